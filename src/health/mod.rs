//! Health-ratio computation: per-leg USD valuation of an obligation's
//! deposits and borrows, threshold/borrow-factor weighting, and the
//! resulting clamped + raw health ratio.

use solana_sdk::pubkey::Pubkey;

use crate::cache::{OracleCache, ReserveCache};
use crate::decoder::Obligation;
use crate::math::sf_to_f64;

/// Why an obligation could not be scored. Returned as a tagged value, never
/// as an error — an unscorable obligation is an ordinary outcome, not a
/// failure of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnscoredReason {
    MissingReserve { reserve: Pubkey },
    MissingOracle { mint: Pubkey },
    EmptyObligation,
    CachesUnset,
    OtherMarket,
}

impl UnscoredReason {
    /// Stable string key, used as the `unscoredReasons` stats counter key.
    pub fn key(&self) -> &'static str {
        match self {
            UnscoredReason::MissingReserve { .. } => "missing_reserve",
            UnscoredReason::MissingOracle { .. } => "missing_oracle",
            UnscoredReason::EmptyObligation => "empty_obligation",
            UnscoredReason::CachesUnset => "no_caches",
            UnscoredReason::OtherMarket => "other_market",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DepositLegBreakdown {
    pub reserve: Pubkey,
    pub mint: Pubkey,
    pub liquidity_units: f64,
    pub value_usd: f64,
    pub weighted_value_usd: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct BorrowLegBreakdown {
    pub reserve: Pubkey,
    pub mint: Pubkey,
    pub liquidity_units: f64,
    pub value_usd: f64,
    pub weighted_value_usd: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HealthBreakdown {
    pub deposits: Vec<DepositLegBreakdown>,
    pub borrows: Vec<BorrowLegBreakdown>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HealthOptions {
    pub include_breakdown: bool,
    pub expose_raw_hr: bool,
}

#[derive(Debug, Clone)]
pub struct ScoredObligation {
    pub obligation_pubkey: Pubkey,
    pub owner_pubkey: Pubkey,
    pub health_ratio: f64,
    pub health_ratio_raw: Option<f64>,
    pub liquidation_eligible: bool,
    pub borrow_value_usd: f64,
    pub collateral_value_usd: f64,
    pub repay_reserve_pubkey: Option<Pubkey>,
    pub collateral_reserve_pubkey: Option<Pubkey>,
    pub primary_borrow_mint: Option<Pubkey>,
    pub primary_collateral_mint: Option<Pubkey>,
    pub deposits_count: usize,
    pub borrows_count: usize,
    pub breakdown: Option<HealthBreakdown>,
}

#[derive(Debug, Clone)]
pub enum HealthOutcome {
    Scored(ScoredObligation),
    Unscored(UnscoredReason),
}

/// `isLiquidatable(healthRatio) = healthRatio < 1.0`. The weighting already
/// folds in the liquidation threshold / borrow factor, so no further
/// adjustment is needed at the comparison site.
pub fn is_liquidatable(health_ratio: f64) -> bool {
    health_ratio < 1.0
}

/// Converts a raw base-unit amount to its UI-decimal value. Reserves with
/// the `-1` absent-decimals sentinel are treated as already being in UI
/// units (no scaling).
fn base_units_to_ui_f64(base_units: f64, decimals: i16) -> f64 {
    if decimals < 0 {
        base_units
    } else {
        base_units / 10f64.powi(decimals as i32)
    }
}

/// Computes the health ratio of one obligation against the given reserve
/// and oracle caches.
///
/// For each deposit: collateral-token shares are converted to liquidity
/// units via the reserve's collateral exchange rate, valued at the oracle
/// UI price *minus* one confidence step, then weighted by
/// `liquidationThreshold / 100`. For each borrow: `borrowedAmountSf` is
/// treated as a 1e18-scaled liquidity base-unit amount, valued at the
/// oracle UI price *plus* one confidence step, then weighted by
/// `borrowFactor / 100`.
pub fn compute_health_scoring(
    obligation: &Obligation,
    reserve_cache: &ReserveCache,
    oracle_cache: &OracleCache,
    options: HealthOptions,
) -> HealthOutcome {
    if obligation.is_empty() {
        return HealthOutcome::Unscored(UnscoredReason::EmptyObligation);
    }
    if reserve_cache.is_empty() || oracle_cache.is_empty() {
        return HealthOutcome::Unscored(UnscoredReason::CachesUnset);
    }

    let mut deposit_legs = Vec::with_capacity(obligation.deposits.len());
    let mut borrow_legs = Vec::with_capacity(obligation.borrows.len());
    let mut total_collateral_weighted = 0.0;
    let mut total_collateral_usd = 0.0;
    let mut total_borrow_weighted = 0.0;
    let mut total_borrow_usd = 0.0;

    for deposit in &obligation.deposits {
        let reserve = match reserve_cache.by_reserve(&deposit.deposit_reserve) {
            Some(r) => r,
            None => {
                return HealthOutcome::Unscored(UnscoredReason::MissingReserve {
                    reserve: deposit.deposit_reserve,
                })
            }
        };
        let mint = reserve.liquidity_mint;
        let price = match oracle_cache.get(&mint) {
            Some(p) => p,
            None => return HealthOutcome::Unscored(UnscoredReason::MissingOracle { mint }),
        };

        let raw_liquidity_units = deposit.deposited_amount as f64 * reserve.collateral_exchange_rate();
        let liquidity_units = base_units_to_ui_f64(raw_liquidity_units, reserve.liquidity_decimals);
        let haircut_price = (price.ui_price() - price.confidence_step_ui()).max(0.0);
        let value_usd = liquidity_units * haircut_price;
        let weighted = value_usd * (reserve.liquidation_threshold_pct as f64 / 100.0);

        total_collateral_usd += value_usd;
        total_collateral_weighted += weighted;
        deposit_legs.push(DepositLegBreakdown {
            reserve: deposit.deposit_reserve,
            mint,
            liquidity_units,
            value_usd,
            weighted_value_usd: weighted,
        });
    }

    for borrow in &obligation.borrows {
        let reserve = match reserve_cache.by_reserve(&borrow.borrow_reserve) {
            Some(r) => r,
            None => {
                return HealthOutcome::Unscored(UnscoredReason::MissingReserve {
                    reserve: borrow.borrow_reserve,
                })
            }
        };
        let mint = reserve.liquidity_mint;
        let price = match oracle_cache.get(&mint) {
            Some(p) => p,
            None => return HealthOutcome::Unscored(UnscoredReason::MissingOracle { mint }),
        };

        let raw_liquidity_units = sf_to_f64(borrow.borrowed_amount_sf);
        let liquidity_units = base_units_to_ui_f64(raw_liquidity_units, reserve.liquidity_decimals);
        let padded_price = price.ui_price() + price.confidence_step_ui();
        let value_usd = liquidity_units * padded_price;
        let weighted = value_usd * (reserve.borrow_factor_pct as f64 / 100.0);

        total_borrow_usd += value_usd;
        total_borrow_weighted += weighted;
        borrow_legs.push(BorrowLegBreakdown {
            reserve: borrow.borrow_reserve,
            mint,
            liquidity_units,
            value_usd,
            weighted_value_usd: weighted,
        });
    }

    let health_ratio_raw = if total_borrow_weighted == 0.0 {
        f64::INFINITY
    } else {
        total_collateral_weighted / total_borrow_weighted
    };
    let health_ratio = crate::math::clamp_f64(health_ratio_raw, 0.0, 2.0);

    let primary_collateral = deposit_legs
        .iter()
        .max_by(|a, b| a.value_usd.total_cmp(&b.value_usd));
    let primary_borrow = borrow_legs.iter().max_by(|a, b| a.value_usd.total_cmp(&b.value_usd));

    let scored = ScoredObligation {
        obligation_pubkey: obligation.obligation_pubkey,
        owner_pubkey: obligation.owner_pubkey,
        health_ratio,
        health_ratio_raw: options.expose_raw_hr.then_some(health_ratio_raw),
        liquidation_eligible: is_liquidatable(health_ratio),
        borrow_value_usd: total_borrow_usd,
        collateral_value_usd: total_collateral_usd,
        repay_reserve_pubkey: primary_borrow.map(|b| b.reserve),
        collateral_reserve_pubkey: primary_collateral.map(|d| d.reserve),
        primary_borrow_mint: primary_borrow.map(|b| b.mint),
        primary_collateral_mint: primary_collateral.map(|d| d.mint),
        deposits_count: obligation.deposits.len(),
        borrows_count: obligation.borrows.len(),
        breakdown: options.include_breakdown.then(|| HealthBreakdown {
            deposits: deposit_legs,
            borrows: borrow_legs,
        }),
    };
    HealthOutcome::Scored(scored)
}
