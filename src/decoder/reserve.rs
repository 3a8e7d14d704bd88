//! Wire schema and decoder for the Reserve account.
//!
//! Covers identity pubkeys, decimals (with a `-1` absent-sentinel), an
//! ordered oracle set, risk parameters, and the 256-bit
//! `cumulativeBorrowRateBsf` big fraction.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::decoder::discriminator::account_discriminator;
use crate::decoder::obligation::RawBigFractionBytes;
use crate::error::LiqsolError;
use crate::math::BigFractionBytes as MathBigFraction;

/// Oracle account slots in priority order: Pyth, Switchboard primary,
/// Switchboard TWAP, Scope. A slot of `Pubkey::default()` means "absent" and
/// is excluded from [`Reserve::oracle_pubkeys`].
pub const MAX_ORACLE_SLOTS: usize = 4;

#[derive(BorshDeserialize, BorshSerialize, Debug, Clone, Copy, Default)]
pub struct RawTokenInfo {
    pub pyth_oracle: Pubkey,
    pub switchboard_price_oracle: Pubkey,
    pub switchboard_twap_oracle: Pubkey,
    pub scope_oracle: Pubkey,
    /// `-1` when this reserve does not participate in a Scope price chain,
    /// otherwise a chain index in `[0, 511]`.
    pub scope_price_chain: i16,
}

#[derive(BorshDeserialize, BorshSerialize, Debug, Clone, Copy, Default)]
pub struct RawReserveConfig {
    pub loan_to_value_pct: u8,
    pub liquidation_threshold_pct: u8,
    pub liquidation_bonus_bps: u16,
    pub borrow_factor_pct: u16,
    /// `-1` sentinel when absent.
    pub liquidity_decimals: i16,
    pub collateral_decimals: i16,
}

#[derive(BorshDeserialize, BorshSerialize, Debug, Clone, Copy, Default)]
pub struct RawReserveLiquidity {
    pub mint_pubkey: Pubkey,
    pub available_amount: u64,
    pub total_borrowed_sf: u128,
    pub cumulative_borrow_rate_bsf: RawBigFractionBytes,
}

#[derive(BorshDeserialize, BorshSerialize, Debug, Clone, Copy, Default)]
pub struct RawReserveCollateral {
    pub mint_pubkey: Pubkey,
    /// Circulating supply of the collateral (share) token.
    pub mint_total_supply: u64,
}

/// The wire-exact account body (everything after the 8-byte discriminator).
#[derive(BorshDeserialize, BorshSerialize, Debug, Clone)]
pub struct RawReserve {
    pub version: u8,
    pub lending_market: Pubkey,
    pub liquidity: RawReserveLiquidity,
    pub collateral: RawReserveCollateral,
    pub config: RawReserveConfig,
    pub token_info: RawTokenInfo,
    pub last_update_slot: u64,
}

/// Application-facing decoded reserve.
#[derive(Debug, Clone)]
pub struct Reserve {
    pub reserve_pubkey: Pubkey,
    pub market_pubkey: Pubkey,
    pub liquidity_mint: Pubkey,
    pub collateral_mint: Pubkey,
    /// `-1` sentinel when absent; otherwise `0..=18` per the invariant.
    pub liquidity_decimals: i16,
    pub collateral_decimals: i16,
    /// Ordered, non-null oracle accounts only.
    pub oracle_pubkeys: Vec<Pubkey>,
    pub loan_to_value_pct: u8,
    pub liquidation_threshold_pct: u8,
    pub liquidation_bonus_bps: u16,
    pub borrow_factor_pct: u16,
    pub total_borrowed_sf: u128,
    pub available_liquidity: u64,
    pub cumulative_borrow_rate_bsf: MathBigFraction,
    pub scope_price_chain: Option<u16>,
    pub last_update_slot: u64,
    pub collateral_mint_total_supply: u64,
}

impl Reserve {
    /// Structural invariants: decimals <= 18 (or the -1 sentinel), LTV <=
    /// liquidation threshold <= 100, borrow factor semantically >= 1.0x (>= 100).
    pub fn check_invariants(&self) -> Result<(), LiqsolError> {
        for d in [self.liquidity_decimals, self.collateral_decimals] {
            if d != -1 && !(0..=18).contains(&d) {
                return Err(LiqsolError::bad_input(format!(
                    "reserve {} has out-of-range decimals {d}",
                    self.reserve_pubkey
                )));
            }
        }
        if self.loan_to_value_pct as u16 > self.liquidation_threshold_pct as u16
            || self.liquidation_threshold_pct > 100
        {
            return Err(LiqsolError::bad_input(format!(
                "reserve {} has invalid LTV/threshold ordering ({} / {})",
                self.reserve_pubkey, self.loan_to_value_pct, self.liquidation_threshold_pct
            )));
        }
        if self.borrow_factor_pct < 100 {
            return Err(LiqsolError::bad_input(format!(
                "reserve {} has borrow factor below 1.0x ({})",
                self.reserve_pubkey, self.borrow_factor_pct
            )));
        }
        if let Some(chain) = self.scope_price_chain {
            if chain > 511 {
                return Err(LiqsolError::bad_input(format!(
                    "reserve {} has out-of-range scope price chain {chain}",
                    self.reserve_pubkey
                )));
            }
        }
        Ok(())
    }

    /// Collateral-to-liquidity exchange rate: total liquidity (available +
    /// borrowed) divided by the circulating collateral-share supply. A
    /// freshly initialized reserve with no collateral minted yet trades
    /// 1:1. Obligation deposit accounting stores raw collateral shares, so
    /// this conversion is required before any USD valuation in the health
    /// math module.
    pub fn collateral_exchange_rate(&self) -> f64 {
        if self.collateral_mint_total_supply == 0 {
            return 1.0;
        }
        let total_liquidity =
            self.available_liquidity as f64 + crate::math::sf_to_f64(self.total_borrowed_sf);
        total_liquidity / self.collateral_mint_total_supply as f64
    }
}

fn extract_oracle_pubkeys(token_info: &RawTokenInfo) -> Vec<Pubkey> {
    [
        token_info.pyth_oracle,
        token_info.switchboard_price_oracle,
        token_info.switchboard_twap_oracle,
        token_info.scope_oracle,
    ]
    .into_iter()
    .filter(|pk| *pk != Pubkey::default())
    .collect()
}

/// Decodes raw reserve account bytes, checking the 8-byte account
/// discriminator first.
pub fn decode_reserve(data: &[u8], expected_pubkey: Pubkey) -> Result<Reserve, LiqsolError> {
    let discriminator = data
        .get(..8)
        .ok_or_else(|| LiqsolError::bad_input("account data shorter than 8-byte discriminator"))?;
    let expected = account_discriminator("Reserve");
    if discriminator != expected {
        return Err(LiqsolError::bad_input("bad_discriminator: not a Reserve account"));
    }

    let mut body = &data[8..];
    let raw = RawReserve::deserialize(&mut body)
        .map_err(|e| LiqsolError::bad_input(format!("failed to deserialize Reserve: {e}")))?;

    let oracle_pubkeys = extract_oracle_pubkeys(&raw.token_info);
    let scope_price_chain = if raw.token_info.scope_price_chain < 0 {
        None
    } else {
        Some(raw.token_info.scope_price_chain as u16)
    };

    let reserve = Reserve {
        reserve_pubkey: expected_pubkey,
        market_pubkey: raw.lending_market,
        liquidity_mint: raw.liquidity.mint_pubkey,
        collateral_mint: raw.collateral.mint_pubkey,
        liquidity_decimals: raw.config.liquidity_decimals,
        collateral_decimals: raw.config.collateral_decimals,
        oracle_pubkeys,
        loan_to_value_pct: raw.config.loan_to_value_pct,
        liquidation_threshold_pct: raw.config.liquidation_threshold_pct,
        liquidation_bonus_bps: raw.config.liquidation_bonus_bps,
        borrow_factor_pct: raw.config.borrow_factor_pct,
        total_borrowed_sf: raw.liquidity.total_borrowed_sf,
        available_liquidity: raw.liquidity.available_amount,
        cumulative_borrow_rate_bsf: raw.liquidity.cumulative_borrow_rate_bsf.into(),
        scope_price_chain,
        last_update_slot: raw.last_update_slot,
        collateral_mint_total_supply: raw.collateral.mint_total_supply,
    };
    reserve.check_invariants()?;
    Ok(reserve)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw(ltv: u8, threshold: u8, borrow_factor: u16) -> RawReserve {
        RawReserve {
            version: 1,
            lending_market: Pubkey::new_unique(),
            liquidity: RawReserveLiquidity {
                mint_pubkey: Pubkey::new_unique(),
                available_amount: 1_000_000,
                total_borrowed_sf: 0,
                cumulative_borrow_rate_bsf: RawBigFractionBytes {
                    value: [1_000_000_000_000_000_000, 0, 0, 0],
                    padding: [0, 0],
                },
            },
            collateral: RawReserveCollateral {
                mint_pubkey: Pubkey::new_unique(),
                mint_total_supply: 1_000_000,
            },
            config: RawReserveConfig {
                loan_to_value_pct: ltv,
                liquidation_threshold_pct: threshold,
                liquidation_bonus_bps: 500,
                borrow_factor_pct: borrow_factor,
                liquidity_decimals: 9,
                collateral_decimals: 9,
            },
            token_info: RawTokenInfo {
                pyth_oracle: Pubkey::new_unique(),
                switchboard_price_oracle: Pubkey::default(),
                switchboard_twap_oracle: Pubkey::default(),
                scope_oracle: Pubkey::default(),
                scope_price_chain: -1,
            },
            last_update_slot: 123,
        }
    }

    fn raw_bytes_for(raw: &RawReserve) -> Vec<u8> {
        let mut out = account_discriminator("Reserve").to_vec();
        out.extend(borsh::to_vec(raw).unwrap());
        out
    }

    #[test]
    fn decode_extracts_only_non_null_oracles() {
        let raw = sample_raw(80, 85, 100);
        let bytes = raw_bytes_for(&raw);
        let reserve = decode_reserve(&bytes, Pubkey::new_unique()).unwrap();
        assert_eq!(reserve.oracle_pubkeys.len(), 1);
        assert_eq!(reserve.scope_price_chain, None);
    }

    #[test]
    fn decode_rejects_ltv_above_threshold() {
        let raw = sample_raw(90, 85, 100);
        let bytes = raw_bytes_for(&raw);
        assert!(decode_reserve(&bytes, Pubkey::new_unique()).is_err());
    }

    #[test]
    fn decode_rejects_borrow_factor_below_one() {
        let raw = sample_raw(80, 85, 99);
        let bytes = raw_bytes_for(&raw);
        assert!(decode_reserve(&bytes, Pubkey::new_unique()).is_err());
    }

    #[test]
    fn collateral_exchange_rate_is_liquidity_over_supply() {
        let raw = sample_raw(80, 85, 100);
        let bytes = raw_bytes_for(&raw);
        let reserve = decode_reserve(&bytes, Pubkey::new_unique()).unwrap();
        assert!((reserve.collateral_exchange_rate() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn decode_rejects_bad_discriminator() {
        let raw = sample_raw(80, 85, 100);
        let mut bytes = raw_bytes_for(&raw);
        bytes[0] ^= 0xff;
        assert!(decode_reserve(&bytes, Pubkey::new_unique()).is_err());
    }
}
