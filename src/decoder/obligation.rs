//! Wire schema and decoder for the Obligation account.
//!
//! The on-chain layout stores `deposits`/`borrows` as fixed-length arrays of
//! slots; zero-amount slots are live placeholders for assets the obligation
//! is not currently using. This decoder filters those out for callers that
//! want "active" positions, while preserving the original slot count so
//! refresh-instruction account ordering can still be derived.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::decoder::discriminator::account_discriminator;
use crate::error::LiqsolError;
use crate::math::BigFractionBytes as MathBigFraction;

pub const MAX_OBLIGATION_DEPOSITS: usize = 8;
pub const MAX_OBLIGATION_BORROWS: usize = 5;

/// Raw wire encoding of a 256-bit big fraction: four little-endian `u64`
/// limbs plus on-chain padding.
#[derive(BorshDeserialize, BorshSerialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawBigFractionBytes {
    pub value: [u64; 4],
    pub padding: [u64; 2],
}

impl From<RawBigFractionBytes> for MathBigFraction {
    fn from(raw: RawBigFractionBytes) -> Self {
        MathBigFraction { value: raw.value }
    }
}

#[derive(BorshDeserialize, BorshSerialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawLastUpdate {
    pub slot: u64,
    pub stale: u8,
    pub price_status: u8,
    pub placeholder: [u8; 6],
}

#[derive(BorshDeserialize, BorshSerialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawObligationCollateral {
    pub deposit_reserve: Pubkey,
    pub deposited_amount: u64,
    pub market_value_sf: u128,
    pub borrowed_amount_against_this_collateral_in_elevation_group: u64,
    pub padding: [u64; 9],
}

#[derive(BorshDeserialize, BorshSerialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawObligationLiquidity {
    pub borrow_reserve: Pubkey,
    pub cumulative_borrow_rate_bsf: RawBigFractionBytes,
    pub padding: u64,
    pub borrowed_amount_sf: u128,
    pub market_value_sf: u128,
    pub borrow_factor_adjusted_market_value_sf: u128,
    pub borrowed_amount_outside_elevation_groups: u64,
    pub padding2: [u64; 7],
}

#[derive(BorshDeserialize, BorshSerialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawObligationOrder {
    pub condition_threshold_sf: u128,
    pub opportunity_parameter_sf: u128,
    pub min_execution_bonus_bps: u16,
    pub max_execution_bonus_bps: u16,
    pub condition_type: u8,
    pub opportunity_type: u8,
    pub padding1: [u8; 10],
    pub padding2: [u128; 5],
}

/// The wire-exact account body (everything after the 8-byte discriminator).
#[derive(BorshDeserialize, BorshSerialize, Debug, Clone)]
pub struct RawObligation {
    pub tag: u64,
    pub last_update: RawLastUpdate,
    pub lending_market: Pubkey,
    pub owner: Pubkey,
    pub deposits: [RawObligationCollateral; MAX_OBLIGATION_DEPOSITS],
    pub lowest_reserve_deposit_liquidation_ltv: u64,
    pub deposited_value_sf: u128,
    pub borrows: [RawObligationLiquidity; MAX_OBLIGATION_BORROWS],
    pub borrow_factor_adjusted_debt_value_sf: u128,
    pub borrowed_assets_market_value_sf: u128,
    pub allowed_borrow_value_sf: u128,
    pub unhealthy_borrow_value_sf: u128,
    pub deposits_asset_tiers: [u8; MAX_OBLIGATION_DEPOSITS],
    pub borrows_asset_tiers: [u8; MAX_OBLIGATION_BORROWS],
    pub elevation_group: u8,
    pub num_of_obsolete_deposit_reserves: u8,
    pub has_debt: u8,
    pub referrer: Pubkey,
    pub borrowing_disabled: u8,
    pub autodeleverage_target_ltv_pct: u8,
    pub lowest_reserve_deposit_max_ltv_pct: u8,
    pub num_of_obsolete_borrow_reserves: u8,
    pub reserved: [u8; 4],
    pub highest_borrow_factor_pct: u64,
    pub autodeleverage_margin_call_started_timestamp: u64,
    pub orders: [RawObligationOrder; 2],
    pub padding_3: [u64; 93],
}

/// An active (non-zero) deposit slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositSlot {
    pub deposit_reserve: Pubkey,
    pub deposited_amount: u64,
}

/// An active (non-zero) borrow slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowSlot {
    pub borrow_reserve: Pubkey,
    pub borrowed_amount_sf: u128,
}

/// The decoded, application-facing obligation: zero-amount slots filtered
/// out of `deposits`/`borrows`, but `deposits_slot_count`/`borrows_slot_count`
/// retained so refresh-instruction account ordering (component L) can
/// reconstruct the original on-chain slot layout.
#[derive(Debug, Clone)]
pub struct Obligation {
    pub obligation_pubkey: Pubkey,
    pub owner_pubkey: Pubkey,
    pub market_pubkey: Pubkey,
    pub last_update_slot: u64,
    pub deposits: Vec<DepositSlot>,
    pub borrows: Vec<BorrowSlot>,
    pub deposits_slot_count: usize,
    pub borrows_slot_count: usize,
    /// Protocol-computed scaled-fraction totals, for a cross-check health
    /// ratio independent of this crate's own recomputed one.
    pub deposited_value_sf: u128,
    pub borrow_factor_adjusted_debt_value_sf: u128,
}

impl Obligation {
    /// All deposit reserves referenced by this obligation, active or not.
    /// A reserve-membership precheck must consider every slot, not just the
    /// filtered active ones, since a zero-amount slot still identifies a
    /// known reserve the obligation touches.
    pub fn all_deposit_reserves(&self) -> impl Iterator<Item = Pubkey> + '_ {
        self.deposits.iter().map(|d| d.deposit_reserve)
    }

    pub fn all_borrow_reserves(&self) -> impl Iterator<Item = Pubkey> + '_ {
        self.borrows.iter().map(|b| b.borrow_reserve)
    }

    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty() && self.borrows.is_empty()
    }
}

/// Decodes raw obligation account bytes, checking the 8-byte account
/// discriminator first. `expected_pubkey` is threaded through purely for
/// attaching identity to the result; it is not itself validated against
/// the account contents (the on-chain program enforces that).
pub fn decode_obligation(data: &[u8], expected_pubkey: Pubkey) -> Result<Obligation, LiqsolError> {
    let discriminator = data
        .get(..8)
        .ok_or_else(|| LiqsolError::bad_input("account data shorter than 8-byte discriminator"))?;
    let expected = account_discriminator("Obligation");
    if discriminator != expected {
        return Err(LiqsolError::bad_input("bad_discriminator: not an Obligation account"));
    }

    let mut body = &data[8..];
    let raw = RawObligation::deserialize(&mut body)
        .map_err(|e| LiqsolError::bad_input(format!("failed to deserialize Obligation: {e}")))?;

    let deposits_slot_count = raw.deposits.len();
    let borrows_slot_count = raw.borrows.len();

    let deposits = raw
        .deposits
        .iter()
        .filter(|d| d.deposited_amount != 0)
        .map(|d| DepositSlot {
            deposit_reserve: d.deposit_reserve,
            deposited_amount: d.deposited_amount,
        })
        .collect();

    let borrows = raw
        .borrows
        .iter()
        .filter(|b| b.borrowed_amount_sf != 0)
        .map(|b| BorrowSlot {
            borrow_reserve: b.borrow_reserve,
            borrowed_amount_sf: b.borrowed_amount_sf,
        })
        .collect();

    Ok(Obligation {
        obligation_pubkey: expected_pubkey,
        owner_pubkey: raw.owner,
        market_pubkey: raw.lending_market,
        last_update_slot: raw.last_update.slot,
        deposits,
        borrows,
        deposits_slot_count,
        borrows_slot_count,
        deposited_value_sf: raw.deposited_value_sf,
        borrow_factor_adjusted_debt_value_sf: raw.borrow_factor_adjusted_debt_value_sf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_bytes_for(raw: &RawObligation) -> Vec<u8> {
        let mut out = account_discriminator("Obligation").to_vec();
        out.extend(borsh::to_vec(raw).unwrap());
        out
    }

    #[test]
    fn decode_filters_zero_amount_slots_but_keeps_slot_count() {
        let mut raw = RawObligation {
            tag: 0,
            last_update: RawLastUpdate {
                slot: 42,
                ..Default::default()
            },
            lending_market: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            deposits: [RawObligationCollateral::default(); MAX_OBLIGATION_DEPOSITS],
            lowest_reserve_deposit_liquidation_ltv: 0,
            deposited_value_sf: 0,
            borrows: [RawObligationLiquidity::default(); MAX_OBLIGATION_BORROWS],
            borrow_factor_adjusted_debt_value_sf: 0,
            borrowed_assets_market_value_sf: 0,
            allowed_borrow_value_sf: 0,
            unhealthy_borrow_value_sf: 0,
            deposits_asset_tiers: [u8::MAX; MAX_OBLIGATION_DEPOSITS],
            borrows_asset_tiers: [u8::MAX; MAX_OBLIGATION_BORROWS],
            elevation_group: 0,
            num_of_obsolete_deposit_reserves: 0,
            has_debt: 0,
            referrer: Pubkey::default(),
            borrowing_disabled: 0,
            autodeleverage_target_ltv_pct: 0,
            lowest_reserve_deposit_max_ltv_pct: 0,
            num_of_obsolete_borrow_reserves: 0,
            reserved: [0; 4],
            highest_borrow_factor_pct: 0,
            autodeleverage_margin_call_started_timestamp: 0,
            orders: [RawObligationOrder::default(); 2],
            padding_3: [0; 93],
        };
        raw.deposits[0] = RawObligationCollateral {
            deposit_reserve: Pubkey::new_unique(),
            deposited_amount: 1_000,
            ..Default::default()
        };
        raw.borrows[0] = RawObligationLiquidity {
            borrow_reserve: Pubkey::new_unique(),
            borrowed_amount_sf: 5_000_000_000_000_000_000,
            ..Default::default()
        };

        let bytes = raw_bytes_for(&raw);
        let decoded = decode_obligation(&bytes, Pubkey::new_unique()).unwrap();

        assert_eq!(decoded.deposits.len(), 1);
        assert_eq!(decoded.borrows.len(), 1);
        assert_eq!(decoded.deposits_slot_count, MAX_OBLIGATION_DEPOSITS);
        assert_eq!(decoded.borrows_slot_count, MAX_OBLIGATION_BORROWS);
        assert_eq!(decoded.last_update_slot, 42);
    }

    #[test]
    fn decode_rejects_bad_discriminator() {
        let mut bytes = vec![0u8; 8];
        bytes.extend(vec![0u8; 1784]);
        bytes[0] = 0xff;
        let err = decode_obligation(&bytes, Pubkey::new_unique()).unwrap_err();
        assert!(matches!(err, LiqsolError::BadInput { .. }));
    }

    #[test]
    fn decode_rejects_truncated_data() {
        let bytes = vec![0u8; 4];
        assert!(decode_obligation(&bytes, Pubkey::new_unique()).is_err());
    }
}
