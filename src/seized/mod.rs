//! Seized-collateral estimator (component M): simulates the liquidation
//! instruction window on its own, without the flash-borrow/repay pair, to
//! measure how much collateral a liquidation would actually seize before
//! committing to a swap route.

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSimulateTransactionAccountsConfig, RpcSimulateTransactionConfig};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::message::{v0, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signer;
use solana_sdk::signer::keypair::Keypair;
use solana_sdk::transaction::VersionedTransaction;

use crate::error::LiqsolError;
use crate::liquidation::{ata_setup_ixs, liquidate_ix, refresh_farm_ix, refresh_obligation_ix, refresh_reserve_ix, LiquidationRequest};

/// Default basis-point haircut applied to a seized-collateral estimate
/// before it's handed to the swap builder, guarding against the estimate
/// drifting stale by the time the real liquidation lands.
pub const DEFAULT_SWAP_IN_HAIRCUT_BPS: u16 = 100;

pub struct SeizedEstimate {
    pub pre_balance_base_units: u64,
    pub post_balance_base_units: u64,
    pub seized_delta_base_units: u64,
    pub haircut_bps: u16,
}

impl SeizedEstimate {
    /// The amount to feed into the swap builder after applying the
    /// configured haircut.
    pub fn haircut_amount_base_units(&self) -> u64 {
        let bps = self.haircut_bps as u128;
        let reduced = (self.seized_delta_base_units as u128) * (10_000u128.saturating_sub(bps)) / 10_000;
        reduced as u64
    }
}

fn decode_token_amount_base64(data_base64: &str) -> Option<u64> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD.decode(data_base64).ok()?;
    // SPL token account layout: amount is a little-endian u64 at byte offset 64.
    let amount_bytes = bytes.get(64..72)?;
    Some(u64::from_le_bytes(amount_bytes.try_into().ok()?))
}

/// Builds the liquidation-only instruction set (no flash loan) used for
/// simulation: ComputeBudget, ATA setup, PRE refresh, CORE refresh +
/// core farms, LIQUIDATE, POST farms.
fn build_simulation_instructions(req: &LiquidationRequest) -> Vec<solana_sdk::instruction::Instruction> {
    let mut instructions = Vec::new();
    instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(req.compute_unit_limit));
    instructions.extend(ata_setup_ixs(
        req.liquidator,
        &[
            (req.repay.liquidity_mint, req.repay.liquidity_token_program),
            (req.withdraw.liquidity_mint, req.withdraw.liquidity_token_program),
        ],
    ));
    for reserve in &req.obligation_reserves {
        instructions.push(refresh_reserve_ix(req.klend_program_id, *reserve));
    }
    instructions.push(refresh_obligation_ix(
        req.klend_program_id,
        req.market_pubkey,
        req.obligation_pubkey,
        &req.obligation_reserves,
    ));
    if let Some(farm) = req.repay.farm_pubkey {
        instructions.push(refresh_farm_ix(req.klend_program_id, req.repay.reserve_pubkey, farm));
    }
    if let Some(farm) = req.withdraw.farm_pubkey {
        instructions.push(refresh_farm_ix(req.klend_program_id, req.withdraw.reserve_pubkey, farm));
    }
    instructions.push(liquidate_ix(req));
    if let Some(farm) = req.repay.farm_pubkey {
        instructions.push(refresh_farm_ix(req.klend_program_id, req.repay.reserve_pubkey, farm));
    }
    if let Some(farm) = req.withdraw.farm_pubkey {
        instructions.push(refresh_farm_ix(req.klend_program_id, req.withdraw.reserve_pubkey, farm));
    }
    instructions
}

/// Simulates the liquidation-only instruction window and returns the
/// seized-collateral delta on the liquidator's collateral ATA, haircut by
/// `haircut_bps`.
pub async fn estimate_seized_collateral(
    client: &RpcClient,
    req: &LiquidationRequest,
    liquidator_keypair: &Keypair,
    collateral_ata: Pubkey,
    haircut_bps: u16,
) -> Result<SeizedEstimate, LiqsolError> {
    let pre_balance_base_units = match client.get_token_account_balance(&collateral_ata).await {
        Ok(balance) => balance
            .amount
            .parse::<u64>()
            .map_err(|_| LiqsolError::bad_input("non-numeric pre-liquidation collateral balance"))?,
        Err(_) => 0,
    };

    let instructions = build_simulation_instructions(req);
    let blockhash = client.get_latest_blockhash().await?;
    let message = v0::Message::try_compile(&liquidator_keypair.pubkey(), &instructions, &[], blockhash)
        .map_err(|e| LiqsolError::bad_input(format!("failed to compile simulation message: {e}")))?;
    let tx = VersionedTransaction::try_new(VersionedMessage::V0(message), &[liquidator_keypair])
        .map_err(|e| LiqsolError::bad_input(format!("failed to sign simulation transaction: {e}")))?;

    let config = RpcSimulateTransactionConfig {
        sig_verify: false,
        replace_recent_blockhash: true,
        commitment: Some(CommitmentConfig::processed()),
        accounts: Some(RpcSimulateTransactionAccountsConfig {
            encoding: Some(solana_account_decoder::UiAccountEncoding::Base64),
            addresses: vec![collateral_ata.to_string()],
        }),
        ..RpcSimulateTransactionConfig::default()
    };

    let result = client.simulate_transaction_with_config(&tx, config).await?;
    if result.value.err.is_some() {
        let logs = result.value.logs.clone().unwrap_or_default();
        let classified = crate::error::SimulationFailure::classify(&logs);
        return Err(LiqsolError::SimulationFailed { logs, classified });
    }

    let post_balance_base_units = result
        .value
        .accounts
        .and_then(|accs| accs.into_iter().next())
        .flatten()
        .and_then(|acc| match acc.data {
            solana_account_decoder::UiAccountData::Binary(data, _) => decode_token_amount_base64(&data),
            _ => None,
        })
        .unwrap_or(pre_balance_base_units);

    if post_balance_base_units <= pre_balance_base_units {
        return Err(LiqsolError::bad_input("no_collateral_delta"));
    }

    let seized_delta_base_units = post_balance_base_units - pre_balance_base_units;

    Ok(SeizedEstimate {
        pre_balance_base_units,
        post_balance_base_units,
        seized_delta_base_units,
        haircut_bps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haircut_reduces_by_configured_bps() {
        let estimate = SeizedEstimate {
            pre_balance_base_units: 0,
            post_balance_base_units: 1_000_000,
            seized_delta_base_units: 1_000_000,
            haircut_bps: 100,
        };
        assert_eq!(estimate.haircut_amount_base_units(), 990_000);
    }

    #[test]
    fn zero_haircut_passes_through_unchanged() {
        let estimate = SeizedEstimate {
            pre_balance_base_units: 0,
            post_balance_base_units: 500,
            seized_delta_base_units: 500,
            haircut_bps: 0,
        };
        assert_eq!(estimate.haircut_amount_base_units(), 500);
    }

    #[test]
    fn decode_token_amount_reads_offset_64() {
        let mut bytes = vec![0u8; 72];
        bytes[64..72].copy_from_slice(&1_234_567u64.to_le_bytes());
        let encoded = {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        };
        assert_eq!(decode_token_amount_base64(&encoded), Some(1_234_567));
    }
}
