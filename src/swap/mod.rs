//! Swap-aggregator client shim: the external quote/swap aggregator is
//! treated as a remote quoting service that returns already-compiled
//! instructions, never as something this crate assembles itself.

use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use crate::error::LiqsolError;

#[derive(Debug, Clone)]
pub struct SwapInstructions {
    pub setup_ixs: Vec<Instruction>,
    pub swap_ix: Instruction,
    pub cleanup_ixs: Vec<Instruction>,
    pub address_lookup_tables: Vec<Pubkey>,
    pub expected_output_base_units: u64,
}

#[async_trait]
pub trait SwapQuoteProvider: Send + Sync {
    async fn quote_and_build_swap(
        &self,
        input_mint: Pubkey,
        output_mint: Pubkey,
        amount_in_base_units: u64,
        slippage_bps: u16,
        user: Pubkey,
    ) -> Result<SwapInstructions, LiqsolError>;
}

/// Deterministic stand-in for the real aggregator, used in tests and
/// dry-run CLI paths.
pub struct FakeSwapQuoteProvider {
    pub fixed_output_base_units: u64,
    pub program_id: Pubkey,
}

#[async_trait]
impl SwapQuoteProvider for FakeSwapQuoteProvider {
    async fn quote_and_build_swap(
        &self,
        input_mint: Pubkey,
        output_mint: Pubkey,
        amount_in_base_units: u64,
        _slippage_bps: u16,
        user: Pubkey,
    ) -> Result<SwapInstructions, LiqsolError> {
        if amount_in_base_units == 0 {
            return Err(LiqsolError::bad_input("cannot quote a zero-amount swap"));
        }
        let swap_ix = Instruction {
            program_id: self.program_id,
            accounts: vec![
                solana_sdk::instruction::AccountMeta::new(user, true),
                solana_sdk::instruction::AccountMeta::new_readonly(input_mint, false),
                solana_sdk::instruction::AccountMeta::new_readonly(output_mint, false),
            ],
            data: amount_in_base_units.to_le_bytes().to_vec(),
        };
        Ok(SwapInstructions {
            setup_ixs: vec![],
            swap_ix,
            cleanup_ixs: vec![],
            address_lookup_tables: vec![],
            expected_output_base_units: self.fixed_output_base_units,
        })
    }
}
