//! Flash loan builder: assembles the protocol-specific borrow/repay
//! instruction pair, bound to the exact position the borrow instruction
//! will occupy in the final transaction (`borrowIxIndex`).

use solana_program::sysvar;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address_with_program_id;

use crate::decoder::discriminator::instruction_discriminator;
use crate::error::LiqsolError;
use crate::math::ui_amount_to_base_units;

pub const NATIVE_SOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");
pub const USDC_MINT: Pubkey = pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashLoanSymbol {
    Sol,
    Usdc,
}

impl FlashLoanSymbol {
    pub fn mint(&self) -> Pubkey {
        match self {
            FlashLoanSymbol::Sol => NATIVE_SOL_MINT,
            FlashLoanSymbol::Usdc => USDC_MINT,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            FlashLoanSymbol::Sol => 9,
            FlashLoanSymbol::Usdc => 6,
        }
    }
}

pub struct FlashLoanRequest {
    pub market_pubkey: Pubkey,
    pub klend_program_id: Pubkey,
    pub signer: Pubkey,
    pub symbol: FlashLoanSymbol,
    pub reserve_pubkey: Pubkey,
    pub reserve_liquidity_supply: Pubkey,
    pub reserve_token_program: Pubkey,
    pub lending_market_authority: Pubkey,
    pub ui_amount: String,
    /// The exact position the flash-borrow instruction will occupy in the
    /// final transaction. On-chain validation fails if this doesn't match
    /// the instruction's actual index, so the caller must re-invoke the
    /// builder after any upstream instruction is inserted/removed.
    pub borrow_ix_index: u8,
}

pub struct FlashLoanArtifact {
    pub destination_ata: Pubkey,
    pub token_program_id: Pubkey,
    pub flash_borrow_ix: Instruction,
    pub flash_repay_ix: Instruction,
}

/// Builds the flash-borrow/flash-repay instruction pair for `request`.
pub fn build_flash_loan(request: &FlashLoanRequest) -> Result<FlashLoanArtifact, LiqsolError> {
    let amount_base_units = ui_amount_to_base_units(&request.ui_amount, request.symbol.decimals())?;

    let destination_ata = get_associated_token_address_with_program_id(
        &request.signer,
        &request.symbol.mint(),
        &request.reserve_token_program,
    );

    let borrow_data = build_flash_borrow_data(amount_base_units);
    let repay_data = build_flash_repay_data(amount_base_units, request.borrow_ix_index);

    let shared_accounts = vec![
        AccountMeta::new(request.signer, true),
        AccountMeta::new(request.reserve_pubkey, false),
        AccountMeta::new(request.reserve_liquidity_supply, false),
        AccountMeta::new(destination_ata, false),
        AccountMeta::new_readonly(request.market_pubkey, false),
        AccountMeta::new_readonly(request.lending_market_authority, false),
        AccountMeta::new_readonly(request.reserve_token_program, false),
        AccountMeta::new_readonly(sysvar::instructions::ID, false),
    ];

    let flash_borrow_ix = Instruction {
        program_id: request.klend_program_id,
        accounts: shared_accounts.clone(),
        data: borrow_data,
    };
    let flash_repay_ix = Instruction {
        program_id: request.klend_program_id,
        accounts: shared_accounts,
        data: repay_data,
    };

    Ok(FlashLoanArtifact {
        destination_ata,
        token_program_id: request.reserve_token_program,
        flash_borrow_ix,
        flash_repay_ix,
    })
}

/// `flash_borrow_reserve_liquidity(ctx, liquidity_amount: u64)`.
fn build_flash_borrow_data(amount_base_units: u64) -> Vec<u8> {
    let mut data = instruction_discriminator("flash_borrow_reserve_liquidity").to_vec();
    data.extend_from_slice(&amount_base_units.to_le_bytes());
    data
}

/// `flash_repay_reserve_liquidity(ctx, liquidity_amount: u64, borrow_instruction_index: u8)`.
/// The trailing index byte is what binds this repay to the flash-borrow at
/// `borrow_ix_index`; omitting it fails Anchor's arg deserialization on-chain.
fn build_flash_repay_data(amount_base_units: u64, borrow_instruction_index: u8) -> Vec<u8> {
    let mut data = instruction_discriminator("flash_repay_reserve_liquidity").to_vec();
    data.extend_from_slice(&amount_base_units.to_le_bytes());
    data.push(borrow_instruction_index);
    data
}
