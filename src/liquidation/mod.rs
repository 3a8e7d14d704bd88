//! Liquidation transaction builder (component L): assembles the canonical
//! refresh/liquidate/farm instruction window for one obligation, bracketed
//! by the flash-borrow and flash-repay instructions built in
//! [`crate::flashloan`].
//!
//! Canonical instruction order produced by [`build_liquidation_window`]:
//!
//! ```text
//! [ComputeBudget limit, ComputeBudget price]
//! FlashBorrow
//! [ATA create idempotent x <=3]
//! RefreshReserve x N            (N = number of distinct reserves the obligation touches, N >= 2)
//! RefreshObligation              (remaining_accounts = same N reserves, deterministic order)
//! RefreshObligationFarmsForReserve x {0,1,2}   (repay side, then withdraw side, each only if farm configured)
//! LiquidateObligationAndRedeemReserveCollateral
//! RefreshObligationFarmsForReserve x same count as above
//! [swap setup / swap / cleanup]
//! FlashRepay
//! ```

use std::collections::HashSet;

use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address_with_program_id;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;

use crate::decoder::discriminator::instruction_discriminator;
use crate::error::LiqsolError;
use crate::flashloan::{build_flash_loan, FlashLoanArtifact, FlashLoanRequest, FlashLoanSymbol};
use crate::swap::SwapInstructions;

/// One side (repay or withdraw) of the liquidation instruction's reserve
/// accounts.
#[derive(Debug, Clone)]
pub struct LiquidationReserveSide {
    pub reserve_pubkey: Pubkey,
    pub liquidity_mint: Pubkey,
    pub liquidity_supply: Pubkey,
    pub liquidity_token_program: Pubkey,
    /// `None` on the repay side; the withdraw side additionally needs its
    /// collateral mint/supply to redeem collateral shares into liquidity.
    pub collateral_mint: Option<Pubkey>,
    pub collateral_supply: Option<Pubkey>,
    /// Farm account for this reserve, if the reserve has a farm configured.
    pub farm_pubkey: Option<Pubkey>,
}

pub struct LiquidationRequest {
    pub klend_program_id: Pubkey,
    pub market_pubkey: Pubkey,
    pub lending_market_authority: Pubkey,
    pub liquidator: Pubkey,
    pub obligation_pubkey: Pubkey,
    pub obligation_owner: Pubkey,
    /// Every reserve the obligation references (deposits then borrows, in
    /// slot order, deduplicated). Must contain at least 2 entries.
    pub obligation_reserves: Vec<Pubkey>,
    pub repay: LiquidationReserveSide,
    pub withdraw: LiquidationReserveSide,
    pub liquidity_amount_base_units: u64,
    pub min_acceptable_received_collateral_amount: u64,
    pub flash_loan: FlashLoanRequest,
    pub compute_unit_limit: u32,
    pub compute_unit_price_micro_lamports: u64,
    pub swap: Option<SwapInstructions>,
    /// Destination ATAs already confirmed to exist on-chain (from account
    /// state read ahead of the build). A role whose derived ATA appears
    /// here is skipped in `setupIxs`; per spec, `setupIxs` is empty when
    /// all three destination ATAs already exist.
    pub existing_atas: HashSet<Pubkey>,
    /// Downgrade-profile toggle: when true, neither the compute-unit-limit
    /// nor compute-unit-price instruction is emitted. The caller must
    /// recompute `flash_loan.borrow_ix_index` to match before calling
    /// [`build_liquidation_window`] again.
    pub omit_compute_budget_ixs: bool,
    /// Downgrade-profile toggle: when true, the post-liquidate farm
    /// refresh instructions are skipped even if a farm is configured on
    /// the repay/withdraw reserve. Pre-liquidate farm refreshes are
    /// unaffected by this flag.
    pub disable_post_farms_refresh: bool,
}

/// Structured liquidation artifact matching the canonical window's named
/// sections: `setupIxs`, `refreshIxs` (= pre-reserve + core + core-farm),
/// `liquidationIxs`, `postFarmIxs`, plus the bookkeeping fields the
/// executor and candidate-selection layers need without re-deriving them
/// from the flattened instruction list.
pub struct LiquidationArtifact {
    /// The full, ordered instruction window (compute-budget, flash-borrow,
    /// setup, refresh, liquidate, post-farms, swap, flash-repay) — what
    /// actually gets compiled into the transaction message.
    pub instructions: Vec<Instruction>,
    pub flash_loan: FlashLoanArtifact,

    /// Idempotent ATA-create instructions only (never any other kind).
    pub setup_ixs: Vec<Instruction>,
    /// `preReserveIxs + coreIxs + coreFarmIxs`: every `RefreshReserve`,
    /// then `RefreshObligation`, then the pre-liquidate farm refreshes.
    pub refresh_ixs: Vec<Instruction>,
    /// The single `LiquidateObligationAndRedeemReserveCollateral` instruction.
    pub liquidation_ixs: Vec<Instruction>,
    pub post_farm_ixs: Vec<Instruction>,

    pub repay_mint: Pubkey,
    pub collateral_mint: Pubkey,
    pub repay_reserve_pubkey: Pubkey,
    pub collateral_reserve_pubkey: Pubkey,

    pub ata_count: usize,
    pre_farm_count: usize,
    post_farm_count: usize,
    /// Farm modes required by the chosen reserves: `0` = collateral
    /// (withdraw-side) farm, `1` = debt (repay-side) farm.
    pub farm_required_modes: Vec<u8>,
    pub post_farm_refresh_count: usize,

    pub address_lookup_tables: Vec<Pubkey>,
}

impl LiquidationArtifact {
    /// Number of pre-liquidate `RefreshObligationFarmsForReserve`
    /// instructions (`{0,1,2}`).
    pub fn pre_farm_count(&self) -> usize {
        self.pre_farm_count
    }

    /// Number of post-liquidate farm refreshes (equals [`Self::pre_farm_count`]
    /// unless `disable_post_farms_refresh` dropped them).
    pub fn post_farm_count(&self) -> usize {
        self.post_farm_count
    }
}

pub(crate) fn refresh_reserve_ix(klend_program_id: Pubkey, reserve_pubkey: Pubkey) -> Instruction {
    Instruction {
        program_id: klend_program_id,
        accounts: vec![AccountMeta::new(reserve_pubkey, false)],
        data: instruction_discriminator("refresh_reserve").to_vec(),
    }
}

pub(crate) fn refresh_obligation_ix(
    klend_program_id: Pubkey,
    market_pubkey: Pubkey,
    obligation_pubkey: Pubkey,
    obligation_reserves: &[Pubkey],
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new_readonly(market_pubkey, false),
        AccountMeta::new(obligation_pubkey, false),
    ];
    accounts.extend(obligation_reserves.iter().map(|r| AccountMeta::new_readonly(*r, false)));
    Instruction {
        program_id: klend_program_id,
        accounts,
        data: instruction_discriminator("refresh_obligation").to_vec(),
    }
}

pub(crate) fn refresh_farm_ix(klend_program_id: Pubkey, reserve_pubkey: Pubkey, farm_pubkey: Pubkey) -> Instruction {
    Instruction {
        program_id: klend_program_id,
        accounts: vec![
            AccountMeta::new(farm_pubkey, false),
            AccountMeta::new_readonly(reserve_pubkey, false),
        ],
        data: instruction_discriminator("refresh_obligation_farms_for_reserve").to_vec(),
    }
}

pub(crate) fn liquidate_ix(req: &LiquidationRequest) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new(req.liquidator, true),
        AccountMeta::new_readonly(req.obligation_owner, false),
        AccountMeta::new_readonly(req.market_pubkey, false),
        AccountMeta::new_readonly(req.lending_market_authority, false),
        AccountMeta::new(req.obligation_pubkey, false),
        AccountMeta::new(req.repay.reserve_pubkey, false),
        AccountMeta::new_readonly(req.repay.liquidity_mint, false),
        AccountMeta::new(req.repay.liquidity_supply, false),
        AccountMeta::new(req.withdraw.reserve_pubkey, false),
        AccountMeta::new_readonly(req.withdraw.liquidity_mint, false),
        AccountMeta::new(req.withdraw.liquidity_supply, false),
    ];
    if let Some(mint) = req.withdraw.collateral_mint {
        accounts.push(AccountMeta::new(mint, false));
    }
    if let Some(supply) = req.withdraw.collateral_supply {
        accounts.push(AccountMeta::new(supply, false));
    }
    accounts.push(AccountMeta::new_readonly(req.repay.liquidity_token_program, false));
    accounts.push(AccountMeta::new_readonly(
        req.withdraw.liquidity_token_program,
        false,
    ));

    let mut data = instruction_discriminator("liquidate_obligation_and_redeem_reserve_collateral").to_vec();
    data.extend_from_slice(&req.liquidity_amount_base_units.to_le_bytes());
    data.extend_from_slice(&req.min_acceptable_received_collateral_amount.to_le_bytes());

    Instruction {
        program_id: req.klend_program_id,
        accounts,
        data,
    }
}

/// Builds idempotent ATA-create instructions for `liquidator`, one per
/// distinct `(mint, token_program)` pair, skipping duplicates.
pub(crate) fn ata_setup_ixs(liquidator: Pubkey, mints: &[(Pubkey, Pubkey)]) -> Vec<Instruction> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (mint, token_program) in mints {
        if seen.insert(*mint) {
            out.push(create_associated_token_account_idempotent(
                &liquidator,
                &liquidator,
                mint,
                token_program,
            ));
        }
    }
    out
}

/// Assembles the full canonical instruction window described at module
/// level. `req.flash_loan.borrow_ix_index` must equal the index the
/// flash-borrow instruction occupies in the returned vector (index 1 or 2
/// depending on whether a compute-unit-price instruction is included); the
/// caller is responsible for keeping that in sync if the window shape
/// changes upstream.
pub fn build_liquidation_window(req: &LiquidationRequest) -> Result<LiquidationArtifact, LiqsolError> {
    if req.obligation_reserves.len() < 2 {
        return Err(LiqsolError::bad_input(
            "obligation must reference at least 2 reserves to build a liquidation window",
        ));
    }

    let flash_loan = build_flash_loan(&req.flash_loan)?;

    let mut compute_budget_ixs = Vec::new();
    if !req.omit_compute_budget_ixs {
        compute_budget_ixs.push(ComputeBudgetInstruction::set_compute_unit_limit(req.compute_unit_limit));
        if req.compute_unit_price_micro_lamports > 0 {
            compute_budget_ixs.push(ComputeBudgetInstruction::set_compute_unit_price(
                req.compute_unit_price_micro_lamports,
            ));
        }
    }

    // Three independent ATA roles — flash-loan destination, repay-reserve
    // liquidity, withdraw-reserve liquidity. A role is skipped if its
    // derived ATA is already known to exist, and two roles that derive the
    // same ATA (shared mint + token program) only get one create.
    let roles = [
        (flash_loan.destination_ata, req.flash_loan.symbol.mint(), flash_loan.token_program_id),
        (
            liquidator_ata(req.liquidator, req.repay.liquidity_mint, req.repay.liquidity_token_program),
            req.repay.liquidity_mint,
            req.repay.liquidity_token_program,
        ),
        (
            liquidator_ata(req.liquidator, req.withdraw.liquidity_mint, req.withdraw.liquidity_token_program),
            req.withdraw.liquidity_mint,
            req.withdraw.liquidity_token_program,
        ),
    ];
    let mut setup_ixs = Vec::new();
    let mut seen_atas = HashSet::new();
    for (ata, mint, token_program) in roles {
        if req.existing_atas.contains(&ata) {
            continue;
        }
        if !seen_atas.insert(ata) {
            continue;
        }
        setup_ixs.push(create_associated_token_account_idempotent(
            &req.liquidator,
            &req.liquidator,
            &mint,
            &token_program,
        ));
    }
    let ata_count = setup_ixs.len();

    let mut refresh_ixs = Vec::new();
    for reserve in &req.obligation_reserves {
        refresh_ixs.push(refresh_reserve_ix(req.klend_program_id, *reserve));
    }
    refresh_ixs.push(refresh_obligation_ix(
        req.klend_program_id,
        req.market_pubkey,
        req.obligation_pubkey,
        &req.obligation_reserves,
    ));

    let mut farm_required_modes = Vec::new();
    if req.withdraw.farm_pubkey.is_some() {
        farm_required_modes.push(0u8);
    }
    if req.repay.farm_pubkey.is_some() {
        farm_required_modes.push(1u8);
    }

    let mut pre_farm_count = 0usize;
    if let Some(farm) = req.repay.farm_pubkey {
        refresh_ixs.push(refresh_farm_ix(req.klend_program_id, req.repay.reserve_pubkey, farm));
        pre_farm_count += 1;
    }
    if let Some(farm) = req.withdraw.farm_pubkey {
        refresh_ixs.push(refresh_farm_ix(req.klend_program_id, req.withdraw.reserve_pubkey, farm));
        pre_farm_count += 1;
    }

    let liquidation_ixs = vec![liquidate_ix(req)];

    let mut post_farm_ixs = Vec::new();
    if !req.disable_post_farms_refresh {
        if let Some(farm) = req.repay.farm_pubkey {
            post_farm_ixs.push(refresh_farm_ix(req.klend_program_id, req.repay.reserve_pubkey, farm));
        }
        if let Some(farm) = req.withdraw.farm_pubkey {
            post_farm_ixs.push(refresh_farm_ix(req.klend_program_id, req.withdraw.reserve_pubkey, farm));
        }
    }
    let post_farm_count = post_farm_ixs.len();

    let mut swap_ixs = Vec::new();
    let mut address_lookup_tables = Vec::new();
    if let Some(swap) = &req.swap {
        swap_ixs.extend(swap.setup_ixs.clone());
        swap_ixs.push(swap.swap_ix.clone());
        swap_ixs.extend(swap.cleanup_ixs.clone());
        address_lookup_tables.extend(swap.address_lookup_tables.clone());
    }

    let mut instructions = compute_budget_ixs;
    instructions.push(flash_loan.flash_borrow_ix.clone());
    instructions.extend(setup_ixs.clone());
    instructions.extend(refresh_ixs.clone());
    instructions.extend(liquidation_ixs.clone());
    instructions.extend(post_farm_ixs.clone());
    instructions.extend(swap_ixs);
    instructions.push(flash_loan.flash_repay_ix.clone());

    Ok(LiquidationArtifact {
        instructions,
        repay_mint: req.repay.liquidity_mint,
        collateral_mint: req.withdraw.collateral_mint.unwrap_or(req.withdraw.liquidity_mint),
        repay_reserve_pubkey: req.repay.reserve_pubkey,
        collateral_reserve_pubkey: req.withdraw.reserve_pubkey,
        flash_loan,
        setup_ixs,
        refresh_ixs,
        liquidation_ixs,
        post_farm_ixs,
        ata_count,
        pre_farm_count,
        post_farm_count,
        farm_required_modes,
        post_farm_refresh_count: post_farm_count,
        address_lookup_tables,
    })
}

/// Derives the liquidator's associated token account for `mint`, matching
/// the derivation `ata_setup_ixs` uses, so callers can predict the
/// destination account without re-deriving it by hand.
pub fn liquidator_ata(liquidator: Pubkey, mint: Pubkey, token_program: Pubkey) -> Pubkey {
    get_associated_token_address_with_program_id(&liquidator, &mint, &token_program)
}
