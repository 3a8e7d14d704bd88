//! Compiled-instruction validator: decodes every instruction of a compiled
//! transaction by program-id + 8-byte discriminator and enforces the
//! canonical pre/core/post refresh-instruction adjacency window around the
//! liquidate instruction.

use solana_sdk::pubkey::Pubkey;

use crate::decoder::discriminator::{instruction_discriminator, to_hex};
use crate::error::truncate_pubkey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    RefreshReserve,
    RefreshObligation,
    RefreshObligationFarmsForReserve,
    LiquidateObligationAndRedeemReserveCollateral,
    FlashBorrowReserveLiquidity,
    FlashRepayReserveLiquidity,
    ComputeBudgetLimit,
    ComputeBudgetPrice,
    SwapAggregator,
    Token,
    Token2022,
    AssociatedTokenAccount,
    /// A recognized klend program id, but a discriminator this validator
    /// does not track.
    KaminoUnknown,
    Unknown,
}

/// Well-known program ids this validator recognizes outside of the
/// caller-supplied klend/swap-aggregator program ids.
#[derive(Debug, Clone, Copy)]
pub struct ValidatorContext {
    pub klend_program_id: Pubkey,
    pub swap_aggregator_program_id: Option<Pubkey>,
    pub compute_budget_program_id: Pubkey,
    pub token_program_id: Pubkey,
    pub token_2022_program_id: Pubkey,
    pub associated_token_program_id: Pubkey,
}

#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    pub program_id: Pubkey,
    pub discriminator_hex: String,
    pub kind: InstructionKind,
}

fn klend_kind_for_discriminator(data: &[u8]) -> InstructionKind {
    const NAMED: &[(&str, InstructionKind)] = &[
        ("refresh_reserve", InstructionKind::RefreshReserve),
        ("refresh_obligation", InstructionKind::RefreshObligation),
        (
            "refresh_obligation_farms_for_reserve",
            InstructionKind::RefreshObligationFarmsForReserve,
        ),
        (
            "liquidate_obligation_and_redeem_reserve_collateral",
            InstructionKind::LiquidateObligationAndRedeemReserveCollateral,
        ),
        ("flash_borrow_reserve_liquidity", InstructionKind::FlashBorrowReserveLiquidity),
        ("flash_repay_reserve_liquidity", InstructionKind::FlashRepayReserveLiquidity),
    ];
    if data.len() < 8 {
        return InstructionKind::KaminoUnknown;
    }
    for (name, kind) in NAMED {
        if instruction_discriminator(name) == data[..8] {
            return *kind;
        }
    }
    InstructionKind::KaminoUnknown
}

/// Classifies one compiled instruction by program id, then (for the klend
/// program) by its 8-byte instruction discriminator.
pub fn classify_instruction(program_id: Pubkey, data: &[u8], ctx: &ValidatorContext) -> DecodedInstruction {
    let discriminator_hex = if data.len() >= 8 {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&data[..8]);
        to_hex(&arr)
    } else {
        String::new()
    };

    let kind = if program_id == ctx.klend_program_id {
        klend_kind_for_discriminator(data)
    } else if program_id == ctx.compute_budget_program_id {
        match data.first() {
            Some(2) => InstructionKind::ComputeBudgetLimit,
            Some(3) => InstructionKind::ComputeBudgetPrice,
            _ => InstructionKind::Unknown,
        }
    } else if program_id == ctx.token_program_id {
        InstructionKind::Token
    } else if program_id == ctx.token_2022_program_id {
        InstructionKind::Token2022
    } else if program_id == ctx.associated_token_program_id {
        InstructionKind::AssociatedTokenAccount
    } else if Some(program_id) == ctx.swap_aggregator_program_id {
        InstructionKind::SwapAggregator
    } else {
        InstructionKind::Unknown
    };

    DecodedInstruction {
        program_id,
        discriminator_hex,
        kind,
    }
}

/// Returns the index of the liquidate instruction, or `-1` if absent.
pub fn find_liquidation_index(ixs: &[DecodedInstruction]) -> i64 {
    ixs.iter()
        .position(|ix| ix.kind == InstructionKind::LiquidateObligationAndRedeemReserveCollateral)
        .map(|i| i as i64)
        .unwrap_or(-1)
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub diagnostics: String,
    pub liquidation_index: i64,
}

fn window_diagnostics(ixs: &[DecodedInstruction], center: usize, radius: usize) -> String {
    let lo = center.saturating_sub(radius);
    let hi = (center + radius + 1).min(ixs.len());
    let mut lines = Vec::new();
    for i in lo..hi {
        let ix = &ixs[i];
        lines.push(format!(
            "[{i}] {:?} program={}",
            ix.kind,
            truncate_pubkey(&ix.program_id.to_string())
        ));
    }
    lines.join("; ")
}

fn fail(reason: &str, ixs: &[DecodedInstruction], center: usize, liquidation_index: i64) -> ValidationResult {
    ValidationResult {
        valid: false,
        diagnostics: format!("{reason}; window: {}", window_diagnostics(ixs, center, 6)),
        liquidation_index,
    }
}

/// Verifies the canonical refresh window around the liquidate instruction:
/// 1. Up to two `refreshObligationFarmsForReserve` immediately preceding
///    liquidate ("pre farms"), then exactly one `refreshObligation`.
/// 2. Exactly two `refreshReserve` immediately preceding that.
/// 3. `preFarmCount` in `[0, 2]`; if `require_pre_farms`, at least one pre
///    farm must be present; if not, none may be present.
/// 4. If `require_post_farms`, exactly `preFarmCount`
///    `refreshObligationFarmsForReserve` immediately follow liquidate.
pub fn validate_liquidation_window(
    ixs: &[DecodedInstruction],
    require_pre_farms: bool,
    require_post_farms: bool,
) -> ValidationResult {
    let liquidation_index = find_liquidation_index(ixs);
    if liquidation_index < 0 {
        return fail("no liquidate instruction found", ixs, 0, liquidation_index);
    }
    let idx = liquidation_index as usize;

    let mut pre_farm_count = 0usize;
    let mut cursor = idx;
    while cursor > 0
        && pre_farm_count < 2
        && ixs[cursor - 1].kind == InstructionKind::RefreshObligationFarmsForReserve
    {
        pre_farm_count += 1;
        cursor -= 1;
    }

    if cursor == 0 || ixs[cursor - 1].kind != InstructionKind::RefreshObligation {
        return fail("missing refreshObligation immediately before liquidate (after any pre farms)", ixs, idx, liquidation_index);
    }
    let refresh_obligation_idx = cursor - 1;

    if refresh_obligation_idx < 2
        || ixs[refresh_obligation_idx - 1].kind != InstructionKind::RefreshReserve
        || ixs[refresh_obligation_idx - 2].kind != InstructionKind::RefreshReserve
    {
        return fail("missing two refreshReserve immediately before refreshObligation", ixs, idx, liquidation_index);
    }

    if require_pre_farms && pre_farm_count == 0 {
        return fail("pre farms required but none present", ixs, idx, liquidation_index);
    }
    if !require_pre_farms && pre_farm_count > 0 {
        return fail("pre farms present but not required", ixs, idx, liquidation_index);
    }

    if require_post_farms {
        let mut post_farm_count = 0usize;
        let mut j = idx + 1;
        while j < ixs.len() && ixs[j].kind == InstructionKind::RefreshObligationFarmsForReserve {
            post_farm_count += 1;
            j += 1;
        }
        if post_farm_count != pre_farm_count {
            return fail(
                &format!("post farms count {post_farm_count} does not match pre farms count {pre_farm_count}"),
                ixs,
                idx,
                liquidation_index,
            );
        }
    }

    ValidationResult {
        valid: true,
        diagnostics: String::new(),
        liquidation_index,
    }
}
