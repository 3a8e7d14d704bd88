//! Cross-module end-to-end scenarios. Each test composes the public API of
//! at least two components against in-memory fakes — no live RPC — mirroring
//! the E1-E6 scenarios from the design's testable-properties section.

use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use liqsol::executor::{confirm_signature_by_polling, FakeTransactionSubmitter, PollParams, PolledStatus};
use liqsol::flashloan::{build_flash_loan, FlashLoanRequest, FlashLoanSymbol};
use liqsol::health::ScoredObligation;
use liqsol::liquidation::{build_liquidation_window, LiquidationRequest, LiquidationReserveSide};
use liqsol::realtime::{recompute_plan_fields, RecomputeParams};
use liqsol::scheduler::{enqueue_plans, plan_from_candidate, FlashLoanMint, PlanQueue};
use liqsol::scoring::EvParams;
use liqsol::selector::Candidate;
use liqsol::validator::{classify_instruction, validate_liquidation_window, ValidatorContext};

fn scored(health_ratio: f64, liquidation_eligible: bool, borrow_usd: f64) -> ScoredObligation {
    ScoredObligation {
        obligation_pubkey: Pubkey::new_unique(),
        owner_pubkey: Pubkey::new_unique(),
        health_ratio,
        health_ratio_raw: Some(health_ratio),
        liquidation_eligible,
        borrow_value_usd: borrow_usd,
        collateral_value_usd: borrow_usd * health_ratio,
        repay_reserve_pubkey: Some(Pubkey::new_unique()),
        collateral_reserve_pubkey: Some(Pubkey::new_unique()),
        primary_borrow_mint: Some(Pubkey::new_unique()),
        primary_collateral_mint: Some(Pubkey::new_unique()),
        deposits_count: 1,
        borrows_count: 1,
        breakdown: None,
    }
}

fn candidate_from(scored: ScoredObligation) -> Candidate {
    Candidate {
        scored,
        priority_score: 0.0,
        distance_to_liquidation: 0.0,
        predicted_liquidatable_soon: false,
        hazard: None,
        ev: None,
    }
}

fn ev_params() -> EvParams {
    EvParams {
        close_factor: 0.5,
        liquidation_bonus_pct: 0.05,
        flashloan_fee_pct: 0.002,
        slippage_buffer_pct: 0.001,
        fixed_gas_usd: 0.5,
    }
}

/// E1: a price move that worsens an obligation's health ratio must flow
/// through to a recomputed plan with a changed hazard/EV and a non-null
/// TTL string.
#[test]
fn e1_health_recompute_on_price_move_updates_plan_forecast() {
    let stale_candidate = candidate_from(scored(0.85, true, 5_000.0));
    let params = RecomputeParams {
        hazard_alpha: 25.0,
        ev: ev_params(),
        sol_drop_pct_per_min: 0.2,
        max_drop_pct: 20.0,
    };

    let scoring = liqsol::config::ScoringConfig {
        hazard_alpha: params.hazard_alpha,
        ev: params.ev,
    };
    let ttl = liqsol::config::TtlConfig {
        sol_drop_pct_per_min: params.sol_drop_pct_per_min,
        max_drop_pct: params.max_drop_pct,
        grace_ms: 60_000,
        unknown_passes: true,
        forecast_max_age_ms: 300_000,
    };
    let initial_plan = plan_from_candidate(
        &stale_candidate,
        &scoring,
        &ttl,
        FlashLoanMint::Sol,
        5_000.0,
        33.0,
        1_000,
        None,
    )
    .expect("complete candidate produces a plan");

    // SOL price drops further: health ratio worsens from 0.85 to 0.80.
    let fresh_candidate = candidate_from(scored(0.80, true, 5_000.0));
    let updated = recompute_plan_fields(&initial_plan, Some(&fresh_candidate), &params);

    assert!(!updated.ttl_str.is_empty());
    assert_eq!(updated.prev_ev, Some(initial_plan.ev));
    assert!(updated.liquidation_eligible);
}

/// E5: plans A (liquidatable, ev=10), B (non-liquidatable, ev=100), C
/// (liquidatable, ev=5) enqueue in order [A, C, B] - liquidation-eligible
/// always outranks EV.
#[test]
fn e5_enqueue_sorts_eligible_before_ev() {
    let a = candidate_from(scored(0.9, true, 1_000.0));
    let b = candidate_from(scored(1.5, false, 50_000.0));
    let c = candidate_from(scored(0.95, true, 500.0));

    let scoring = liqsol::config::ScoringConfig {
        hazard_alpha: 25.0,
        ev: ev_params(),
    };
    let ttl = liqsol::config::TtlConfig {
        sol_drop_pct_per_min: 0.2,
        max_drop_pct: 20.0,
        grace_ms: 60_000,
        unknown_passes: true,
        forecast_max_age_ms: 300_000,
    };

    let mut plan_a = plan_from_candidate(&a, &scoring, &ttl, FlashLoanMint::Usdc, 1_000.0, 1_000.0, 1, None).unwrap();
    let mut plan_b = plan_from_candidate(&b, &scoring, &ttl, FlashLoanMint::Usdc, 1_000.0, 1_000.0, 1, None).unwrap();
    let mut plan_c = plan_from_candidate(&c, &scoring, &ttl, FlashLoanMint::Usdc, 1_000.0, 1_000.0, 1, None).unwrap();
    plan_a.ev = 10.0;
    plan_b.ev = 100.0;
    plan_c.ev = 5.0;

    let mut queue = PlanQueue::default();
    enqueue_plans(&mut queue, vec![plan_a.clone(), plan_b.clone(), plan_c.clone()]);

    let keys: Vec<_> = queue.plans.iter().map(|p| p.obligation_pubkey).collect();
    assert_eq!(keys, vec![plan_a.obligation_pubkey, plan_c.obligation_pubkey, plan_b.obligation_pubkey]);
}

/// E6: a `blockhash expired` error surfaced via the confirmation poll must
/// be treated as an outright failure (no retry loop mistakes it for a
/// transient status), matching how the executor would move on to a fresh
/// blockhash on the next attempt rather than re-polling a dead signature.
#[tokio::test]
async fn e6_confirmation_fails_hard_on_blockhash_expired() {
    let submitter = FakeTransactionSubmitter {
        simulate_outcomes: std::sync::Mutex::new(vec![]),
        poll_sequence: std::sync::Mutex::new(vec![Some(PolledStatus {
            confirmation_status: None,
            err: Some("blockhash expired".to_string()),
        })]),
        send_signature: Signature::default(),
    };
    let params = PollParams {
        interval_ms: 1,
        timeout_ms: 1_000,
    };

    let outcome = confirm_signature_by_polling(&submitter, Signature::default(), params).await;
    assert!(!outcome.success);
    assert_eq!(outcome.poll_count, 1);
    assert!(outcome.error.unwrap().contains("blockhash expired"));
}

/// Composes the liquidation builder with the flash-loan builder and the
/// compiled-instruction validator: an obligation with one SOL deposit and
/// one USDC borrow, no farms, assembled end to end, must classify as a
/// valid liquidation window.
#[test]
fn builder_output_validates_as_a_canonical_window() {
    let klend_program_id = Pubkey::new_unique();
    let market_pubkey = Pubkey::new_unique();
    let lending_market_authority = Pubkey::new_unique();
    let liquidator = Pubkey::new_unique();
    let obligation_pubkey = Pubkey::new_unique();
    let obligation_owner = Pubkey::new_unique();

    let repay_reserve = Pubkey::new_unique();
    let withdraw_reserve = Pubkey::new_unique();

    let repay = LiquidationReserveSide {
        reserve_pubkey: repay_reserve,
        liquidity_mint: liqsol::flashloan::USDC_MINT,
        liquidity_supply: Pubkey::new_unique(),
        liquidity_token_program: spl_token::ID,
        collateral_mint: None,
        collateral_supply: None,
        farm_pubkey: None,
    };
    let withdraw = LiquidationReserveSide {
        reserve_pubkey: withdraw_reserve,
        liquidity_mint: liqsol::flashloan::NATIVE_SOL_MINT,
        liquidity_supply: Pubkey::new_unique(),
        liquidity_token_program: spl_token::ID,
        collateral_mint: Some(Pubkey::new_unique()),
        collateral_supply: Some(Pubkey::new_unique()),
        farm_pubkey: None,
    };

    let flash_loan = FlashLoanRequest {
        market_pubkey,
        klend_program_id,
        signer: liquidator,
        symbol: FlashLoanSymbol::Usdc,
        reserve_pubkey: repay_reserve,
        reserve_liquidity_supply: repay.liquidity_supply,
        reserve_token_program: spl_token::ID,
        lending_market_authority,
        ui_amount: "1000".to_string(),
        borrow_ix_index: 1,
    };
    // Sanity-check the flash loan half builds independently of the
    // liquidation window (component boundary between K and L).
    build_flash_loan(&flash_loan).expect("flash loan build should succeed");

    let request = LiquidationRequest {
        klend_program_id,
        market_pubkey,
        lending_market_authority,
        liquidator,
        obligation_pubkey,
        obligation_owner,
        obligation_reserves: vec![repay_reserve, withdraw_reserve],
        repay,
        withdraw,
        liquidity_amount_base_units: 1_000_000_000,
        min_acceptable_received_collateral_amount: 0,
        flash_loan,
        compute_unit_limit: 1_400_000,
        compute_unit_price_micro_lamports: 0,
        swap: None,
        existing_atas: std::collections::HashSet::new(),
        omit_compute_budget_ixs: false,
        disable_post_farms_refresh: false,
    };
    let artifact = build_liquidation_window(&request).expect("liquidation window should build");

    assert_eq!(artifact.setup_ixs.len(), 3);
    assert!(artifact.farm_required_modes.is_empty());
    assert_eq!(artifact.post_farm_refresh_count, 0);

    let ctx = ValidatorContext {
        klend_program_id,
        swap_aggregator_program_id: None,
        compute_budget_program_id: solana_sdk::compute_budget::ID,
        token_program_id: spl_token::ID,
        token_2022_program_id: spl_token_2022_id(),
        associated_token_program_id: spl_associated_token_account::ID,
    };
    let decoded: Vec<_> = artifact
        .instructions
        .iter()
        .map(|ix| classify_instruction(ix.program_id, &ix.data, &ctx))
        .collect();

    let result = validate_liquidation_window(&decoded, false, false);
    assert!(result.valid, "diagnostics: {}", result.diagnostics);
}

fn spl_token_2022_id() -> Pubkey {
    // Avoids an extra direct dependency on spl-token-2022 purely for its id.
    pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb")
}
