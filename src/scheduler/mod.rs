//! Persistent liquidation plan queue: atomic writes, legacy-plan purge,
//! and blocked-plan downgrade.

use std::path::Path;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::warn;

use crate::error::LiqsolError;
use crate::persist;
use crate::selector::Candidate;
use crate::scoring::estimate_ttl_string;
use crate::config::{ScoringConfig, TtlConfig};

pub const PLAN_VERSION: u32 = 2;
/// `ttlMin` sentinel for a downgraded/blocked plan: effectively "never".
pub const BLOCKED_TTL_MIN: f64 = 999_999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLoanMint {
    Sol,
    Usdc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashloanPlan {
    pub plan_version: u32,
    pub obligation_pubkey: Pubkey,
    pub owner_pubkey: Pubkey,

    pub mint: FlashLoanMint,
    pub amount_usd: f64,
    pub amount_ui: f64,

    pub repay_mint: String,
    pub collateral_mint: String,
    pub repay_reserve_pubkey: String,
    pub collateral_reserve_pubkey: String,

    pub ev: f64,
    pub hazard: f64,
    pub ttl_min: Option<f64>,
    pub ttl_str: String,
    pub predicted_liquidation_at_ms: Option<u64>,
    pub created_at_ms: u64,
    pub prev_ev: Option<f64>,

    pub liquidation_eligible: bool,
}

impl FlashloanPlan {
    pub fn key(&self) -> Pubkey {
        self.obligation_pubkey
    }

    /// Per-enqueue invariant: every required reserve-pubkey/mint field must
    /// be a non-empty base58 string. Returns the first violated field name.
    fn missing_field(&self) -> Option<&'static str> {
        if self.repay_reserve_pubkey.trim().is_empty() {
            Some("repay_reserve_pubkey")
        } else if self.collateral_reserve_pubkey.trim().is_empty() {
            Some("collateral_reserve_pubkey")
        } else if self.collateral_mint.trim().is_empty() {
            Some("collateral_mint")
        } else if self.repay_mint.trim().is_empty() {
            Some("repay_mint")
        } else {
            None
        }
    }

    fn is_complete(&self) -> bool {
        self.missing_field().is_none()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlanQueue {
    pub plans: Vec<FlashloanPlan>,
}

/// Compares two plans: liquidation-eligible first, then EV desc, then
/// ttlMin asc, then hazard desc. Float components use `total_cmp` so a NaN
/// `ev`/`ttl_min` orders consistently instead of panicking, matching
/// [`crate::indexer::LiveIndexer::all_scored_obligations`]'s idiom.
fn compare_plans(a: &FlashloanPlan, b: &FlashloanPlan) -> std::cmp::Ordering {
    let ev_desc_a = -a.ev;
    let ev_desc_b = -b.ev;
    let ttl_asc_a = a.ttl_min.unwrap_or(f64::INFINITY);
    let ttl_asc_b = b.ttl_min.unwrap_or(f64::INFINITY);
    let hazard_desc_a = (a.hazard * 1_000_000.0).round() as u64;
    let hazard_desc_b = (b.hazard * 1_000_000.0).round() as u64;

    std::cmp::Reverse(a.liquidation_eligible)
        .cmp(&std::cmp::Reverse(b.liquidation_eligible))
        .then_with(|| ev_desc_a.total_cmp(&ev_desc_b))
        .then_with(|| ttl_asc_a.total_cmp(&ttl_asc_b))
        .then_with(|| std::cmp::Reverse(hazard_desc_a).cmp(&std::cmp::Reverse(hazard_desc_b)))
}

/// Sorts in place: liquidation-eligible first, then EV desc, then ttlMin
/// asc, then hazard desc.
pub fn sort_queue(queue: &mut PlanQueue) {
    queue.plans.sort_by(compare_plans);
}

/// `enqueuePlans`: drops incomplete entries (existing and incoming) with a
/// logged reason, merges by `key` keeping the newer record, and re-sorts.
pub fn enqueue_plans(queue: &mut PlanQueue, new_plans: Vec<FlashloanPlan>) {
    queue.plans.retain(|p| {
        if let Some(field) = p.missing_field() {
            warn!(obligation = %p.obligation_pubkey, field, "skip_incomplete_plan");
            false
        } else {
            true
        }
    });

    for incoming in new_plans {
        if let Some(field) = incoming.missing_field() {
            warn!(obligation = %incoming.obligation_pubkey, field, "skip_incomplete_plan");
            continue;
        }
        if let Some(existing) = queue.plans.iter_mut().find(|p| p.key() == incoming.key()) {
            if incoming.created_at_ms >= existing.created_at_ms {
                *existing = incoming;
            }
        } else {
            queue.plans.push(incoming);
        }
    }

    sort_queue(queue);
}

/// Sets `ttlMin = 999999`, `ttlStr = reason.unwrap_or("blocked-<reason>")`,
/// `liquidationEligible = false` for the plan keyed by `key`, if present.
pub fn downgrade_blocked_plan(queue: &mut PlanQueue, key: Pubkey, reason: Option<&str>) {
    if let Some(plan) = queue.plans.iter_mut().find(|p| p.key() == key) {
        plan.ttl_min = Some(BLOCKED_TTL_MIN);
        plan.ttl_str = match reason {
            Some(r) => r.to_string(),
            None => "blocked-unspecified".to_string(),
        };
        plan.liquidation_eligible = false;
    }
}

/// Builds a [`FlashloanPlan`] from a ranked [`Candidate`], deriving hazard/EV
/// (falling back to the scoring formulas when the selector didn't already
/// compute them) and a TTL string/minutes pair. Returns `None` when the
/// candidate lacks a repay or collateral reserve — such a candidate cannot
/// yet be turned into a plan and is left for a later recompute once the
/// indexer resolves its primary borrow/collateral legs.
pub fn plan_from_candidate(
    candidate: &Candidate,
    scoring: &ScoringConfig,
    ttl: &TtlConfig,
    flash_loan_mint: FlashLoanMint,
    amount_usd: f64,
    amount_ui: f64,
    now_ms: u64,
    prev_ev: Option<f64>,
) -> Option<FlashloanPlan> {
    let scored = &candidate.scored;
    let repay_reserve_pubkey = scored.repay_reserve_pubkey?;
    let collateral_reserve_pubkey = scored.collateral_reserve_pubkey?;
    let repay_mint = scored.primary_borrow_mint?;
    let collateral_mint = scored.primary_collateral_mint?;

    let hr_for_scoring = scored.health_ratio_raw.unwrap_or(scored.health_ratio);
    let hazard = candidate
        .hazard
        .unwrap_or_else(|| crate::scoring::score_hazard(hr_for_scoring, scoring.hazard_alpha));
    let ev = candidate
        .ev
        .unwrap_or_else(|| crate::scoring::compute_ev(scored.borrow_value_usd, hazard, &scoring.ev));

    let ttl_str = estimate_ttl_string(scored.health_ratio, ttl.sol_drop_pct_per_min, ttl.max_drop_pct);
    let ttl_min = crate::scoring::parse_ttl_minutes(&ttl_str);
    let predicted_liquidation_at_ms = ttl_min.map(|m| now_ms + (m * 60_000.0).round() as u64);

    Some(FlashloanPlan {
        plan_version: PLAN_VERSION,
        obligation_pubkey: scored.obligation_pubkey,
        owner_pubkey: scored.owner_pubkey,
        mint: flash_loan_mint,
        amount_usd,
        amount_ui,
        repay_mint: repay_mint.to_string(),
        collateral_mint: collateral_mint.to_string(),
        repay_reserve_pubkey: repay_reserve_pubkey.to_string(),
        collateral_reserve_pubkey: collateral_reserve_pubkey.to_string(),
        ev,
        hazard,
        ttl_min,
        ttl_str,
        predicted_liquidation_at_ms,
        created_at_ms: now_ms,
        prev_ev,
        liquidation_eligible: scored.liquidation_eligible,
    })
}

pub async fn load_queue(path: &Path) -> Result<PlanQueue, LiqsolError> {
    persist::read_json(path).await
}

pub async fn save_queue(path: &Path, queue: &PlanQueue) -> Result<(), LiqsolError> {
    persist::write_json_atomic(path, queue).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(
        obligation: Pubkey,
        liquidation_eligible: bool,
        ev: f64,
        repay_reserve: &str,
        collateral_mint: &str,
    ) -> FlashloanPlan {
        FlashloanPlan {
            plan_version: PLAN_VERSION,
            obligation_pubkey: obligation,
            owner_pubkey: Pubkey::new_unique(),
            mint: FlashLoanMint::Usdc,
            amount_usd: 100.0,
            amount_ui: 100.0,
            repay_mint: "usdc".to_string(),
            collateral_mint: collateral_mint.to_string(),
            repay_reserve_pubkey: repay_reserve.to_string(),
            collateral_reserve_pubkey: "collat-reserve".to_string(),
            ev,
            hazard: 0.5,
            ttl_min: Some(1.0),
            ttl_str: "1m00s".to_string(),
            predicted_liquidation_at_ms: None,
            created_at_ms: 1,
            prev_ev: None,
            liquidation_eligible,
        }
    }

    #[test]
    fn enqueue_drops_incomplete_incoming_plan() {
        let mut queue = PlanQueue::default();
        enqueue_plans(&mut queue, vec![plan(Pubkey::new_unique(), false, 10.0, "", "usdc")]);
        assert!(queue.plans.is_empty());
    }

    #[test]
    fn enqueue_purges_preexisting_incomplete_legacy_plan() {
        let mut queue = PlanQueue::default();
        queue.plans.push(plan(Pubkey::new_unique(), false, 10.0, "r", ""));
        enqueue_plans(&mut queue, vec![]);
        assert!(queue.plans.is_empty());
    }

    #[test]
    fn enqueue_keeps_complete_legacy_plan() {
        let mut queue = PlanQueue::default();
        let key = Pubkey::new_unique();
        queue.plans.push(plan(key, false, 10.0, "r", "usdc"));
        enqueue_plans(&mut queue, vec![]);
        assert_eq!(queue.plans.len(), 1);
    }

    #[test]
    fn enqueue_merges_by_key_keeping_newer() {
        let mut queue = PlanQueue::default();
        let key = Pubkey::new_unique();
        let mut old = plan(key, false, 10.0, "r", "usdc");
        old.created_at_ms = 1;
        queue.plans.push(old);

        let mut new = plan(key, true, 20.0, "r", "usdc");
        new.created_at_ms = 2;
        enqueue_plans(&mut queue, vec![new]);

        assert_eq!(queue.plans.len(), 1);
        assert_eq!(queue.plans[0].ev, 20.0);
        assert!(queue.plans[0].liquidation_eligible);
    }

    #[test]
    fn sort_order_is_eligible_then_ev_then_ttl_then_hazard() {
        let a = plan(Pubkey::new_unique(), true, 10.0, "r", "usdc");
        let b = plan(Pubkey::new_unique(), false, 100.0, "r", "usdc");
        let c = plan(Pubkey::new_unique(), true, 5.0, "r", "usdc");
        let mut queue = PlanQueue {
            plans: vec![b.clone(), a.clone(), c.clone()],
        };
        sort_queue(&mut queue);
        let keys: Vec<_> = queue.plans.iter().map(|p| p.obligation_pubkey).collect();
        assert_eq!(keys, vec![a.obligation_pubkey, c.obligation_pubkey, b.obligation_pubkey]);
    }

    #[test]
    fn downgrade_sets_blocked_fields() {
        let key = Pubkey::new_unique();
        let mut queue = PlanQueue {
            plans: vec![plan(key, true, 10.0, "r", "usdc")],
        };
        downgrade_blocked_plan(&mut queue, key, Some("insufficient-rent"));
        let plan = &queue.plans[0];
        assert_eq!(plan.ttl_min, Some(BLOCKED_TTL_MIN));
        assert_eq!(plan.ttl_str, "insufficient-rent");
        assert!(!plan.liquidation_eligible);
    }

    fn test_candidate(liquidation_eligible: bool, health_ratio: f64) -> Candidate {
        use crate::health::ScoredObligation;
        Candidate {
            scored: ScoredObligation {
                obligation_pubkey: Pubkey::new_unique(),
                owner_pubkey: Pubkey::new_unique(),
                health_ratio,
                health_ratio_raw: Some(health_ratio),
                liquidation_eligible,
                borrow_value_usd: 500.0,
                collateral_value_usd: 600.0,
                repay_reserve_pubkey: Some(Pubkey::new_unique()),
                collateral_reserve_pubkey: Some(Pubkey::new_unique()),
                primary_borrow_mint: Some(Pubkey::new_unique()),
                primary_collateral_mint: Some(Pubkey::new_unique()),
                deposits_count: 1,
                borrows_count: 1,
                breakdown: None,
            },
            priority_score: 1.0,
            distance_to_liquidation: (health_ratio - 1.0).max(0.0),
            predicted_liquidatable_soon: false,
            hazard: None,
            ev: None,
        }
    }

    fn test_scoring() -> ScoringConfig {
        ScoringConfig {
            hazard_alpha: 25.0,
            ev: crate::scoring::EvParams {
                close_factor: 0.5,
                liquidation_bonus_pct: 0.05,
                flashloan_fee_pct: 0.002,
                slippage_buffer_pct: 0.0,
                fixed_gas_usd: 0.5,
            },
        }
    }

    fn test_ttl() -> TtlConfig {
        TtlConfig {
            sol_drop_pct_per_min: 0.2,
            max_drop_pct: 20.0,
            grace_ms: 60_000,
            unknown_passes: true,
            forecast_max_age_ms: 300_000,
        }
    }

    #[test]
    fn plan_from_candidate_fills_derived_fields() {
        let candidate = test_candidate(true, 0.9);
        let plan = plan_from_candidate(
            &candidate,
            &test_scoring(),
            &test_ttl(),
            FlashLoanMint::Usdc,
            500.0,
            500.0,
            1_000,
            None,
        )
        .expect("complete candidate should produce a plan");
        assert!(plan.liquidation_eligible);
        assert_eq!(plan.ttl_str, "now");
        assert_eq!(plan.ttl_min, Some(0.0));
        assert!(plan.hazard > 0.0);
    }

    #[test]
    fn plan_from_candidate_none_without_reserves() {
        let mut candidate = test_candidate(false, 1.2);
        candidate.scored.repay_reserve_pubkey = None;
        let plan = plan_from_candidate(
            &candidate,
            &test_scoring(),
            &test_ttl(),
            FlashLoanMint::Sol,
            10.0,
            0.1,
            1_000,
            None,
        );
        assert!(plan.is_none());
    }
}
