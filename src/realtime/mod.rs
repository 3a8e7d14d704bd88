//! Realtime refresh orchestrator: debounces account and oracle-price
//! update events, decides which plans need a targeted recompute, and
//! rederives plan forecast fields from a fresh candidate.

use std::collections::HashMap;

use solana_sdk::pubkey::Pubkey;

use crate::scheduler::FlashloanPlan;
use crate::scoring::{compute_ev, estimate_ttl_string, score_hazard, EvParams};
use crate::selector::Candidate;

#[derive(Debug, Clone)]
pub struct AccountEvent {
    pub pubkey: Pubkey,
    pub slot: u64,
    pub before: Option<Vec<u8>>,
    pub after: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy)]
pub struct PriceEvent {
    pub oracle_or_mint: Pubkey,
    pub slot: u64,
    pub price: f64,
    pub prev_price: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorParams {
    pub debounce_ms: u64,
    pub min_price_pct_change: f64,
    pub min_health_delta: f64,
    pub min_refresh_interval_ms: u64,
}

/// Tracks per-key dedupe/debounce state across repeated account and price
/// events. One instance per running bot process.
#[derive(Default)]
pub struct RealtimeOrchestrator {
    seen_account_slots: HashMap<Pubkey, u64>,
    last_account_event_ms: HashMap<Pubkey, u64>,
    last_price_slot: HashMap<Pubkey, u64>,
    last_refresh_ms: HashMap<Pubkey, u64>,
}

impl RealtimeOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this account event should be acted on, `false` if
    /// it was deduped (same or older slot already seen) or coalesced into
    /// an ongoing debounce burst.
    pub fn admit_account_event(&mut self, event: &AccountEvent, params: &OrchestratorParams, now_ms: u64) -> bool {
        if let Some(&last_slot) = self.seen_account_slots.get(&event.pubkey) {
            if event.slot <= last_slot {
                return false;
            }
        }
        self.seen_account_slots.insert(event.pubkey, event.slot);

        let last_event = self.last_account_event_ms.get(&event.pubkey).copied();
        self.last_account_event_ms.insert(event.pubkey, now_ms);
        match last_event {
            Some(last) if now_ms.saturating_sub(last) < params.debounce_ms => false,
            _ => true,
        }
    }

    /// Returns `true` if this price event carries a fresh slot (not stale)
    /// for its oracle/mint key.
    pub fn admit_price_event(&mut self, event: &PriceEvent) -> bool {
        if let Some(&last_slot) = self.last_price_slot.get(&event.oracle_or_mint) {
            if event.slot <= last_slot {
                return false;
            }
        }
        self.last_price_slot.insert(event.oracle_or_mint, event.slot);
        true
    }

    /// Decides whether `key`'s plan should be recomputed now, given an
    /// observed price-change percentage and/or health-ratio delta, subject
    /// to a per-key rate limit.
    pub fn should_trigger_recompute(
        &mut self,
        key: Pubkey,
        price_pct_change: Option<f64>,
        health_delta: Option<f64>,
        params: &OrchestratorParams,
        now_ms: u64,
    ) -> bool {
        let crosses_threshold = price_pct_change.map(|p| p.abs() >= params.min_price_pct_change).unwrap_or(false)
            || health_delta.map(|h| h.abs() >= params.min_health_delta).unwrap_or(false);
        if !crosses_threshold {
            return false;
        }
        if let Some(&last) = self.last_refresh_ms.get(&key) {
            if now_ms.saturating_sub(last) < params.min_refresh_interval_ms {
                return false;
            }
        }
        self.last_refresh_ms.insert(key, now_ms);
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecomputeParams {
    pub hazard_alpha: f64,
    pub ev: EvParams,
    pub sol_drop_pct_per_min: f64,
    pub max_drop_pct: f64,
}

/// Rederives `hazard`/`ev`/`ttlMin`/`ttlStr` for `plan` from `candidate`.
/// When `candidate` is `None` (no fresh scoring available), the plan's
/// previous hazard/EV/TTL are preserved unchanged — the hazard fallback is
/// simply the plan's prior hazard value.
pub fn recompute_plan_fields(
    plan: &FlashloanPlan,
    candidate: Option<&Candidate>,
    params: &RecomputeParams,
) -> FlashloanPlan {
    let mut updated = plan.clone();
    let Some(candidate) = candidate else {
        return updated;
    };

    let health_ratio = candidate.scored.health_ratio_raw.unwrap_or(candidate.scored.health_ratio);
    let hazard = score_hazard(health_ratio, params.hazard_alpha);
    let ev = compute_ev(candidate.scored.borrow_value_usd, hazard, &params.ev);
    let ttl_str = estimate_ttl_string(health_ratio, params.sol_drop_pct_per_min, params.max_drop_pct);
    let ttl_min = crate::scoring::parse_ttl_minutes(&ttl_str);

    updated.prev_ev = Some(updated.ev);
    updated.hazard = hazard;
    updated.ev = ev;
    updated.ttl_str = ttl_str;
    updated.ttl_min = ttl_min;
    updated.liquidation_eligible = candidate.scored.liquidation_eligible;
    updated
}
