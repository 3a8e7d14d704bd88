//! Candidate selector: ranks scored obligations by priority or EV, and
//! flags obligations nearing the liquidation threshold.

use solana_sdk::pubkey::Pubkey;

use crate::health::ScoredObligation;
use crate::scoring::{compute_ev, score_hazard, EvParams};

#[derive(Debug, Clone)]
pub struct Candidate {
    pub scored: ScoredObligation,
    pub priority_score: f64,
    pub distance_to_liquidation: f64,
    pub predicted_liquidatable_soon: bool,
    pub hazard: Option<f64>,
    pub ev: Option<f64>,
}

impl Candidate {
    pub fn obligation_pubkey(&self) -> Pubkey {
        self.scored.obligation_pubkey
    }
}

fn distance_to_liquidation(health_ratio: f64) -> f64 {
    (health_ratio - 1.0).max(0.0)
}

fn default_priority(scored: &ScoredObligation, distance: f64) -> f64 {
    let urgency = if scored.liquidation_eligible {
        1_000_000.0
    } else {
        1.0 / (distance + 0.001)
    };
    let size = scored.borrow_value_usd.max(10.0).log10();
    urgency * size
}

/// Builds candidates in the default priority-ranking mode: liquidation-
/// eligible obligations always outrank non-eligible ones, sorted
/// descending by `priorityScore`.
pub fn select_by_priority(scored: Vec<ScoredObligation>, near_threshold: f64) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = scored
        .into_iter()
        .map(|s| {
            let distance = distance_to_liquidation(s.health_ratio);
            let priority_score = default_priority(&s, distance);
            let predicted_liquidatable_soon = !s.liquidation_eligible && s.health_ratio <= near_threshold;
            Candidate {
                scored: s,
                priority_score,
                distance_to_liquidation: distance,
                predicted_liquidatable_soon,
                hazard: None,
                ev: None,
            }
        })
        .collect();
    candidates.sort_by(|a, b| b.priority_score.total_cmp(&a.priority_score));
    candidates
}

#[derive(Debug, Clone, Copy)]
pub struct EvSelectorParams {
    pub hazard_alpha: f64,
    pub ev: EvParams,
    pub min_borrow_usd: f64,
    pub near_threshold: f64,
}

/// Builds candidates in EV-ranking mode: hazard/EV are computed from
/// `healthRatioRaw` when available (falling back to the clamped ratio
/// otherwise), candidates below `minBorrowUsd` are dropped unless already
/// liquidation-eligible, and the remainder is sorted descending by EV.
pub fn select_by_ev(scored: Vec<ScoredObligation>, params: &EvSelectorParams) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = scored
        .into_iter()
        .filter(|s| s.liquidation_eligible || s.borrow_value_usd >= params.min_borrow_usd)
        .map(|s| {
            let hr_for_scoring = s.health_ratio_raw.unwrap_or(s.health_ratio);
            let hazard = score_hazard(hr_for_scoring, params.hazard_alpha);
            let ev = compute_ev(s.borrow_value_usd, hazard, &params.ev);
            let distance = distance_to_liquidation(s.health_ratio);
            let predicted_liquidatable_soon = !s.liquidation_eligible && s.health_ratio <= params.near_threshold;
            Candidate {
                scored: s,
                priority_score: ev,
                distance_to_liquidation: distance,
                predicted_liquidatable_soon,
                hazard: Some(hazard),
                ev: Some(ev),
            }
        })
        .collect();
    candidates.sort_by(|a, b| b.ev.unwrap_or(f64::MIN).total_cmp(&a.ev.unwrap_or(f64::MIN)));
    candidates
}
