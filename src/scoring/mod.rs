//! Hazard score, expected-value (EV) estimate, and time-to-liquidation
//! (TTL) estimator/parser.

/// `scoreHazard(hr, alpha=25) = 1 / (1 + alpha * max(0, hr - 1))`, in `(0, 1]`.
pub fn score_hazard(health_ratio: f64, alpha: f64) -> f64 {
    let margin = (health_ratio - 1.0).max(0.0);
    1.0 / (1.0 + alpha * margin)
}

#[derive(Debug, Clone, Copy)]
pub struct EvParams {
    pub close_factor: f64,
    pub liquidation_bonus_pct: f64,
    pub flashloan_fee_pct: f64,
    pub slippage_buffer_pct: f64,
    pub fixed_gas_usd: f64,
}

/// `computeEV = hazard * closeFactor * liquidationBonusPct * borrowUsd
/// - (flashloanFeePct + slippageBufferPct) * borrowUsd - fixedGasUsd`.
pub fn compute_ev(borrow_usd: f64, hazard: f64, params: &EvParams) -> f64 {
    let gross = hazard * params.close_factor * params.liquidation_bonus_pct * borrow_usd;
    let cost = (params.flashloan_fee_pct + params.slippage_buffer_pct) * borrow_usd;
    gross - cost - params.fixed_gas_usd
}

/// Estimates time-to-liquidation as a human string. `margin = max(0, hr -
/// 1)`; returns `"now"` immediately when the obligation is already at or
/// past the liquidation threshold. Otherwise projects how many minutes of
/// price decline (at `sol_drop_pct_per_min`) it would take to consume the
/// margin, capped at `max_drop_pct`, formatted as `MmSSs`. Returns
/// `"unknown"` rather than propagating an error on any degenerate input
/// (zero/negative drop rate, non-finite health ratio).
pub fn estimate_ttl_string(health_ratio: f64, sol_drop_pct_per_min: f64, max_drop_pct: f64) -> String {
    if !health_ratio.is_finite() || sol_drop_pct_per_min <= 0.0 {
        return "unknown".to_string();
    }
    let margin = (health_ratio - 1.0).max(0.0);
    if margin <= 0.0 {
        return "now".to_string();
    }
    let capped_drop_pct = (margin * 100.0).min(max_drop_pct);
    let minutes = capped_drop_pct / sol_drop_pct_per_min;
    if !minutes.is_finite() || minutes < 0.0 {
        return "unknown".to_string();
    }
    format_minutes(minutes)
}

fn format_minutes(minutes: f64) -> String {
    let total_seconds = (minutes * 60.0).round() as i64;
    let m = total_seconds / 60;
    let s = total_seconds % 60;
    format!("{m}m{s:02}s")
}

/// Inverse of [`estimate_ttl_string`]: parses `"now"` as `Some(0.0)`,
/// `"unknown"` as `None`, and the `MmSSs` form back into fractional minutes.
pub fn parse_ttl_minutes(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed == "now" {
        return Some(0.0);
    }
    if trimmed == "unknown" {
        return None;
    }
    let m_idx = trimmed.find('m')?;
    let s_idx = trimmed.find('s')?;
    if s_idx <= m_idx {
        return None;
    }
    let minutes: i64 = trimmed[..m_idx].parse().ok()?;
    let seconds: i64 = trimmed[m_idx + 1..s_idx].parse().ok()?;
    Some(minutes as f64 + seconds as f64 / 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hazard_is_one_at_or_below_threshold() {
        assert_eq!(score_hazard(1.0, 25.0), 1.0);
        assert_eq!(score_hazard(0.5, 25.0), 1.0);
    }

    #[test]
    fn hazard_decreases_with_margin() {
        let near = score_hazard(1.01, 25.0);
        let far = score_hazard(1.5, 25.0);
        assert!(near > far);
        assert!(near <= 1.0 && near > 0.0);
        assert!(far > 0.0);
    }

    #[test]
    fn compute_ev_matches_closed_form() {
        let params = EvParams {
            close_factor: 0.5,
            liquidation_bonus_pct: 0.05,
            flashloan_fee_pct: 0.002,
            slippage_buffer_pct: 0.001,
            fixed_gas_usd: 0.5,
        };
        let ev = compute_ev(1000.0, 1.0, &params);
        let expected = 1.0 * 0.5 * 0.05 * 1000.0 - (0.002 + 0.001) * 1000.0 - 0.5;
        assert!((ev - expected).abs() < 1e-9);
    }

    #[test]
    fn ttl_now_when_margin_non_positive() {
        assert_eq!(estimate_ttl_string(1.0, 0.2, 20.0), "now");
        assert_eq!(estimate_ttl_string(0.8, 0.2, 20.0), "now");
    }

    #[test]
    fn ttl_unknown_on_degenerate_input() {
        assert_eq!(estimate_ttl_string(1.1, 0.0, 20.0), "unknown");
        assert_eq!(estimate_ttl_string(f64::NAN, 0.2, 20.0), "unknown");
    }

    #[test]
    fn ttl_roundtrips_through_parse() {
        let s = estimate_ttl_string(1.5, 0.2, 20.0);
        let minutes = parse_ttl_minutes(&s).unwrap();
        assert!(minutes > 0.0);
    }

    #[test]
    fn parse_ttl_handles_sentinels() {
        assert_eq!(parse_ttl_minutes("now"), Some(0.0));
        assert_eq!(parse_ttl_minutes("unknown"), None);
        assert_eq!(parse_ttl_minutes("5m30s"), Some(5.5));
    }
}
