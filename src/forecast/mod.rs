//! TTL/freshness manager: evaluates each forecast entry for staleness and
//! whether it needs recomputation, without conflating "small positive TTL"
//! with "expired" — the absolute `predictedLiquidationAtMs + ttlGraceMs`
//! deadline is authoritative.

#[derive(Debug, Clone, Copy)]
pub struct ForecastEntry {
    pub forecast_updated_at_ms: u64,
    pub ttl_min: Option<f64>,
    pub predicted_liquidation_at_ms: Option<u64>,
    pub ev: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ForecastParams {
    pub forecast_max_age_ms: u64,
    pub ttl_grace_ms: u64,
    pub ttl_unknown_passes: bool,
    pub ev_drop_pct: f64,
    pub min_ev: f64,
    pub min_refresh_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastEvaluation {
    pub expired: bool,
    pub needs_recompute: bool,
    pub reason: Option<String>,
}

fn push_reason(reason: &mut Option<String>, tag: &str) {
    match reason {
        Some(r) => {
            r.push(',');
            r.push_str(tag);
        }
        None => *reason = Some(tag.to_string()),
    }
}

/// Evaluates one forecast entry. `prev_ev` is the EV recorded the last time
/// this candidate was scored, if any; `now_ms` is the evaluation instant.
pub fn evaluate_forecast(
    entry: &ForecastEntry,
    params: &ForecastParams,
    prev_ev: Option<f64>,
    now_ms: u64,
) -> ForecastEvaluation {
    let mut expired = false;
    let mut reason: Option<String> = None;

    let age_ms = now_ms.saturating_sub(entry.forecast_updated_at_ms);
    if age_ms > params.forecast_max_age_ms {
        expired = true;
        push_reason(&mut reason, "age");
    }
    match entry.ttl_min {
        Some(ttl) if ttl < 0.0 => {
            expired = true;
            push_reason(&mut reason, "ttl_negative");
        }
        None if !params.ttl_unknown_passes => {
            expired = true;
            push_reason(&mut reason, "ttl_unknown");
        }
        _ => {}
    }
    if let Some(predicted_ms) = entry.predicted_liquidation_at_ms {
        if now_ms as i128 > predicted_ms as i128 + params.ttl_grace_ms as i128 {
            expired = true;
            push_reason(&mut reason, "ttl_grace_exceeded");
        }
    }

    let mut needs_recompute = expired;
    if entry.ev <= params.min_ev {
        needs_recompute = true;
        push_reason(&mut reason, "ev_below_min");
    }
    if let Some(prev) = prev_ev {
        if prev != 0.0 {
            let drop_pct = (prev - entry.ev) / prev;
            if drop_pct >= params.ev_drop_pct {
                needs_recompute = true;
                push_reason(&mut reason, "ev_drop");
            }
        }
    }

    if !expired {
        if let Some(min_interval) = params.min_refresh_interval_ms {
            if age_ms < min_interval {
                needs_recompute = false;
                push_reason(&mut reason, "throttle");
            }
        }
    }

    ForecastEvaluation {
        expired,
        needs_recompute,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ForecastParams {
        ForecastParams {
            forecast_max_age_ms: 300_000,
            ttl_grace_ms: 60_000,
            ttl_unknown_passes: true,
            ev_drop_pct: 0.5,
            min_ev: -1_000_000.0,
            min_refresh_interval_ms: None,
        }
    }

    #[test]
    fn tiny_positive_ttl_with_future_prediction_not_expired() {
        let now = 1_000_000u64;
        let entry = ForecastEntry {
            forecast_updated_at_ms: now,
            ttl_min: Some(0.01),
            predicted_liquidation_at_ms: Some(now + 60_000),
            ev: 10.0,
        };
        let eval = evaluate_forecast(&entry, &params(), None, now);
        assert!(!eval.expired);
    }

    #[test]
    fn zero_ttl_at_now_not_expired() {
        let now = 1_000_000u64;
        let entry = ForecastEntry {
            forecast_updated_at_ms: now,
            ttl_min: Some(0.0),
            predicted_liquidation_at_ms: Some(now),
            ev: 10.0,
        };
        let eval = evaluate_forecast(&entry, &params(), None, now);
        assert!(!eval.expired);
    }

    #[test]
    fn grace_exceeded_expires() {
        let now = 1_000_000u64;
        let entry = ForecastEntry {
            forecast_updated_at_ms: now,
            ttl_min: Some(1.0),
            predicted_liquidation_at_ms: Some(now - 120_000),
            ev: 10.0,
        };
        let eval = evaluate_forecast(&entry, &params(), None, now);
        assert!(eval.expired);
        assert!(eval.reason.unwrap().contains("ttl_grace_exceeded"));
    }

    #[test]
    fn unknown_ttl_expires_when_not_passed() {
        let mut p = params();
        p.ttl_unknown_passes = false;
        let now = 1_000_000u64;
        let entry = ForecastEntry {
            forecast_updated_at_ms: now,
            ttl_min: None,
            predicted_liquidation_at_ms: None,
            ev: 10.0,
        };
        let eval = evaluate_forecast(&entry, &p, None, now);
        assert!(eval.expired);
        assert!(eval.reason.unwrap().contains("ttl_unknown"));
    }

    #[test]
    fn negative_ttl_expires() {
        let now = 1_000_000u64;
        let entry = ForecastEntry {
            forecast_updated_at_ms: now,
            ttl_min: Some(-5.0),
            predicted_liquidation_at_ms: None,
            ev: 10.0,
        };
        let eval = evaluate_forecast(&entry, &params(), None, now);
        assert!(eval.expired);
        assert!(eval.reason.unwrap().contains("ttl_negative"));
    }

    #[test]
    fn throttle_suppresses_recompute_when_fresh() {
        let mut p = params();
        p.min_refresh_interval_ms = Some(10_000);
        p.min_ev = -1.0;
        let now = 1_005_000u64;
        let entry = ForecastEntry {
            forecast_updated_at_ms: 1_000_000,
            ttl_min: Some(5.0),
            predicted_liquidation_at_ms: None,
            ev: -5.0,
        };
        let eval = evaluate_forecast(&entry, &p, None, now);
        assert!(!eval.expired);
        assert!(!eval.needs_recompute);
        assert!(eval.reason.unwrap().contains("throttle"));
    }
}
