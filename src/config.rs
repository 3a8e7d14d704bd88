//! Typed, validated configuration snapshot (component R): every environment
//! variable in the external-interfaces table, loaded once at startup.
//!
//! `.env` loading is optional and silent on absence, matching the corpus's
//! keeper-style bootstrapping — a missing `.env` file is not an error, only
//! a missing *required* variable is.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tracing::warn;

use crate::error::LiqsolError;
use crate::flashloan::{NATIVE_SOL_MINT, USDC_MINT};
use crate::scoring::EvParams;

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub hazard_alpha: f64,
    pub ev: EvParams,
}

#[derive(Debug, Clone)]
pub struct TtlConfig {
    pub sol_drop_pct_per_min: f64,
    pub max_drop_pct: f64,
    pub grace_ms: u64,
    pub unknown_passes: bool,
    pub forecast_max_age_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub min_ev: f64,
    pub max_ttl_min: f64,
    pub min_hazard: f64,
    pub min_refresh_interval_ms: u64,
    pub force_include_liquidatable: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_primary: String,
    pub rpc_secondary: Option<String>,
    pub ws_primary: Option<String>,

    pub kamino_market_pubkey: Pubkey,
    pub kamino_klend_program_id: Pubkey,

    pub bot_keypair_path: Option<String>,

    pub yellowstone_grpc_url: Option<String>,
    pub yellowstone_x_token: Option<String>,

    pub allowlist_mints: HashSet<Pubkey>,

    pub scoring: ScoringConfig,
    pub ttl: TtlConfig,
    pub scheduler: SchedulerConfig,

    pub swap_in_haircut_bps: u16,
    pub broadcast: bool,
    pub executor_lut_address: Option<Pubkey>,
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    match env_str(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, raw, "failed to parse env var, using default");
            default
        }),
        None => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_str(key) {
        Some(raw) => is_truthy(&raw),
        None => default,
    }
}

/// The case-insensitive truthy set `{true, 1, yes}`.
fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_required_pubkey(key: &str) -> Result<Pubkey, LiqsolError> {
    let raw = env_str(key).ok_or_else(|| LiqsolError::bad_input(format!("missing required env var {key}")))?;
    Pubkey::from_str(&raw).map_err(|e| LiqsolError::bad_input(format!("{key} is not a valid pubkey: {e}")))
}

fn parse_mint_list(raw: &str) -> HashSet<Pubkey> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| Pubkey::from_str(s).ok())
        .collect()
}

fn default_allowlist() -> HashSet<Pubkey> {
    [NATIVE_SOL_MINT, USDC_MINT].into_iter().collect()
}

impl Config {
    /// Loads `.env` (if present, silently) then reads `std::env`. Fails
    /// fast with `bad_input` on a missing required variable or a
    /// malformed pubkey/required value.
    pub fn from_env() -> Result<Config, LiqsolError> {
        dotenvy::dotenv().ok();

        let rpc_primary =
            env_str("RPC_PRIMARY").ok_or_else(|| LiqsolError::bad_input("missing required env var RPC_PRIMARY"))?;
        let rpc_secondary = env_str("RPC_SECONDARY");
        let ws_primary = env_str("WS_PRIMARY");

        let kamino_market_pubkey = parse_required_pubkey("KAMINO_MARKET_PUBKEY")?;
        let kamino_klend_program_id = parse_required_pubkey("KAMINO_KLEND_PROGRAM_ID")?;

        let bot_keypair_path = env_str("BOT_KEYPAIR_PATH");
        let yellowstone_grpc_url = env_str("YELLOWSTONE_GRPC_URL");
        let yellowstone_x_token = env_str("YELLOWSTONE_X_TOKEN");

        let allowlist_mints = Self::resolve_allowlist();

        let scoring = ScoringConfig {
            hazard_alpha: env_parsed("HAZARD_ALPHA", 25.0),
            ev: EvParams {
                close_factor: env_parsed("EV_CLOSE_FACTOR", 0.5),
                liquidation_bonus_pct: env_parsed("EV_LIQUIDATION_BONUS_PCT", 0.05),
                flashloan_fee_pct: env_parsed("EV_FLASHLOAN_FEE_PCT", 0.002),
                fixed_gas_usd: env_parsed("EV_FIXED_GAS_USD", 0.5),
                slippage_buffer_pct: env_parsed("EV_SLIPPAGE_BUFFER_PCT", 0.0),
            },
        };

        let ttl = TtlConfig {
            sol_drop_pct_per_min: env_parsed("TTL_SOL_DROP_PCT_PER_MIN", 0.2),
            max_drop_pct: env_parsed("TTL_MAX_DROP_PCT", 20.0),
            grace_ms: env_parsed("TTL_GRACE_MS", 60_000u64),
            unknown_passes: env_bool("TTL_UNKNOWN_PASSES", true),
            forecast_max_age_ms: env_parsed("FORECAST_MAX_AGE_MS", 300_000u64),
        };

        let scheduler = SchedulerConfig {
            min_ev: env_parsed("SCHED_MIN_EV", 0.0),
            max_ttl_min: env_parsed("SCHED_MAX_TTL_MIN", 10.0),
            min_hazard: env_parsed("SCHED_MIN_HAZARD", 0.05),
            min_refresh_interval_ms: env_parsed("SCHED_MIN_REFRESH_INTERVAL_MS", 0u64),
            force_include_liquidatable: env_bool("SCHED_FORCE_INCLUDE_LIQUIDATABLE", true),
        };

        let swap_in_haircut_bps = env_parsed("SWAP_IN_HAIRCUT_BPS", crate::seized::DEFAULT_SWAP_IN_HAIRCUT_BPS);
        let broadcast = env_bool("LIQSOL_BROADCAST", false) || env_bool("EXECUTOR_BROADCAST", false);
        let executor_lut_address = env_str("EXECUTOR_LUT_ADDRESS")
            .map(|raw| Pubkey::from_str(&raw))
            .transpose()
            .map_err(|e| LiqsolError::bad_input(format!("EXECUTOR_LUT_ADDRESS is not a valid pubkey: {e}")))?;

        Ok(Config {
            rpc_primary,
            rpc_secondary,
            ws_primary,
            kamino_market_pubkey,
            kamino_klend_program_id,
            bot_keypair_path,
            yellowstone_grpc_url,
            yellowstone_x_token,
            allowlist_mints,
            scoring,
            ttl,
            scheduler,
            swap_in_haircut_bps,
            broadcast,
            executor_lut_address,
        })
    }

    /// `ALLOWLIST_MINTS` / `LIQSOL_LIQ_MINT_ALLOWLIST`: both are read; if
    /// both are set and disagree, the legacy-compat `LIQSOL_LIQ_MINT_ALLOWLIST`
    /// wins and a warning is emitted. If neither is set, defaults to
    /// SOL+USDC.
    fn resolve_allowlist() -> HashSet<Pubkey> {
        let primary = env_str("ALLOWLIST_MINTS").map(|raw| parse_mint_list(&raw));
        let legacy = env_str("LIQSOL_LIQ_MINT_ALLOWLIST").map(|raw| parse_mint_list(&raw));

        match (primary, legacy) {
            (Some(p), Some(l)) => {
                if p != l {
                    warn!("ALLOWLIST_MINTS and LIQSOL_LIQ_MINT_ALLOWLIST disagree; using LIQSOL_LIQ_MINT_ALLOWLIST");
                }
                l
            }
            (None, Some(l)) => l,
            (Some(p), None) => p,
            (None, None) => default_allowlist(),
        }
    }

    pub fn ttl_grace(&self) -> Duration {
        Duration::from_millis(self.ttl.grace_ms)
    }

    #[cfg(test)]
    pub fn test_default() -> Config {
        Config {
            rpc_primary: "http://localhost:8899".to_string(),
            rpc_secondary: None,
            ws_primary: None,
            kamino_market_pubkey: Pubkey::new_unique(),
            kamino_klend_program_id: Pubkey::new_unique(),
            bot_keypair_path: None,
            yellowstone_grpc_url: None,
            yellowstone_x_token: None,
            allowlist_mints: default_allowlist(),
            scoring: ScoringConfig {
                hazard_alpha: 25.0,
                ev: EvParams {
                    close_factor: 0.5,
                    liquidation_bonus_pct: 0.05,
                    flashloan_fee_pct: 0.002,
                    fixed_gas_usd: 0.5,
                    slippage_buffer_pct: 0.0,
                },
            },
            ttl: TtlConfig {
                sol_drop_pct_per_min: 0.2,
                max_drop_pct: 20.0,
                grace_ms: 60_000,
                unknown_passes: true,
                forecast_max_age_ms: 300_000,
            },
            scheduler: SchedulerConfig {
                min_ev: 0.0,
                max_ttl_min: 10.0,
                min_hazard: 0.05,
                min_refresh_interval_ms: 0,
                force_include_liquidatable: true,
            },
            swap_in_haircut_bps: crate::seized::DEFAULT_SWAP_IN_HAIRCUT_BPS,
            broadcast: false,
            executor_lut_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_set_is_case_insensitive() {
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("1"));
        assert!(is_truthy("Yes"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("no"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn mint_list_parses_comma_separated_base58() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let raw = format!("{a}, {b}");
        let parsed = parse_mint_list(&raw);
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains(&a));
        assert!(parsed.contains(&b));
    }

    #[test]
    fn test_default_has_required_fields_populated() {
        let cfg = Config::test_default();
        assert!(!cfg.rpc_primary.is_empty());
        assert_eq!(cfg.swap_in_haircut_bps, 100);
    }
}
