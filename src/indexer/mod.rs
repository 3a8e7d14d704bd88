//! Live obligation indexer: maintains a snapshot + live-streamed map of
//! obligation accounts, applies health scoring to each, and filters by
//! reserve membership and mint allowlist.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;

use crate::cache::{OracleCache, ReserveCache};
use crate::decoder::{decode_obligation, Obligation};
use crate::error::LiqsolError;
use crate::health::{compute_health_scoring, HealthOptions, HealthOutcome, ScoredObligation, UnscoredReason};

#[derive(Debug, Clone, Default)]
pub struct IndexerStats {
    pub cache_size: usize,
    pub scored_count: usize,
    pub unscored_count: usize,
    pub liquidatable_count: usize,
    pub empty_obligations: usize,
    pub skipped_other_markets_count: usize,
    pub skipped_allowlist_count: usize,
    pub touches_known_reserve_count: usize,
    pub unscored_reasons: HashMap<String, usize>,
}

pub struct LiveIndexer {
    market_pubkey: Pubkey,
    reserve_cache: Arc<ReserveCache>,
    oracle_cache: Arc<OracleCache>,
    mint_allowlist: Option<HashSet<Pubkey>>,
    obligations: HashMap<Pubkey, Obligation>,
    scored: HashMap<Pubkey, ScoredObligation>,
    stats: IndexerStats,
}

impl LiveIndexer {
    pub fn new(
        market_pubkey: Pubkey,
        reserve_cache: Arc<ReserveCache>,
        oracle_cache: Arc<OracleCache>,
        mint_allowlist: Option<HashSet<Pubkey>>,
    ) -> Self {
        Self {
            market_pubkey,
            reserve_cache,
            oracle_cache,
            mint_allowlist,
            obligations: HashMap::new(),
            scored: HashMap::new(),
            stats: IndexerStats::default(),
        }
    }

    pub fn stats(&self) -> &IndexerStats {
        &self.stats
    }

    /// Decodes and upserts one obligation account, applying the
    /// reserve-membership precheck, market filter, mint allowlist, and
    /// health scoring in that order. The precheck runs *before* the market
    /// filter and allowlist, per the ordering invariant: an obligation that
    /// touches no reserve in the cache is rejected as `OTHER_MARKET`
    /// without ever reaching the market/allowlist checks.
    pub fn upsert_from_account_data(&mut self, pubkey: Pubkey, data: &[u8]) -> Result<(), LiqsolError> {
        let obligation = decode_obligation(data, pubkey)?;
        self.upsert(obligation);
        Ok(())
    }

    pub fn upsert(&mut self, obligation: Obligation) {
        let pubkey = obligation.obligation_pubkey;

        if !self.reserve_cache.is_empty() {
            let touches_known_reserve = obligation
                .all_deposit_reserves()
                .chain(obligation.all_borrow_reserves())
                .any(|r| self.reserve_cache.contains_reserve(&r));

            if !touches_known_reserve {
                self.stats.skipped_other_markets_count += 1;
                self.obligations.insert(pubkey, obligation);
                self.scored.remove(&pubkey);
                self.record_unscored(UnscoredReason::OtherMarket);
                return;
            }
            self.stats.touches_known_reserve_count += 1;
        }

        if obligation.market_pubkey != self.market_pubkey {
            self.stats.skipped_other_markets_count += 1;
            self.obligations.insert(pubkey, obligation);
            self.scored.remove(&pubkey);
            self.record_unscored(UnscoredReason::OtherMarket);
            return;
        }

        let outcome = compute_health_scoring(
            &obligation,
            &self.reserve_cache,
            &self.oracle_cache,
            HealthOptions {
                include_breakdown: false,
                expose_raw_hr: true,
            },
        );

        match outcome {
            HealthOutcome::Scored(scored) => {
                if let Some(allowlist) = &self.mint_allowlist {
                    let borrow_ok = scored.primary_borrow_mint.map(|m| allowlist.contains(&m)).unwrap_or(true);
                    let collateral_ok = scored
                        .primary_collateral_mint
                        .map(|m| allowlist.contains(&m))
                        .unwrap_or(true);
                    if !borrow_ok || !collateral_ok {
                        self.stats.skipped_allowlist_count += 1;
                        self.obligations.insert(pubkey, obligation);
                        self.scored.remove(&pubkey);
                        return;
                    }
                }
                if obligation.is_empty() {
                    self.stats.empty_obligations += 1;
                }
                if scored.liquidation_eligible {
                    self.stats.liquidatable_count += 1;
                }
                self.stats.scored_count += 1;
                self.scored.insert(pubkey, scored);
            }
            HealthOutcome::Unscored(reason) => {
                if reason == UnscoredReason::EmptyObligation {
                    self.stats.empty_obligations += 1;
                }
                self.record_unscored(reason);
                self.scored.remove(&pubkey);
            }
        }

        self.obligations.insert(pubkey, obligation);
        self.stats.cache_size = self.obligations.len();
    }

    fn record_unscored(&mut self, reason: UnscoredReason) {
        self.stats.unscored_count += 1;
        *self.stats.unscored_reasons.entry(reason.key().to_string()).or_insert(0) += 1;
    }

    /// Removes an obligation whose account has disappeared (closed).
    pub fn remove(&mut self, pubkey: &Pubkey) {
        self.obligations.remove(pubkey);
        self.scored.remove(pubkey);
        self.stats.cache_size = self.obligations.len();
    }

    /// Top-`n` scored obligations by ascending health ratio (closest to
    /// liquidation first).
    pub fn get_scored_obligations(&self, n: usize) -> Vec<ScoredObligation> {
        let mut all = self.all_scored_obligations();
        all.truncate(n);
        all
    }

    /// Every scored obligation, sorted ascending by health ratio. Callers
    /// that need their own ranking (candidate selection, EV mode) start
    /// from here rather than from an arbitrarily-truncated top-n.
    pub fn all_scored_obligations(&self) -> Vec<ScoredObligation> {
        let mut all: Vec<ScoredObligation> = self.scored.values().cloned().collect();
        all.sort_by(|a, b| a.health_ratio.total_cmp(&b.health_ratio));
        all
    }

    pub fn obligation_count(&self) -> usize {
        self.obligations.len()
    }
}
