//! In-memory caches for reserves and oracle prices.
//!
//! Both caches are refreshed by swapping the entire backing map at once —
//! readers observe either the old snapshot or the new one, never a mix of
//! both within a single read.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use solana_sdk::pubkey::Pubkey;

use crate::decoder::{OraclePrice, Reserve};

/// `byReserve: reservePubkey -> Reserve` and `byMint: liquidityMint -> Reserve`.
/// Lookups by reserve pubkey are authoritative; `byMint` is a convenience
/// index for the (common) case of one reserve per liquidity mint.
#[derive(Default)]
pub struct ReserveCache {
    inner: RwLock<ReserveCacheInner>,
}

#[derive(Default, Clone)]
struct ReserveCacheInner {
    by_reserve: HashMap<Pubkey, Reserve>,
    by_mint: HashMap<Pubkey, Reserve>,
}

impl ReserveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces the whole cache contents with `reserves`.
    pub fn replace_all(&self, reserves: Vec<Reserve>) {
        let mut by_reserve = HashMap::with_capacity(reserves.len());
        let mut by_mint = HashMap::with_capacity(reserves.len());
        for reserve in reserves {
            by_mint.insert(reserve.liquidity_mint, reserve.clone());
            by_reserve.insert(reserve.reserve_pubkey, reserve);
        }
        let mut guard = self.inner.write().expect("reserve cache lock poisoned");
        guard.by_reserve = by_reserve;
        guard.by_mint = by_mint;
    }

    pub fn by_reserve(&self, reserve_pubkey: &Pubkey) -> Option<Reserve> {
        self.inner
            .read()
            .expect("reserve cache lock poisoned")
            .by_reserve
            .get(reserve_pubkey)
            .cloned()
    }

    pub fn by_mint(&self, liquidity_mint: &Pubkey) -> Option<Reserve> {
        self.inner
            .read()
            .expect("reserve cache lock poisoned")
            .by_mint
            .get(liquidity_mint)
            .cloned()
    }

    pub fn contains_reserve(&self, reserve_pubkey: &Pubkey) -> bool {
        self.inner
            .read()
            .expect("reserve cache lock poisoned")
            .by_reserve
            .contains_key(reserve_pubkey)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("reserve cache lock poisoned").by_reserve.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `mint -> Price`. An optional mint allow-list scopes which mints are ever
/// loaded or priced; mints outside the allow-list are simply absent.
#[derive(Default)]
pub struct OracleCache {
    by_mint: RwLock<HashMap<Pubkey, OraclePrice>>,
}

impl OracleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces the whole cache. `allowlist`, when present,
    /// restricts which entries of `prices` are retained.
    pub fn replace_all(&self, prices: HashMap<Pubkey, OraclePrice>, allowlist: Option<&HashSet<Pubkey>>) {
        let filtered = match allowlist {
            Some(allow) => prices
                .into_iter()
                .filter(|(mint, _)| allow.contains(mint))
                .collect(),
            None => prices,
        };
        *self.by_mint.write().expect("oracle cache lock poisoned") = filtered;
    }

    pub fn get(&self, mint: &Pubkey) -> Option<OraclePrice> {
        self.by_mint.read().expect("oracle cache lock poisoned").get(mint).copied()
    }

    pub fn len(&self) -> usize {
        self.by_mint.read().expect("oracle cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::OracleType;

    fn sample_reserve(reserve: Pubkey, mint: Pubkey) -> Reserve {
        Reserve {
            reserve_pubkey: reserve,
            market_pubkey: Pubkey::new_unique(),
            liquidity_mint: mint,
            collateral_mint: Pubkey::new_unique(),
            liquidity_decimals: 9,
            collateral_decimals: 9,
            oracle_pubkeys: vec![],
            loan_to_value_pct: 80,
            liquidation_threshold_pct: 85,
            liquidation_bonus_bps: 500,
            borrow_factor_pct: 100,
            total_borrowed_sf: 0,
            available_liquidity: 0,
            cumulative_borrow_rate_bsf: crate::math::BigFractionBytes {
                value: [1_000_000_000_000_000_000, 0, 0, 0],
            },
            scope_price_chain: None,
            last_update_slot: 0,
            collateral_mint_total_supply: 0,
        }
    }

    #[test]
    fn reserve_cache_swap_is_atomic_and_indexes_both_ways() {
        let cache = ReserveCache::new();
        let reserve_pk = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        cache.replace_all(vec![sample_reserve(reserve_pk, mint)]);

        assert!(cache.by_reserve(&reserve_pk).is_some());
        assert!(cache.by_mint(&mint).is_some());
        assert!(cache.contains_reserve(&reserve_pk));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn reserve_cache_replace_drops_stale_entries() {
        let cache = ReserveCache::new();
        let old = Pubkey::new_unique();
        cache.replace_all(vec![sample_reserve(old, Pubkey::new_unique())]);
        assert!(cache.contains_reserve(&old));

        let new = Pubkey::new_unique();
        cache.replace_all(vec![sample_reserve(new, Pubkey::new_unique())]);
        assert!(!cache.contains_reserve(&old));
        assert!(cache.contains_reserve(&new));
    }

    #[test]
    fn oracle_cache_allowlist_drops_non_allowed_mints() {
        let cache = OracleCache::new();
        let allowed = Pubkey::new_unique();
        let denied = Pubkey::new_unique();
        let price = OraclePrice {
            price: 100,
            exponent: 0,
            confidence: 1,
            slot: 1,
            oracle_type: OracleType::Pyth,
        };
        let mut prices = HashMap::new();
        prices.insert(allowed, price);
        prices.insert(denied, price);

        let mut allowlist = HashSet::new();
        allowlist.insert(allowed);
        cache.replace_all(prices, Some(&allowlist));

        assert!(cache.get(&allowed).is_some());
        assert!(cache.get(&denied).is_none());
        assert_eq!(cache.len(), 1);
    }
}
