//! Account-stream provider shim. The Yellowstone gRPC geyser plugin is
//! treated as an opaque external service: this module only defines the
//! trait boundary the live indexer consumes and a deterministic fake for
//! tests, never a reimplementation of the streaming protocol itself.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::mpsc;

use crate::error::LiqsolError;

#[derive(Debug, Clone)]
pub struct StreamedAccountUpdate {
    pub pubkey: Pubkey,
    pub slot: u64,
    pub data: Vec<u8>,
}

/// A memcmp filter, matching the RPC `getProgramAccounts` shape this
/// crate's snapshot reads already use.
#[derive(Debug, Clone)]
pub struct MemcmpFilter {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait AccountStreamProvider: Send + Sync {
    /// Subscribes to account updates for `program_id`. If `filters` is
    /// empty, the caller is expected to have already injected the
    /// obligation-discriminator memcmp filter (component E's
    /// responsibility, not this shim's).
    async fn subscribe(
        &self,
        program_id: Pubkey,
        filters: Vec<MemcmpFilter>,
    ) -> Result<mpsc::Receiver<StreamedAccountUpdate>, LiqsolError>;
}

/// Test/dry-run fake: replays a fixed list of updates on subscribe.
pub struct FakeAccountStreamProvider {
    pub updates: Vec<StreamedAccountUpdate>,
}

#[async_trait]
impl AccountStreamProvider for FakeAccountStreamProvider {
    async fn subscribe(
        &self,
        _program_id: Pubkey,
        _filters: Vec<MemcmpFilter>,
    ) -> Result<mpsc::Receiver<StreamedAccountUpdate>, LiqsolError> {
        let (tx, rx) = mpsc::channel(self.updates.len().max(1));
        for update in self.updates.clone() {
            tx.send(update)
                .await
                .map_err(|_| LiqsolError::bad_input("fake stream receiver dropped"))?;
        }
        Ok(rx)
    }
}

/// Builds the default memcmp filter pair for obligation streaming: the
/// 8-byte account discriminator at offset 0, and the market pubkey at
/// offset 32 (after the discriminator and the obligation's tag/last-update
/// prefix, per the wire layout in [`crate::decoder::obligation`]).
pub fn default_obligation_filters(market_pubkey: Pubkey) -> Vec<MemcmpFilter> {
    vec![
        MemcmpFilter {
            offset: 0,
            bytes: crate::decoder::discriminator::account_discriminator("Obligation").to_vec(),
        },
        MemcmpFilter {
            offset: 32,
            bytes: market_pubkey.to_bytes().to_vec(),
        },
    ]
}
