//! Shared RPC connection and blockhash manager singletons.
//!
//! One process owns one RPC client (initialized lazily from `RPC_PRIMARY`)
//! and one blockhash manager. Freshness is judged strictly by comparing
//! current block height against `lastValidBlockHeight` — never by mixing
//! in a slot number, which advances on a different cadence.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use tokio::sync::RwLock;

use crate::error::LiqsolError;

static RPC_CLIENT: OnceCell<Arc<RpcClient>> = OnceCell::new();

/// Returns the process-wide RPC client, creating it on first call from
/// `endpoint`. Subsequent calls ignore `endpoint` and return the existing
/// client — callers always pass the same configured `RPC_PRIMARY`.
pub fn rpc_client(endpoint: &str) -> Arc<RpcClient> {
    RPC_CLIENT
        .get_or_init(|| {
            Arc::new(RpcClient::new_with_commitment(
                endpoint.to_string(),
                CommitmentConfig::confirmed(),
            ))
        })
        .clone()
}

#[cfg(test)]
pub fn reset_for_tests() {
    // OnceCell has no public reset; tests that need isolation construct
    // their own RpcClient directly instead of going through this singleton.
}

/// Caches the latest blockhash and refreshes it once the current block
/// height comes within `safety_margin` blocks of `last_valid_block_height`.
pub struct BlockhashManager {
    client: Arc<RpcClient>,
    state: RwLock<Option<CachedBlockhash>>,
    safety_margin: u64,
}

#[derive(Debug, Clone, Copy)]
struct CachedBlockhash {
    blockhash: solana_sdk::hash::Hash,
    last_valid_block_height: u64,
}

impl BlockhashManager {
    pub fn new(client: Arc<RpcClient>, safety_margin: u64) -> Self {
        Self {
            client,
            state: RwLock::new(None),
            safety_margin,
        }
    }

    /// Returns a blockhash guaranteed to still be valid, refreshing from
    /// the RPC endpoint if the cached one is stale or has never been
    /// fetched. Staleness is decided purely by block-height-to-block-height
    /// comparison against `last_valid_block_height`.
    pub async fn get_blockhash(&self) -> Result<solana_sdk::hash::Hash, LiqsolError> {
        {
            let guard = self.state.read().await;
            if let Some(cached) = *guard {
                let current_height = self.client.get_block_height().await?;
                if current_height + self.safety_margin < cached.last_valid_block_height {
                    return Ok(cached.blockhash);
                }
            }
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<solana_sdk::hash::Hash, LiqsolError> {
        let (blockhash, last_valid_block_height) = self.client.get_latest_blockhash_with_commitment(CommitmentConfig::confirmed()).await?;
        let mut guard = self.state.write().await;
        *guard = Some(CachedBlockhash {
            blockhash,
            last_valid_block_height,
        });
        Ok(blockhash)
    }
}
