//! Setup-state store (component P): a persistent record of plans the
//! executor has given up on for a structural reason (e.g. insufficient
//! rent), consulted by the scheduler before dispatch so it doesn't keep
//! retrying a plan known to fail the same way.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LiqsolError;
use crate::persist::{read_json, write_json_atomic};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedEntry {
    pub reason: String,
    pub at_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupState {
    pub blocked: HashMap<String, BlockedEntry>,
}

pub struct SetupStateStore {
    path: PathBuf,
    state: SetupState,
}

impl SetupStateStore {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, LiqsolError> {
        let path = path.into();
        let state = read_json(&path).await?;
        Ok(Self { path, state })
    }

    async fn save(&self) -> Result<(), LiqsolError> {
        write_json_atomic(&self.path, &self.state).await
    }

    pub async fn mark_blocked(&mut self, key: &str, reason: &str, now_ms: u64) -> Result<(), LiqsolError> {
        self.state.blocked.insert(
            key.to_string(),
            BlockedEntry {
                reason: reason.to_string(),
                at_ms: now_ms,
            },
        );
        self.save().await
    }

    pub fn is_blocked(&self, key: &str) -> bool {
        self.state.blocked.contains_key(key)
    }

    pub fn blocked_entry(&self, key: &str) -> Option<&BlockedEntry> {
        self.state.blocked.get(key)
    }

    pub async fn clear_blocked(&mut self, key: &str) -> Result<(), LiqsolError> {
        if self.state.blocked.remove(key).is_some() {
            self.save().await?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
