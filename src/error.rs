//! Tagged error kinds for the liquidation engine. Callers match on `kind`
//! (via the enum variant), never on a formatted string, per the design's
//! error-handling policy: recover locally whenever a well-defined fallback
//! exists, and surface fatally only when configuration is structurally
//! wrong.

use thiserror::Error;

/// Truncates a base58 pubkey-like string to 8-12 characters for inclusion in
/// diagnostics, per the user-visible-failure policy.
pub fn truncate_pubkey(s: &str) -> String {
    if s.len() <= 12 {
        s.to_string()
    } else {
        format!("{}…", &s[..10])
    }
}

/// Further classification of a `simulation_failed` error, derived by
/// pattern-matching program log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationFailure {
    InsufficientRent,
    ObligationMarketMismatch,
    ReserveStale,
    IncorrectIxPosition,
    Other,
}

impl SimulationFailure {
    /// Classifies a joined program-log blob into one of the known failure
    /// buckets. Order matters: more specific substrings are checked first.
    pub fn classify(logs: &[String]) -> Self {
        let joined = logs.join("\n").to_lowercase();
        if joined.contains("insufficient funds for rent") || joined.contains("insufficient rent") {
            SimulationFailure::InsufficientRent
        } else if joined.contains("obligation") && joined.contains("market") && joined.contains("mismatch")
        {
            SimulationFailure::ObligationMarketMismatch
        } else if joined.contains("reserve is stale") || joined.contains("stale reserve") {
            SimulationFailure::ReserveStale
        } else if joined.contains("incorrect instruction position")
            || joined.contains("unexpected instruction")
        {
            SimulationFailure::IncorrectIxPosition
        } else {
            SimulationFailure::Other
        }
    }
}

#[derive(Debug, Error)]
pub enum LiqsolError {
    #[error("bad_input: {message}")]
    BadInput { message: String },

    #[error("missing_cache: reserve cache has no entry for mint {mint}")]
    MissingCache { mint: String },

    #[error("missing_oracle: oracle cache has no price for mint {mint}")]
    MissingOracle { mint: String },

    #[error("no_caches: reserve and/or oracle caches are not yet populated")]
    NoCaches,

    #[error("reserve_mismatch: obligation {obligation} does not reference reserve {reserve}")]
    ReserveMismatch { obligation: String, reserve: String },

    #[error("simulation_failed: classified as {classified:?}")]
    SimulationFailed {
        logs: Vec<String>,
        classified: SimulationFailure,
    },

    #[error("adjacency_invalid: {diagnostics}")]
    AdjacencyInvalid { diagnostics: String },

    #[error("network_transient: {message}")]
    NetworkTransient { message: String },

    #[error("blocked: plan {key} is blocked ({reason})")]
    Blocked { key: String, reason: String },

    #[error("timeout: deadline of {elapsed_ms}ms exceeded")]
    Timeout { elapsed_ms: u64 },
}

impl LiqsolError {
    pub fn bad_input(message: impl Into<String>) -> Self {
        LiqsolError::BadInput {
            message: message.into(),
        }
    }

    pub fn reserve_mismatch(obligation: &str, reserve: &str) -> Self {
        LiqsolError::ReserveMismatch {
            obligation: truncate_pubkey(obligation),
            reserve: truncate_pubkey(reserve),
        }
    }

    /// Whether this error kind is recoverable locally (a well-defined
    /// fallback exists) as opposed to a fatal configuration error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LiqsolError::BadInput { .. })
    }
}

impl From<std::num::TryFromIntError> for LiqsolError {
    fn from(e: std::num::TryFromIntError) -> Self {
        LiqsolError::bad_input(format!("integer conversion failed: {e}"))
    }
}

impl From<solana_client::client_error::ClientError> for LiqsolError {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        LiqsolError::NetworkTransient {
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for LiqsolError {
    fn from(e: std::io::Error) -> Self {
        LiqsolError::NetworkTransient {
            message: format!("io error: {e}"),
        }
    }
}
