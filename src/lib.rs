//! Automated liquidation engine for a Kamino-style Solana lending market.
//!
//! The pipeline: stream obligation/reserve/oracle account updates into the
//! in-memory caches and indexer, score every obligation's health, select
//! and queue candidate liquidations, then build, validate, simulate, and
//! (optionally) broadcast the canonical liquidation transaction window.

pub mod cache;
pub mod config;
pub mod decoder;
pub mod error;
pub mod executor;
pub mod flashloan;
pub mod forecast;
pub mod health;
pub mod indexer;
pub mod liquidation;
pub mod lut;
pub mod math;
pub mod persist;
pub mod realtime;
pub mod rpc;
pub mod scheduler;
pub mod scoring;
pub mod seized;
pub mod selector;
pub mod setup_state;
pub mod streaming;
pub mod swap;
pub mod validator;

pub use error::LiqsolError;
