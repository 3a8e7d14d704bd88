//! Oracle price type: `{price, exponent, confidence, slot, oracleType}` with
//! `UI price = mantissa * 10^exponent`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleType {
    Pyth,
    SwitchboardV2,
    SwitchboardOnDemand,
    Scope,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OraclePrice {
    pub price: i64,
    pub exponent: i32,
    pub confidence: u64,
    pub slot: u64,
    pub oracle_type: OracleType,
}

impl OraclePrice {
    /// `UI price = mantissa * 10^exponent`.
    pub fn ui_price(&self) -> f64 {
        self.price as f64 * 10f64.powi(self.exponent)
    }

    /// One "confidence step" in UI-price units, used by the health math
    /// module to haircut collateral and pad debt valuations.
    pub fn confidence_step_ui(&self) -> f64 {
        self.confidence as f64 * 10f64.powi(self.exponent)
    }
}
