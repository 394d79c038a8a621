//! API response and query types.

use serde::{Deserialize, Serialize};

use crate::sim::report::MarketReport;
use crate::sim::types::{SimConfig, TickResult};

/// Combined state response.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub config: SimConfig,
    pub report: MarketReport,
    /// Most recent tick, `null` for an empty run.
    pub latest_tick: Option<TickResult>,
    pub clear_price: f64,
}

/// Optional round id range for the rounds endpoint.
#[derive(Debug, Deserialize)]
pub struct RoundsQuery {
    /// First round id (inclusive).
    pub from: Option<u64>,
    /// Last round id (inclusive).
    pub to: Option<u64>,
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
