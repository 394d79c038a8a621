//! REST API for market state and round history.
//!
//! Provides two GET endpoints:
//! - `/state` returns the simulation config, market report, latest tick and clearing price
//! - `/rounds` returns archived round records with optional id range filtering

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::market::protocol::RoundRecord;
use crate::sim::report::MarketReport;
use crate::sim::types::{SimConfig, TickResult};

/// Immutable application state shared across all request handlers.
///
/// Constructed once after the simulation run completes and wrapped in
/// `Arc`; all data is read-only so no locks are needed.
pub struct AppState {
    /// Simulation configuration used for this run.
    pub config: SimConfig,
    /// Aggregate market report.
    pub report: MarketReport,
    /// Archived rounds, oldest first.
    pub rounds: Vec<RoundRecord>,
    /// Last tick of the run, if any.
    pub latest: Option<TickResult>,
    /// Latest clearing price.
    pub clear_price: f64,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/rounds", get(handlers::get_rounds))
        .with_state(state)
}

/// Binds to the given address and serves the API until the server stops.
///
/// # Errors
///
/// Returns an error if the listener cannot bind to `addr` or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
