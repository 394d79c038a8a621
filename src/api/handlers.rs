//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{ErrorResponse, RoundsQuery, StateResponse};
use crate::market::protocol::RoundRecord;

/// Returns the simulation config, market report, latest tick and clearing price.
///
/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    Json(StateResponse {
        config: state.config.clone(),
        report: state.report.clone(),
        latest_tick: state.latest.clone(),
        clear_price: state.clear_price,
    })
}

/// Returns archived rounds, optionally filtered by round id.
///
/// `GET /rounds` → 200 + `Vec<RoundRecord>` JSON
/// `GET /rounds?from=N&to=M` → rounds with `N <= id <= M`
/// `GET /rounds?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_rounds(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoundsQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(u64::MAX);

    if from > to {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            }),
        ));
    }

    let rounds: Vec<RoundRecord> = state
        .rounds
        .iter()
        .filter(|r| (from..=to).contains(&r.round.0))
        .cloned()
        .collect();

    Ok(Json(rounds))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::market::{ClearingResult, RoundId, RoundPhase};
    use crate::sim::report::MarketReport;
    use crate::sim::types::{SimConfig, TickResult};

    fn make_test_state() -> Arc<AppState> {
        let rounds: Vec<RoundRecord> = (1..=12)
            .map(|r| RoundRecord {
                round: RoundId(r),
                opened_at: r * 3600,
                cleared_at: Some(r * 3600),
                closed_at: r * 3600,
                result: Some(ClearingResult {
                    price: Some(1.0 + r as f64 / 10.0),
                    matched: BTreeSet::new(),
                    unmatched: BTreeSet::new(),
                }),
                timed_out: BTreeSet::new(),
                malformed: BTreeSet::new(),
                unacknowledged: BTreeSet::new(),
                superseded: false,
            })
            .collect();
        let report = MarketReport::from_rounds(&rounds);
        Arc::new(AppState {
            config: SimConfig::new(3600, 12 * 3600, 42),
            report,
            rounds,
            latest: Some(TickResult {
                timestamp: 43_200,
                phase: RoundPhase::Idle,
                round: None,
                clear_price: 2.2,
                cleared: true,
                net_power_kw: 0.3,
                operating_cost: 0.0,
            }),
            clear_price: 2.2,
        })
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let app = router(make_test_state());
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn state_returns_200() {
        let (status, json) = get_json("/state").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.get("config").is_some());
        assert_eq!(json["report"]["cleared"], 12);
        assert_eq!(json["latest_tick"]["timestamp"], 43_200);
        assert_eq!(json["clear_price"], 2.2);
    }

    #[tokio::test]
    async fn rounds_returns_all() {
        let (status, json) = get_json("/rounds").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().map(Vec::len), Some(12));
    }

    #[tokio::test]
    async fn rounds_range_query() {
        let (status, json) = get_json("/rounds?from=5&to=10").await;
        assert_eq!(status, StatusCode::OK);
        let rounds = json.as_array().unwrap();
        assert_eq!(rounds.len(), 6); // rounds 5..=10
        assert_eq!(rounds[0]["round"], 5);
        assert_eq!(rounds[5]["round"], 10);
        assert_eq!(rounds[0]["result"]["price"], 1.5);
    }

    #[tokio::test]
    async fn rounds_invalid_range_returns_400() {
        let (status, json) = get_json("/rounds?from=10&to=5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json.get("error").is_some());
    }
}
