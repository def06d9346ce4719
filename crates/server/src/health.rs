use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use slashbot_core::config::TransportMode;

#[derive(Clone)]
pub struct HealthState {
    transport: TransportMode,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub transport: &'static str,
    pub checked_at: String,
}

pub fn router(transport: TransportMode) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { transport })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        transport: state.transport.as_str(),
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
