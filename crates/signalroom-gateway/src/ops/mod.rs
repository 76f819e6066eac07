//! Operational HTTP endpoints.
//!
//! - `/health`  : liveness
//! - `/metrics` : Prometheus text format

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::app_state::AppState;

pub const SERVICE_NAME: &str = "signalroom";

pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": SERVICE_NAME,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })),
    )
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let stats = state.hub().stats();
    let extra = [
        ("signalroom_rooms", stats.rooms as u64),
        ("signalroom_room_members", stats.members as u64),
        ("signalroom_handshake_tracked_clients", state.limiter().tracked() as u64),
    ];
    let body = state.metrics().render(&extra);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
