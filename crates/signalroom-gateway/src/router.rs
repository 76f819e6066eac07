//! Axum router wiring.
//!
//! - `/ws`      : WebSocket upgrade into the relay
//! - `/health`  : static liveness report
//! - `/metrics` : Prometheus text format
//!
//! Every route sits behind the origin/CORS guard. Serve with
//! `into_make_service_with_connect_info::<SocketAddr>()`; the upgrade
//! handler keys the handshake limiter on the peer address.

use axum::{middleware, routing::get, Router};

use crate::{app_state::AppState, ops, policy, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(transport::ws::ws_upgrade))
        .route("/health", get(ops::health))
        .route("/metrics", get(ops::metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            policy::cors_guard,
        ))
        .with_state(state)
}
