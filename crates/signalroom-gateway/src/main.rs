//! signalroom gateway
//!
//! - WebSocket endpoint: /ws (join a room, exchange offer/answer/candidate
//!   and file metadata with the other members)
//! - One relay hub task owns all room state
//! - Heartbeat ping + read deadline per connection

use std::future::IntoFuture;
use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signalroom_core::error::{Result, SignalError};
use signalroom_gateway::{app_state::AppState, config, router};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, code = e.client_code().as_str(), "signalroom-gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cfg = config::load_from_env()?;
    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .map_err(|e| SignalError::BadRequest(format!("gateway.listen must be a valid SocketAddr: {e}")))?;

    let (state, hub) = AppState::with_hub(cfg);
    let mut hub_task = tokio::spawn(hub.run());
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| SignalError::Internal(format!("bind {listen} failed: {e}")))?;
    tracing::info!(%listen, "signalroom-gateway starting");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .into_future();

    tokio::select! {
        res = server => {
            res.map_err(|e| SignalError::Internal(format!("server failed: {e}")))?;
        }
        res = &mut hub_task => {
            // no supervisor: room state is gone
            return Err(SignalError::Internal(format!("relay hub exited: {res:?}")));
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
}
