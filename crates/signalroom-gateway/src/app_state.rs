//! Shared application state for the signalroom gateway.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::obs::GatewayMetrics;
use crate::policy::OriginPolicy;
use crate::relay::{Hub, HubHandle};
use crate::transport::handshake::HandshakeLimiter;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    hub: HubHandle,
    limiter: HandshakeLimiter,
    origins: OriginPolicy,
    metrics: Arc<GatewayMetrics>,
}

impl AppState {
    /// Build state around an existing hub handle.
    pub fn new(cfg: GatewayConfig, hub: HubHandle, metrics: Arc<GatewayMetrics>) -> Self {
        let limiter = HandshakeLimiter::new(&cfg.rate_limit);
        let origins = OriginPolicy::new(&cfg.origins);
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                hub,
                limiter,
                origins,
                metrics,
            }),
        }
    }

    /// Build state plus the hub it talks to. The caller must spawn
    /// [`Hub::run`].
    pub fn with_hub(cfg: GatewayConfig) -> (Self, Hub) {
        let metrics = Arc::new(GatewayMetrics::default());
        let (hub, handle) = Hub::new(cfg.gateway.hub_queue, Arc::clone(&metrics));
        (Self::new(cfg, handle, metrics), hub)
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn hub(&self) -> HubHandle {
        self.inner.hub.clone()
    }

    pub fn limiter(&self) -> &HandshakeLimiter {
        &self.inner.limiter
    }

    pub fn origins(&self) -> &OriginPolicy {
        &self.inner.origins
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.inner.metrics
    }

    pub fn metrics_arc(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.inner.metrics)
    }
}
