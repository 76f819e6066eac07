//! The relay control loop.
//!
//! Every register/unregister/relay event is processed to completion, in
//! arrival order, before the next one is looked at. The registry sits behind
//! a `RwLock` only so diagnostics can copy a snapshot; the loop is its sole
//! writer.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;

use signalroom_core::error::{Result, SignalError};
use signalroom_core::protocol::{Envelope, MemberInfo};

use crate::obs::GatewayMetrics;

use super::registry::Registry;
use super::types::{ConnId, Peer};

#[derive(Debug)]
pub enum HubEvent {
    Register(Peer),
    Unregister(ConnId),
    Relay { sender: ConnId, envelope: Envelope },
}

/// Point-in-time counts for health/metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub rooms: usize,
    pub members: usize,
}

fn read(reg: &RwLock<Registry>) -> RwLockReadGuard<'_, Registry> {
    reg.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(reg: &RwLock<Registry>) -> RwLockWriteGuard<'_, Registry> {
    reg.write().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of the event queue. Run exactly one per process.
pub struct Hub {
    registry: Arc<RwLock<Registry>>,
    events: mpsc::Receiver<HubEvent>,
    metrics: Arc<GatewayMetrics>,
}

/// Cloneable submission side of the hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubEvent>,
    registry: Arc<RwLock<Registry>>,
}

impl Hub {
    pub fn new(capacity: usize, metrics: Arc<GatewayMetrics>) -> (Hub, HubHandle) {
        let (tx, events) = mpsc::channel(capacity.max(1));
        let registry = Arc::new(RwLock::new(Registry::new()));
        let hub = Hub {
            registry: Arc::clone(&registry),
            events,
            metrics,
        };
        (hub, HubHandle { tx, registry })
    }

    /// Process events until every `HubHandle` is dropped.
    pub async fn run(mut self) {
        tracing::info!("relay hub started");
        while let Some(ev) = self.events.recv().await {
            self.handle(ev);
        }
        tracing::info!("relay hub stopped");
    }

    fn handle(&self, ev: HubEvent) {
        let mut reg = write(&self.registry);
        let evicted = match ev {
            HubEvent::Register(peer) => reg.register(peer),
            HubEvent::Unregister(conn_id) => reg.unregister(conn_id),
            HubEvent::Relay { sender, envelope } => {
                let out = reg.relay(sender, &envelope);
                let mode = if out.directed { "directed" } else { "broadcast" };
                if out.delivered > 0 {
                    self.metrics.relayed.add(&[("mode", mode)], out.delivered as u64);
                } else {
                    self.metrics.relay_misses.inc(&[("mode", mode)]);
                    tracing::debug!(
                        room = %envelope.room_id,
                        msg_type = %envelope.msg_type,
                        mode,
                        "relay reached nobody"
                    );
                }
                out.evicted
            }
        };
        if evicted > 0 {
            self.metrics.evictions.add(&[], evicted as u64);
        }
    }
}

impl HubHandle {
    async fn submit(&self, ev: HubEvent) -> Result<()> {
        self.tx.send(ev).await.map_err(|_| SignalError::HubClosed)
    }

    pub async fn register(&self, peer: Peer) -> Result<()> {
        self.submit(HubEvent::Register(peer)).await
    }

    pub async fn unregister(&self, conn_id: ConnId) -> Result<()> {
        self.submit(HubEvent::Unregister(conn_id)).await
    }

    pub async fn relay(&self, sender: ConnId, envelope: Envelope) -> Result<()> {
        self.submit(HubEvent::Relay { sender, envelope }).await
    }

    pub fn stats(&self) -> HubStats {
        let reg = read(&self.registry);
        HubStats {
            rooms: reg.room_count(),
            members: reg.member_count(),
        }
    }

    pub fn members(&self, room_id: &str) -> Vec<MemberInfo> {
        read(&self.registry).members(room_id)
    }
}
