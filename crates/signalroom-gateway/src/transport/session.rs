//! Per-connection lifecycle: one reader, one writer.
//!
//! The reader turns frames into hub events; the writer drains the outbound
//! queue and sends liveness pings. Neither touches room state directly.
//!
//! Teardown paths all converge on the reader submitting `Unregister`:
//! - transport closed/errored or read deadline passed -> reader exits
//! - hub closed the queue (unregister/eviction) -> writer sends Close, exits
//! - transport write failed -> writer exits
//!
//! and the reader exits whenever the writer has.

use std::io::ErrorKind;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Duration, Instant, MissedTickBehavior};
use tracing::Instrument;

use signalroom_core::error::Result;
use signalroom_core::protocol::{kind, Envelope};

use crate::config::GatewaySection;
use crate::obs::GatewayMetrics;
use crate::relay::{ConnId, HubHandle, Peer, PeerIdentity, PreparedMsg};
use crate::transport::codec;

/// Connection timing and queue sizing.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ping_every: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
    pub outbound_queue: usize,
}

impl SessionSettings {
    pub fn from_config(gw: &GatewaySection) -> Self {
        Self {
            ping_every: Duration::from_millis(gw.ping_interval_ms),
            pong_wait: Duration::from_millis(gw.pong_wait_ms),
            write_wait: Duration::from_millis(gw.write_wait_ms),
            outbound_queue: gw.outbound_queue,
        }
    }
}

/// What the reader does with one decoded envelope.
#[derive(Debug)]
enum Admission {
    Register(Peer),
    Relay(Envelope),
    Drop(&'static str),
}

/// Reader-side state. Identity is set once by the first valid `join`.
struct SessionState {
    conn_id: ConnId,
    identity: Option<Arc<PeerIdentity>>,
    /// Held until join, then handed to the hub.
    out_tx: Option<mpsc::Sender<PreparedMsg>>,
}

impl SessionState {
    fn new(conn_id: ConnId, out_tx: mpsc::Sender<PreparedMsg>) -> Self {
        Self {
            conn_id,
            identity: None,
            out_tx: Some(out_tx),
        }
    }

    fn admit(&mut self, mut env: Envelope, now_ms: i64) -> Admission {
        if env.is_join() {
            if self.identity.is_some() {
                return Admission::Drop("rejoin");
            }
            let identity = match codec::join_identity(&env, now_ms) {
                Ok(id) => Arc::new(id),
                Err(e) => {
                    tracing::warn!(error = %e, "join rejected");
                    return Admission::Drop("bad_join");
                }
            };
            let Some(tx) = self.out_tx.take() else {
                return Admission::Drop("rejoin");
            };
            self.identity = Some(Arc::clone(&identity));
            return Admission::Register(Peer {
                conn_id: self.conn_id,
                identity,
                tx,
            });
        }

        let Some(identity) = &self.identity else {
            return Admission::Drop("unjoined");
        };
        if env.room_id != identity.room_id {
            return Admission::Drop("cross_room");
        }
        if kind::is_presence(&env.msg_type) {
            return Admission::Drop("reserved_type");
        }
        env.stamp_sender(&identity.device_id);
        Admission::Relay(env)
    }
}

/// Serve one upgraded connection until it closes.
pub async fn serve_connection(
    hub: HubHandle,
    socket: WebSocket,
    settings: SessionSettings,
    metrics: Arc<GatewayMetrics>,
) {
    let conn_id = ConnId::next();
    let span = tracing::info_span!("conn", conn = %conn_id);

    metrics.ws_active_sessions.inc(&[]);
    run_session(conn_id, hub, socket, settings, &metrics)
        .instrument(span)
        .await;
    metrics.ws_active_sessions.dec(&[]);
}

async fn run_session(
    conn_id: ConnId,
    hub: HubHandle,
    socket: WebSocket,
    settings: SessionSettings,
    metrics: &GatewayMetrics,
) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<PreparedMsg>(settings.outbound_queue.max(1));

    let mut writer = tokio::spawn(
        write_loop(ws_tx, out_rx, settings.ping_every, settings.write_wait).in_current_span(),
    );
    let mut sess = SessionState::new(conn_id, out_tx);

    loop {
        tokio::select! {
            _ = &mut writer => {
                tracing::debug!("writer finished");
                break;
            }

            read = timeout(settings.pong_wait, ws_rx.next()) => {
                let msg = match read {
                    Err(_) => {
                        tracing::debug!("read deadline exceeded");
                        break;
                    }
                    Ok(None) => {
                        tracing::debug!("transport closed");
                        break;
                    }
                    Ok(Some(Err(e))) => {
                        if is_routine_read_error(&e) {
                            tracing::debug!(error = %e, "transport reset");
                        } else {
                            tracing::warn!(error = %e, "transport read failed");
                        }
                        break;
                    }
                    Ok(Some(Ok(msg))) => msg,
                };

                match msg {
                    Message::Text(text) => {
                        if let Err(e) = handle_text(&hub, &mut sess, &text, metrics).await {
                            tracing::error!(error = %e, "relay hub unavailable");
                            break;
                        }
                    }
                    Message::Binary(_) => {
                        metrics.inbound_dropped.inc(&[("reason", "binary")]);
                        tracing::debug!("binary frame ignored");
                    }
                    // any inbound frame already refreshed the read deadline
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(frame) => {
                        log_close(frame.as_ref());
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = hub.unregister(conn_id).await {
        tracing::warn!(error = %e, "unregister not delivered");
    }
    // Unjoined connections still own their queue; dropping it stops the writer.
    drop(sess);
}

async fn handle_text(
    hub: &HubHandle,
    sess: &mut SessionState,
    text: &str,
    metrics: &GatewayMetrics,
) -> Result<()> {
    let env = match codec::decode(text) {
        Ok(env) => env,
        Err(e) => {
            metrics.inbound_dropped.inc(&[("reason", "malformed")]);
            tracing::warn!(error = %e, "malformed frame dropped");
            return Ok(());
        }
    };

    match sess.admit(env, chrono::Utc::now().timestamp_millis()) {
        Admission::Register(peer) => {
            tracing::info!(
                room = %peer.identity.room_id,
                device = %peer.identity.device_id,
                name = %peer.identity.display_name,
                "join request"
            );
            hub.register(peer).await
        }
        Admission::Relay(env) => hub.relay(sess.conn_id, env).await,
        Admission::Drop(reason) => {
            metrics.inbound_dropped.inc(&[("reason", reason)]);
            tracing::debug!(reason, "frame dropped");
            Ok(())
        }
    }
}

fn log_close(frame: Option<&CloseFrame<'static>>) {
    match frame {
        Some(f) if f.code != close_code::NORMAL && f.code != close_code::AWAY => {
            tracing::warn!(code = f.code, reason = %f.reason, "unexpected close");
        }
        _ => tracing::debug!("peer closed"),
    }
}

/// Peer vanished without a close frame: TCP reset, EOF or broken pipe.
/// Anything else (protocol violations, oversized frames) is unexpected.
fn is_routine_read_error(err: &axum::Error) -> bool {
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = cur {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            );
        }
        // tungstenite reports EOF without a close handshake as a protocol error
        if e.to_string().contains("without closing handshake") {
            return true;
        }
        cur = e.source();
    }
    false
}

/// Drain `rx` onto `sink`, pinging every `ping_every`.
///
/// Returns when the queue is closed (after sending a Close frame) or when a
/// write fails or exceeds `write_wait`.
pub(crate) async fn write_loop<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<PreparedMsg>,
    ping_every: Duration,
    write_wait: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut ping = interval_at(Instant::now() + ping_every, ping_every);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(msg) => {
                    if !write(&mut sink, msg.to_ws_message(), write_wait).await {
                        return;
                    }
                }
                None => {
                    let _ = write(&mut sink, Message::Close(None), write_wait).await;
                    return;
                }
            },

            _ = ping.tick() => {
                if !write(&mut sink, Message::Ping(Vec::new()), write_wait).await {
                    return;
                }
            }
        }
    }
}

async fn write<S>(sink: &mut S, msg: Message, wait: Duration) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    match timeout(wait, sink.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "transport write failed");
            false
        }
        Err(_) => {
            tracing::debug!("transport write timed out");
            false
        }
    }
}
