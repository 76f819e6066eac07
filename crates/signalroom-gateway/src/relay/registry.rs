//! Room membership map and routing.
//!
//! `Registry` is plain synchronous state. The hub owns the only writer; the
//! diagnostics path takes a read lock and copies what it needs.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use signalroom_core::protocol::{Envelope, MemberInfo, MemberStatus};

use super::presence;
use super::types::{ConnId, Peer, PeerIdentity, PreparedMsg};

struct Member {
    conn_id: ConnId,
    identity: Arc<PeerIdentity>,
    tx: mpsc::Sender<PreparedMsg>,
}

impl From<Peer> for Member {
    fn from(p: Peer) -> Self {
        Self {
            conn_id: p.conn_id,
            identity: p.identity,
            tx: p.tx,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepartureReason {
    /// Unregistered by its own connection.
    Left,
    /// Outbound queue was full.
    Evicted,
    /// Outbound queue already closed (writer gone).
    Gone,
}

impl DepartureReason {
    fn from_send_error<T>(e: &TrySendError<T>) -> Self {
        match e {
            TrySendError::Full(_) => DepartureReason::Evicted,
            TrySendError::Closed(_) => DepartureReason::Gone,
        }
    }
}

/// A member already removed from its room. Its sender has been dropped, so
/// the connection's outbound queue is closed.
struct Departure {
    conn_id: ConnId,
    identity: Arc<PeerIdentity>,
    reason: DepartureReason,
}

impl Departure {
    fn new(member: Member, reason: DepartureReason) -> Self {
        Self {
            conn_id: member.conn_id,
            identity: member.identity,
            reason,
        }
    }
}

#[derive(Default)]
struct Room {
    /// Join order.
    members: Vec<Member>,
}

impl Room {
    /// Try to enqueue `msg` for every member except `except`. Members whose
    /// queue rejects it are removed and returned.
    fn deliver_all(&mut self, msg: &PreparedMsg, except: Option<ConnId>) -> (usize, Vec<Departure>) {
        let mut delivered = 0;
        let mut departed = Vec::new();
        let mut i = 0;
        while i < self.members.len() {
            let m = &self.members[i];
            if Some(m.conn_id) == except {
                i += 1;
                continue;
            }
            match m.tx.try_send(msg.clone()) {
                Ok(()) => {
                    delivered += 1;
                    i += 1;
                }
                Err(e) => {
                    let reason = DepartureReason::from_send_error(&e);
                    departed.push(Departure::new(self.members.remove(i), reason));
                }
            }
        }
        (delivered, departed)
    }

    /// Enqueue `msg` for the member whose device id is `target`. When a
    /// device id is held by several connections, the latest join wins.
    fn deliver_to(
        &mut self,
        target: &str,
        msg: &PreparedMsg,
        except: ConnId,
    ) -> (usize, Vec<Departure>) {
        let Some(i) = self
            .members
            .iter()
            .rposition(|m| m.conn_id != except && m.identity.device_id == target)
        else {
            return (0, Vec::new());
        };
        match self.members[i].tx.try_send(msg.clone()) {
            Ok(()) => (1, Vec::new()),
            Err(e) => {
                let reason = DepartureReason::from_send_error(&e);
                (0, vec![Departure::new(self.members.remove(i), reason)])
            }
        }
    }

    fn position(&self, conn_id: ConnId) -> Option<usize> {
        self.members.iter().position(|m| m.conn_id == conn_id)
    }
}

/// Result of one relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    pub directed: bool,
    pub delivered: usize,
    pub evicted: usize,
}

/// Rooms and the connection -> room index.
#[derive(Default)]
pub struct Registry {
    rooms: HashMap<String, Room>,
    index: HashMap<ConnId, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn member_count(&self) -> usize {
        self.index.len()
    }

    #[cfg(test)]
    fn contains(&self, conn_id: ConnId) -> bool {
        self.index.contains_key(&conn_id)
    }

    /// Presence snapshot of one room, in join order.
    pub fn members(&self, room_id: &str) -> Vec<MemberInfo> {
        self.rooms
            .get(room_id)
            .map(|r| {
                r.members
                    .iter()
                    .map(|m| presence::member_info(&m.identity, MemberStatus::Online))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Add `peer` to its room, notify existing members, then send the fresh
    /// member list to everyone. Returns the number of evictions caused.
    pub fn register(&mut self, peer: Peer) -> usize {
        if self.index.contains_key(&peer.conn_id) {
            tracing::warn!(conn = %peer.conn_id, "connection already registered, ignoring join");
            return 0;
        }

        let conn_id = peer.conn_id;
        let identity = Arc::clone(&peer.identity);
        let room_id = identity.room_id.clone();

        self.index.insert(conn_id, room_id.clone());
        let room = self.rooms.entry(room_id.clone()).or_default();
        room.members.push(Member::from(peer));

        tracing::info!(
            room = %room_id,
            device = %identity.device_id,
            members = room.members.len(),
            "member joined"
        );

        let mut departed = VecDeque::new();

        if room.members.len() > 1 {
            match presence::member_joined(&identity) {
                Ok(msg) => departed.extend(room.deliver_all(&msg, Some(conn_id)).1),
                Err(e) => tracing::warn!(error = %e, "member-joined not sent"),
            }
        }

        match presence::member_list(&room_id, room.members.iter().map(|m| m.identity.as_ref())) {
            Ok(msg) => departed.extend(room.deliver_all(&msg, None).1),
            Err(e) => tracing::warn!(error = %e, "member-list not sent"),
        }

        for d in &departed {
            self.index.remove(&d.conn_id);
        }
        self.settle(departed)
    }

    /// Remove a connection. Idempotent: unknown connections are a no-op.
    /// Returns the number of evictions caused (not counting this one).
    pub fn unregister(&mut self, conn_id: ConnId) -> usize {
        let Some(room_id) = self.index.remove(&conn_id) else {
            return 0;
        };
        let Some(member) = self
            .rooms
            .get_mut(&room_id)
            .and_then(|room| room.position(conn_id).map(|i| room.members.remove(i)))
        else {
            return 0;
        };

        let mut departed = VecDeque::new();
        departed.push_back(Departure::new(member, DepartureReason::Left));
        self.settle(departed)
    }

    /// Route `env` from `sender`: to the single member named by `targetId`,
    /// or to every other member of the room. Unknown rooms, unknown targets
    /// and senders that are not members of `env.room_id` are silent no-ops.
    pub fn relay(&mut self, sender: ConnId, env: &Envelope) -> RelayOutcome {
        let directed = env.target().is_some();
        let miss = RelayOutcome {
            directed,
            ..RelayOutcome::default()
        };

        if self.index.get(&sender) != Some(&env.room_id) {
            return miss;
        }
        let Some(room) = self.rooms.get_mut(&env.room_id) else {
            return miss;
        };

        let msg = match PreparedMsg::from_envelope(env) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "relay encode failed");
                return miss;
            }
        };

        let (delivered, departed) = match env.target() {
            Some(target) => room.deliver_to(target, &msg, sender),
            None => room.deliver_all(&msg, Some(sender)),
        };

        for d in &departed {
            self.index.remove(&d.conn_id);
        }
        let evicted = self.settle(departed.into());

        RelayOutcome {
            directed,
            delivered,
            evicted,
        }
    }

    /// Announce departures to the remaining members until nothing else
    /// departs, deleting rooms that end up empty. Returns evictions seen.
    fn settle(&mut self, mut queue: VecDeque<Departure>) -> usize {
        let mut evicted = 0;

        while let Some(d) = queue.pop_front() {
            let room_id = &d.identity.room_id;
            match d.reason {
                DepartureReason::Left => {
                    tracing::info!(room = %room_id, device = %d.identity.device_id, "member left")
                }
                DepartureReason::Evicted => {
                    evicted += 1;
                    tracing::warn!(
                        room = %room_id,
                        device = %d.identity.device_id,
                        conn = %d.conn_id,
                        "outbound queue full, member evicted"
                    );
                }
                DepartureReason::Gone => {
                    tracing::debug!(room = %room_id, device = %d.identity.device_id, "outbound queue closed")
                }
            }

            let Some(room) = self.rooms.get_mut(room_id) else {
                continue;
            };

            if !room.members.is_empty() {
                match presence::member_left(&d.identity) {
                    Ok(msg) => {
                        let (_, more) = room.deliver_all(&msg, None);
                        for m in more {
                            self.index.remove(&m.conn_id);
                            queue.push_back(m);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "member-left not sent"),
                }
            }

            if room.members.is_empty() {
                self.rooms.remove(room_id);
                tracing::debug!(room = %room_id, "room closed");
            }
        }

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn peer(room: &str, device: &str, cap: usize) -> (Peer, mpsc::Receiver<PreparedMsg>) {
        let (tx, rx) = mpsc::channel(cap);
        let p = Peer {
            conn_id: ConnId::next(),
            identity: Arc::new(PeerIdentity {
                room_id: room.into(),
                device_id: device.into(),
                display_name: device.to_lowercase(),
                joined_at: 1_700_000_000_000,
            }),
            tx,
        };
        (p, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<PreparedMsg>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(serde_json::from_str(m.as_str()).unwrap());
        }
        out
    }

    fn types(msgs: &[Value]) -> Vec<&str> {
        msgs.iter().map(|m| m["type"].as_str().unwrap()).collect()
    }

    fn env(json: &str) -> Envelope {
        Envelope::from_json(json).unwrap()
    }

    #[test]
    fn first_join_gets_member_list_only() {
        let mut reg = Registry::new();
        let (x, mut x_rx) = peer("abc", "X", 8);
        reg.register(x);

        let got = drain(&mut x_rx);
        assert_eq!(types(&got), ["member-list"]);
        assert_eq!(got[0]["payload"].as_array().unwrap().len(), 1);
        assert_eq!(reg.room_count(), 1);
    }

    #[test]
    fn join_notifies_each_existing_member_once() {
        let mut reg = Registry::new();
        let (a, mut a_rx) = peer("abc", "A", 8);
        let (b, mut b_rx) = peer("abc", "B", 8);
        let (c, mut c_rx) = peer("abc", "C", 8);
        reg.register(a);
        reg.register(b);
        drain(&mut a_rx);
        drain(&mut b_rx);

        reg.register(c);

        for rx in [&mut a_rx, &mut b_rx] {
            let got = drain(rx);
            assert_eq!(types(&got), ["member-joined", "member-list"]);
            assert_eq!(got[0]["deviceId"], "C");
            assert_eq!(got[0]["payload"]["status"], "online");
        }
        let got = drain(&mut c_rx);
        assert_eq!(types(&got), ["member-list"]);
        let ids: Vec<&str> = got[0]["payload"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["deviceId"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["A", "B", "C"]);
    }

    #[test]
    fn broadcast_skips_sender_and_other_rooms() {
        let mut reg = Registry::new();
        let (x, mut x_rx) = peer("abc", "X", 8);
        let (y, mut y_rx) = peer("abc", "Y", 8);
        let (z, mut z_rx) = peer("other", "Z", 8);
        let x_id = x.conn_id;
        reg.register(x);
        reg.register(y);
        reg.register(z);
        drain(&mut x_rx);
        drain(&mut y_rx);
        drain(&mut z_rx);

        let out = reg.relay(x_id, &env(r#"{"type":"file-meta","roomId":"abc","deviceId":"X","payload":{"n":1}}"#));
        assert_eq!(out, RelayOutcome { directed: false, delivered: 1, evicted: 0 });

        assert!(drain(&mut x_rx).is_empty());
        assert!(drain(&mut z_rx).is_empty());
        let got = drain(&mut y_rx);
        assert_eq!(types(&got), ["file-meta"]);
        assert_eq!(got[0]["payload"]["n"], 1);
    }

    #[test]
    fn directed_reaches_only_target() {
        let mut reg = Registry::new();
        let (x, mut x_rx) = peer("abc", "X", 8);
        let (y, mut y_rx) = peer("abc", "Y", 8);
        let (w, mut w_rx) = peer("abc", "W", 8);
        let x_id = x.conn_id;
        reg.register(x);
        reg.register(y);
        reg.register(w);
        drain(&mut x_rx);
        drain(&mut y_rx);
        drain(&mut w_rx);

        let out = reg.relay(x_id, &env(r#"{"type":"offer","roomId":"abc","deviceId":"X","targetId":"Y"}"#));
        assert_eq!(out.delivered, 1);
        assert!(out.directed);
        assert_eq!(types(&drain(&mut y_rx)), ["offer"]);
        assert!(drain(&mut w_rx).is_empty());
        assert!(drain(&mut x_rx).is_empty());
    }

    #[test]
    fn unknown_target_room_or_sender_is_silent() {
        let mut reg = Registry::new();
        let (x, mut x_rx) = peer("abc", "X", 8);
        let (y, mut y_rx) = peer("abc", "Y", 8);
        let x_id = x.conn_id;
        reg.register(x);
        reg.register(y);
        drain(&mut x_rx);
        drain(&mut y_rx);

        let out = reg.relay(x_id, &env(r#"{"type":"offer","roomId":"abc","targetId":"nobody"}"#));
        assert_eq!(out.delivered, 0);
        let out = reg.relay(x_id, &env(r#"{"type":"offer","roomId":"zzz"}"#));
        assert_eq!(out.delivered, 0);
        let out = reg.relay(ConnId::next(), &env(r#"{"type":"offer","roomId":"abc"}"#));
        assert_eq!(out.delivered, 0);
        assert!(drain(&mut y_rx).is_empty());
        assert!(drain(&mut x_rx).is_empty());
    }

    #[test]
    fn leave_notifies_remaining_and_last_leave_deletes_room() {
        let mut reg = Registry::new();
        let (a, mut a_rx) = peer("abc", "A", 8);
        let (b, mut b_rx) = peer("abc", "B", 8);
        let (c, mut c_rx) = peer("abc", "C", 8);
        let (a_id, b_id, c_id) = (a.conn_id, b.conn_id, c.conn_id);
        reg.register(a);
        reg.register(b);
        reg.register(c);
        drain(&mut a_rx);
        drain(&mut b_rx);
        drain(&mut c_rx);

        reg.unregister(c_id);
        for rx in [&mut a_rx, &mut b_rx] {
            let got = drain(rx);
            assert_eq!(types(&got), ["member-left"]);
            assert_eq!(got[0]["deviceId"], "C");
            assert_eq!(got[0]["payload"]["status"], "offline");
        }
        // queue closed once the hub drops its sender
        assert!(matches!(
            c_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        // double unregister is a no-op
        assert_eq!(reg.unregister(c_id), 0);
        assert!(drain(&mut a_rx).is_empty());

        reg.unregister(a_id);
        reg.unregister(b_id);
        assert_eq!(reg.room_count(), 0);
        assert_eq!(reg.member_count(), 0);
        assert!(reg.members("abc").is_empty());

        // rejoining creates a fresh room
        let (d, mut d_rx) = peer("abc", "D", 8);
        reg.register(d);
        let got = drain(&mut d_rx);
        assert_eq!(got[0]["payload"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn full_queue_evicts_and_announces_left() {
        let mut reg = Registry::new();
        let (x, mut x_rx) = peer("abc", "X", 8);
        // capacity 2: its own member-list on join plus Y's member-joined fill it
        let (slow, _slow_rx) = peer("abc", "SLOW", 2);
        let (y, mut y_rx) = peer("abc", "Y", 8);
        let x_id = x.conn_id;
        let slow_id = slow.conn_id;
        reg.register(x);
        reg.register(slow);
        drain(&mut x_rx);

        // Y joining overflows SLOW: member-joined fits, member-list does not
        reg.register(y);
        assert!(!reg.contains(slow_id));
        let got = drain(&mut x_rx);
        assert_eq!(types(&got), ["member-joined", "member-list", "member-left"]);
        assert_eq!(got[2]["deviceId"], "SLOW");
        let got = drain(&mut y_rx);
        assert_eq!(types(&got), ["member-list", "member-left"]);
        // snapshot was built before SLOW failed to take it
        assert_eq!(got[0]["payload"].as_array().unwrap().len(), 3);

        let out = reg.relay(x_id, &env(r#"{"type":"chat","roomId":"abc"}"#));
        assert_eq!(out.delivered, 1);
        assert_eq!(reg.member_count(), 2);
    }

    #[test]
    fn relay_eviction_is_counted() {
        let mut reg = Registry::new();
        let (x, mut x_rx) = peer("abc", "X", 8);
        let (y, y_rx) = peer("abc", "Y", 1);
        let x_id = x.conn_id;
        reg.register(x);
        reg.register(y);
        drain(&mut x_rx);
        // Y's single slot already holds its member-list
        let out = reg.relay(x_id, &env(r#"{"type":"offer","roomId":"abc","targetId":"Y"}"#));
        assert_eq!(out, RelayOutcome { directed: true, delivered: 0, evicted: 1 });
        assert_eq!(types(&drain(&mut x_rx)), ["member-left"]);
        drop(y_rx);
    }

    #[test]
    fn closed_queue_is_removed() {
        let mut reg = Registry::new();
        let (x, mut x_rx) = peer("abc", "X", 8);
        let (y, y_rx) = peer("abc", "Y", 8);
        let x_id = x.conn_id;
        reg.register(x);
        reg.register(y);
        drain(&mut x_rx);
        drop(y_rx);

        let out = reg.relay(x_id, &env(r#"{"type":"chat","roomId":"abc"}"#));
        assert_eq!(out.delivered, 0);
        assert_eq!(out.evicted, 0);
        assert_eq!(reg.member_count(), 1);
        assert_eq!(types(&drain(&mut x_rx)), ["member-left"]);
    }

    #[test]
    fn duplicate_device_latest_join_receives_directed() {
        let mut reg = Registry::new();
        let (x, mut x_rx) = peer("abc", "X", 8);
        let (old, mut old_rx) = peer("abc", "Y", 8);
        let (new, mut new_rx) = peer("abc", "Y", 8);
        let x_id = x.conn_id;
        reg.register(x);
        reg.register(old);
        reg.register(new);
        drain(&mut x_rx);
        drain(&mut old_rx);
        drain(&mut new_rx);

        reg.relay(x_id, &env(r#"{"type":"answer","roomId":"abc","targetId":"Y"}"#));
        assert!(drain(&mut old_rx).is_empty());
        assert_eq!(types(&drain(&mut new_rx)), ["answer"]);
    }
}
