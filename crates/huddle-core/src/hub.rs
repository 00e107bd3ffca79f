//! The presence and room-broadcast hub.
//!
//! The hub is the single source of truth for who is connected and which
//! connections are in which room. All state sits behind one read/write lock:
//! registration, unregistration and room joins take the write lock, while
//! lookups, snapshots and broadcasts take the read lock. A connection is
//! added to or removed from every index inside one critical section.
//!
//! Broadcasting never touches a transport. Frames are pushed into each
//! connection's bounded outbound queue with `try_send`, so holding the read
//! lock during a broadcast is bounded by the number of recipients.

use crate::outbound::{self, Delivery, OutboundHandle, OutboundQueue};
use crate::presence::{PresencePolicy, UserEntry};
use crate::room::RoomId;
use bytes::Bytes;
use huddle_protocol::{Outbound, PresenceSnapshot, UserPresence};
use huddle_transport::ConnectionId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// A stable user identifier issued by the identity provider.
pub type UserId = String;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each connection's outbound queue.
    pub outbound_queue_capacity: usize,
    /// When to announce users as online.
    pub presence_policy: PresencePolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: outbound::DEFAULT_QUEUE_CAPACITY,
            presence_policy: PresencePolicy::default(),
        }
    }
}

/// Result of [`Hub::unregister`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unregistered {
    /// Owner of the connection, `None` if it was never registered.
    pub user_id: Option<UserId>,
    /// Whether this removal took the user's connection count to zero.
    pub last_connection: bool,
    /// Frames dropped for this connection because its queue was full.
    pub dropped_frames: u64,
}

struct ConnectionEntry {
    user_id: UserId,
    outbound: OutboundHandle,
    rooms: HashSet<RoomId>,
}

#[derive(Default)]
struct HubState {
    /// Online users and the connections backing them.
    users: HashMap<UserId, UserEntry>,
    /// Live room membership.
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    /// Registered connections (connection -> owner, queue, rooms).
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl HubState {
    /// Detach a connection from its user; returns `true` if the user went offline.
    fn detach_from_user(&mut self, user_id: &str, connection_id: &ConnectionId) -> bool {
        let now_empty = self
            .users
            .get_mut(user_id)
            .map(|user| user.detach(connection_id))
            .unwrap_or(false);

        if now_empty {
            self.users.remove(user_id);
            debug!(user = %user_id, "User has no more connections");
        }
        now_empty
    }

    /// Remove a connection from one room, dropping the room if it empties.
    fn detach_from_room(&mut self, room_id: &str, connection_id: &ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let removed = members.remove(connection_id);

        if members.is_empty() {
            self.rooms.remove(room_id);
            debug!(room = %room_id, "Room is now empty");
        }
        removed
    }

    fn register(&mut self, presence: UserPresence, outbound: OutboundHandle) -> bool {
        let connection_id = outbound.id().clone();
        let user_id = presence.user_id.clone();

        // A connection belongs to exactly one user
        let previous_owner = self
            .connections
            .get(&connection_id)
            .map(|c| c.user_id.clone())
            .filter(|owner| *owner != user_id);
        if let Some(owner) = previous_owner {
            warn!(connection = %connection_id, from = %owner, to = %user_id, "Connection re-registered for another user");
            self.detach_from_user(&owner, &connection_id);
        }

        let first_connection = !self.users.contains_key(&user_id);
        let user = self
            .users
            .entry(user_id.clone())
            .or_insert_with(|| UserEntry::new(presence.clone()));
        user.presence = presence;
        user.connections.insert(connection_id.clone());
        let connection_count = user.connections.len();

        match self.connections.get_mut(&connection_id) {
            Some(entry) => {
                entry.user_id = user_id.clone();
                entry.outbound = outbound;
            }
            None => {
                self.connections.insert(
                    connection_id.clone(),
                    ConnectionEntry {
                        user_id: user_id.clone(),
                        outbound,
                        rooms: HashSet::new(),
                    },
                );
            }
        }

        info!(
            user = %user_id,
            connection = %connection_id,
            connections = connection_count,
            "User connected"
        );
        first_connection
    }

    /// Online users other than `excluded`, ordered by user id.
    fn snapshot_excluding(&self, excluded: Option<&str>) -> Vec<UserPresence> {
        let mut users: Vec<UserPresence> = self
            .users
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != excluded)
            .map(|(_, u)| u.presence.clone())
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }
}

/// The central presence and room registry.
pub struct Hub {
    state: RwLock<HubState>,
    config: HubConfig,
    shutdown: watch::Sender<bool>,
}

impl Hub {
    /// Create a new hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!("Creating hub with config: {:?}", config);
        let (shutdown, _) = watch::channel(false);
        Self {
            state: RwLock::new(HubState::default()),
            config,
            shutdown,
        }
    }

    /// Get the hub configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Create an outbound queue sized by this hub's configuration.
    #[must_use]
    pub fn outbound_channel(&self, id: ConnectionId) -> (OutboundHandle, OutboundQueue) {
        outbound::channel(id, self.config.outbound_queue_capacity)
    }

    /// Register a connection for a user.
    ///
    /// Creates the user's presence entry on their first connection and always
    /// refreshes the stored metadata. Returns `true` if this call brought the
    /// user online.
    pub fn register_user(&self, presence: UserPresence, outbound: OutboundHandle) -> bool {
        self.state.write().register(presence, outbound)
    }

    /// Register a connection and queue the presence snapshot as its first frame.
    ///
    /// The snapshot lists every other online user and is built in the same
    /// critical section as the registration, so no broadcast can reach the
    /// connection ahead of it. Returns `true` if this call brought the user
    /// online.
    pub fn register_with_snapshot(&self, presence: UserPresence, outbound: OutboundHandle) -> bool {
        let mut state = self.state.write();

        let users = state.snapshot_excluding(Some(presence.user_id.as_str()));
        match Outbound::PresenceSnapshot(PresenceSnapshot { users }).encode() {
            Ok(frame) => {
                outbound.deliver(frame);
            }
            Err(e) => warn!(connection = %outbound.id(), error = %e, "Failed to encode snapshot"),
        }

        state.register(presence, outbound)
    }

    /// Unregister a connection from every index.
    ///
    /// Drops the connection's outbound handle, which lets its writer finish.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Unregistered {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let Some(entry) = state.connections.remove(connection_id) else {
            return Unregistered {
                user_id: None,
                last_connection: false,
                dropped_frames: 0,
            };
        };

        for room_id in &entry.rooms {
            state.detach_from_room(room_id, connection_id);
        }

        let last_connection = state.detach_from_user(&entry.user_id, connection_id);
        let remaining = state
            .users
            .get(&entry.user_id)
            .map(|u| u.connections.len())
            .unwrap_or(0);

        let dropped_frames = entry.outbound.dropped_count();

        info!(
            user = %entry.user_id,
            connection = %connection_id,
            remaining,
            dropped_frames,
            "Connection unregistered"
        );

        Unregistered {
            user_id: Some(entry.user_id),
            last_connection,
            dropped_frames,
        }
    }

    /// Add a registered connection to a room, creating the room if needed.
    ///
    /// Idempotent. Returns `false` if the connection is not registered.
    pub fn join_room(&self, room_id: &str, connection_id: &ConnectionId) -> bool {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let Some(entry) = state.connections.get_mut(connection_id) else {
            warn!(room = %room_id, connection = %connection_id, "Join from unregistered connection");
            return false;
        };
        entry.rooms.insert(room_id.to_string());

        let members = state.rooms.entry(room_id.to_string()).or_default();
        members.insert(connection_id.clone());

        debug!(
            room = %room_id,
            connection = %connection_id,
            members = members.len(),
            "Joined room"
        );
        true
    }

    /// Remove a connection from a room.
    ///
    /// Returns `true` if the connection was a member.
    pub fn leave_room(&self, room_id: &str, connection_id: &ConnectionId) -> bool {
        let mut guard = self.state.write();
        let state = &mut *guard;

        if let Some(entry) = state.connections.get_mut(connection_id) {
            entry.rooms.remove(room_id);
        }
        let removed = state.detach_from_room(room_id, connection_id);
        if removed {
            debug!(room = %room_id, connection = %connection_id, "Left room");
        }
        removed
    }

    /// Send a frame to every connection in a room.
    ///
    /// Returns the number of connections the frame was queued for.
    pub fn broadcast_to_room(&self, room_id: &str, frame: Bytes) -> usize {
        let state = self.state.read();

        let Some(members) = state.rooms.get(room_id) else {
            debug!(room = %room_id, "No active connections in room");
            return 0;
        };

        let targets = members
            .iter()
            .filter_map(|id| state.connections.get(id))
            .map(|c| &c.outbound);
        let count = deliver_all(targets, &frame);
        trace!(room = %room_id, recipients = count, "Broadcast to room");
        count
    }

    /// Send a frame to every registered connection.
    pub fn broadcast_to_all(&self, frame: Bytes) -> usize {
        self.broadcast_filtered(None, frame)
    }

    /// Send a frame to every registered connection except one.
    pub fn broadcast_to_all_except(&self, excluded: &ConnectionId, frame: Bytes) -> usize {
        self.broadcast_filtered(Some(excluded), frame)
    }

    fn broadcast_filtered(&self, excluded: Option<&ConnectionId>, frame: Bytes) -> usize {
        let state = self.state.read();

        let targets = state
            .connections
            .iter()
            .filter(|(id, _)| Some(*id) != excluded)
            .map(|(_, c)| &c.outbound);
        let count = deliver_all(targets, &frame);
        trace!(recipients = count, "Broadcast to all");
        count
    }

    /// Send a frame to a single registered connection.
    pub fn send_to(&self, connection_id: &ConnectionId, frame: Bytes) -> bool {
        let state = self.state.read();
        state
            .connections
            .get(connection_id)
            .map(|c| c.outbound.deliver(frame) == Delivery::Queued)
            .unwrap_or(false)
    }

    /// Distinct online users, ordered by user id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UserPresence> {
        self.state.read().snapshot_excluding(None)
    }

    /// The user that owns a connection.
    #[must_use]
    pub fn user_id_for(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.state
            .read()
            .connections
            .get(connection_id)
            .map(|c| c.user_id.clone())
    }

    /// Presence metadata of an online user.
    #[must_use]
    pub fn presence(&self, user_id: &str) -> Option<UserPresence> {
        self.state
            .read()
            .users
            .get(user_id)
            .map(|u| u.presence.clone())
    }

    /// Presence of the user owning a connection, in one lookup.
    #[must_use]
    pub fn presence_for(&self, connection_id: &ConnectionId) -> Option<UserPresence> {
        let state = self.state.read();
        let user_id = &state.connections.get(connection_id)?.user_id;
        state.users.get(user_id).map(|u| u.presence.clone())
    }

    /// Whether a connection is registered.
    #[must_use]
    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.state.read().connections.contains_key(connection_id)
    }

    /// Number of live connections for a user.
    #[must_use]
    pub fn connection_count(&self, user_id: &str) -> usize {
        self.state
            .read()
            .users
            .get(user_id)
            .map(|u| u.connections.len())
            .unwrap_or(0)
    }

    /// Connections currently in a room.
    #[must_use]
    pub fn room_members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.state
            .read()
            .rooms
            .get(room_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms a connection has joined.
    #[must_use]
    pub fn connection_rooms(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        self.state
            .read()
            .connections
            .get(connection_id)
            .map(|c| c.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let state = self.state.read();
        HubStats {
            user_count: state.users.len(),
            connection_count: state.connections.len(),
            room_count: state.rooms.len(),
            total_memberships: state.rooms.values().map(HashSet::len).sum(),
        }
    }

    /// Subscribe to the shutdown signal.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Whether [`Hub::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Drop every connection and signal all sessions to stop.
    ///
    /// Outbound handles are released, so each writer flushes what is already
    /// queued and closes its transport. Returns the number of connections
    /// that were registered.
    pub fn shutdown(&self) -> usize {
        let closed = {
            let mut state = self.state.write();
            let closed = state.connections.len();
            *state = HubState::default();
            closed
        };
        self.shutdown.send_replace(true);
        info!(connections = closed, "Hub shut down");
        closed
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver_all<'a>(targets: impl Iterator<Item = &'a OutboundHandle>, frame: &Bytes) -> usize {
    targets
        .filter(|handle| handle.deliver(frame.clone()) == Delivery::Queued)
        .count()
}

/// Hub statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    /// Number of online users.
    pub user_count: usize,
    /// Number of registered connections.
    pub connection_count: usize,
    /// Number of rooms with at least one live member.
    pub room_count: usize,
    /// Total number of live room memberships.
    pub total_memberships: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(hub: &Hub, conn: &str, user: &str) -> OutboundQueue {
        let (handle, queue) = hub.outbound_channel(conn.into());
        hub.register_user(UserPresence::new(user, user.to_uppercase(), None), handle);
        queue
    }

    fn drain(queue: &mut OutboundQueue) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = queue.try_next() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_snapshot_has_one_entry_per_user() {
        let hub = Hub::new();
        let _q1 = connect(&hub, "c1", "u1");
        let _q2 = connect(&hub, "c2", "u1");
        let _q3 = connect(&hub, "c3", "u1");

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].user_id, "u1");
        assert_eq!(hub.connection_count("u1"), 3);

        hub.unregister(&"c1".into());
        hub.unregister(&"c2".into());
        assert_eq!(hub.snapshot().len(), 1);

        hub.unregister(&"c3".into());
        assert!(hub.snapshot().is_empty());
    }

    #[test]
    fn test_last_connection_detection() {
        let hub = Hub::new();
        assert!({
            let (handle, _q) = hub.outbound_channel("c1".into());
            hub.register_user(UserPresence::new("u1", "A", None), handle)
        });
        let (handle, _q2) = hub.outbound_channel("c2".into());
        assert!(!hub.register_user(UserPresence::new("u1", "A", None), handle));

        let first = hub.unregister(&"c1".into());
        assert_eq!(first.user_id.as_deref(), Some("u1"));
        assert!(!first.last_connection);

        let second = hub.unregister(&"c2".into());
        assert_eq!(second.user_id.as_deref(), Some("u1"));
        assert!(second.last_connection);
    }

    #[test]
    fn test_unregister_unknown_connection() {
        let hub = Hub::new();
        let result = hub.unregister(&"nope".into());
        assert_eq!(
            result,
            Unregistered {
                user_id: None,
                last_connection: false,
                dropped_frames: 0,
            }
        );
    }

    #[test]
    fn test_register_refreshes_presence() {
        let hub = Hub::new();
        let _q1 = connect(&hub, "c1", "u1");

        let (handle, _q2) = hub.outbound_channel("c2".into());
        hub.register_user(
            UserPresence::new("u1", "Renamed", Some(huddle_protocol::ProfileTag::Profile2)),
            handle,
        );

        let presence = hub.presence("u1").unwrap();
        assert_eq!(presence.name, "Renamed");
        assert_eq!(presence.profile, Some(huddle_protocol::ProfileTag::Profile2));
        assert_eq!(hub.presence_for(&"c1".into()).unwrap().name, "Renamed");
    }

    #[test]
    fn test_reregistering_same_connection_is_idempotent() {
        let hub = Hub::new();
        let (handle, _q) = hub.outbound_channel("c1".into());
        hub.register_user(UserPresence::new("u1", "A", None), handle.clone());
        hub.register_user(UserPresence::new("u1", "A", None), handle);

        assert_eq!(hub.connection_count("u1"), 1);
        assert_eq!(hub.stats().connection_count, 1);
        assert!(hub.unregister(&"c1".into()).last_connection);
    }

    #[test]
    fn test_room_isolation() {
        let hub = Hub::new();
        let mut qa = connect(&hub, "a", "u1");
        let mut qb = connect(&hub, "b", "u2");
        let mut qc = connect(&hub, "c", "u3");

        assert!(hub.join_room("room-a", &"a".into()));
        assert!(hub.join_room("room-b", &"b".into()));

        let count = hub.broadcast_to_room("room-a", Bytes::from_static(b"hello"));
        assert_eq!(count, 1);

        assert_eq!(drain(&mut qa), vec![Bytes::from_static(b"hello")]);
        assert!(drain(&mut qb).is_empty());
        assert!(drain(&mut qc).is_empty());
    }

    #[test]
    fn test_join_room_is_idempotent() {
        let hub = Hub::new();
        let mut q = connect(&hub, "a", "u1");

        hub.join_room("r1", &"a".into());
        hub.join_room("r1", &"a".into());
        assert_eq!(hub.room_members("r1").len(), 1);

        assert_eq!(hub.broadcast_to_room("r1", Bytes::from_static(b"x")), 1);
        assert_eq!(drain(&mut q).len(), 1);
    }

    #[test]
    fn test_join_requires_registration() {
        let hub = Hub::new();
        assert!(!hub.join_room("r1", &"ghost".into()));
        assert_eq!(hub.stats().room_count, 0);
    }

    #[test]
    fn test_broadcast_to_unknown_room() {
        let hub = Hub::new();
        let _q = connect(&hub, "a", "u1");
        assert_eq!(hub.broadcast_to_room("missing", Bytes::from_static(b"x")), 0);
    }

    #[test]
    fn test_broadcast_except_skips_only_excluded() {
        let hub = Hub::new();
        let mut qa = connect(&hub, "a", "u1");
        let mut qb = connect(&hub, "b", "u2");
        let mut qc = connect(&hub, "c", "u2");

        let count = hub.broadcast_to_all_except(&"a".into(), Bytes::from_static(b"hi"));
        assert_eq!(count, 2);
        assert!(drain(&mut qa).is_empty());
        assert_eq!(drain(&mut qb).len(), 1);
        assert_eq!(drain(&mut qc).len(), 1);

        assert_eq!(hub.broadcast_to_all(Bytes::from_static(b"all")), 3);
        assert_eq!(drain(&mut qa).len(), 1);
    }

    #[test]
    fn test_unregister_removes_from_every_room() {
        let hub = Hub::new();
        let _qa = connect(&hub, "a", "u1");
        let _qb = connect(&hub, "b", "u2");

        hub.join_room("r1", &"a".into());
        hub.join_room("r2", &"a".into());
        hub.join_room("r2", &"b".into());
        assert_eq!(hub.connection_rooms(&"a".into()).len(), 2);

        hub.unregister(&"a".into());

        let stats = hub.stats();
        assert_eq!(stats.room_count, 1);
        assert_eq!(stats.total_memberships, 1);
        assert_eq!(hub.room_members("r2"), vec![ConnectionId::from("b")]);
        assert!(!hub.is_registered(&"a".into()));
        assert_eq!(hub.user_id_for(&"a".into()), None);
    }

    #[test]
    fn test_leave_room() {
        let hub = Hub::new();
        let _q = connect(&hub, "a", "u1");

        hub.join_room("r1", &"a".into());
        assert!(hub.leave_room("r1", &"a".into()));
        assert!(!hub.leave_room("r1", &"a".into()));
        assert_eq!(hub.stats().room_count, 0);
        assert!(hub.connection_rooms(&"a".into()).is_empty());
    }

    #[test]
    fn test_slow_peer_does_not_block_broadcast() {
        let hub = Hub::with_config(HubConfig {
            outbound_queue_capacity: 1,
            ..HubConfig::default()
        });
        let _slow = connect(&hub, "slow", "u1");
        let mut fast = connect(&hub, "fast", "u2");

        assert_eq!(hub.broadcast_to_all(Bytes::from_static(b"1")), 2);
        assert_eq!(drain(&mut fast).len(), 1);

        // The slow queue is full; the frame is dropped for it only
        assert_eq!(hub.broadcast_to_all(Bytes::from_static(b"2")), 1);
        assert_eq!(drain(&mut fast).len(), 1);
        assert!(hub.is_registered(&"slow".into()));
    }

    #[test]
    fn test_unregister_reports_dropped_frames() {
        let hub = Hub::with_config(HubConfig {
            outbound_queue_capacity: 1,
            ..HubConfig::default()
        });
        let _slow = connect(&hub, "slow", "u1");

        hub.broadcast_to_all(Bytes::from_static(b"1"));
        hub.broadcast_to_all(Bytes::from_static(b"2"));
        hub.broadcast_to_all(Bytes::from_static(b"3"));

        let result = hub.unregister(&"slow".into());
        assert_eq!(result.dropped_frames, 2);
        assert!(result.last_connection);
    }

    #[test]
    fn test_broadcast_skips_closed_queue() {
        let hub = Hub::new();
        let gone = connect(&hub, "gone", "u1");
        let mut live = connect(&hub, "live", "u2");
        drop(gone);

        assert_eq!(hub.broadcast_to_all(Bytes::from_static(b"x")), 1);
        assert_eq!(drain(&mut live).len(), 1);
        assert!(!hub.send_to(&"gone".into(), Bytes::from_static(b"x")));
        assert!(hub.is_registered(&"gone".into()));
    }

    #[test]
    fn test_register_with_snapshot_queues_snapshot_first() {
        let hub = Hub::new();
        let _q2 = connect(&hub, "c2", "u2");
        let _q1 = connect(&hub, "c1-phone", "u1");

        let (handle, mut queue) = hub.outbound_channel("c1".into());
        assert!(!hub.register_with_snapshot(UserPresence::new("u1", "U1", None), handle));
        hub.broadcast_to_all(Bytes::from_static(b"after"));

        let frames = drain(&mut queue);
        assert_eq!(frames.len(), 2);

        let envelope = huddle_protocol::decode(&frames[0]).unwrap();
        assert_eq!(envelope.kind, "presence_snapshot");
        let snapshot: PresenceSnapshot = huddle_protocol::codec::decode_payload(envelope).unwrap();
        let ids: Vec<_> = snapshot.users.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u2"]);
        assert_eq!(frames[1], Bytes::from_static(b"after"));
    }

    #[test]
    fn test_register_with_snapshot_when_alone() {
        let hub = Hub::new();
        let (handle, mut queue) = hub.outbound_channel("c1".into());
        assert!(hub.register_with_snapshot(UserPresence::new("u1", "U1", None), handle));

        let frames = drain(&mut queue);
        assert_eq!(frames.len(), 1);
        let envelope = huddle_protocol::decode(&frames[0]).unwrap();
        let snapshot: PresenceSnapshot = huddle_protocol::codec::decode_payload(envelope).unwrap();
        assert!(snapshot.users.is_empty());
        assert_eq!(hub.snapshot().len(), 1);
    }

    #[test]
    fn test_send_to() {
        let hub = Hub::new();
        let mut q = connect(&hub, "a", "u1");

        assert!(hub.send_to(&"a".into(), Bytes::from_static(b"direct")));
        assert!(!hub.send_to(&"b".into(), Bytes::from_static(b"direct")));
        assert_eq!(drain(&mut q).len(), 1);
    }

    #[test]
    fn test_connection_moves_between_users() {
        let hub = Hub::new();
        let (handle, _q) = hub.outbound_channel("c1".into());
        hub.register_user(UserPresence::new("u1", "A", None), handle.clone());
        hub.register_user(UserPresence::new("u2", "B", None), handle);

        assert_eq!(hub.user_id_for(&"c1".into()).as_deref(), Some("u2"));
        assert!(hub.presence("u1").is_none());
        assert_eq!(hub.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_releases_queues() {
        let hub = Hub::new();
        let mut q = connect(&hub, "a", "u1");
        let mut signal = hub.shutdown_signal();

        assert_eq!(hub.shutdown(), 1);
        assert!(hub.is_shut_down());
        assert!(q.next().await.is_none());
        assert!(signal.wait_for(|stopped| *stopped).await.is_ok());
        assert_eq!(hub.stats().connection_count, 0);
    }

    #[test]
    fn test_concurrent_register_and_broadcast() {
        use std::sync::Arc;
        use std::thread;

        let hub = Arc::new(Hub::new());
        let mut handles = Vec::new();

        for t in 0..4 {
            let hub = Arc::clone(&hub);
            handles.push(thread::spawn(move || {
                let mut queues = Vec::new();
                for i in 0..50 {
                    let conn = format!("t{t}-c{i}");
                    let (handle, queue) = hub.outbound_channel(conn.as_str().into());
                    hub.register_user(UserPresence::new(format!("u{}", i % 5), "x", None), handle);
                    hub.join_room("shared", &conn.as_str().into());
                    hub.broadcast_to_room("shared", Bytes::from_static(b"ping"));
                    queues.push((conn, queue));
                }
                for (conn, _queue) in &queues {
                    hub.unregister(&conn.as_str().into());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = hub.stats();
        assert_eq!(stats.connection_count, 0);
        assert_eq!(stats.user_count, 0);
        assert_eq!(stats.room_count, 0);
    }
}
