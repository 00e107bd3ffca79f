//! Presence tracking for Huddle.
//!
//! A user is online while at least one of their connections is registered.
//! Several devices may back the same presence.

use huddle_protocol::UserPresence;
use huddle_transport::ConnectionId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// When to announce a user as online to everyone else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresencePolicy {
    /// Announce every time a connection registers, including extra devices.
    #[default]
    EveryConnection,
    /// Announce only when a user goes from zero connections to one.
    FirstConnection,
}

impl PresencePolicy {
    /// Whether a registration should be announced.
    #[must_use]
    pub fn should_announce(&self, first_connection: bool) -> bool {
        match self {
            PresencePolicy::EveryConnection => true,
            PresencePolicy::FirstConnection => first_connection,
        }
    }
}

/// Presence entry for one online user.
#[derive(Debug, Clone)]
pub(crate) struct UserEntry {
    /// Latest presence metadata.
    pub(crate) presence: UserPresence,
    /// Live connections backing this presence.
    pub(crate) connections: HashSet<ConnectionId>,
}

impl UserEntry {
    pub(crate) fn new(presence: UserPresence) -> Self {
        Self {
            presence,
            connections: HashSet::new(),
        }
    }

    /// Remove a connection; returns `true` if none remain.
    pub(crate) fn detach(&mut self, connection_id: &ConnectionId) -> bool {
        self.connections.remove(connection_id);
        self.connections.is_empty()
    }
}
