//! The outer tagged envelope wrapping every frame.
//!
//! An envelope is `{ "type": ..., "status": ..., "data": ... }` where `data`
//! is a JSON value whose schema is implied by `type`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Envelope type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    PresenceSnapshot,
    UserPresence,
    Message,
    ReactMessage,
    CreateRoom,
    JoinRoom,
}

impl EnvelopeType {
    /// All known envelope types.
    pub const ALL: [EnvelopeType; 6] = [
        EnvelopeType::PresenceSnapshot,
        EnvelopeType::UserPresence,
        EnvelopeType::Message,
        EnvelopeType::ReactMessage,
        EnvelopeType::CreateRoom,
        EnvelopeType::JoinRoom,
    ];

    /// The wire tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeType::PresenceSnapshot => "presence_snapshot",
            EnvelopeType::UserPresence => "user_presence",
            EnvelopeType::Message => "message",
            EnvelopeType::ReactMessage => "react_message",
            EnvelopeType::CreateRoom => "create_room",
            EnvelopeType::JoinRoom => "join_room",
        }
    }

    /// Look up a type by its wire tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Whether clients may send this type to the server.
    #[must_use]
    pub fn is_inbound(&self) -> bool {
        !matches!(
            self,
            EnvelopeType::PresenceSnapshot | EnvelopeType::UserPresence
        )
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presence status carried by `user_presence` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// A decoded envelope whose payload has not been interpreted yet.
///
/// `kind` stays a raw string so that frames with unknown tags still decode
/// and can be ignored without being treated as malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional status, only meaningful for `user_presence`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PresenceStatus>,
    /// Type-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Create a new envelope without status.
    #[must_use]
    pub fn new(kind: EnvelopeType, data: serde_json::Value) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            status: None,
            data,
        }
    }

    /// Attach a presence status.
    #[must_use]
    pub fn with_status(mut self, status: PresenceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// The known type of this envelope, if any.
    #[must_use]
    pub fn envelope_type(&self) -> Option<EnvelopeType> {
        EnvelopeType::from_tag(&self.kind)
    }
}
