//! Server-to-client messages.

use bytes::Bytes;

use crate::codec::{self, ProtocolError};
use crate::envelope::{Envelope, EnvelopeType, PresenceStatus};
use crate::payloads::{
    OutgoingText, PresenceSnapshot, ReactMessage, RoomCreated, RoomMemberJoined, UserOffline,
    UserPresence,
};

/// A message the server sends to one or more connections.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Everyone currently online, sent to a connection right after it registers.
    PresenceSnapshot(PresenceSnapshot),
    /// A user came online.
    UserOnline(UserPresence),
    /// A user's last connection went away.
    UserOffline(UserOffline),
    /// A persisted chat message.
    Message(OutgoingText),
    /// A reaction was added to a message.
    React(ReactMessage),
    /// A room was created.
    RoomCreated(RoomCreated),
    /// A connection joined a room.
    RoomMemberJoined(RoomMemberJoined),
}

impl Outbound {
    /// Get the envelope type.
    #[must_use]
    pub fn envelope_type(&self) -> EnvelopeType {
        match self {
            Outbound::PresenceSnapshot(_) => EnvelopeType::PresenceSnapshot,
            Outbound::UserOnline(_) | Outbound::UserOffline(_) => EnvelopeType::UserPresence,
            Outbound::Message(_) => EnvelopeType::Message,
            Outbound::React(_) => EnvelopeType::ReactMessage,
            Outbound::RoomCreated(_) => EnvelopeType::CreateRoom,
            Outbound::RoomMemberJoined(_) => EnvelopeType::JoinRoom,
        }
    }

    /// Get the presence status, for `user_presence` messages.
    #[must_use]
    pub fn status(&self) -> Option<PresenceStatus> {
        match self {
            Outbound::UserOnline(_) => Some(PresenceStatus::Online),
            Outbound::UserOffline(_) => Some(PresenceStatus::Offline),
            _ => None,
        }
    }

    /// Render this message as an envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let data = match self {
            Outbound::PresenceSnapshot(p) => serde_json::to_value(p)?,
            Outbound::UserOnline(p) => serde_json::to_value(p)?,
            Outbound::UserOffline(p) => serde_json::to_value(p)?,
            Outbound::Message(p) => serde_json::to_value(p)?,
            Outbound::React(p) => serde_json::to_value(p)?,
            Outbound::RoomCreated(p) => serde_json::to_value(p)?,
            Outbound::RoomMemberJoined(p) => serde_json::to_value(p)?,
        };

        let mut envelope = Envelope::new(self.envelope_type(), data);
        envelope.status = self.status();
        Ok(envelope)
    }

    /// Encode this message to a wire frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the frame is too large.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        codec::encode(&self.to_envelope()?)
    }
}
