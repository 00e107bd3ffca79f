//! Decoding of client-to-server frames.
//!
//! [`decode_inbound`] never fails: anything the server cannot act on maps to
//! [`Inbound::Ignored`] with the reason, so a bad frame never tears down the
//! connection that sent it.

use std::fmt;

use crate::codec::{self, ProtocolError};
use crate::envelope::{Envelope, EnvelopeType};
use crate::payloads::{IncomingCreateRoom, IncomingJoinRoom, IncomingText, ReactMessage};

/// A frame received from a client.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Chat text for a room.
    Message(IncomingText),
    /// Reaction to an existing message.
    React(ReactMessage),
    /// Request to create a room.
    CreateRoom(IncomingCreateRoom),
    /// Request to join a room's live broadcast group.
    JoinRoom(IncomingJoinRoom),
    /// A frame that is dropped without dispatch.
    Ignored(IgnoreReason),
}

/// Why a frame was not dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum IgnoreReason {
    /// Frame exceeds the maximum size.
    TooLarge(usize),
    /// The outer envelope could not be decoded.
    MalformedEnvelope(String),
    /// The payload did not match the schema of its type.
    MalformedPayload { kind: EnvelopeType, error: String },
    /// The type tag is not known.
    UnknownType(String),
    /// The type is only ever sent by the server.
    OutboundOnly(EnvelopeType),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::TooLarge(size) => write!(f, "frame of {size} bytes is too large"),
            IgnoreReason::MalformedEnvelope(e) => write!(f, "malformed envelope: {e}"),
            IgnoreReason::MalformedPayload { kind, error } => {
                write!(f, "malformed {kind} payload: {error}")
            }
            IgnoreReason::UnknownType(tag) => write!(f, "unknown message type {tag:?}"),
            IgnoreReason::OutboundOnly(kind) => write!(f, "{kind} is server-to-client only"),
        }
    }
}

impl Inbound {
    /// The envelope type of a dispatchable frame.
    #[must_use]
    pub fn envelope_type(&self) -> Option<EnvelopeType> {
        match self {
            Inbound::Message(_) => Some(EnvelopeType::Message),
            Inbound::React(_) => Some(EnvelopeType::ReactMessage),
            Inbound::CreateRoom(_) => Some(EnvelopeType::CreateRoom),
            Inbound::JoinRoom(_) => Some(EnvelopeType::JoinRoom),
            Inbound::Ignored(_) => None,
        }
    }
}

/// Decode a raw frame into an [`Inbound`] value.
#[must_use]
pub fn decode_inbound(data: &[u8]) -> Inbound {
    let envelope = match codec::decode(data) {
        Ok(envelope) => envelope,
        Err(ProtocolError::FrameTooLarge(size)) => {
            return Inbound::Ignored(IgnoreReason::TooLarge(size))
        }
        Err(e) => return Inbound::Ignored(IgnoreReason::MalformedEnvelope(e.to_string())),
    };

    from_envelope(envelope)
}

/// Interpret an already decoded envelope.
#[must_use]
pub fn from_envelope(envelope: Envelope) -> Inbound {
    let Some(kind) = envelope.envelope_type() else {
        return Inbound::Ignored(IgnoreReason::UnknownType(envelope.kind));
    };

    let decoded = match kind {
        EnvelopeType::Message => codec::decode_payload(envelope).map(Inbound::Message),
        EnvelopeType::ReactMessage => codec::decode_payload(envelope).map(Inbound::React),
        EnvelopeType::CreateRoom => codec::decode_payload(envelope).map(Inbound::CreateRoom),
        EnvelopeType::JoinRoom => codec::decode_payload(envelope).map(Inbound::JoinRoom),
        EnvelopeType::PresenceSnapshot | EnvelopeType::UserPresence => {
            return Inbound::Ignored(IgnoreReason::OutboundOnly(kind))
        }
    };

    decoded.unwrap_or_else(|e| {
        Inbound::Ignored(IgnoreReason::MalformedPayload {
            kind,
            error: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::{BackgroundColor, ReactionType};

    #[test]
    fn test_decode_message() {
        let inbound =
            decode_inbound(br#"{"type":"message","data":{"content":"hi","roomId":"r1"}}"#);
        assert_eq!(
            inbound,
            Inbound::Message(IncomingText {
                content: "hi".into(),
                room_id: "r1".into(),
                reply_content: None,
            })
        );
        assert_eq!(inbound.envelope_type(), Some(EnvelopeType::Message));
    }

    #[test]
    fn test_decode_react_and_rooms() {
        let react = decode_inbound(
            br#"{"type":"react_message","data":{"messageId":"m1","reactType":"1"}}"#,
        );
        assert_eq!(
            react,
            Inbound::React(ReactMessage {
                message_id: "m1".into(),
                react_type: ReactionType::Like,
            })
        );

        let create = decode_inbound(
            br#"{"type":"create_room","data":{"chatName":"general","background":"2","isPublic":true}}"#,
        );
        assert_eq!(
            create,
            Inbound::CreateRoom(IncomingCreateRoom {
                chat_name: "general".into(),
                background: BackgroundColor::Blue,
                is_public: true,
            })
        );

        let join = decode_inbound(br#"{"type":"join_room","data":{"roomId":"r1"}}"#);
        assert_eq!(
            join,
            Inbound::JoinRoom(IncomingJoinRoom {
                room_id: "r1".into()
            })
        );
    }

    #[test]
    fn test_non_json_is_ignored() {
        assert!(matches!(
            decode_inbound(b"definitely not json"),
            Inbound::Ignored(IgnoreReason::MalformedEnvelope(_))
        ));
        assert!(matches!(
            decode_inbound(&[0xff, 0xfe, 0x00]),
            Inbound::Ignored(IgnoreReason::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_bad_payload_is_ignored() {
        let inbound =
            decode_inbound(br#"{"type":"react_message","data":{"messageId":"m1","reactType":"9"}}"#);
        assert!(matches!(
            inbound,
            Inbound::Ignored(IgnoreReason::MalformedPayload {
                kind: EnvelopeType::ReactMessage,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_and_outbound_types_are_ignored() {
        assert_eq!(
            decode_inbound(br#"{"type":"typing","data":{}}"#),
            Inbound::Ignored(IgnoreReason::UnknownType("typing".into()))
        );
        assert_eq!(
            decode_inbound(br#"{"type":"presence_snapshot","data":{"users":[]}}"#),
            Inbound::Ignored(IgnoreReason::OutboundOnly(EnvelopeType::PresenceSnapshot))
        );
    }
}
