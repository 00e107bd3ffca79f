//! # huddle-protocol
//!
//! Wire protocol definitions for the Huddle chat hub.
//!
//! Every frame is a UTF-8 JSON envelope `{ "type", "status"?, "data" }`.
//! The `type` tag selects the schema of `data`:
//!
//! - `presence_snapshot` / `user_presence` - Who is online (server to client)
//! - `message` - Chat text for a room
//! - `react_message` - Reactions on a message
//! - `create_room` / `join_room` - Room lifecycle
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{decode_inbound, Inbound};
//!
//! let frame = br#"{"type":"join_room","data":{"roomId":"r1"}}"#;
//! match decode_inbound(frame) {
//!     Inbound::JoinRoom(join) => assert_eq!(join.room_id, "r1"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

pub mod codec;
pub mod envelope;
pub mod inbound;
pub mod outbound;
pub mod payloads;

pub use codec::{decode, encode, ProtocolError, MAX_FRAME_SIZE};
pub use envelope::{Envelope, EnvelopeType, PresenceStatus};
pub use inbound::{decode_inbound, IgnoreReason, Inbound};
pub use outbound::Outbound;
pub use payloads::{
    BackgroundColor, IncomingCreateRoom, IncomingJoinRoom, IncomingText, OutgoingText,
    PresenceSnapshot, ProfileTag, ReactMessage, ReactionType, RoomCreated, RoomMemberJoined,
    UserOffline, UserPresence,
};
