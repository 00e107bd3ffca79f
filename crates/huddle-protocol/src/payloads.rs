//! Payload schemas carried in the `data` field of an envelope.
//!
//! Field names follow the camelCase JSON contract used by web clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Avatar/profile selector attached to a user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum ProfileTag {
    Profile1 = 1,
    Profile2 = 2,
    Profile3 = 3,
    Profile4 = 4,
}

impl From<ProfileTag> for u8 {
    fn from(tag: ProfileTag) -> u8 {
        tag as u8
    }
}

impl TryFrom<u8> for ProfileTag {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProfileTag::Profile1),
            2 => Ok(ProfileTag::Profile2),
            3 => Ok(ProfileTag::Profile3),
            4 => Ok(ProfileTag::Profile4),
            _ => Err("Invalid profile tag"),
        }
    }
}

impl ProfileTag {
    /// Parse a profile tag from a loosely typed claim value.
    ///
    /// Returns `None` for anything outside `1..=4`.
    #[must_use]
    pub fn from_claim(value: i64) -> Option<Self> {
        u8::try_from(value).ok().and_then(|v| Self::try_from(v).ok())
    }
}

/// Reaction kinds a user can attach to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionType {
    #[serde(rename = "1")]
    Like,
    #[serde(rename = "2")]
    Dislike,
    #[serde(rename = "3")]
    Love,
}

/// Room background colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackgroundColor {
    #[serde(rename = "1")]
    Red,
    #[serde(rename = "2")]
    Blue,
    #[serde(rename = "3")]
    Green,
    #[serde(rename = "4")]
    Yellow,
    #[serde(rename = "5")]
    Purple,
    #[serde(rename = "6")]
    Pink,
}

/// Online state and display metadata of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    /// Stable identity issued by the identity provider.
    pub user_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Profile tag, omitted when unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileTag>,
}

impl UserPresence {
    /// Create a new presence record.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        profile: Option<ProfileTag>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            profile,
        }
    }
}

/// `presence_snapshot` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub users: Vec<UserPresence>,
}

/// `user_presence` payload with status `offline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOffline {
    pub user_id: String,
}

/// Inbound `message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingText {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub room_id: String,
    /// Quoted content of the message being replied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_content: Option<String>,
}

/// Outbound `message` payload, enriched with sender metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingText {
    pub message_id: String,
    pub sender_id: String,
    pub content: String,
    pub room_id: String,
    /// Always present on the wire; `null` when the message is not a reply.
    #[serde(default)]
    pub reply_content: Option<String>,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_profile: Option<ProfileTag>,
    #[serde(default)]
    pub reactions: Vec<ReactionType>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

/// `react_message` payload (same shape in both directions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactMessage {
    pub message_id: String,
    pub react_type: ReactionType,
}

/// Inbound `create_room` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCreateRoom {
    #[serde(default)]
    pub chat_name: String,
    pub background: BackgroundColor,
    #[serde(default)]
    pub is_public: bool,
}

/// Outbound `create_room` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    pub room_id: String,
    pub created_by: String,
    pub chat_name: String,
    /// Durable member ids; named `userId` on the wire.
    #[serde(rename = "userId", default)]
    pub member_ids: Vec<String>,
    pub background: BackgroundColor,
    #[serde(default)]
    pub is_public: bool,
}

/// Inbound `join_room` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingJoinRoom {
    #[serde(default)]
    pub room_id: String,
}

/// Outbound `join_room` payload announcing a new live member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMemberJoined {
    pub room_id: String,
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileTag>,
}
