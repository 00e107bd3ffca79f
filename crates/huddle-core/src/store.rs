//! Chat persistence.
//!
//! The hub persists through a [`ChatStore`]. [`MemoryChatStore`] keeps
//! everything in concurrent maps and backs the binary and the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use huddle_protocol::{BackgroundColor, ReactionType};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Chat store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// A message to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub reply_to: Option<String>,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub reply_to: Option<String>,
    pub reactions: Vec<ReactionType>,
    pub created_at: DateTime<Utc>,
}

/// A room to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub creator_id: String,
    /// Durable members; an empty list means just the creator.
    pub member_ids: Vec<String>,
    pub name: String,
    pub background: BackgroundColor,
    pub is_public: bool,
}

/// A persisted room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRoom {
    pub id: String,
    pub creator_id: String,
    pub member_ids: Vec<String>,
    pub name: String,
    pub background: BackgroundColor,
    pub is_public: bool,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Durable storage for rooms and messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Whether a room exists.
    async fn room_exists(&self, room_id: &str) -> Result<bool, StoreError>;

    /// Persist a message.
    ///
    /// Fails with [`StoreError::RoomNotFound`] if the room does not exist.
    async fn save_message(&self, message: NewMessage) -> Result<StoredMessage, StoreError>;

    /// Persist a new room and assign it an id.
    async fn create_room(&self, room: NewRoom) -> Result<StoredRoom, StoreError>;

    /// Add a reaction to a message; returns the updated message.
    async fn add_reaction(
        &self,
        message_id: &str,
        reaction: ReactionType,
    ) -> Result<StoredMessage, StoreError>;

    /// Record a user as a durable member of a room.
    async fn join_room(&self, room_id: &str, user_id: &str) -> Result<(), StoreError>;
}

/// In-memory [`ChatStore`].
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    rooms: DashMap<String, StoredRoom>,
    messages: DashMap<String, StoredMessage>,
}

impl MemoryChatStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a room with a known id.
    pub fn seed_room(&self, room_id: impl Into<String>, creator_id: impl Into<String>) {
        let id = room_id.into();
        let creator_id = creator_id.into();
        self.rooms.insert(
            id.clone(),
            StoredRoom {
                id,
                member_ids: vec![creator_id.clone()],
                creator_id,
                name: String::new(),
                background: BackgroundColor::Red,
                is_public: true,
                last_message_at: None,
            },
        );
    }

    /// Look up a room.
    #[must_use]
    pub fn room(&self, room_id: &str) -> Option<StoredRoom> {
        self.rooms.get(room_id).map(|r| r.value().clone())
    }

    /// Look up a message.
    #[must_use]
    pub fn message(&self, message_id: &str) -> Option<StoredMessage> {
        self.messages.get(message_id).map(|m| m.value().clone())
    }

    /// Messages of a room, oldest first.
    #[must_use]
    pub fn messages_in(&self, room_id: &str) -> Vec<StoredMessage> {
        let mut messages: Vec<StoredMessage> = self
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .map(|m| m.value().clone())
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        messages
    }

    /// Number of stored rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn room_exists(&self, room_id: &str) -> Result<bool, StoreError> {
        Ok(self.rooms.contains_key(room_id))
    }

    async fn save_message(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        let now = Utc::now();

        // Touch the room first so a missing room never leaves an orphan message
        match self.rooms.get_mut(&message.room_id) {
            Some(mut room) => room.last_message_at = Some(now),
            None => return Err(StoreError::RoomNotFound(message.room_id)),
        }

        let stored = StoredMessage {
            id: Uuid::new_v4().simple().to_string(),
            room_id: message.room_id,
            sender_id: message.sender_id,
            content: message.content,
            reply_to: message.reply_to,
            reactions: Vec::new(),
            created_at: now,
        };
        self.messages.insert(stored.id.clone(), stored.clone());

        debug!(room = %stored.room_id, message = %stored.id, "Message saved");
        Ok(stored)
    }

    async fn create_room(&self, room: NewRoom) -> Result<StoredRoom, StoreError> {
        let member_ids = if room.member_ids.is_empty() {
            vec![room.creator_id.clone()]
        } else {
            room.member_ids
        };

        let stored = StoredRoom {
            id: Uuid::new_v4().simple().to_string(),
            creator_id: room.creator_id,
            member_ids,
            name: room.name,
            background: room.background,
            is_public: room.is_public,
            last_message_at: None,
        };
        self.rooms.insert(stored.id.clone(), stored.clone());

        debug!(room = %stored.id, creator = %stored.creator_id, "Room created");
        Ok(stored)
    }

    async fn add_reaction(
        &self,
        message_id: &str,
        reaction: ReactionType,
    ) -> Result<StoredMessage, StoreError> {
        let mut message = self
            .messages
            .get_mut(message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
        message.reactions.push(reaction);
        Ok(message.value().clone())
    }

    async fn join_room(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        // Unknown rooms are accepted silently, matching an update that matches nothing
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            if !room.member_ids.iter().any(|id| id == user_id) {
                room.member_ids.push(user_id.to_string());
            }
        }
        Ok(())
    }
}
