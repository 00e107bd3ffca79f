//! # huddle-core
//!
//! Presence tracking and room broadcasting for the Huddle chat hub.
//!
//! - **Hub** - Registry of online users, live connections and room membership
//! - **Outbound** - Bounded per-connection queues drained by writer tasks
//! - **Presence** - Per-user presence entries and announcement policy
//! - **Identity** - Token verification seam
//! - **Store** - Chat persistence seam
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌───────────────┐     ┌────────┐
//! │   Session   │────▶│     Hub     │────▶│ OutboundQueue │────▶│ Writer │
//! └─────────────┘     └─────────────┘     └───────────────┘     └────────┘
//!        │                   │
//!        ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐
//! │  ChatStore  │     │  Presence   │
//! └─────────────┘     └─────────────┘
//! ```

pub mod hub;
pub mod identity;
pub mod outbound;
pub mod presence;
pub mod room;
pub mod store;

pub use hub::{Hub, HubConfig, HubStats, Unregistered, UserId};
pub use identity::{Identity, IdentityError, IdentityVerifier, StaticIdentityVerifier, StaticUser};
pub use outbound::{Delivery, OutboundHandle, OutboundQueue};
pub use presence::PresencePolicy;
pub use room::{validate_room_id, RoomId};
pub use store::{ChatStore, MemoryChatStore, NewMessage, NewRoom, StoreError, StoredMessage, StoredRoom};
