//! # huddle-transport
//!
//! Connection abstraction for the Huddle chat hub.
//!
//! - **WebSocket** - Upgraded axum sockets, the production transport
//! - **Memory** - Channel-backed pairs for tests and embedding
//!
//! ## Connection Ownership
//!
//! A session owns its [`Connection`] exclusively and splits it once: the read
//! half stays with the session loop, the write half moves to a writer task
//! that drains the connection's outbound queue.
//!
//! ```rust,ignore
//! use huddle_transport::Connection;
//!
//! async fn handle_connection(conn: Box<dyn Connection>) {
//!     let (mut reader, mut writer) = conn.split();
//!     while let Ok(Some(frame)) = reader.recv().await {
//!         writer.send(frame).await.ok();
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Connection, ConnectionId, ConnectionReader, ConnectionWriter, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;
