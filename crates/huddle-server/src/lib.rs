//! # huddle-server
//!
//! Realtime chat presence and room-broadcast server.
//!
//! - **Config** - TOML and environment configuration
//! - **Handlers** - WebSocket upgrade, health check and server lifecycle
//! - **Session** - Per-connection state machine
//! - **Dispatch** - Handlers for inbound chat messages
//! - **Metrics** - Prometheus instrumentation

pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod metrics;
pub mod session;

pub use config::Config;
pub use handlers::{router, run_server, serve, AppState};
pub use session::{run_session, ChatContext, Session, SessionOutcome, SessionState};
