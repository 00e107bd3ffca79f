//! Connection sessions.
//!
//! A session drives one connection from upgrade to close:
//!
//! ```text
//! Connecting ──▶ Authenticating ──▶ Active ──▶ Closing ──▶ Closed
//!                      │                                     ▲
//!                      └──────────── rejected ───────────────┘
//! ```
//!
//! While active, the session owns the read half and a spawned writer task
//! drains the connection's outbound queue into the write half.

use crate::dispatch;
use crate::metrics::{self, ConnectionMetricsGuard};
use huddle_core::{ChatStore, Hub, Identity, IdentityVerifier, OutboundHandle};
use huddle_protocol::{decode_inbound, IgnoreReason, Inbound, Outbound, UserOffline};
use huddle_transport::{Connection, ConnectionId, ConnectionReader};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct ChatContext {
    pub hub: Arc<Hub>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub store: Arc<dyn ChatStore>,
}

impl ChatContext {
    /// Create a new context.
    pub fn new(
        hub: Arc<Hub>,
        identity: Arc<dyn IdentityVerifier>,
        store: Arc<dyn ChatStore>,
    ) -> Self {
        Self {
            hub,
            identity,
            store,
        }
    }
}

impl fmt::Debug for ChatContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatContext")
            .field("hub", &self.hub.stats())
            .finish()
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Active,
    Closing,
    Closed,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The credential was missing or rejected; nothing was registered.
    Rejected,
    /// The connection was registered and has since been removed.
    Completed {
        user_id: String,
        last_connection: bool,
    },
}

/// Drives one connection through its lifecycle.
pub struct Session {
    id: ConnectionId,
    state: SessionState,
    ctx: ChatContext,
}

impl Session {
    /// Create a session for a freshly upgraded connection.
    pub fn new(ctx: ChatContext, id: ConnectionId) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
            ctx,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(connection = %self.id, from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }

    /// Run the session to completion.
    pub async fn run(mut self, conn: Box<dyn Connection>, token: Option<String>) -> SessionOutcome {
        let _metrics_guard = ConnectionMetricsGuard::new();

        self.transition(SessionState::Authenticating);
        let identity = match self.authenticate(token.as_deref()).await {
            Some(identity) => identity,
            None => {
                metrics::record_auth_failure();
                let (_reader, mut writer) = conn.split();
                if let Err(e) = writer.close().await {
                    debug!(connection = %self.id, error = %e, "Close after rejection failed");
                }
                self.transition(SessionState::Closed);
                return SessionOutcome::Rejected;
            }
        };

        self.transition(SessionState::Active);
        let (reader, writer) = conn.split();
        let (handle, queue) = self.ctx.hub.outbound_channel(self.id.clone());
        let writer_task = tokio::spawn(queue.drain(writer));

        self.announce(&identity, handle);
        self.read_loop(reader).await;

        self.transition(SessionState::Closing);
        let unregistered = self.ctx.hub.unregister(&self.id);
        metrics::record_dropped_frames(unregistered.dropped_frames);
        if unregistered.last_connection {
            let offline = Outbound::UserOffline(UserOffline {
                user_id: identity.user_id.clone(),
            });
            match offline.encode() {
                Ok(frame) => {
                    self.ctx.hub.broadcast_to_all(frame);
                }
                Err(e) => warn!(connection = %self.id, error = %e, "Failed to encode offline presence"),
            }
        }
        metrics::record_hub_stats(&self.ctx.hub.stats());

        // The hub dropped our outbound handle, so the writer flushes and closes
        match writer_task.await {
            Ok(written) => debug!(connection = %self.id, frames = written, "Writer finished"),
            Err(e) => warn!(connection = %self.id, error = %e, "Writer task failed"),
        }

        self.transition(SessionState::Closed);
        info!(connection = %self.id, user = %identity.user_id, "Session closed");

        SessionOutcome::Completed {
            user_id: identity.user_id,
            last_connection: unregistered.last_connection,
        }
    }

    async fn authenticate(&self, token: Option<&str>) -> Option<Identity> {
        if self.ctx.hub.is_shut_down() {
            debug!(connection = %self.id, "Hub is shut down, rejecting connection");
            return None;
        }

        let Some(token) = token.filter(|t| !t.is_empty()) else {
            warn!(connection = %self.id, "Connection without token");
            return None;
        };

        match self.ctx.identity.verify(token).await {
            Ok(identity) if identity.user_id.is_empty() => {
                warn!(connection = %self.id, "Identity without user id");
                None
            }
            Ok(identity) => {
                debug!(connection = %self.id, user = %identity.user_id, "Token verified");
                Some(identity)
            }
            Err(e) => {
                warn!(connection = %self.id, error = %e, "Token rejected");
                None
            }
        }
    }

    /// Register with the hub, send the snapshot, and announce the user.
    fn announce(&self, identity: &Identity, handle: OutboundHandle) {
        let hub = &self.ctx.hub;
        let presence = identity.presence();
        let first_connection = hub.register_with_snapshot(presence.clone(), handle);

        if hub.config().presence_policy.should_announce(first_connection) {
            match Outbound::UserOnline(presence).encode() {
                Ok(frame) => {
                    let recipients = hub.broadcast_to_all_except(&self.id, frame);
                    debug!(connection = %self.id, recipients, "Announced online");
                }
                Err(e) => warn!(connection = %self.id, error = %e, "Failed to encode online presence"),
            }
        }
        metrics::record_hub_stats(&hub.stats());
    }

    async fn read_loop(&self, mut reader: Box<dyn ConnectionReader>) {
        let mut shutdown = self.ctx.hub.shutdown_signal();
        if *shutdown.borrow_and_update() {
            return;
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(connection = %self.id, "Hub shutting down, closing session");
                        break;
                    }
                }

                frame = reader.recv() => {
                    match frame {
                        Ok(Some(data)) => {
                            metrics::record_message(data.len(), "inbound");
                            self.handle_frame(&data).await;
                        }
                        Ok(None) => {
                            debug!(connection = %self.id, "Connection closed by peer");
                            break;
                        }
                        Err(e) => {
                            debug!(connection = %self.id, error = %e, "Read failed");
                            metrics::record_error("transport");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, data: &[u8]) {
        match decode_inbound(data) {
            Inbound::Ignored(reason) => {
                debug!(connection = %self.id, reason = %reason, "Ignoring frame");
                metrics::record_ignored(ignore_label(&reason));
            }
            inbound => dispatch::dispatch(&self.ctx, &self.id, inbound).await,
        }
    }
}

/// Run a session for a connection under its own id.
pub async fn run_session(
    ctx: ChatContext,
    conn: Box<dyn Connection>,
    token: Option<String>,
) -> SessionOutcome {
    let id = conn.id().clone();
    debug!(connection = %id, remote = ?conn.remote_addr(), "Connection opened");
    Session::new(ctx, id).run(conn, token).await
}

fn ignore_label(reason: &IgnoreReason) -> &'static str {
    match reason {
        IgnoreReason::TooLarge(_) => "too_large",
        IgnoreReason::MalformedEnvelope(_) => "malformed_envelope",
        IgnoreReason::MalformedPayload { .. } => "malformed_payload",
        IgnoreReason::UnknownType(_) => "unknown_type",
        IgnoreReason::OutboundOnly(_) => "outbound_only",
    }
}
