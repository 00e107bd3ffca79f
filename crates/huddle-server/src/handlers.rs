//! HTTP and WebSocket handlers for the Huddle server.
//!
//! This module wires the upgrade endpoint and health check to the hub and
//! runs the server until shutdown.

use crate::config::Config;
use crate::metrics;
use crate::session::{self, ChatContext};
use anyhow::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Router,
};
use huddle_core::{Hub, MemoryChatStore};
use huddle_transport::WebSocketConnection;
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Shared server state.
pub struct AppState {
    /// Hub and collaborators handed to every session.
    pub ctx: ChatContext,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create app state with the static verifier and in-memory store.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let ctx = ChatContext::new(
            Arc::new(Hub::with_config(config.hub_config())),
            Arc::new(config.identity_verifier()),
            Arc::new(MemoryChatStore::new()),
        );
        Self::with_context(config, ctx)
    }

    /// Create app state around existing collaborators.
    #[must_use]
    pub fn with_context(config: Config, ctx: ChatContext) -> Self {
        Self { ctx, config }
    }

    /// The hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        &self.ctx.hub
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    let websocket_path = state.config.transport.websocket_path.clone();
    Router::new()
        .route(&websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let state = Arc::new(AppState::new(config));
    serve(listener, state, ctrl_c()).await
}

/// Serve on an existing listener until `shutdown` resolves, then shut the
/// hub down so every session closes.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hub = Arc::clone(state.hub());
    let app = router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        info!("Shutting down");
        hub.shutdown();
    })
    .await?;

    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub().stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "users": stats.user_count,
        "connections": stats.connection_count,
        "rooms": stats.room_count,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let token = extract_token(&headers, query.token);
    ws.on_upgrade(move |socket| handle_websocket(socket, addr, token, state))
}

/// Handle an upgraded WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    addr: SocketAddr,
    token: Option<String>,
    state: Arc<AppState>,
) {
    let conn = WebSocketConnection::new(socket, state.config.transport.max_message_size)
        .with_remote_addr(addr);
    session::run_session(state.ctx.clone(), Box::new(conn), token).await;
}

/// Pull the credential from `Authorization` (with or without a `Bearer`
/// prefix), falling back to the `token` query parameter.
pub fn extract_token(headers: &HeaderMap, query_token: Option<String>) -> Option<String> {
    let header_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| strip_bearer(value).trim().to_string())
        .filter(|token| !token.is_empty());

    header_token.or_else(|| query_token.filter(|token| !token.is_empty()))
}

/// The auth scheme is case-insensitive.
fn strip_bearer(value: &str) -> &str {
    const SCHEME: &str = "bearer ";
    match value.get(..SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SCHEME) => &value[SCHEME.len()..],
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_token_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_token(&headers, None).as_deref(), Some("abc"));
    }

    #[test]
    fn test_extract_token_lowercase_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(extract_token(&headers, None).as_deref(), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("BEARER xyz"));
        assert_eq!(extract_token(&headers, None).as_deref(), Some("xyz"));

        // Too short to carry a scheme
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bear"));
        assert_eq!(extract_token(&headers, None).as_deref(), Some("bear"));
    }

    #[test]
    fn test_extract_token_raw_header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("raw-token"));
        assert_eq!(
            extract_token(&headers, Some("query".into())).as_deref(),
            Some("raw-token")
        );
    }

    #[test]
    fn test_extract_token_query_fallback() {
        let headers = HeaderMap::new();
        assert_eq!(
            extract_token(&headers, Some("q".into())).as_deref(),
            Some("q")
        );
        assert_eq!(extract_token(&headers, Some(String::new())), None);
        assert_eq!(extract_token(&headers, None), None);
    }
}
