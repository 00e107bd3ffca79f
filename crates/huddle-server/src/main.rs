//! # Huddle Server
//!
//! Realtime chat presence and room-broadcast server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! huddle
//!
//! # Run with environment variables
//! HUDDLE_PORT=8080 HUDDLE_HOST=0.0.0.0 huddle
//!
//! # Connect with a token from the [auth.tokens] table
//! websocat "ws://127.0.0.1:8080/ws?token=dev-alice"
//! ```

use anyhow::Result;
use huddle_server::{handlers, metrics, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "huddle=debug,huddle_server=debug,huddle_core=debug,huddle_transport=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;

    tracing::info!("Starting Huddle server on {}:{}", config.host, config.port);
    if config.auth.tokens.is_empty() {
        tracing::warn!("No tokens configured in [auth.tokens]; every connection will be rejected");
    }

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
