//! Web server and API endpoints for the battery monitor.
//!
//! REST endpoints for on-demand readings, history, aggregates, and CSV
//! export, plus a Server-Sent-Events stream republishing live acquisition
//! cycles once per second.

pub mod config;
pub mod handlers;
pub mod router;
pub mod stream;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::{create_app, AppState};

use crate::acquisition::CellSampler;
use crate::error::{MonitorError, Result};
use crate::storage::VoltageStore;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

/// Start the web server with the provided configuration, sampler, and store.
pub async fn start_web_server(
    config: WebConfig,
    sampler: CellSampler,
    store: VoltageStore,
) -> Result<()> {
    let state = AppState::new(
        sampler,
        store,
        Duration::from_millis(config.poll_interval_ms),
    );

    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| MonitorError::config_error(format!("Invalid bind address: {e}")))?;

    let app = create_app(config, state).await?;

    info!("Starting battery monitor web server on http://{addr}");
    info!("API endpoint: http://{addr}/api/voltage");
    info!("SSE endpoint: http://{addr}/api/voltage/stream");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MonitorError::web_server_error(format!("Failed to bind to address: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| MonitorError::web_server_error(format!("Server error: {e}")))?;

    Ok(())
}
