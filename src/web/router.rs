//! Web application router, shared state, and middleware setup.

use crate::acquisition::CellSampler;
use crate::error::Result;
use crate::storage::VoltageStore;
use crate::web::config::WebConfig;
use crate::web::{handlers, stream};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// State shared by every handler and stream.
///
/// All bus access is serialized behind the sampler mutex, so an on-demand
/// acquisition can never interleave its bus transactions with an active
/// stream's cycle.
#[derive(Clone)]
pub struct AppState {
    pub sampler: Arc<Mutex<CellSampler>>,
    pub store: VoltageStore,
    /// Steady-state delay between stream ticks
    pub poll_interval: Duration,
}

impl AppState {
    pub fn new(sampler: CellSampler, store: VoltageStore, poll_interval: Duration) -> Self {
        Self {
            sampler: Arc::new(Mutex::new(sampler)),
            store,
            poll_interval,
        }
    }
}

/// Create the main axum application with all routes and middleware.
pub async fn create_app(config: WebConfig, state: AppState) -> Result<Router> {
    let mut app = Router::new()
        .route("/", get(handlers::index))
        // API routes
        .route("/api/voltage", get(handlers::get_voltage))
        .route("/api/voltage/stream", get(stream::voltage_stream))
        .route("/api/history", get(handlers::get_history))
        .route("/api/connect", post(handlers::connect))
        .route("/api/download", get(handlers::download_csv))
        .route("/api/dashboard", get(handlers::get_dashboard))
        .route("/api/health", get(handlers::health_check))
        .with_state(state);

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app = app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SamplerConfig;

    #[tokio::test]
    async fn test_create_app() {
        let state = AppState::new(
            CellSampler::new(None, SamplerConfig::default()),
            VoltageStore::open_in_memory().unwrap(),
            Duration::from_millis(10),
        );
        let app = create_app(WebConfig::default(), state).await;
        assert!(app.is_ok());
    }
}
