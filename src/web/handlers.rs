//! HTTP handlers for the battery monitor API endpoints.

use crate::acquisition::data::{ErrorPayload, VoltageSnapshot};
use crate::web::router::AppState;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

/// Default number of rows returned by the history endpoint.
const DEFAULT_HISTORY_LIMIT: u32 = 100;

/// Number of rows included in the CSV export.
const CSV_EXPORT_LIMIT: u32 = 1000;

fn api_error(message: impl Into<String>, error_code: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorPayload::new(message, error_code)),
    )
        .into_response()
}

/// Service banner; the frontend talks to /api/* directly.
pub async fn index() -> &'static str {
    "Battery monitor API is running. Use /api/..."
}

/// Run one acquisition cycle, persist the readings, and return them.
///
/// Used by the frontend for initial load and manual refresh.
pub async fn get_voltage(State(state): State<AppState>) -> Response {
    let readings = {
        let mut sampler = state.sampler.lock().await;
        sampler.sample_all().await
    };

    match readings {
        Ok(readings) => {
            for reading in &readings {
                // The sink skips null voltages but stores functional zeros.
                state.store.record(reading.cell, reading.voltage);
            }
            Json(VoltageSnapshot::success(readings)).into_response()
        }
        Err(e) if e.is_hardware_unavailable() => {
            error!("Error in /api/voltage due to hardware interface: {e}");
            api_error(e.to_string(), "BSE_NO_HW_INTERFACE")
        }
        Err(e) => {
            error!("Error in /api/voltage: {e}");
            api_error(
                "An internal server error occurred while fetching voltages.",
                "BSE5001",
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u32>,
}

/// Most recent persisted readings, newest first.
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match state.store.history(limit) {
        Ok(history) => Json(history).into_response(),
        Err(e) => {
            error!("Error in /api/history: {e}");
            api_error(
                "An internal server error occurred while fetching history.",
                "BSE5002",
            )
        }
    }
}

/// Connectivity probe: sample channel 0 only.
///
/// Distinguishes hardware absence from a transient null read.
pub async fn connect(State(state): State<AppState>) -> Response {
    let result = {
        let mut sampler = state.sampler.lock().await;
        sampler.sample(0).await
    };

    match result {
        Ok(Some(voltage)) => Json(json!({
            "status": "success",
            "message": format!(
                "Connected to battery monitor. ADC reading for AIN0: {voltage}V (compensated, 0.0 if functional zero)"
            ),
        }))
        .into_response(),
        Ok(None) => api_error(
            "Could not read valid voltage from ADC. Check hardware or I2C connection. Reading was null.",
            "BSEHW001",
        ),
        Err(e) if e.is_hardware_unavailable() => {
            error!("Error in /api/connect due to hardware interface: {e}");
            api_error(e.to_string(), "BSE_NO_HW_INTERFACE_CONNECT")
        }
        Err(e) => {
            error!("Error in /api/connect: {e}");
            api_error(e.to_string(), "BSE5005")
        }
    }
}

/// Voltage history as a CSV attachment.
pub async fn download_csv(State(state): State<AppState>) -> Response {
    match state
        .store
        .history(CSV_EXPORT_LIMIT)
        .and_then(|history| write_csv(&history))
    {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"voltage_history.csv\"",
                ),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Error in /api/download: {e}");
            api_error("Failed to generate CSV file.", "BSE5006")
        }
    }
}

fn write_csv(history: &[crate::storage::StoredReading]) -> crate::error::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let io_err = |e: csv::Error| crate::error::MonitorError::storage_error(e.to_string());

    writer
        .write_record(["Cell", "AIN Channel", "Voltage (V)", "Timestamp"])
        .map_err(io_err)?;
    for row in history {
        writer
            .write_record([
                row.cell.to_string(),
                row.ain_channel.clone(),
                row.voltage.map(|v| v.to_string()).unwrap_or_default(),
                row.timestamp.clone().unwrap_or_default(),
            ])
            .map_err(io_err)?;
    }

    writer
        .into_inner()
        .map_err(|e| crate::error::MonitorError::storage_error(e.to_string()))
}

/// Aggregate statistics over persisted readings.
pub async fn get_dashboard(State(state): State<AppState>) -> Response {
    match state.store.dashboard() {
        Ok(stats) => Json(json!({
            "status": "success",
            "total_readings": stats.total_readings,
            "average_voltages_per_cell": stats.average_voltages_per_cell,
            "latest_reading_timestamp": stats.latest_reading_timestamp,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
        .into_response(),
        Err(e) => {
            error!("Error in /api/dashboard: {e}");
            api_error("Database error fetching dashboard data.", "BSEDB004")
        }
    }
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "cellmon",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
