//! # Cellmon - Battery Cell Voltage Monitor
//!
//! A Rust crate for monitoring battery cell voltages on a Raspberry Pi
//! through a PCF8591 analog-to-digital converter on the I2C bus. Readings
//! are persisted to an embedded SQLite database and served to a separate
//! frontend over a REST + Server-Sent-Events API.
//!
//! ## Features
//!
//! - **Channel sampling**: select/settle/discard/read protocol per ADC channel
//!   with voltage-divider compensation and a functional-zero clamp
//! - **Live streaming**: one acquisition cycle per second over SSE, with
//!   graceful backoff when the hardware interface or database is unavailable
//! - **History and aggregates**: persisted readings, per-cell averages,
//!   CSV export
//! - **Hardware feature gate**: builds and runs on non-Pi systems, where the
//!   missing I2C interface is an explicit, queryable state
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cellmon::{start_web_server, CellSampler, SamplerConfig, VoltageStore, WebConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sampler = CellSampler::detect(SamplerConfig::default());
//!     let store = VoltageStore::open("voltage_history.db")?;
//!     start_web_server(WebConfig::default(), sampler, store).await?;
//!     Ok(())
//! }
//! ```

pub mod acquisition;
pub mod error;
pub mod storage;
pub mod web;

// Re-export public API
pub use acquisition::{
    bus::{AdcBus, BusError},
    data::{CellReading, VoltageSnapshot},
    sampler::{CellSampler, SamplerConfig},
};
pub use error::{MonitorError, Result};
pub use storage::{CellAverage, DashboardStats, StoredReading, VoltageStore};
pub use web::{start_web_server, WebConfig};

/// The default polling interval for the streaming loop in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 5000;

/// The default number of monitored battery cells
pub const DEFAULT_CELL_COUNT: u8 = 4;
