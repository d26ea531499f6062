//! SQLite-backed persistence for voltage readings.
//!
//! One append-only table of (cell number, voltage, server timestamp), indexed
//! by (cell, timestamp) for range scans. Failed reads are never stored: the
//! sink treats a null voltage as a successful no-op so averages are not
//! polluted with sentinel zeros, while a legitimate functional-zero reading
//! of 0.0 V is stored like any other value.

use crate::error::{MonitorError, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// A persisted reading as returned by queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReading {
    /// 1-based cell number
    pub cell: u8,
    /// ADC input label, derived from the cell number
    pub ain_channel: String,
    pub voltage: Option<f64>,
    /// Server-assigned timestamp, RFC 3339
    pub timestamp: Option<String>,
}

/// Per-cell average voltage over stored readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellAverage {
    pub cell: u8,
    pub avg_voltage: Option<f64>,
}

/// Aggregate statistics for the dashboard endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_readings: u64,
    pub average_voltages_per_cell: Vec<CellAverage>,
    pub latest_reading_timestamp: Option<String>,
}

/// Handle to the voltage readings database.
///
/// A single connection behind a mutex with scoped acquisition replaces the
/// original service's connect/disconnect-per-call pattern; the lock is
/// released on every exit path, including errors.
#[derive(Clone)]
pub struct VoltageStore {
    conn: Arc<Mutex<Connection>>,
}

impl VoltageStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| MonitorError::storage_error(format!("failed to open database: {e}")))?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests and `--volatile` style runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MonitorError::storage_error(format!("failed to open database: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Create the readings table and index if they don't exist.
    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS voltage_readings (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 cell_number INTEGER NOT NULL,
                 voltage REAL,
                 timestamp TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_cell_timestamp
                 ON voltage_readings (cell_number, timestamp);",
        )
        .map_err(|e| MonitorError::storage_error(format!("failed to ensure schema: {e}")))?;
        Ok(())
    }

    /// Persist one reading.
    ///
    /// A `None` voltage (transient read failure) is skipped and treated as
    /// success. Storage failures are logged and reported as `false`; they
    /// never abort the caller's acquisition or stream tick.
    pub fn record(&self, cell: u8, voltage: Option<f64>) -> bool {
        let Some(voltage) = voltage else {
            debug!("Skipping database insert for cell {cell}: voltage is null (I2C read error).");
            return true;
        };

        match self.insert(cell, voltage) {
            Ok(()) => true,
            Err(e) => {
                error!("Database insert error for cell {cell} voltage {voltage}: {e}");
                false
            }
        }
    }

    fn insert(&self, cell: u8, voltage: f64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO voltage_readings (cell_number, voltage, timestamp) VALUES (?1, ?2, ?3)",
            params![cell, voltage, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| MonitorError::storage_error(e.to_string()))?;
        Ok(())
    }

    /// The most recent readings, newest first.
    pub fn history(&self, limit: u32) -> Result<Vec<StoredReading>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT cell_number, voltage, timestamp
                 FROM voltage_readings
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1",
            )
            .map_err(|e| MonitorError::storage_error(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit], |row| {
                let cell: u8 = row.get(0)?;
                Ok(StoredReading {
                    cell,
                    ain_channel: format!("AIN{}", cell.saturating_sub(1)),
                    voltage: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })
            .map_err(|e| MonitorError::storage_error(e.to_string()))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MonitorError::storage_error(e.to_string()))
    }

    /// Aggregate stats: non-null reading count, per-cell averages (excluding
    /// non-positive values), and the newest stored timestamp.
    pub fn dashboard(&self) -> Result<DashboardStats> {
        let conn = self.lock()?;

        let total_readings: u64 = conn
            .query_row(
                "SELECT COUNT(*) FROM voltage_readings WHERE voltage IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .map_err(|e| MonitorError::storage_error(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT cell_number, AVG(voltage)
                 FROM voltage_readings
                 WHERE voltage IS NOT NULL AND voltage > 0
                 GROUP BY cell_number
                 ORDER BY cell_number",
            )
            .map_err(|e| MonitorError::storage_error(e.to_string()))?;

        let averages = stmt
            .query_map([], |row| {
                let avg: Option<f64> = row.get(1)?;
                Ok(CellAverage {
                    cell: row.get(0)?,
                    avg_voltage: avg.map(|v| (v * 1000.0).round() / 1000.0),
                })
            })
            .map_err(|e| MonitorError::storage_error(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MonitorError::storage_error(e.to_string()))?;

        let latest_reading_timestamp: Option<String> = conn
            .query_row(
                "SELECT MAX(timestamp) FROM voltage_readings WHERE voltage IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .map_err(|e| MonitorError::storage_error(e.to_string()))?;

        Ok(DashboardStats {
            total_readings,
            average_voltages_per_cell: averages,
            latest_reading_timestamp,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MonitorError::storage_error("database connection mutex poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_voltage_is_skipped() {
        let store = VoltageStore::open_in_memory().unwrap();
        assert!(store.record(1, None));
        assert!(store.history(10).unwrap().is_empty());
    }

    #[test]
    fn test_functional_zero_is_stored() {
        let store = VoltageStore::open_in_memory().unwrap();
        assert!(store.record(2, Some(0.0)));
        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].cell, 2);
        assert_eq!(history[0].ain_channel, "AIN1");
        assert_eq!(history[0].voltage, Some(0.0));
        assert!(history[0].timestamp.is_some());
    }

    #[test]
    fn test_history_newest_first_with_limit() {
        let store = VoltageStore::open_in_memory().unwrap();
        store.record(1, Some(3.1));
        store.record(2, Some(3.2));
        store.record(3, Some(3.3));

        let history = store.history(2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].voltage, Some(3.3));
        assert_eq!(history[1].voltage, Some(3.2));
    }

    #[test]
    fn test_dashboard_excludes_non_positive_from_averages() {
        let store = VoltageStore::open_in_memory().unwrap();
        store.record(1, Some(3.0));
        store.record(1, Some(4.0));
        store.record(2, Some(0.0));

        let stats = store.dashboard().unwrap();
        // The functional zero counts as a reading but not toward any average.
        assert_eq!(stats.total_readings, 3);
        assert_eq!(stats.average_voltages_per_cell.len(), 1);
        assert_eq!(stats.average_voltages_per_cell[0].cell, 1);
        assert_eq!(stats.average_voltages_per_cell[0].avg_voltage, Some(3.5));
        assert!(stats.latest_reading_timestamp.is_some());
    }

    #[test]
    fn test_dashboard_on_empty_store() {
        let store = VoltageStore::open_in_memory().unwrap();
        let stats = store.dashboard().unwrap();
        assert_eq!(stats.total_readings, 0);
        assert!(stats.average_voltages_per_cell.is_empty());
        assert!(stats.latest_reading_timestamp.is_none());
    }
}
