//! Data structures produced by an acquisition cycle.

use serde::{Deserialize, Serialize};

/// One channel's reading within an acquisition cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CellReading {
    /// 1-based cell number
    pub cell: u8,
    /// ADC input label, e.g. "AIN0"
    pub ain_channel: String,
    /// Compensated voltage rounded to 3 decimals, or `None` on a transient
    /// read failure. A legitimate functional zero is `Some(0.0)`, never `None`.
    pub voltage: Option<f64>,
}

impl CellReading {
    /// Build a reading for the given 0-based channel index.
    pub fn new(channel: u8, voltage: Option<f64>) -> Self {
        Self {
            cell: channel + 1,
            ain_channel: format!("AIN{channel}"),
            voltage,
        }
    }
}

/// One acquisition cycle's output as delivered to API clients.
///
/// `readings` always holds one entry per configured cell, in channel order,
/// even when some voltages are `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoltageSnapshot {
    pub status: String,
    pub readings: Vec<CellReading>,
    /// Capture time, RFC 3339
    pub timestamp: String,
}

impl VoltageSnapshot {
    /// Wrap a cycle's readings with a capture timestamp.
    pub fn success(readings: Vec<CellReading>) -> Self {
        Self {
            status: "success".to_string(),
            readings,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error payload shared by the REST endpoints and the SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub status: String,
    pub message: String,
    pub error_code: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            error_code: error_code.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_reading_labels() {
        let reading = CellReading::new(0, Some(3.3));
        assert_eq!(reading.cell, 1);
        assert_eq!(reading.ain_channel, "AIN0");

        let reading = CellReading::new(3, None);
        assert_eq!(reading.cell, 4);
        assert_eq!(reading.ain_channel, "AIN3");
        assert!(reading.voltage.is_none());
    }

    #[test]
    fn test_snapshot_serializes_null_voltage() {
        let snapshot = VoltageSnapshot::success(vec![
            CellReading::new(0, Some(3.922)),
            CellReading::new(1, None),
        ]);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["readings"][0]["voltage"], 3.922);
        assert!(json["readings"][1]["voltage"].is_null());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_error_payload_shape() {
        let payload = ErrorPayload::new("boom", "BSE5001");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_code"], "BSE5001");
    }
}
