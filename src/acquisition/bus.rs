//! I2C bus abstraction for the PCF8591 ADC.
//!
//! The real bus is only available on a Raspberry Pi and is feature-gated
//! behind `hardware`. On other systems [`detect_bus`] returns `None`, making
//! the absence of the hardware interface an explicit, queryable state rather
//! than a crash at first use.

use serde::{Deserialize, Serialize};

/// Errors raised by a single I2C transaction.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// No acknowledgment from the device
    #[error("No acknowledgment from device at address 0x{0:02x}")]
    NoAck(u8),

    /// Transaction-level bus failure
    #[error("I2C transaction failed: {0}")]
    Transaction(String),
}

/// Byte-level access to an I2C device.
///
/// The PCF8591 protocol only needs single-byte writes (control/channel
/// select) and single-byte reads (conversion result), both addressed to a
/// selectable device address.
pub trait AdcBus: Send {
    /// Write one byte to the device at the given address.
    fn write_byte(&mut self, addr: u8, value: u8) -> std::result::Result<(), BusError>;

    /// Read one byte from the device at the given address.
    fn read_byte(&mut self, addr: u8) -> std::result::Result<u8, BusError>;
}

/// Summary of the bus probe, reported by the `info` command and logged at
/// startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusAvailability {
    /// Whether an I2C bus handle could be opened
    pub available: bool,
    /// Human-readable detail (driver name or the failure reason)
    pub detail: String,
}

#[cfg(feature = "hardware")]
mod raspberry_pi {
    use super::{AdcBus, BusError};
    use rppal::i2c::I2c;

    /// Raspberry Pi I2C bus using rppal.
    pub struct RaspberryPiBus {
        i2c: I2c,
    }

    impl RaspberryPiBus {
        /// Open the default I2C bus (bus 1 on current Raspberry Pi models).
        pub fn new() -> std::result::Result<Self, BusError> {
            let i2c = I2c::new().map_err(|e| BusError::Transaction(e.to_string()))?;
            Ok(Self { i2c })
        }

        fn select(&mut self, addr: u8) -> std::result::Result<(), BusError> {
            self.i2c
                .set_slave_address(addr as u16)
                .map_err(|e| BusError::Transaction(e.to_string()))
        }
    }

    impl AdcBus for RaspberryPiBus {
        fn write_byte(&mut self, addr: u8, value: u8) -> std::result::Result<(), BusError> {
            self.select(addr)?;
            self.i2c
                .write(&[value])
                .map_err(|e| BusError::Transaction(e.to_string()))?;
            Ok(())
        }

        fn read_byte(&mut self, addr: u8) -> std::result::Result<u8, BusError> {
            self.select(addr)?;
            let mut buf = [0u8; 1];
            self.i2c
                .read(&mut buf)
                .map_err(|e| BusError::Transaction(e.to_string()))?;
            Ok(buf[0])
        }
    }
}

#[cfg(feature = "hardware")]
pub use raspberry_pi::RaspberryPiBus;

/// Probe for an I2C bus, detected once at startup.
///
/// Returns `None` when the `hardware` feature is not compiled in or the bus
/// cannot be opened. Callers hold the returned handle for the lifetime of the
/// process; availability is not re-checked per call.
pub fn detect_bus() -> Option<Box<dyn AdcBus>> {
    #[cfg(feature = "hardware")]
    {
        match RaspberryPiBus::new() {
            Ok(bus) => {
                tracing::info!("I2C bus available. Running with hardware.");
                return Some(Box::new(bus));
            }
            Err(e) => {
                tracing::warn!("Failed to open I2C bus, ADC readings will not be possible: {e}");
                return None;
            }
        }
    }

    #[cfg(not(feature = "hardware"))]
    {
        tracing::warn!("Built without the `hardware` feature. ADC readings will not be possible.");
        None
    }
}

/// Describe the outcome of [`detect_bus`] without holding a handle.
pub fn probe_availability() -> BusAvailability {
    #[cfg(feature = "hardware")]
    {
        match RaspberryPiBus::new() {
            Ok(_) => BusAvailability {
                available: true,
                detail: "rppal I2C bus 1".to_string(),
            },
            Err(e) => BusAvailability {
                available: false,
                detail: e.to_string(),
            },
        }
    }

    #[cfg(not(feature = "hardware"))]
    {
        BusAvailability {
            available: false,
            detail: "hardware feature not compiled".to_string(),
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::{AdcBus, BusError};

    /// Scriptable in-memory bus for tests.
    ///
    /// Reads pop from a queue of results; writes are recorded so tests can
    /// assert the channel-select sequence (or that the bus was never touched).
    pub struct MockBus {
        pub writes: Vec<u8>,
        reads: Vec<std::result::Result<u8, BusError>>,
        fail_writes: bool,
    }

    impl MockBus {
        /// A bus that yields the given bytes, one per read, in order.
        pub fn with_reads(reads: Vec<u8>) -> Self {
            Self {
                writes: Vec::new(),
                reads: reads.into_iter().map(Ok).collect(),
                fail_writes: false,
            }
        }

        /// A bus whose every transaction fails.
        pub fn failing() -> Self {
            Self {
                writes: Vec::new(),
                reads: Vec::new(),
                fail_writes: true,
            }
        }

        /// Queue an explicit read outcome.
        pub fn push_read(&mut self, result: std::result::Result<u8, BusError>) {
            self.reads.push(result);
        }
    }

    impl AdcBus for MockBus {
        fn write_byte(&mut self, addr: u8, value: u8) -> std::result::Result<(), BusError> {
            if self.fail_writes {
                return Err(BusError::NoAck(addr));
            }
            self.writes.push(value);
            Ok(())
        }

        fn read_byte(&mut self, addr: u8) -> std::result::Result<u8, BusError> {
            if self.reads.is_empty() {
                return Err(BusError::NoAck(addr));
            }
            self.reads.remove(0)
        }
    }
}
