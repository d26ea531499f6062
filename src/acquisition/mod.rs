//! Voltage acquisition: the I2C bus interface, the per-channel sampler,
//! and the data structures an acquisition cycle produces.

pub mod bus;
pub mod data;
pub mod sampler;

// Re-export commonly used items
pub use bus::{detect_bus, AdcBus, BusError};
pub use data::{CellReading, VoltageSnapshot};
pub use sampler::{CellSampler, SamplerConfig};
