//! Per-channel voltage sampling against the PCF8591.
//!
//! The device multiplexes four analog inputs behind a single conversion
//! register. Selecting a channel starts a new conversion, but the first byte
//! read back still holds the previous channel's result, so every sample is a
//! select / settle / discard-read / settle / real-read sequence.

use crate::acquisition::bus::{detect_bus, AdcBus, BusError};
use crate::acquisition::data::CellReading;
use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

/// Acquisition configuration, threaded through constructors so independently
/// configured samplers can coexist (and be tested) in one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Number of monitored battery cells (one per ADC channel)
    pub cells: u8,
    /// ADC reference voltage in volts
    pub reference_voltage: f64,
    /// Linear correction for the voltage-divider circuit
    pub compensation_factor: f64,
    /// Voltage floor below which a cell is reported as exactly 0.0 V,
    /// treated as disconnected or completely depleted
    pub functional_zero_threshold: f64,
    /// Settle time between bus transactions in milliseconds
    pub settle_delay_ms: u64,
    /// I2C address of the PCF8591
    pub device_address: u8,
    /// Base control byte; OR'd with the channel index to select an input
    pub channel_select_base: u8,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            cells: crate::DEFAULT_CELL_COUNT,
            reference_voltage: 5.0,
            compensation_factor: 1.0,
            functional_zero_threshold: 2.6,
            settle_delay_ms: 20,
            device_address: 0x48,
            channel_select_base: 0x40,
        }
    }
}

impl SamplerConfig {
    /// Set the number of monitored cells.
    pub fn with_cells(mut self, cells: u8) -> Self {
        self.cells = cells;
        self
    }

    /// Set the voltage-divider compensation factor.
    pub fn with_compensation_factor(mut self, factor: f64) -> Self {
        self.compensation_factor = factor;
        self
    }

    /// Set the functional-zero threshold in volts.
    pub fn with_functional_zero_threshold(mut self, threshold: f64) -> Self {
        self.functional_zero_threshold = threshold;
        self
    }

    /// Set the I2C device address.
    pub fn with_device_address(mut self, addr: u8) -> Self {
        self.device_address = addr;
        self
    }

    /// Settle delay as a [`Duration`].
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Upper edge of the broad plausibility band for compensated voltages.
    pub fn max_expected_voltage(&self) -> f64 {
        self.reference_voltage * self.compensation_factor + 0.5
    }
}

/// Samples battery cell voltages channel by channel.
///
/// Holds the bus handle as an explicit capability: `None` means the hardware
/// interface was never initialized, and every sample attempt fails fast with
/// [`MonitorError::HardwareUnavailable`].
pub struct CellSampler {
    bus: Option<Box<dyn AdcBus>>,
    config: SamplerConfig,
}

impl CellSampler {
    /// Create a sampler over an explicit bus capability.
    pub fn new(bus: Option<Box<dyn AdcBus>>, config: SamplerConfig) -> Self {
        Self { bus, config }
    }

    /// Create a sampler by probing for the I2C bus once.
    pub fn detect(config: SamplerConfig) -> Self {
        Self::new(detect_bus(), config)
    }

    /// Whether the hardware interface was available at startup.
    pub fn hardware_available(&self) -> bool {
        self.bus.is_some()
    }

    /// The configuration this sampler was built with.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sample one channel.
    ///
    /// Returns `Ok(None)` when a bus transaction fails mid-sequence (the
    /// caller keeps the channel slot but skips persistence). Hardware absence
    /// and an out-of-range channel are hard errors, rejected before any bus
    /// access.
    pub async fn sample(&mut self, channel: u8) -> Result<Option<f64>> {
        let config = self.config.clone();

        let bus = match self.bus.as_mut() {
            Some(bus) => bus,
            None => {
                error!("I2C interface is not available. Cannot read from ADC for channel {channel}.");
                return Err(MonitorError::HardwareUnavailable);
            }
        };

        if channel >= config.cells {
            let max = config.cells.saturating_sub(1);
            error!("Invalid channel number: {channel}. Expected 0 to {max}.");
            return Err(MonitorError::InvalidChannel { channel, max });
        }

        match Self::read_raw(bus.as_mut(), &config, channel).await {
            Ok(raw) => Ok(Some(compensate(raw, channel, &config))),
            Err(e) => {
                error!(
                    "I2C error reading channel {channel}: {e}. Check PCF8591 at address 0x{:02x}.",
                    config.device_address
                );
                Ok(None)
            }
        }
    }

    /// One full acquisition cycle: channels 0..N-1 in strict order.
    ///
    /// Hardware absence propagates immediately and atomically (it fires on
    /// channel 0, and no further channels are attempted). Transient per-channel
    /// failures keep their slot as a null reading and do not abort the rest of
    /// the cycle.
    pub async fn sample_all(&mut self) -> Result<Vec<CellReading>> {
        let mut readings = Vec::with_capacity(self.config.cells as usize);
        for channel in 0..self.config.cells {
            let voltage = self.sample(channel).await?;
            readings.push(CellReading::new(channel, voltage));
        }
        Ok(readings)
    }

    /// Drive the select/settle/discard/read sequence for one channel.
    async fn read_raw(
        bus: &mut dyn AdcBus,
        config: &SamplerConfig,
        channel: u8,
    ) -> std::result::Result<u8, BusError> {
        bus.write_byte(
            config.device_address,
            config.channel_select_base | channel,
        )?;
        tokio::time::sleep(config.settle_delay()).await;
        // The device returns the previous channel's stale conversion first.
        bus.read_byte(config.device_address)?;
        tokio::time::sleep(config.settle_delay()).await;
        bus.read_byte(config.device_address)
    }
}

/// Convert a raw ADC byte to a calibrated cell voltage.
fn compensate(raw: u8, channel: u8, config: &SamplerConfig) -> f64 {
    let voltage_at_pin = (raw as f64 / 255.0) * config.reference_voltage;
    let compensated = voltage_at_pin * config.compensation_factor;

    if compensated < config.functional_zero_threshold {
        info!(
            "Channel {channel} voltage {compensated:.3}V is below functional zero threshold {}V. Reporting as 0.0V.",
            config.functional_zero_threshold
        );
        return 0.0;
    }

    // Soft plausibility check only: out-of-band values are logged but still
    // returned, matching documented behavior.
    let max_expected = config.max_expected_voltage();
    if !(-0.5..=max_expected).contains(&compensated) {
        warn!(
            "Channel {channel} compensated voltage {compensated:.3}V is outside the expected range (-0.5V to {max_expected:.1}V)."
        );
    }

    round3(compensated)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::bus::mock::MockBus;
    use crate::acquisition::bus::BusError;

    fn sampler_with(bus: MockBus) -> CellSampler {
        CellSampler::new(Some(Box::new(bus)), SamplerConfig::default())
    }

    #[tokio::test]
    async fn test_sample_below_functional_zero() {
        // Raw 130 ~ 2.549V at factor 1.0, below the 2.6V threshold.
        let mut sampler = sampler_with(MockBus::with_reads(vec![0, 130]));
        let voltage = sampler.sample(0).await.unwrap();
        assert_eq!(voltage, Some(0.0));
    }

    #[tokio::test]
    async fn test_sample_above_functional_zero() {
        // Raw 200 ~ 3.922V.
        let mut sampler = sampler_with(MockBus::with_reads(vec![0, 200]));
        let voltage = sampler.sample(0).await.unwrap();
        assert_eq!(voltage, Some(3.922));
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        // Raw 133 is the smallest byte whose pin voltage (~2.608V) clears the
        // 2.6V threshold; raw 132 (~2.588V) must clamp to zero.
        let mut sampler = sampler_with(MockBus::with_reads(vec![0, 132]));
        assert_eq!(sampler.sample(0).await.unwrap(), Some(0.0));

        let mut sampler = sampler_with(MockBus::with_reads(vec![0, 133]));
        assert_eq!(sampler.sample(0).await.unwrap(), Some(2.608));
    }

    #[tokio::test]
    async fn test_invalid_channel_rejected_before_bus_access() {
        let mut sampler = sampler_with(MockBus::with_reads(vec![0, 200]));
        let err = sampler.sample(4).await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::InvalidChannel { channel: 4, max: 3 }
        ));
    }

    #[tokio::test]
    async fn test_hardware_absent_fails_fast() {
        let mut sampler = CellSampler::new(None, SamplerConfig::default());
        let err = sampler.sample(0).await.unwrap_err();
        assert!(err.is_hardware_unavailable());
        assert!(!sampler.hardware_available());
    }

    #[tokio::test]
    async fn test_transient_bus_fault_yields_null() {
        let mut bus = MockBus::with_reads(vec![0]);
        bus.push_read(Err(BusError::NoAck(0x48)));
        let mut sampler = sampler_with(bus);
        let voltage = sampler.sample(0).await.unwrap();
        assert_eq!(voltage, None);
    }

    #[test]
    fn test_channel_select_command_byte() {
        let mut bus = MockBus::with_reads(vec![0, 200]);
        let config = SamplerConfig::default();
        let raw = tokio_test::block_on(CellSampler::read_raw(&mut bus, &config, 1)).unwrap();
        assert_eq!(raw, 200);
        // Base command OR'd with the channel index.
        assert_eq!(bus.writes, vec![0x41]);
    }

    #[tokio::test]
    async fn test_sample_all_keeps_failed_slots() {
        // Channel 0 reads fine; channel 1's reads are exhausted and fail.
        let mut sampler = CellSampler::new(
            Some(Box::new(MockBus::with_reads(vec![0, 200]))),
            SamplerConfig::default().with_cells(3),
        );
        let readings = sampler.sample_all().await.unwrap();
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].voltage, Some(3.922));
        assert_eq!(readings[1].voltage, None);
        assert_eq!(readings[2].voltage, None);
        assert_eq!(readings[2].cell, 3);
        assert_eq!(readings[2].ain_channel, "AIN2");
    }

    #[tokio::test]
    async fn test_sample_all_propagates_hardware_absence() {
        let mut sampler = CellSampler::new(None, SamplerConfig::default());
        assert!(sampler.sample_all().await.is_err());
    }

    #[test]
    fn test_config_builders() {
        let config = SamplerConfig::default()
            .with_cells(8)
            .with_compensation_factor(2.0)
            .with_functional_zero_threshold(1.5)
            .with_device_address(0x49);
        assert_eq!(config.cells, 8);
        assert_eq!(config.compensation_factor, 2.0);
        assert_eq!(config.functional_zero_threshold, 1.5);
        assert_eq!(config.device_address, 0x49);
        assert_eq!(config.max_expected_voltage(), 10.5);
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(3.92156862745), 3.922);
        assert_eq!(round3(2.6), 2.6);
    }
}
