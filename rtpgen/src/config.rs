//! Generator configuration.
//!
//! Packetization defaults match a narrowband G.711 call leg: 8 kHz
//! samples, 30 ms per packet, static payload type 0 (PCMU).

use std::time::Duration;

use rtpgen_common::rtp::PAYLOAD_TYPE_PCMU;

use crate::error::GeneratorError;

/// Default packetization interval in milliseconds
pub const DEFAULT_PTIME_MS: u64 = 30;

/// Default RTP clock rate (narrowband telephony)
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Default payload type (G.711 mu-law)
pub const DEFAULT_PAYLOAD_TYPE: u8 = PAYLOAD_TYPE_PCMU;

/// Packetization parameters for one generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorConfig {
    // ---
    /// Nominal interval between packets
    pub ptime: Duration,

    /// RTP clock rate in Hz
    pub sample_rate: u32,

    /// Payload type written into every packet
    pub payload_type: u8,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        // ---
        Self {
            ptime: Duration::from_millis(DEFAULT_PTIME_MS),
            sample_rate: DEFAULT_SAMPLE_RATE,
            payload_type: DEFAULT_PAYLOAD_TYPE,
        }
    }
}

impl GeneratorConfig {
    // ---
    /// Checks that the parameters describe a whole number of samples per
    /// packet at a representable payload type.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), GeneratorError> {
        // ---
        if self.ptime.is_zero() {
            return Err(GeneratorError::InvalidConfig(
                "packetization interval must be non-zero".into(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(GeneratorError::InvalidConfig(
                "sample rate must be non-zero".into(),
            ));
        }
        if self.payload_type > 0x7F {
            return Err(GeneratorError::InvalidConfig(format!(
                "payload type {} does not fit in 7 bits",
                self.payload_type
            )));
        }

        let scaled = u128::from(self.sample_rate) * self.ptime.as_nanos();
        if scaled % 1_000_000_000 != 0 {
            return Err(GeneratorError::InvalidConfig(format!(
                "{:?} at {} Hz is not a whole number of samples",
                self.ptime, self.sample_rate
            )));
        }
        if scaled / 1_000_000_000 > u128::from(u32::MAX) {
            return Err(GeneratorError::InvalidConfig(format!(
                "{:?} at {} Hz overflows the RTP timestamp step",
                self.ptime, self.sample_rate
            )));
        }

        Ok(())
    }

    /// Samples carried by one packet (240 for 30 ms at 8 kHz).
    ///
    /// Only meaningful for a configuration that passed [`validate`].
    ///
    /// [`validate`]: GeneratorConfig::validate
    pub fn samples_per_packet(&self) -> u32 {
        // ---
        let samples = u128::from(self.sample_rate) * self.ptime.as_nanos() / 1_000_000_000;
        u32::try_from(samples).unwrap_or(u32::MAX)
    }

    /// Packetization interval in whole milliseconds, for logging.
    pub fn ptime_ms(&self) -> u128 {
        // ---
        self.ptime.as_millis()
    }
}
