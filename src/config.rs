//! Engine configuration, grounded on `StreamConfig` (`ring_buffer_size`,
//! `sample_rate`, `channels`, `low_latency`/`stable` presets,
//! `latency_ms()`).

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::format::AudioFormat;

/// Engine construction parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The engine's fixed rendering format. Every enqueued decoder must
    /// match this exactly.
    pub format: AudioFormat,
    /// Requested ring buffer capacity in frames; rounded up to the next
    /// power of two by [`crate::ring_buffer::RingBuffer::allocate`].
    pub ring_buffer_capacity_frames: usize,
}

impl EngineConfig {
    /// A configuration tuned for low latency: a small ring buffer (≈93ms at
    /// 44.1kHz), matching `StreamConfig::low_latency`.
    pub fn low_latency(format: AudioFormat) -> Self {
        Self {
            format,
            ring_buffer_capacity_frames: 4096,
        }
    }

    /// A configuration tuned for stability against underrun: a larger ring
    /// buffer (≈372ms at 44.1kHz), matching `StreamConfig::stable`.
    pub fn stable(format: AudioFormat) -> Self {
        Self {
            format,
            ring_buffer_capacity_frames: 16384,
        }
    }

    /// Approximate buffered latency in milliseconds at this configuration's
    /// sample rate, before rounding the capacity up to a power of two.
    pub fn latency_ms(&self) -> f32 {
        (self.ring_buffer_capacity_frames as f32 / self.format.sample_rate as f32) * 1000.0
    }

    /// Validate this configuration, returning
    /// [`EngineError::InvalidConfiguration`] for a malformed format or a
    /// zero-frame ring buffer request.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.format.is_valid() {
            return Err(EngineError::InvalidConfiguration(format!(
                "invalid rendering format: {:?}",
                self.format
            )));
        }
        if self.ring_buffer_capacity_frames == 0 {
            return Err(EngineError::InvalidConfiguration(
                "ring_buffer_capacity_frames must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::stable(AudioFormat::new(44_100, 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_latency_is_under_100ms_at_44_1khz() {
        let cfg = EngineConfig::low_latency(AudioFormat::new(44_100, 2));
        assert!(cfg.latency_ms() < 100.0);
    }

    #[test]
    fn stable_is_over_300ms_at_44_1khz() {
        let cfg = EngineConfig::stable(AudioFormat::new(44_100, 2));
        assert!(cfg.latency_ms() > 300.0);
    }

    #[test]
    fn validate_rejects_zero_sample_rate() {
        let cfg = EngineConfig::stable(AudioFormat::new(0, 2));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut cfg = EngineConfig::stable(AudioFormat::new(44_100, 2));
        cfg.ring_buffer_capacity_frames = 0;
        assert!(cfg.validate().is_err());
    }
}
