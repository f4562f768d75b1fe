//! Fixed PCM rendering format and channel-layout mapping.
//!
//! The engine's rendering format is always non-interleaved 32-bit float;
//! only sample rate and channel count vary.

use serde::{Deserialize, Serialize};

/// Descriptor of a PCM stream's sample rate and channel count.
///
/// Sample representation (32-bit float) and interleaving (non-interleaved)
/// are fixed crate-wide and therefore not fields of this type; a decoder's
/// own conversion to that representation is its responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz. Must be positive.
    pub sample_rate: u32,
    /// Channel count. Must be at least 1.
    pub channels: u16,
}

impl AudioFormat {
    /// Construct a format descriptor.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Whether this format is well-formed (positive rate, at least one
    /// channel). Checked at engine construction and at decoder enqueue.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }

    /// Whether `other` produces frames this format can render without
    /// conversion, i.e. matching sample rate and channel count.
    pub fn matches(&self, other: &AudioFormat) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }
}

/// A permutation from output channel index to input channel index, applied
/// by [`crate::decoder_state::DecoderState::decode_into`] while copying
/// decoded samples into the ring buffer.
///
/// `map[output_channel] = input_channel`. A decoder with no channel layout
/// information, or one whose layout already matches the engine's, has no
/// `ChannelMap` and frames are copied verbatim.
#[derive(Debug, Clone)]
pub struct ChannelMap {
    map: Vec<usize>,
}

impl ChannelMap {
    /// Build a channel map. `map[output_channel]` must be a valid index
    /// into the decoder's input channels; `map.len()` must equal the
    /// engine's channel count.
    pub fn new(map: Vec<usize>) -> Self {
        Self { map }
    }

    /// The identity map: output channel `i` reads input channel `i`.
    pub fn identity(channels: u16) -> Self {
        Self {
            map: (0..channels as usize).collect(),
        }
    }

    /// Source input-channel index for a given output channel.
    pub fn input_channel_for(&self, output_channel: usize) -> usize {
        self.map[output_channel]
    }

    /// Number of output channels this map produces.
    pub fn output_channels(&self) -> usize {
        self.map.len()
    }
}

/// Sentinel frame count meaning "unknown" (e.g. a non-seekable stream).
pub const FRAMES_UNKNOWN: i64 = -1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_requires_rate_and_channels() {
        let a = AudioFormat::new(48_000, 2);
        let b = AudioFormat::new(48_000, 2);
        let c = AudioFormat::new(44_100, 2);
        let d = AudioFormat::new(48_000, 1);
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert!(!a.matches(&d));
    }

    #[test]
    fn invalid_formats_are_rejected() {
        assert!(!AudioFormat::new(0, 2).is_valid());
        assert!(!AudioFormat::new(48_000, 0).is_valid());
        assert!(AudioFormat::new(48_000, 2).is_valid());
    }

    #[test]
    fn identity_map_passes_through() {
        let map = ChannelMap::identity(2);
        assert_eq!(map.input_channel_for(0), 0);
        assert_eq!(map.input_channel_for(1), 1);
    }
}
