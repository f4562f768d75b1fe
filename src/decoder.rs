//! The `Decoder` trait: the engine's only way of consuming a codec.
//!
//! Grounded on `ym2149-common`'s `ChiptunePlayer` trait (`player.rs`):
//! `play`/`pause`/`stop`/`state`, `generate_samples_into` filling a caller
//! buffer with mono f32 samples, silence on non-playing state. This engine
//! generalizes that shape to non-interleaved multi-channel PCM and to an
//! explicit open/close/seek lifecycle for an external codec wrapper.

use crate::format::{AudioFormat, FRAMES_UNKNOWN};
use std::fmt;

/// A channel layout a decoder may report, used only to build a
/// [`crate::format::ChannelMap`] when it differs from the engine's
/// rendering layout. The concrete set of layouts (stereo, 5.1, ambisonic,
/// ...) is deliberately left to the host application; the core never
/// enumerates channel layouts itself.
pub trait ChannelLayout: fmt::Debug + Send {
    /// Number of channels in this layout.
    fn channel_count(&self) -> u16;
}

/// Result of one [`Decoder::read_audio`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramesProduced(pub usize);

/// External collaborator interface over a single audio codec. A `Decoder`
/// is read-only from the engine's perspective except during the decoding
/// thread's own calls into it: the engine mutates a decoder only from the
/// decoding thread, never from the realtime render callback.
///
/// Implementations are expected to decode on demand rather than eagerly
/// loading an entire stream, so the engine can treat `read_audio` as
/// bounded-latency work suitable for a background thread but never for the
/// realtime render callback.
pub trait Decoder: Send {
    /// Prepare the decoder for reading. Called once by the decoding thread
    /// before the first `read_audio`. Returns `Ok(())` on success;
    /// otherwise the decoding thread logs the error and treats the decoder
    /// as if it had immediately reached end-of-stream.
    fn open(&mut self) -> Result<(), crate::error::DecoderError>;

    /// Release any resources held by the decoder. Called exactly once, by
    /// the GC worker, after both `DecodingComplete` and `RenderingComplete`
    /// have been observed for this decoder's [`crate::decoder_state::DecoderState`].
    fn close(&mut self) -> Result<(), crate::error::DecoderError>;

    /// The format this decoder produces. Must be non-interleaved 32-bit
    /// float at construction of any frames it hands to `read_audio`; its
    /// sample rate and channel count must match the engine's rendering
    /// format or [`crate::Engine::enqueue`] rejects it.
    fn format(&self) -> AudioFormat;

    /// Channel layout, if known. When present and it differs from the
    /// engine's layout, the engine may build a [`crate::format::ChannelMap`]
    /// from it.
    fn channel_layout(&self) -> Option<Box<dyn ChannelLayout>> {
        None
    }

    /// Total frame count, or [`FRAMES_UNKNOWN`] if unknown.
    fn frame_length(&self) -> i64 {
        FRAMES_UNKNOWN
    }

    /// Current frame position, or [`FRAMES_UNKNOWN`] if unknown.
    fn frame_position(&self) -> i64 {
        FRAMES_UNKNOWN
    }

    /// Whether [`Decoder::seek_to_frame`] is supported.
    fn supports_seeking(&self) -> bool {
        false
    }

    /// Decode up to `buffers[*].len()` frames into `buffers` (one
    /// non-interleaved slice per input channel). Returns the number of
    /// frames actually produced; `0` signals end-of-stream.
    fn read_audio(
        &mut self,
        buffers: &mut [&mut [f32]],
    ) -> Result<FramesProduced, crate::error::DecoderError>;

    /// Seek to an absolute frame offset. Only called when
    /// [`Decoder::supports_seeking`] returns `true`.
    fn seek_to_frame(&mut self, frame: i64) -> Result<(), crate::error::DecoderError>;
}
