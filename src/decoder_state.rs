//! Per-decoder bookkeeping shared between the decoding thread and the
//! realtime render callback.

use bitflags::bitflags;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::decoder::Decoder;
use crate::error::DecoderError;
use crate::format::{ChannelMap, FRAMES_UNKNOWN};
use crate::ring_buffer::RingBufferWriter;

bitflags! {
    /// Lifecycle flags for a [`DecoderState`], grounded on `MixerFlags` in
    /// `ym2149/mixer.rs`: a small bitflags word read and written atomically
    /// rather than a boolean per event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DecoderFlags: u8 {
        /// `Decoder::open` has succeeded and decoding has begun.
        const DECODING_STARTED   = 0b0000_0001;
        /// The decoder reached end-of-stream and all its frames have been
        /// written to the ring.
        const DECODING_COMPLETE  = 0b0000_0010;
        /// The decoder was canceled via `cancel_current_decoder`.
        const DECODING_CANCELED  = 0b0000_0100;
        /// The render callback has consumed at least one frame from this
        /// decoder.
        const RENDERING_STARTED  = 0b0000_1000;
        /// `framesRendered == framesDecoded` and `DECODING_COMPLETE` is set.
        const RENDERING_COMPLETE = 0b0001_0000;
    }
}

/// Per-decoder counters and flags, created when a decoder becomes
/// "current" and retired through the GC channel once both
/// `DECODING_COMPLETE` and `RENDERING_COMPLETE` are observed.
///
/// `frames_decoded`/`frames_rendered` are plain atomics rather than a
/// lock-free queue entry: the decoding thread only ever increments
/// `frames_decoded`, the render callback only ever increments
/// `frames_rendered`, and both are read by API threads for position
/// snapshots. No field here is ever written by more than one thread role.
pub struct DecoderState {
    /// Engine-assigned sequence number, monotonically increasing, used to
    /// disambiguate decoders in logs and tests.
    pub sequence: u64,
    /// The decoder this state tracks. Only the decoding thread calls
    /// through to it.
    decoder: Mutex<Box<dyn Decoder>>,
    flags: std::sync::atomic::AtomicU8,
    frames_decoded: AtomicI64,
    frames_rendered: AtomicI64,
    /// Copied from `decoder.frame_length()` at open; may be
    /// [`FRAMES_UNKNOWN`].
    total_frames: AtomicI64,
    /// Frame offset of the most recent seek (or 0), added to
    /// `frames_rendered` for [`DecoderState::position_snapshot`].
    seek_origin: AtomicI64,
    channel_map: Option<ChannelMap>,
    /// Set by the decoding thread when a cooperative discard/flush is in
    /// progress; the render callback
    /// checks this and advances past this decoder's frames as silence.
    discard: std::sync::atomic::AtomicBool,
    /// Monotonic clock, bumped whenever this generation's position
    /// accounting is reset by a seek, so stale reads from before the seek
    /// can be told apart from fresh ones if ever needed by a caller.
    generation: AtomicU64,
}

impl DecoderState {
    /// Create a new state for `decoder`, assigning `sequence`, capturing
    /// `decoder.frame_length()`, and storing whatever `channel_map` the
    /// caller derived from `decoder.channel_layout()` (or `None`, if the
    /// decoder reported no layout or one the engine's format can't use).
    /// Does not call `decoder.open()`; the decoding thread does that as a
    /// separate step.
    pub fn new(
        sequence: u64,
        decoder: Box<dyn Decoder>,
        channel_map: Option<ChannelMap>,
    ) -> Self {
        let total_frames = decoder.frame_length();
        Self {
            sequence,
            decoder: Mutex::new(decoder),
            flags: std::sync::atomic::AtomicU8::new(0),
            frames_decoded: AtomicI64::new(0),
            frames_rendered: AtomicI64::new(0),
            total_frames: AtomicI64::new(total_frames),
            seek_origin: AtomicI64::new(0),
            channel_map,
            discard: std::sync::atomic::AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Open the underlying decoder. Called once by the decoding thread.
    pub fn open(&self) -> Result<(), DecoderError> {
        let mut guard = self.decoder.lock().unwrap();
        guard.open()?;
        self.total_frames
            .store(guard.frame_length(), Ordering::Relaxed);
        Ok(())
    }

    /// Close the underlying decoder. Called once by the GC worker.
    pub fn close(&self) -> Result<(), DecoderError> {
        self.decoder.lock().unwrap().close()
    }

    /// Whether the underlying decoder supports seeking.
    pub fn supports_seeking(&self) -> bool {
        self.decoder.lock().unwrap().supports_seeking()
    }

    /// Seek the underlying decoder and reset frame accounting against the
    /// new origin.
    pub fn seek_to_frame(&self, frame: i64) -> Result<(), DecoderError> {
        self.decoder.lock().unwrap().seek_to_frame(frame)?;
        self.seek_origin.store(frame, Ordering::Relaxed);
        self.frames_decoded.store(0, Ordering::Relaxed);
        self.frames_rendered.store(0, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Decode a batch of frames from the underlying decoder into
    /// `scratch` (one `Vec<f32>` per input channel, reused across calls to
    /// avoid allocating on every decode pass), then copy them into `ring`
    /// applying this decoder's channel map if present. Returns the number
    /// of frames written to the ring and whether the decoder reported
    /// end-of-stream (`read_audio` returned 0 frames).
    ///
    /// Called only by the decoding thread.
    pub fn decode_into(
        &self,
        ring: &mut RingBufferWriter,
        scratch: &mut [Vec<f32>],
        batch_frames: usize,
    ) -> Result<(usize, bool), DecoderError> {
        for ch in scratch.iter_mut() {
            ch.clear();
            ch.resize(batch_frames, 0.0);
        }

        let produced = {
            let mut guard = self.decoder.lock().unwrap();
            let mut refs: Vec<&mut [f32]> = scratch.iter_mut().map(|v| v.as_mut_slice()).collect();
            guard.read_audio(&mut refs)?.0
        };

        if produced == 0 {
            return Ok((0, true));
        }

        let written = match &self.channel_map {
            None => {
                let refs: Vec<&[f32]> = scratch.iter().map(|v| &v[..produced]).collect();
                ring.write(&refs, produced)
            }
            Some(map) => {
                let mapped: Vec<&[f32]> = (0..map.output_channels())
                    .map(|out_ch| {
                        let in_ch = map.input_channel_for(out_ch);
                        &scratch[in_ch][..produced]
                    })
                    .collect();
                ring.write(&mapped, produced)
            }
        };

        self.frames_decoded
            .fetch_add(written as i64, Ordering::Release);

        Ok((written, false))
    }

    /// Lock-free snapshot of `(frame_position, frame_length)` for API
    /// queries.
    pub fn position_snapshot(&self) -> (i64, i64) {
        let total = self.total_frames.load(Ordering::Relaxed);
        let rendered = self.frames_rendered.load(Ordering::Acquire);
        let origin = self.seek_origin.load(Ordering::Relaxed);
        (origin + rendered, total)
    }

    /// Frames the decoding thread has published into the ring so far.
    pub fn frames_decoded(&self) -> i64 {
        self.frames_decoded.load(Ordering::Acquire)
    }

    /// Frames the render callback has consumed from this decoder so far.
    pub fn frames_rendered(&self) -> i64 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    /// Called by the render callback as it consumes frames attributable to
    /// this decoder.
    pub fn add_frames_rendered(&self, frames: i64) {
        self.frames_rendered.fetch_add(frames, Ordering::AcqRel);
    }

    /// Set one or more flags.
    pub fn set_flag(&self, flags: DecoderFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Test whether all of `flags` are set.
    pub fn test_flag(&self, flags: DecoderFlags) -> bool {
        let bits = self.flags.load(Ordering::Acquire);
        DecoderFlags::from_bits_truncate(bits).contains(flags)
    }

    /// Current flag word snapshot.
    pub fn flags(&self) -> DecoderFlags {
        DecoderFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Mark this decoder for cooperative discard.
    pub fn set_discard(&self, discard: bool) {
        self.discard.store(discard, Ordering::Release);
    }

    /// Whether this decoder is currently marked for discard.
    pub fn is_discarding(&self) -> bool {
        self.discard.load(Ordering::Acquire)
    }

    /// Whether rendering of this decoder has fully completed: every frame
    /// the decoding thread published has been rendered, and decoding has
    /// finished. This is the gapless-boundary test that triggers promoting
    /// the next decoder without inserting silence.
    pub fn is_fully_rendered(&self) -> bool {
        self.test_flag(DecoderFlags::DECODING_COMPLETE)
            && self.frames_rendered() >= self.frames_decoded()
    }
}
