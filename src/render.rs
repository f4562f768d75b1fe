//! The realtime render callback.
//!
//! Grounded on `RealtimePlayer::render_block` in `streaming.rs`: a tight
//! loop pulling from a ring buffer into a host-owned output buffer,
//! zero-filling whatever the ring could not supply. This version adds the
//! gapless boundary detection and event emission a multi-track engine
//! requires, and never takes the ring buffer's producer-side lock — only
//! [`crate::ring_buffer::RingBufferReader`], which is lock-free.
//!
//! Every call into this type must come from the single realtime thread the
//! host drives it from. Nothing here allocates, blocks, locks, or performs
//! I/O: [`crate::decoder_slots::DecoderSlots`], the current/next decoder
//! pointers this type reads every call, is a wait-free
//! `arc_swap::ArcSwapOption` handoff for exactly that reason.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::decoder_slots::DecoderSlots;
use crate::decoder_state::DecoderFlags;
use crate::event::{EventSender, Notification};
use crate::gc::GcSender;
use crate::wake::Waker;

/// The realtime consumer of the ring buffer. Owned by whatever the host
/// uses to drive playback (an audio callback, a dedicated thread loop in a
/// test, ...).
pub struct RenderCallback {
    reader: crate::ring_buffer::RingBufferReader,
    slots: Arc<DecoderSlots>,
    events: EventSender,
    gc: GcSender,
    decode_waker: Arc<Waker>,
    paused: Arc<AtomicBool>,
    /// Bumped every time [`RingBufferReader::discard_and_reset`] runs, so the
    /// engine thread driving a flush/seek/cancel can poll for the
    /// acknowledgement instead of guessing how many render passes to wait.
    flush_ack: Arc<AtomicU64>,
}

impl RenderCallback {
    pub(crate) fn new(
        reader: crate::ring_buffer::RingBufferReader,
        slots: Arc<DecoderSlots>,
        events: EventSender,
        gc: GcSender,
        decode_waker: Arc<Waker>,
        paused: Arc<AtomicBool>,
        flush_ack: Arc<AtomicU64>,
    ) -> Self {
        Self {
            reader,
            slots,
            events,
            gc,
            decode_waker,
            paused,
            flush_ack,
        }
    }

    /// Render up to `frame_count` frames into `output` (one slice per
    /// channel, each at least `frame_count` long), starting at `host_time`
    /// (an opaque timestamp passed through verbatim to
    /// [`Notification::RenderingWillStart`]). Always returns `frame_count`:
    /// any shortfall from an empty ring, a paused engine, or no current
    /// decoder is zero-filled rather than reported as a short read.
    pub fn render(&mut self, host_time: u64, frame_count: usize, output: &mut [&mut [f32]]) -> usize {
        if self.paused.load(Ordering::Acquire) {
            zero_fill(output, 0, frame_count);
            return frame_count;
        }

        let mut filled = 0usize;
        while filled < frame_count {
            let Some(current) = self.slots.peek_current() else {
                break;
            };

            if current.is_discarding() {
                // Collapsing the read cursor onto the write cursor is
                // itself the acknowledgement the decoding thread waits for;
                // zeroing both afterward is safe only because the decoding
                // thread has stopped advancing `write_cursor` for as long as
                // this flag is set (see `decode_thread::feed`).
                self.reader.discard_and_reset();
                self.flush_ack.fetch_add(1, Ordering::Release);
                break;
            }

            let owed = (current.frames_decoded() - current.frames_rendered()).max(0) as usize;

            if owed == 0 {
                if current.test_flag(DecoderFlags::DECODING_COMPLETE) {
                    // DecodingComplete is published here, not by the decoding
                    // thread, so that for any decoder that ever produced a
                    // frame it is observed after RenderingStarted. A decoder whose
                    // FrameLength is 0 never sets RENDERING_STARTED, so it
                    // gets DecodingComplete with no rendering events at all.
                    self.events.publish(Notification::DecodingComplete {
                        sequence: current.sequence,
                    });
                    if current.test_flag(DecoderFlags::RENDERING_STARTED) {
                        current.set_flag(DecoderFlags::RENDERING_COMPLETE);
                        self.events.publish(Notification::RenderingComplete {
                            sequence: current.sequence,
                        });
                    }
                    if let Some(retired) = self.slots.promote_next() {
                        self.gc.retire(retired);
                        self.decode_waker.notify();
                        continue;
                    } else {
                        if let Some(retired) = self.slots.take_current() {
                            self.gc.retire(retired);
                        }
                        self.events.publish(Notification::EndOfAudio);
                        break;
                    }
                } else {
                    // Underrun: the decoding thread hasn't kept up.
                    break;
                }
            }

            if !current.test_flag(DecoderFlags::RENDERING_STARTED) {
                self.events.publish(Notification::RenderingWillStart {
                    sequence: current.sequence,
                    host_time,
                });
                current.set_flag(DecoderFlags::RENDERING_STARTED);
                self.events.publish(Notification::RenderingStarted {
                    sequence: current.sequence,
                });
            }

            let available = self.reader.frames_available_to_read();
            let take = (frame_count - filled).min(available).min(owed);
            if take == 0 {
                break;
            }

            let mut dst: Vec<&mut [f32]> = output
                .iter_mut()
                .map(|channel| &mut channel[filled..filled + take])
                .collect();
            let read = self.reader.read(&mut dst, take);
            current.add_frames_rendered(read as i64);
            filled += read;
            self.decode_waker.notify();
            if read < take {
                break;
            }
        }

        zero_fill(output, filled, frame_count - filled);
        frame_count
    }
}

fn zero_fill(output: &mut [&mut [f32]], offset: usize, count: usize) {
    for channel in output.iter_mut() {
        for sample in &mut channel[offset..offset + count] {
            *sample = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Decoder, FramesProduced};
    use crate::decoder_state::DecoderState;
    use crate::error::DecoderError;
    use crate::event::channel as event_channel;
    use crate::format::AudioFormat;
    use crate::gc::channel as gc_channel;
    use crate::ring_buffer::{RingBuffer, RingBufferReader, RingBufferWriter};

    struct FixedDecoder {
        remaining: usize,
        value: f32,
    }

    impl Decoder for FixedDecoder {
        fn open(&mut self) -> Result<(), DecoderError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), DecoderError> {
            Ok(())
        }
        fn format(&self) -> AudioFormat {
            AudioFormat::new(48_000, 1)
        }
        fn read_audio(&mut self, buffers: &mut [&mut [f32]]) -> Result<FramesProduced, DecoderError> {
            let n = buffers[0].len().min(self.remaining);
            for sample in &mut buffers[0][..n] {
                *sample = self.value;
            }
            self.remaining -= n;
            Ok(FramesProduced(n))
        }
        fn seek_to_frame(&mut self, _frame: i64) -> Result<(), DecoderError> {
            Ok(())
        }
    }

    /// Fully decodes `sequence` (a constant-`value` stream of `frames`
    /// frames) into `writer`, marking it `DECODING_COMPLETE` at EOS.
    fn decode_fully(writer: &mut RingBufferWriter, sequence: u64, frames: usize, value: f32) -> Arc<DecoderState> {
        let state = Arc::new(DecoderState::new(
            sequence,
            Box::new(FixedDecoder {
                remaining: frames,
                value,
            }),
            None,
        ));
        state.open().unwrap();
        let mut scratch = vec![Vec::new()];
        loop {
            let (_written, eof) = state.decode_into(writer, &mut scratch, 256).unwrap();
            if eof {
                state.set_flag(DecoderFlags::DECODING_COMPLETE);
                break;
            }
        }
        state
    }

    fn make_callback(
        reader: RingBufferReader,
        slots: Arc<DecoderSlots>,
    ) -> (RenderCallback, crate::event::EventReceiver, crate::gc::GcReceiver) {
        let (events_tx, events_rx) = event_channel();
        let (gc_tx, gc_rx) = gc_channel();
        let callback = RenderCallback::new(
            reader,
            slots,
            events_tx,
            gc_tx,
            Arc::new(Waker::new()),
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicU64::new(0)),
        );
        (callback, events_rx, gc_rx)
    }

    #[test]
    fn discarding_decoder_collapses_the_ring_and_bumps_flush_ack() {
        let (mut writer, reader) = RingBuffer::allocate(1, 1024).unwrap();
        let state = decode_fully(&mut writer, 0, 10, 1.0);
        state.set_discard(true);

        let slots = Arc::new(DecoderSlots::new());
        slots.install_current(state);
        let (mut callback, _events, _gc) = make_callback(reader, slots);

        let mut out = vec![9.0f32; 10];
        let mut out_refs: Vec<&mut [f32]> = vec![out.as_mut_slice()];
        callback.render(0, 10, &mut out_refs);

        assert!(out_refs[0].iter().all(|&s| s == 0.0));
        assert_eq!(callback.flush_ack.load(Ordering::Acquire), 1);
    }

    #[test]
    fn renders_a_single_fully_decoded_stream_and_emits_start_events() {
        let (mut writer, reader) = RingBuffer::allocate(1, 1024).unwrap();
        let state = decode_fully(&mut writer, 0, 100, 0.5);

        let slots = Arc::new(DecoderSlots::new());
        slots.install_current(state);
        let (mut callback, events, _gc) = make_callback(reader, slots);

        let mut out = vec![0.0f32; 50];
        let mut out_refs: Vec<&mut [f32]> = vec![out.as_mut_slice()];
        let produced = callback.render(0, 50, &mut out_refs);
        assert_eq!(produced, 50);
        assert!(out_refs[0].iter().all(|&s| s == 0.5));

        let mut saw_will_start = false;
        let mut saw_started = false;
        while let Some(event) = events.try_recv() {
            match event {
                Notification::RenderingWillStart { sequence, .. } => {
                    assert_eq!(sequence, 0);
                    saw_will_start = true;
                }
                Notification::RenderingStarted { sequence } => {
                    assert_eq!(sequence, 0);
                    saw_started = true;
                }
                _ => {}
            }
        }
        assert!(saw_will_start && saw_started);
    }

    #[test]
    fn gapless_boundary_promotes_next_decoder_within_one_render_pass() {
        // The decoding thread writes decoder A's frames, then decoder B's,
        // into the same ring without waiting for a render pass in between —
        // exactly what it does at a real gapless transition.
        let (mut writer, reader) = RingBuffer::allocate(1, 1024).unwrap();
        let state_a = decode_fully(&mut writer, 0, 10, 1.0);
        let state_b = decode_fully(&mut writer, 1, 10, -1.0);

        let slots = Arc::new(DecoderSlots::new());
        slots.install_current(state_a);
        slots.install_next(state_b);
        let (mut callback, events, gc) = make_callback(reader, slots.clone());

        let mut out = vec![0.0f32; 20];
        let mut out_refs: Vec<&mut [f32]> = vec![out.as_mut_slice()];
        let produced = callback.render(0, 20, &mut out_refs);
        assert_eq!(produced, 20);
        assert!(out_refs[0][..10].iter().all(|&s| s == 1.0));
        assert!(out_refs[0][10..20].iter().all(|&s| s == -1.0));

        assert_eq!(slots.peek_current().unwrap().sequence, 1);
        assert!(slots.peek_next().is_none());
        assert!(gc.try_recv().is_some());

        let saw_complete_zero = std::iter::from_fn(|| events.try_recv()).any(|event| {
            matches!(event, Notification::RenderingComplete { sequence: 0 })
        });
        assert!(saw_complete_zero);
    }

    #[test]
    fn end_of_audio_emitted_once_when_no_successor_is_queued() {
        let (mut writer, reader) = RingBuffer::allocate(1, 1024).unwrap();
        let state = decode_fully(&mut writer, 0, 10, 0.25);

        let slots = Arc::new(DecoderSlots::new());
        slots.install_current(state);
        let (mut callback, events, _gc) = make_callback(reader, slots.clone());

        let mut out = vec![9.0f32; 20];
        let mut out_refs: Vec<&mut [f32]> = vec![out.as_mut_slice()];
        callback.render(0, 20, &mut out_refs);

        assert!(slots.peek_current().is_none());
        assert!(out_refs[0][..10].iter().all(|&s| s == 0.25));
        assert!(out_refs[0][10..].iter().all(|&s| s == 0.0));

        let end_of_audio_count = std::iter::from_fn(|| events.try_recv())
            .filter(|event| matches!(event, Notification::EndOfAudio))
            .count();
        assert_eq!(end_of_audio_count, 1);
    }

    #[test]
    fn underrun_zero_fills_the_remainder_without_completing_the_decoder() {
        let (mut writer, reader) = RingBuffer::allocate(1, 1024).unwrap();
        let state = Arc::new(DecoderState::new(
            0,
            Box::new(FixedDecoder {
                remaining: 5,
                value: 1.0,
            }),
            None,
        ));
        state.open().unwrap();
        let mut scratch = vec![Vec::new()];
        // Decode only the 5 available frames; do not mark DECODING_COMPLETE,
        // simulating a decoding thread that has merely fallen behind.
        state.decode_into(&mut writer, &mut scratch, 256).unwrap();

        let slots = Arc::new(DecoderSlots::new());
        slots.install_current(state.clone());
        let (mut callback, events, _gc) = make_callback(reader, slots.clone());

        let mut out = vec![9.0f32; 10];
        let mut out_refs: Vec<&mut [f32]> = vec![out.as_mut_slice()];
        callback.render(0, 10, &mut out_refs);

        assert!(out_refs[0][..5].iter().all(|&s| s == 1.0));
        assert!(out_refs[0][5..].iter().all(|&s| s == 0.0));
        assert!(slots.peek_current().is_some());
        assert!(!std::iter::from_fn(|| events.try_recv())
            .any(|event| matches!(event, Notification::RenderingComplete { .. })));
    }

    #[test]
    fn paused_engine_renders_silence_without_touching_the_ring() {
        let (mut writer, reader) = RingBuffer::allocate(1, 1024).unwrap();
        let state = decode_fully(&mut writer, 0, 10, 1.0);

        let slots = Arc::new(DecoderSlots::new());
        slots.install_current(state);
        let (mut callback, _events, _gc) = make_callback(reader, slots);
        callback.paused.store(true, Ordering::Release);

        let mut out = vec![9.0f32; 10];
        let mut out_refs: Vec<&mut [f32]> = vec![out.as_mut_slice()];
        callback.render(0, 10, &mut out_refs);
        assert!(out_refs[0].iter().all(|&s| s == 0.0));
    }
}
