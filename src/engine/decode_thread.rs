//! The decoding-thread state machine.
//!
//! [`step`] performs exactly one unit of work — handle a pending control
//! request, open a decoder, feed the ring, or wait — and returns whether it
//! did anything. [`run`] is the loop the real background thread executes;
//! tests call `step` directly so the state machine can be driven
//! deterministically without relying on scheduling or timeouts.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::decoder::Decoder;
use crate::decoder_state::{DecoderFlags, DecoderState};
use crate::event::Notification;

use super::{ControlRequest, EngineInner};

/// Frames pulled from a `Decoder` per `decode_into` call. Matches
/// `streaming.rs`'s `STREAM_CHUNK_FRAMES` batch size.
const BATCH_FRAMES: usize = 1024;

const IDLE_WAIT: Duration = Duration::from_millis(200);
const RING_FULL_WAIT: Duration = Duration::from_millis(20);
const FLUSH_POLL: Duration = Duration::from_millis(2);

enum TargetSlot {
    Current,
    Next,
}

pub(super) fn run(inner: &Arc<EngineInner>) {
    while !inner.shutdown.load(Ordering::Acquire) {
        step(inner);
    }
}

/// Perform one unit of decoding-thread work. Returns `true` if it made
/// forward progress (so a test driving this directly can loop "while
/// step(...) { }" to reach quiescence).
pub(super) fn step(inner: &Arc<EngineInner>) -> bool {
    if let Some(request) = inner.take_control_request() {
        match request {
            ControlRequest::Stop => do_stop(inner),
            ControlRequest::Cancel => do_cancel(inner),
            ControlRequest::Seek(frame) => do_seek(inner, frame),
        }
        return true;
    }

    if !inner.slots.has_current() {
        return match inner.queue.dequeue() {
            Some((sequence, decoder)) => {
                open_and_install(inner, sequence, decoder, TargetSlot::Current);
                true
            }
            None => {
                inner.decode_waker.wait_timeout(IDLE_WAIT);
                false
            }
        };
    }

    let current = inner.slots.peek_current().expect("has_current just returned true");

    if !current.test_flag(DecoderFlags::DECODING_COMPLETE) {
        return feed(inner, &current);
    }

    if inner.slots.has_next() {
        inner.decode_waker.wait_timeout(IDLE_WAIT);
        return false;
    }

    match inner.queue.dequeue() {
        Some((sequence, decoder)) => {
            open_and_install(inner, sequence, decoder, TargetSlot::Next);
            true
        }
        None => {
            inner.decode_waker.wait_timeout(IDLE_WAIT);
            false
        }
    }
}

fn open_and_install(
    inner: &Arc<EngineInner>,
    sequence: u64,
    decoder: Box<dyn Decoder>,
    slot: TargetSlot,
) {
    let channel_map = decoder.channel_layout().and_then(|layout| {
        let reported = layout.channel_count();
        if reported == inner.format.channels {
            Some(crate::format::ChannelMap::identity(reported))
        } else {
            tracing::warn!(
                sequence,
                reported_channels = reported,
                engine_channels = inner.format.channels,
                "decoder reported a channel layout that does not match the engine's channel count; ignoring it"
            );
            None
        }
    });
    let state = Arc::new(DecoderState::new(sequence, decoder, channel_map));
    match state.open() {
        Ok(()) => {
            tracing::debug!(sequence, "decoder opened");
            state.set_flag(DecoderFlags::DECODING_STARTED);
            inner.events.publish(Notification::DecodingStarted { sequence });
        }
        Err(err) => {
            tracing::error!(sequence, error = %err, "decoder open failed");
            inner.events.publish(Notification::Error {
                sequence: Some(sequence),
                message: err.to_string(),
            });
            // A failed open behaves like immediate end-of-stream. The render
            // callback publishes DecodingComplete once it observes this flag
            // (render.rs), so ordering against RenderingStarted holds even here.
            state.set_flag(DecoderFlags::DECODING_STARTED | DecoderFlags::DECODING_COMPLETE);
        }
    }

    match slot {
        TargetSlot::Current => inner.slots.install_current(state),
        TargetSlot::Next => inner.slots.install_next(state),
    }
}

/// Feed one batch from `current` into the ring. Returns whether any work
/// happened (a batch was decoded, or end-of-stream was newly observed).
fn feed(inner: &Arc<EngineInner>, current: &Arc<DecoderState>) -> bool {
    if current.is_discarding() {
        inner.decode_waker.wait_timeout(RING_FULL_WAIT);
        return false;
    }

    let mut writer = inner.ring_writer.lock();
    if writer.frames_available_to_write() == 0 {
        drop(writer);
        inner.decode_waker.wait_timeout(RING_FULL_WAIT);
        return false;
    }

    let mut scratch = inner.scratch.lock();
    match current.decode_into(&mut writer, &mut scratch, BATCH_FRAMES) {
        Ok((_written, eof)) => {
            // The render callback publishes DecodingComplete once it
            // observes this flag (render.rs), guaranteeing it is seen after
            // RenderingStarted for any decoder that produced a frame.
            if eof {
                tracing::debug!(sequence = current.sequence, "decoder reached end of stream");
                current.set_flag(DecoderFlags::DECODING_COMPLETE);
            }
            true
        }
        Err(err) => {
            tracing::error!(sequence = current.sequence, error = %err, "decoder read failed");
            inner.events.publish(Notification::Error {
                sequence: Some(current.sequence),
                message: err.to_string(),
            });
            current.set_flag(DecoderFlags::DECODING_COMPLETE);
            true
        }
    }
}

/// Block until the render callback has acknowledged a discard (or shutdown
/// is requested). The decoding thread may block; the realtime thread never
/// does.
fn wait_for_flush_ack(inner: &Arc<EngineInner>, baseline: u64) {
    while inner.flush_ack.load(Ordering::Acquire) == baseline {
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        std::thread::sleep(FLUSH_POLL);
    }
}

fn do_cancel(inner: &Arc<EngineInner>) {
    let Some(current) = inner.slots.peek_current() else {
        return;
    };

    tracing::debug!(sequence = current.sequence, "canceling decoder");
    let baseline = inner.flush_ack.load(Ordering::Acquire);
    current.set_discard(true);
    wait_for_flush_ack(inner, baseline);

    let partially_rendered = current.frames_rendered() > 0;
    current.set_flag(DecoderFlags::DECODING_CANCELED);
    inner.events.publish(Notification::DecodingCanceled {
        sequence: current.sequence,
        partially_rendered,
    });

    if let Some(retired) = inner.slots.take_current() {
        inner.gc.retire(retired);
    }

    // An already-opened successor was only ever waiting for the outgoing
    // decoder to finish rendering; promote it immediately rather than
    // leaving the realtime side with no current decoder.
    if let Some(next) = inner.slots.take_next() {
        inner.slots.install_current(next);
    }
}

fn do_stop(inner: &Arc<EngineInner>) {
    if inner.slots.has_current() {
        do_cancel(inner);
    }
    if let Some(next) = inner.slots.take_next() {
        inner.gc.retire(next);
    }
    inner.queue.clear();
    inner.paused.store(true, Ordering::Release);
}

fn do_seek(inner: &Arc<EngineInner>, target_frame: i64) {
    let Some(current) = inner.slots.peek_current() else {
        return;
    };

    if !current.supports_seeking() {
        tracing::warn!(sequence = current.sequence, "seek requested on non-seekable decoder");
        inner.events.publish(Notification::Error {
            sequence: Some(current.sequence),
            message: "decoder does not support seeking".to_string(),
        });
        return;
    }

    tracing::debug!(sequence = current.sequence, target_frame, "seeking decoder");
    let baseline = inner.flush_ack.load(Ordering::Acquire);
    current.set_discard(true);
    wait_for_flush_ack(inner, baseline);

    if let Err(err) = current.seek_to_frame(target_frame) {
        tracing::error!(sequence = current.sequence, error = %err, "decoder seek failed");
        inner.events.publish(Notification::Error {
            sequence: Some(current.sequence),
            message: err.to_string(),
        });
    }

    current.set_discard(false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::decoder::FramesProduced;
    use crate::error::DecoderError;
    use crate::format::AudioFormat;

    struct CountingDecoder {
        values: Vec<f32>,
        position: usize,
        seekable: bool,
    }

    impl Decoder for CountingDecoder {
        fn open(&mut self) -> Result<(), DecoderError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), DecoderError> {
            Ok(())
        }
        fn format(&self) -> AudioFormat {
            AudioFormat::new(48_000, 1)
        }
        fn frame_length(&self) -> i64 {
            self.values.len() as i64
        }
        fn supports_seeking(&self) -> bool {
            self.seekable
        }
        fn read_audio(&mut self, buffers: &mut [&mut [f32]]) -> Result<FramesProduced, DecoderError> {
            let n = buffers[0].len().min(self.values.len() - self.position);
            for (i, sample) in buffers[0][..n].iter_mut().enumerate() {
                *sample = self.values[self.position + i];
            }
            self.position += n;
            Ok(FramesProduced(n))
        }
        fn seek_to_frame(&mut self, frame: i64) -> Result<(), DecoderError> {
            self.position = frame as usize;
            Ok(())
        }
    }

    fn new_inner(capacity: usize) -> Arc<EngineInner> {
        let config = EngineConfig {
            format: AudioFormat::new(48_000, 1),
            ring_buffer_capacity_frames: capacity,
        };
        let (writer, _reader) =
            crate::ring_buffer::RingBuffer::allocate(config.format.channels, config.ring_buffer_capacity_frames)
                .unwrap();
        let (events_tx, _events_rx) = crate::event::channel();
        let (gc_tx, _gc_rx) = crate::gc::channel();
        Arc::new(EngineInner {
            format: config.format,
            queue: crate::decoder_queue::DecoderQueue::new(),
            slots: Arc::new(crate::decoder_slots::DecoderSlots::new()),
            ring_writer: parking_lot::Mutex::new(writer),
            scratch: parking_lot::Mutex::new(vec![Vec::new(); config.format.channels as usize]),
            paused: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            decode_waker: Arc::new(crate::wake::Waker::new()),
            flush_ack: Arc::new(std::sync::atomic::AtomicU64::new(0)),
            events: events_tx,
            gc: gc_tx,
            control: parking_lot::Mutex::new(std::collections::VecDeque::new()),
            shutdown: std::sync::atomic::AtomicBool::new(false),
        })
    }

    fn pump(inner: &Arc<EngineInner>, max_steps: usize) {
        for _ in 0..max_steps {
            step(inner);
        }
    }

    #[test]
    fn opens_first_pending_decoder_as_current_and_decodes_it_fully() {
        let inner = new_inner(1024);
        inner.queue.enqueue(Box::new(CountingDecoder {
            values: vec![1.0, 2.0, 3.0],
            position: 0,
            seekable: false,
        }));
        pump(&inner, 8);

        let current = inner.slots.peek_current().unwrap();
        assert!(current.test_flag(DecoderFlags::DECODING_COMPLETE));
        assert_eq!(current.frames_decoded(), 3);
    }

    #[test]
    fn opens_next_decoder_ahead_once_current_completes() {
        let inner = new_inner(1024);
        inner.queue.enqueue(Box::new(CountingDecoder {
            values: vec![1.0, 2.0, 3.0],
            position: 0,
            seekable: false,
        }));
        inner.queue.enqueue(Box::new(CountingDecoder {
            values: vec![4.0, 5.0],
            position: 0,
            seekable: false,
        }));
        pump(&inner, 16);

        assert!(inner.slots.peek_current().unwrap().test_flag(DecoderFlags::DECODING_COMPLETE));
        let next = inner.slots.peek_next().unwrap();
        assert!(next.test_flag(DecoderFlags::DECODING_COMPLETE));
        assert_eq!(next.sequence, 1);
    }

    #[test]
    fn cancel_retires_current_and_promotes_an_already_opened_successor() {
        let inner = new_inner(1024);
        inner.queue.enqueue(Box::new(CountingDecoder {
            values: vec![0.0; 100_000],
            position: 0,
            seekable: false,
        }));
        // Fill the ring but never reach end-of-stream for decoder 0.
        pump(&inner, 4);
        assert!(inner.slots.has_current());
        assert!(!inner
            .slots
            .peek_current()
            .unwrap()
            .test_flag(DecoderFlags::DECODING_COMPLETE));

        inner.push_control(ControlRequest::Cancel);
        // The render side never ran, so the flush-ack wait would spin
        // forever; simulate the render callback's acknowledgement inline.
        std::thread::spawn({
            let inner = inner.clone();
            move || {
                std::thread::sleep(Duration::from_millis(5));
                inner.flush_ack.fetch_add(1, Ordering::Release);
            }
        });
        step(&inner);

        assert!(inner.slots.peek_current().is_none());
    }

    #[test]
    fn seek_resets_decoded_and_rendered_counters() {
        let inner = new_inner(1024);
        inner.queue.enqueue(Box::new(CountingDecoder {
            values: (0..1000).map(|v| v as f32).collect(),
            position: 0,
            seekable: true,
        }));
        pump(&inner, 1);
        let current = inner.slots.peek_current().unwrap();
        assert!(current.frames_decoded() > 0);

        inner.push_control(ControlRequest::Seek(500));
        let ack = std::thread::spawn({
            let inner = inner.clone();
            move || {
                std::thread::sleep(Duration::from_millis(5));
                inner.flush_ack.fetch_add(1, Ordering::Release);
            }
        });
        step(&inner);
        ack.join().unwrap();

        assert_eq!(current.frames_decoded(), 0);
        assert_eq!(current.frames_rendered(), 0);
        assert!(!current.is_discarding());
    }
}
