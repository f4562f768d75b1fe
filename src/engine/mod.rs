//! The engine supervisor: owns every other component, runs
//! the decoding thread, notification worker, and GC worker, and exposes the
//! public API.
//!
//! Grounded on the `Engine`/`RealtimePlayer` pairing in `lib.rs` and
//! `streaming.rs`: a handle type that spawns and joins worker threads, with
//! `parking_lot`-guarded control state for API calls and atomics for
//! anything the realtime side also touches.

mod decode_thread;
mod gc_worker;
mod notify_worker;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::decoder::Decoder;
use crate::decoder_queue::DecoderQueue;
use crate::decoder_slots::DecoderSlots;
use crate::error::EngineError;
use crate::event::{self, EventSender, Notification};
use crate::format::AudioFormat;
use crate::gc::{self, GcSender};
use crate::render::RenderCallback;
use crate::wake::Waker;

/// Receives every [`Notification`] in FIFO order, on the notification
/// worker thread. May block; the engine never calls this from realtime
/// context.
pub trait EngineDelegate: Send {
    fn on_notification(&mut self, event: Notification);
}

/// A request from an API thread to the decoding thread, queued under
/// [`EngineInner::control`] and drained one at a time by
/// [`decode_thread::step`].
enum ControlRequest {
    Stop,
    Cancel,
    Seek(i64),
}

/// State shared across every thread role.
pub(crate) struct EngineInner {
    format: AudioFormat,
    queue: DecoderQueue,
    slots: Arc<DecoderSlots>,
    ring_writer: Mutex<crate::ring_buffer::RingBufferWriter>,
    /// Reused across `decode_into` calls so steady-state decoding never
    /// allocates.
    scratch: Mutex<Vec<Vec<f32>>>,
    paused: Arc<AtomicBool>,
    decode_waker: Arc<Waker>,
    flush_ack: Arc<AtomicU64>,
    events: EventSender,
    gc: GcSender,
    control: Mutex<VecDeque<ControlRequest>>,
    shutdown: AtomicBool,
}

impl EngineInner {
    fn push_control(&self, request: ControlRequest) {
        self.control.lock().push_back(request);
        self.decode_waker.notify();
    }

    fn take_control_request(&self) -> Option<ControlRequest> {
        self.control.lock().pop_front()
    }
}

/// The engine supervisor. `Engine::create` also returns the
/// [`RenderCallback`] half, which the host drives from its own realtime
/// thread; `Engine` itself owns everything else.
pub struct Engine {
    inner: Arc<EngineInner>,
    decode_handle: Option<JoinHandle<()>>,
    notify_handle: Option<JoinHandle<()>>,
    gc_handle: Option<JoinHandle<()>>,
}

impl Engine {
    /// Allocate the ring buffer, then spawn the decoding thread (parked,
    /// engine starts paused), the notification worker, and the GC worker.
    pub fn create(
        config: EngineConfig,
        delegate: Box<dyn EngineDelegate>,
    ) -> Result<(Engine, RenderCallback), EngineError> {
        config.validate()?;

        let (writer, reader) = crate::ring_buffer::RingBuffer::allocate(
            config.format.channels,
            config.ring_buffer_capacity_frames,
        )
        .map_err(|e| EngineError::AllocationFailed(e.to_string()))?;

        let (events_tx, events_rx) = event::channel();
        let (gc_tx, gc_rx) = gc::channel();
        let paused = Arc::new(AtomicBool::new(true));
        let decode_waker = Arc::new(Waker::new());
        let flush_ack = Arc::new(AtomicU64::new(0));
        let slots = Arc::new(DecoderSlots::new());

        let inner = Arc::new(EngineInner {
            format: config.format,
            queue: DecoderQueue::new(),
            slots: slots.clone(),
            ring_writer: Mutex::new(writer),
            scratch: Mutex::new(vec![Vec::new(); config.format.channels as usize]),
            paused: paused.clone(),
            decode_waker: decode_waker.clone(),
            flush_ack: flush_ack.clone(),
            events: events_tx.clone(),
            gc: gc_tx.clone(),
            control: Mutex::new(VecDeque::new()),
            shutdown: AtomicBool::new(false),
        });

        let render = RenderCallback::new(
            reader, slots, events_tx, gc_tx, decode_waker, paused, flush_ack,
        );

        let decode_handle = {
            let inner = inner.clone();
            std::thread::Builder::new()
                .name("gapless-engine-decode".into())
                .spawn(move || decode_thread::run(&inner))
                .map_err(|e| EngineError::AllocationFailed(e.to_string()))?
        };

        let notify_handle = {
            let shutdown = inner_shutdown_flag(&inner);
            std::thread::Builder::new()
                .name("gapless-engine-notify".into())
                .spawn(move || notify_worker::run(events_rx, delegate, shutdown))
                .map_err(|e| EngineError::AllocationFailed(e.to_string()))?
        };

        let gc_handle = {
            let shutdown = inner_shutdown_flag(&inner);
            let events_tx = inner.events.clone();
            std::thread::Builder::new()
                .name("gapless-engine-gc".into())
                .spawn(move || gc_worker::run(gc_rx, events_tx, shutdown))
                .map_err(|e| EngineError::AllocationFailed(e.to_string()))?
        };

        tracing::debug!(format = ?config.format, capacity_frames = config.ring_buffer_capacity_frames, "engine created");

        Ok((
            Engine {
                inner,
                decode_handle: Some(decode_handle),
                notify_handle: Some(notify_handle),
                gc_handle: Some(gc_handle),
            },
            render,
        ))
    }

    /// Reject `decoder` outright if its format doesn't match the engine's,
    /// otherwise append it to the pending queue and wake the decoding
    /// thread.
    pub fn enqueue(&self, decoder: Box<dyn Decoder>) -> Result<(), EngineError> {
        let actual = decoder.format();
        if !self.inner.format.matches(&actual) {
            tracing::warn!(?actual, expected = ?self.inner.format, "rejected enqueue: format mismatch");
            return Err(EngineError::FormatNotSupported {
                expected: self.inner.format,
                actual,
            });
        }
        tracing::debug!(?actual, "decoder enqueued");
        self.inner.queue.enqueue(decoder);
        self.inner.decode_waker.notify();
        Ok(())
    }

    /// Resume rendering and wake the decoding thread.
    pub fn play(&self) {
        self.inner.paused.store(false, Ordering::Release);
        self.inner.decode_waker.notify();
    }

    /// Render silence without disturbing any decoder state.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
    }

    pub fn toggle_play_pause(&self) {
        if self.inner.paused.load(Ordering::Acquire) {
            self.play();
        } else {
            self.pause();
        }
    }

    /// Cancel the current decoder, clear the pending queue, flush the ring,
    /// and pause.
    pub fn stop(&self) {
        self.inner.push_control(ControlRequest::Stop);
    }

    /// Cancel whatever decoder is currently playing. Asynchronous: returns
    /// immediately, before the decoding thread has processed the request.
    pub fn cancel_current_decoder(&self) {
        tracing::debug!("cancel requested");
        self.inner.push_control(ControlRequest::Cancel);
    }

    /// Drop all pending (not-yet-opened) decoders. Does not affect the
    /// current decoder.
    pub fn clear_queue(&self) {
        self.inner.queue.clear();
    }

    /// Seek the current decoder to an absolute frame offset, if it
    /// supports seeking.
    pub fn seek_to_frame(&self, frame: i64) {
        tracing::debug!(frame, "seek requested");
        self.inner.push_control(ControlRequest::Seek(frame));
    }

    /// Alias of [`Engine::seek_to_frame`] (see `DESIGN.md` for why the two
    /// names were not given different semantics).
    pub fn seek_to_position(&self, frame: i64) {
        self.seek_to_frame(frame);
    }

    /// Seek the current decoder to an absolute time offset in seconds.
    pub fn seek_to_time(&self, seconds: f64) {
        let frame = (seconds * self.inner.format.sample_rate as f64).round() as i64;
        self.seek_to_frame(frame.max(0));
    }

    /// Seek the current decoder forward by `seconds` relative to its last
    /// known playback position (or the origin, if none is known yet).
    pub fn seek_forward(&self, seconds: f64) {
        let base = self.playback_position().unwrap_or(0);
        let delta = (seconds * self.inner.format.sample_rate as f64).round() as i64;
        self.seek_to_frame(base + delta);
    }

    /// Seek the current decoder backward by `seconds`, clamped at frame 0.
    pub fn seek_backward(&self, seconds: f64) {
        let base = self.playback_position().unwrap_or(0);
        let delta = (seconds * self.inner.format.sample_rate as f64).round() as i64;
        self.seek_to_frame((base - delta).max(0));
    }

    /// Lock-free snapshot of the current decoder's frame position, or
    /// `None` if no decoder is current.
    pub fn playback_position(&self) -> Option<i64> {
        self.inner
            .slots
            .peek_current()
            .map(|state| state.position_snapshot().0)
    }

    /// [`Engine::playback_position`] converted to seconds using the
    /// engine's sample rate.
    pub fn playback_time(&self) -> Option<f64> {
        self.playback_position()
            .map(|frame| frame as f64 / self.inner.format.sample_rate as f64)
    }

    /// Stop every worker thread, join them, and drop the engine's
    /// resources. Synchronous.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        tracing::debug!("engine shutting down");
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.decode_waker.notify();
        for handle in [
            self.decode_handle.take(),
            self.notify_handle.take(),
            self.gc_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.decode_handle.is_some() {
            self.shutdown_inner();
        }
    }
}

fn inner_shutdown_flag(inner: &Arc<EngineInner>) -> ShutdownPoll {
    ShutdownPoll { inner: inner.clone() }
}

/// A cheap, clonable handle the notification and GC workers poll to learn
/// when to stop, without giving them the rest of `EngineInner`.
pub(crate) struct ShutdownPoll {
    inner: Arc<EngineInner>,
}

impl ShutdownPoll {
    pub(crate) fn requested(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }
}

pub(crate) const WORKER_IDLE_SLEEP: Duration = Duration::from_millis(5);
