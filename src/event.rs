//! Notification events and the lock-free queue that carries them out of
//! realtime context.
//!
//! The queue itself is a `crossbeam::queue::ArrayQueue`: bounded, lock-free,
//! and `push`/`pop` never block. `streaming.rs`'s realtime path has no such
//! dependency (it's a plain producer loop writing into a mutex-guarded ring
//! buffer); this is enrichment from `chimera-core`'s `crossbeam` dependency,
//! reached for because the realtime render callback must be able to
//! publish events without ever blocking.

use crossbeam::queue::ArrayQueue;
use std::sync::Arc;

/// Capacity of the realtime event queue, sized for worst-case transitions
/// per render pass times headroom: at most two
/// decoders can transition state in a single render pass (an outgoing one
/// completing and an incoming one starting at a gapless boundary), each
/// producing at most a handful of flag-transition events, so 64 is ample
/// headroom for any reasonable render quantum.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// A tagged lifecycle event, delivered on the notification worker in FIFO
/// order.
#[derive(Debug, Clone)]
pub enum Notification {
    /// A decoder was opened and the decoding thread began reading from it.
    DecodingStarted { sequence: u64 },
    /// A decoder reached end-of-stream and all of its frames were
    /// published to the ring.
    DecodingComplete { sequence: u64 },
    /// A decoder was canceled via `cancel_current_decoder`.
    DecodingCanceled { sequence: u64, partially_rendered: bool },
    /// Delivered before any frame of this decoder reaches the sink.
    /// `host_time` is an opaque host-clock timestamp, passed through
    /// unmodified from whatever the host gave [`crate::RenderCallback::render`].
    RenderingWillStart { sequence: u64, host_time: u64 },
    /// The render callback consumed the first frame of this decoder.
    RenderingStarted { sequence: u64 },
    /// `framesRendered == framesDecoded` and `DecodingComplete` was set for
    /// this decoder.
    RenderingComplete { sequence: u64 },
    /// The ring buffer drained with no successor decoder queued.
    EndOfAudio,
    /// An asynchronous decoder error (open/read/seek failure).
    Error { sequence: Option<u64>, message: String },
}

/// Producer-only handle into the realtime event queue. Used by the render
/// callback and the decoding thread; `try_push` never blocks or panics on
/// a full queue.
#[derive(Clone)]
pub struct EventSender {
    queue: Arc<ArrayQueue<Notification>>,
}

/// Consumer-only handle into the realtime event queue, owned by the
/// notification worker.
pub struct EventReceiver {
    queue: Arc<ArrayQueue<Notification>>,
}

/// Construct a bounded event queue and split it into sender/receiver
/// halves.
pub fn channel() -> (EventSender, EventReceiver) {
    let queue = Arc::new(ArrayQueue::new(EVENT_QUEUE_CAPACITY));
    (
        EventSender {
            queue: queue.clone(),
        },
        EventReceiver { queue },
    )
}

impl EventSender {
    /// Publish `event`. Overflow is treated as a programmer error: in debug
    /// builds this panics so the undersized capacity is caught immediately;
    /// in release builds the event is silently dropped rather than blocking
    /// the realtime thread.
    pub fn publish(&self, event: Notification) {
        if let Err(_dropped) = self.queue.push(event) {
            debug_assert!(
                false,
                "event queue overflow: capacity {} exceeded",
                EVENT_QUEUE_CAPACITY
            );
        }
    }
}

impl EventReceiver {
    /// Pop the next event, if any. Never blocks; the notification worker
    /// pairs this with a condvar wait when the queue is empty.
    pub fn try_recv(&self) -> Option<Notification> {
        self.queue.pop()
    }
}
