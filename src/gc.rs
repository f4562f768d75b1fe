//! The garbage-collection channel: retired `DecoderState`s are handed off
//! here so closing the underlying decoder and freeing the state never
//! happens on the render callback.
//!
//! Same shape as [`crate::event`]'s queue (bounded `crossbeam::queue::ArrayQueue`,
//! `try_push`/`pop` never block), sized for decoder turnover rather than
//! event volume.

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

use crate::decoder_state::DecoderState;

/// A retired decoder can sit here for at most a handful of GC worker
/// wake-ups; this is generous headroom against pathological skip-rates.
pub const GC_QUEUE_CAPACITY: usize = 256;

/// Producer-only handle, held by the render callback and the decoding
/// thread.
#[derive(Clone)]
pub struct GcSender {
    queue: Arc<ArrayQueue<Arc<DecoderState>>>,
}

/// Consumer-only handle, owned by the GC worker thread.
pub struct GcReceiver {
    queue: Arc<ArrayQueue<Arc<DecoderState>>>,
}

/// Construct a bounded retirement queue and split it into sender/receiver
/// halves.
pub fn channel() -> (GcSender, GcReceiver) {
    let queue = Arc::new(ArrayQueue::new(GC_QUEUE_CAPACITY));
    (
        GcSender {
            queue: queue.clone(),
        },
        GcReceiver { queue },
    )
}

impl GcSender {
    /// Retire `state`. Never blocks; on overflow (the GC worker has fallen
    /// impossibly far behind) the state is dropped inline rather than
    /// blocking the caller — its `Drop` impl still runs, just not on the GC
    /// worker's thread.
    pub fn retire(&self, state: Arc<DecoderState>) {
        if let Err(state) = self.queue.push(state) {
            debug_assert!(false, "GC queue overflow: capacity {} exceeded", GC_QUEUE_CAPACITY);
            drop(state);
        }
    }
}

impl GcReceiver {
    /// Pop the next retired decoder, if any.
    pub fn try_recv(&self) -> Option<Arc<DecoderState>> {
        self.queue.pop()
    }
}
