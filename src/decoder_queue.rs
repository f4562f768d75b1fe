//! Ordered sequence of pending decoders, mutated only under a short mutex.
//!
//! Grounded on `Playlist` in `playlist.rs`: a queue of pending entries
//! mutated from API/UI threads while a separate thread consumes it. The
//! `parking_lot` mutex is held only for `VecDeque` manipulation, never
//! across decoder I/O. The current decoder lives separately, in
//! [`crate::decoder_slots::DecoderSlots`], because it is read by the
//! realtime render callback and a plain `VecDeque` behind this mutex is not
//! an acceptable realtime access path.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::decoder::Decoder;

/// Ordered sequence of pending decoders.
pub struct DecoderQueue {
    pending: Mutex<VecDeque<Box<dyn Decoder>>>,
    next_sequence: std::sync::atomic::AtomicU64,
}

impl DecoderQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            next_sequence: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Append `decoder` to the end of the pending sequence.
    pub fn enqueue(&self, decoder: Box<dyn Decoder>) {
        self.pending.lock().push_back(decoder);
    }

    /// Pop the next pending decoder, if any, assigning it a fresh,
    /// monotonically increasing sequence number.
    pub fn dequeue(&self) -> Option<(u64, Box<dyn Decoder>)> {
        let decoder = self.pending.lock().pop_front()?;
        let sequence = self
            .next_sequence
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Some((sequence, decoder))
    }

    /// Drop all pending decoders without opening them.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    /// Whether there is a pending decoder ready to become current.
    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Number of decoders waiting (not counting whichever is current).
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether the pending sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl Default for DecoderQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Decoder, FramesProduced};
    use crate::error::DecoderError;
    use crate::format::AudioFormat;

    struct StubDecoder;
    impl Decoder for StubDecoder {
        fn open(&mut self) -> Result<(), DecoderError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), DecoderError> {
            Ok(())
        }
        fn format(&self) -> AudioFormat {
            AudioFormat::new(48_000, 1)
        }
        fn read_audio(&mut self, _b: &mut [&mut [f32]]) -> Result<FramesProduced, DecoderError> {
            Ok(FramesProduced(0))
        }
        fn seek_to_frame(&mut self, _frame: i64) -> Result<(), DecoderError> {
            Ok(())
        }
    }

    #[test]
    fn enqueue_then_dequeue_is_fifo_and_assigns_increasing_sequence() {
        let queue = DecoderQueue::new();
        queue.enqueue(Box::new(StubDecoder));
        queue.enqueue(Box::new(StubDecoder));

        let (seq_a, _) = queue.dequeue().unwrap();
        let (seq_b, _) = queue.dequeue().unwrap();
        assert!(seq_b > seq_a);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn clear_empties_pending_queue() {
        let queue = DecoderQueue::new();
        queue.enqueue(Box::new(StubDecoder));
        queue.enqueue(Box::new(StubDecoder));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn len_reports_pending_count() {
        let queue = DecoderQueue::new();
        assert_eq!(queue.len(), 0);
        queue.enqueue(Box::new(StubDecoder));
        assert_eq!(queue.len(), 1);
        queue.dequeue();
        assert_eq!(queue.len(), 0);
    }
}
