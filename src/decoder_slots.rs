//! The "current" and "next" decoder slots shared between the decoding
//! thread, the render callback, and API query threads.
//!
//! The render callback reads `current` on every invocation and swaps it at
//! every gapless boundary, so this can never be a `parking_lot::Mutex` the
//! way most other cross-thread state in this crate is: both slots are
//! `arc_swap::ArcSwapOption`, giving the render callback a wait-free load
//! and the decoding thread a wait-free store, with release-on-publish,
//! acquire-on-read ordering handled internally by the crate.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::decoder_state::DecoderState;

/// Holds the `DecoderState` currently being rendered (`current`) and, once
/// the decoding thread has opened it ahead of time for a gapless
/// transition, the one that will become current next (`next`).
pub struct DecoderSlots {
    current: ArcSwapOption<DecoderState>,
    next: ArcSwapOption<DecoderState>,
}

impl DecoderSlots {
    /// Both slots empty.
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::from(None),
            next: ArcSwapOption::from(None),
        }
    }

    /// Clone of whichever `DecoderState` is current, if any.
    pub fn peek_current(&self) -> Option<Arc<DecoderState>> {
        self.current.load_full()
    }

    /// Clone of whichever `DecoderState` is queued as `next`, if any.
    pub fn peek_next(&self) -> Option<Arc<DecoderState>> {
        self.next.load_full()
    }

    /// Install `state` as current. Called by the decoding thread only when
    /// `current` was empty (the very first decoder, or after the previous
    /// current was retired with no successor queued).
    pub fn install_current(&self, state: Arc<DecoderState>) {
        self.current.store(Some(state));
    }

    /// Install `state` as the successor opened ahead of time for a gapless
    /// transition. Called by the decoding thread only when `next` was
    /// empty.
    pub fn install_next(&self, state: Arc<DecoderState>) {
        self.next.store(Some(state));
    }

    /// Whether `current` is occupied.
    pub fn has_current(&self) -> bool {
        self.current.load().is_some()
    }

    /// Whether `next` is occupied.
    pub fn has_next(&self) -> bool {
        self.next.load().is_some()
    }

    /// Move `next` into `current`, emptying `next`, returning the retired
    /// occupant of `current` (if any) so the caller can hand it to the GC
    /// channel. Called by the render callback at a gapless boundary.
    pub fn promote_next(&self) -> Option<Arc<DecoderState>> {
        let promoted = self.next.swap(None);
        self.current.swap(promoted)
    }

    /// Empty `current`, returning its prior occupant. Used when the current
    /// decoder finishes with no successor queued, or is canceled.
    pub fn take_current(&self) -> Option<Arc<DecoderState>> {
        self.current.swap(None)
    }

    /// Empty `next` without promoting it. Used when clearing the queue
    /// discards a decoder that had already been opened ahead of time.
    pub fn take_next(&self) -> Option<Arc<DecoderState>> {
        self.next.swap(None)
    }
}

impl Default for DecoderSlots {
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

    fn state(sequence: u64) -> Arc<DecoderState> {
        Arc::new(DecoderState::new(sequence, Box::new(StubDecoder), None))
    }

    #[test]
    fn promote_next_moves_it_into_current_and_returns_the_old_one() {
        let slots = DecoderSlots::new();
        slots.install_current(state(1));
        slots.install_next(state(2));

        let retired = slots.promote_next().unwrap();
        assert_eq!(retired.sequence, 1);
        assert_eq!(slots.peek_current().unwrap().sequence, 2);
        assert!(slots.peek_next().is_none());
    }

    #[test]
    fn promote_next_with_no_successor_empties_current() {
        let slots = DecoderSlots::new();
        slots.install_current(state(1));

        let retired = slots.promote_next().unwrap();
        assert_eq!(retired.sequence, 1);
        assert!(slots.peek_current().is_none());
    }

    #[test]
    fn take_current_empties_the_slot() {
        let slots = DecoderSlots::new();
        slots.install_current(state(1));
        let taken = slots.take_current().unwrap();
        assert_eq!(taken.sequence, 1);
        assert!(!slots.has_current());
    }
}
