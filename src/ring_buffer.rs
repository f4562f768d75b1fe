//! Lock-free single-producer/single-consumer ring buffer of non-interleaved
//! PCM frames.
//!
//! Grounded on `ring_buffer.rs` (capacity rounded to the next power of two,
//! a capacity mask for fast modulo, one reserved slot so "full" and "empty"
//! are distinguishable, up-to-two-segment wraparound copies). That original
//! guards its backing storage with a `parking_lot::Mutex`; that is not
//! acceptable here, because the realtime
//! render callback must never acquire a mutex. This implementation instead
//! gives the producer and consumer handles distinct, non-`Sync` types (so
//! the single-writer/single-reader contract is enforced by the type system
//! wherever the compiler can do it) and accesses the shared backing storage
//! through `UnsafeCell`, relying on that SPSC discipline for soundness.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Failure from [`RingBuffer::allocate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RingBufferError {
    /// `requested_capacity_frames` was zero.
    #[error("ring buffer capacity must be greater than 0")]
    ZeroCapacity,
    /// `channels` was zero.
    #[error("ring buffer must have at least one channel")]
    ZeroChannels,
    /// The rounded-up capacity would require an unreasonably large
    /// allocation (mirrors the OOM guard in `RingBuffer::new`).
    #[error("ring buffer capacity {requested} exceeds maximum safe size {max}")]
    CapacityTooLarge { requested: usize, max: usize },
}

/// Maximum rounded-up capacity per channel, in frames. 64Mi frames of f32
/// per channel is 256MiB per channel; a guard against a misconfigured or
/// hostile `requested_capacity_frames`.
const MAX_CAPACITY_FRAMES: usize = 64 * 1024 * 1024;

struct Shared {
    /// One contiguous backing buffer per channel, each `capacity` frames
    /// long. Accessed by exactly one writer and one reader concurrently;
    /// never resized after [`RingBuffer::allocate`].
    channels: Vec<UnsafeCell<Box<[f32]>>>,
    capacity: usize,
    mask: usize,
    write_cursor: AtomicUsize,
    read_cursor: AtomicUsize,
}

// SAFETY: `Shared` is accessed through `RingBufferWriter` (write-only,
// advances `write_cursor`) and `RingBufferReader` (read-only, advances
// `read_cursor`). Each field's mutation is confined to one side. Cursor
// publication uses Release/Acquire so the other side never observes a
// partially-written region.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

/// A lock-free circular buffer of audio frames in a fixed non-interleaved
/// PCM layout, shared between exactly one producer thread and one consumer
/// thread.
pub struct RingBuffer;

impl RingBuffer {
    /// Round `requested_capacity_frames` up to the next power of two,
    /// allocate `channels` backing regions each holding that many frames,
    /// and return a `(writer, reader)` pair with cursors at zero.
    ///
    /// Not thread-safe by itself — the caller must not start the producer
    /// and consumer until both handles exist.
    pub fn allocate(
        channels: u16,
        requested_capacity_frames: usize,
    ) -> Result<(RingBufferWriter, RingBufferReader), RingBufferError> {
        if requested_capacity_frames == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        if channels == 0 {
            return Err(RingBufferError::ZeroChannels);
        }
        let capacity = requested_capacity_frames.next_power_of_two();
        if capacity > MAX_CAPACITY_FRAMES {
            return Err(RingBufferError::CapacityTooLarge {
                requested: capacity,
                max: MAX_CAPACITY_FRAMES,
            });
        }

        let channel_bufs = (0..channels)
            .map(|_| UnsafeCell::new(vec![0.0f32; capacity].into_boxed_slice()))
            .collect();

        let shared = Arc::new(Shared {
            channels: channel_bufs,
            capacity,
            mask: capacity - 1,
            write_cursor: AtomicUsize::new(0),
            read_cursor: AtomicUsize::new(0),
        });

        Ok((
            RingBufferWriter {
                shared: shared.clone(),
                _not_sync: PhantomData,
            },
            RingBufferReader {
                shared,
                _not_sync: PhantomData,
            },
        ))
    }
}

// Cursors are monotone `usize` counters, reduced modulo capacity only at
// use sites (index = cursor & mask), so wrapping subtraction between them
// is correct as long as total frames transferred never exceeds `usize::MAX`.
impl RingBufferWriter {
    #[inline]
    fn diff(write: usize, read: usize) -> usize {
        write.wrapping_sub(read)
    }
}

/// Producer-only handle into a [`RingBuffer`]. Not `Sync`: only the thread
/// that owns it may call its methods, enforcing the single-producer
/// contract.
pub struct RingBufferWriter {
    shared: Arc<Shared>,
    _not_sync: PhantomData<std::cell::Cell<()>>,
}

/// Consumer-only handle into a [`RingBuffer`]. Not `Sync`: only the thread
/// that owns it may call its methods, enforcing the single-consumer
/// contract.
pub struct RingBufferReader {
    shared: Arc<Shared>,
    _not_sync: PhantomData<std::cell::Cell<()>>,
}

impl RingBufferWriter {
    /// Number of channels this ring buffer carries.
    pub fn channels(&self) -> usize {
        self.shared.channels.len()
    }

    /// Rounded-up capacity in frames.
    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity
    }

    /// Frames free to write without overwriting unread data. May under-read
    /// the true free space if the consumer advances concurrently, but never
    /// over-reports it.
    pub fn frames_available_to_write(&self) -> usize {
        let write = self.shared.write_cursor.load(Ordering::Relaxed);
        let read = self.shared.read_cursor.load(Ordering::Acquire);
        let used = Self::diff(write, read);
        (self.shared.capacity - 1).saturating_sub(used)
    }

    /// Copy up to `min(frame_count, frames_available_to_write())` frames
    /// from `src_buffers` (one non-interleaved slice per channel, each at
    /// least `frame_count` long) into the ring, wrapping at the capacity
    /// boundary in up to two contiguous segments per channel. Returns the
    /// number of frames actually written.
    ///
    /// Producer-only. Never blocks, allocates, or locks.
    pub fn write(&mut self, src_buffers: &[&[f32]], frame_count: usize) -> usize {
        debug_assert_eq!(src_buffers.len(), self.channels());

        let available = self.frames_available_to_write();
        let to_write = frame_count.min(available);
        if to_write == 0 {
            return 0;
        }

        let write = self.shared.write_cursor.load(Ordering::Relaxed);
        let start = write & self.shared.mask;
        let first_len = to_write.min(self.shared.capacity - start);
        let second_len = to_write - first_len;

        for (ch, src) in src_buffers.iter().enumerate().take(self.channels()) {
            // SAFETY: this is the sole writer for this channel's buffer;
            // the region [start, start+to_write) (wrapped) has already been
            // drained by the consumer, since `to_write <= available`.
            let dst = unsafe { &mut *self.shared.channels[ch].get() };
            dst[start..start + first_len].copy_from_slice(&src[..first_len]);
            if second_len > 0 {
                dst[..second_len].copy_from_slice(&src[first_len..first_len + second_len]);
            }
        }

        // Release: all channel copies above are visible to the consumer
        // before it can observe the advanced cursor.
        self.shared
            .write_cursor
            .store(write.wrapping_add(to_write), Ordering::Release);

        to_write
    }
}

impl RingBufferReader {
    /// Number of channels this ring buffer carries.
    pub fn channels(&self) -> usize {
        self.shared.channels.len()
    }

    /// Rounded-up capacity in frames.
    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity
    }

    /// Frames available to read. May under-read the true used space if the
    /// producer advances concurrently, but never over-reports it.
    pub fn frames_available_to_read(&self) -> usize {
        let write = self.shared.write_cursor.load(Ordering::Acquire);
        let read = self.shared.read_cursor.load(Ordering::Relaxed);
        RingBufferWriter::diff(write, read)
    }

    /// Copy up to `min(frame_count, frames_available_to_read())` frames
    /// from the ring into `dst_buffers` (one non-interleaved slice per
    /// channel, each at least `frame_count` long), wrapping as necessary.
    /// Returns the number of frames actually read. Does not zero-fill any
    /// remainder; the caller is responsible for silence on underflow.
    ///
    /// Consumer-only. Never blocks, allocates, or locks.
    pub fn read(&mut self, dst_buffers: &mut [&mut [f32]], frame_count: usize) -> usize {
        debug_assert_eq!(dst_buffers.len(), self.channels());

        let available = self.frames_available_to_read();
        let to_read = frame_count.min(available);
        if to_read == 0 {
            return 0;
        }

        let read = self.shared.read_cursor.load(Ordering::Relaxed);
        let start = read & self.shared.mask;
        let first_len = to_read.min(self.shared.capacity - start);
        let second_len = to_read - first_len;

        for (ch, dst) in dst_buffers.iter_mut().enumerate().take(self.channels()) {
            // SAFETY: this is the sole reader for this channel's buffer;
            // the region being read was published by the writer before it
            // advanced `write_cursor` (Release), observed via the Acquire
            // load in `frames_available_to_read`.
            let src = unsafe { &*self.shared.channels[ch].get() };
            dst[..first_len].copy_from_slice(&src[start..start + first_len]);
            if second_len > 0 {
                dst[first_len..first_len + second_len].copy_from_slice(&src[..second_len]);
            }
        }

        self.shared
            .read_cursor
            .store(read.wrapping_add(to_read), Ordering::Release);

        to_read
    }

    /// Discard all buffered frames by advancing the read cursor to match
    /// the current write cursor, without copying anything out.
    ///
    /// Used by the flush protocol's first phase: the consumer calls this
    /// once it observes a discard marker on the decoder it is currently
    /// rendering.
    pub fn discard_all(&mut self) {
        let write = self.shared.write_cursor.load(Ordering::Acquire);
        self.shared.read_cursor.store(write, Ordering::Release);
    }

    /// [`RingBufferReader::discard_all`], then zero both cursors back to
    /// the origin. The producer only ever advances `write_cursor` while
    /// decoding into this ring, and it stops doing that for the whole
    /// duration its decoder is marked for discard — so the consumer, which
    /// already owns the discard half of the flush protocol, is the only
    /// thread touching either cursor here, and can safely zero both
    /// without a handle to the writer.
    pub fn discard_and_reset(&mut self) {
        self.discard_all();
        self.shared.write_cursor.store(0, Ordering::Relaxed);
        self.shared.read_cursor.store(0, Ordering::Relaxed);
    }
}
