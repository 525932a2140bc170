//! Lock-free SPSC byte ring between the receive loop and the reader API.
//!
//! The buffer is split into a [`RingProducer`] and a [`RingConsumer`] half.
//! Neither half is `Clone`, so there is exactly one writer and one reader.
//!
//! # Memory Ordering
//!
//! - `write_idx` and `read_idx` run over `[0, 2 * capacity)` and wrap
//!   explicitly, so a full ring (`write - read == capacity`) is told apart
//!   from an empty one for any capacity
//! - The producer stores `write_idx` with `Release` after copying bytes in;
//!   the consumer loads it with `Acquire` before copying bytes out
//! - The consumer stores `read_idx` with `Release` after copying out; the
//!   producer loads it with `Acquire` before reusing those slots

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default capacity of the device's receive ring
pub const DEFAULT_RING_CAPACITY: usize = 1024;

/// Largest capacity whose index arithmetic cannot overflow
pub const MAX_RING_CAPACITY: usize = usize::MAX / 4;

struct Shared {
    storage: Box<[UnsafeCell<u8>]>,
    capacity: usize,
    write_idx: AtomicUsize,
    read_idx: AtomicUsize,
}

// SAFETY: slots in [read_idx, write_idx) are only touched by the consumer,
// the rest only by the producer; the split halves enforce a single owner
// for each side and the index handoff uses Release/Acquire.
unsafe impl Sync for Shared {}
unsafe impl Send for Shared {}

impl Shared {
    /// Bytes between `read` and `write`, both in `[0, 2 * capacity)`.
    fn distance(&self, write: usize, read: usize) -> usize {
        if write >= read {
            write - read
        } else {
            write + 2 * self.capacity - read
        }
    }

    /// Move `idx` forward by `n <= capacity`, wrapping at `2 * capacity`.
    fn advance(&self, idx: usize, n: usize) -> usize {
        let next = idx + n;
        if next >= 2 * self.capacity {
            next - 2 * self.capacity
        } else {
            next
        }
    }

    fn slot(&self, idx: usize) -> &UnsafeCell<u8> {
        let i = if idx >= self.capacity { idx - self.capacity } else { idx };
        &self.storage[i]
    }

    fn count(&self) -> usize {
        let write = self.write_idx.load(Ordering::Acquire);
        let read = self.read_idx.load(Ordering::Acquire);
        self.distance(write, read)
    }
}

/// Create a ring of `capacity` bytes and split it into its two halves.
///
/// # Panics
///
/// Panics if `capacity` is zero or above [`MAX_RING_CAPACITY`].
pub fn ring_buffer(capacity: usize) -> (RingProducer, RingConsumer) {
    ring_buffer_from(capacity, 0)
}

fn ring_buffer_from(capacity: usize, start: usize) -> (RingProducer, RingConsumer) {
    assert!(capacity > 0, "ring buffer capacity must be non-zero");
    assert!(
        capacity <= MAX_RING_CAPACITY,
        "ring buffer capacity must not exceed {}",
        MAX_RING_CAPACITY
    );

    let storage: Vec<UnsafeCell<u8>> = (0..capacity).map(|_| UnsafeCell::new(0)).collect();
    let shared = Arc::new(Shared {
        storage: storage.into_boxed_slice(),
        capacity,
        write_idx: AtomicUsize::new(start),
        read_idx: AtomicUsize::new(start),
    });

    (
        RingProducer {
            shared: Arc::clone(&shared),
        },
        RingConsumer { shared },
    )
}

/// Writing half, owned by the receive loop's packet handler.
pub struct RingProducer {
    shared: Arc<Shared>,
}

impl RingProducer {
    /// Append as many bytes as fit without overwriting unread data.
    ///
    /// Returns the number of bytes accepted. Never blocks.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let shared = &*self.shared;
        let write = shared.write_idx.load(Ordering::Relaxed);
        let read = shared.read_idx.load(Ordering::Acquire);
        let free = shared.capacity - shared.distance(write, read);
        let n = data.len().min(free);

        for (i, &byte) in data[..n].iter().enumerate() {
            let slot = shared.slot(shared.advance(write, i));
            // SAFETY: slot lies outside [read, write), consumer won't touch it
            // until write_idx is published below
            unsafe { *slot.get() = byte };
        }

        shared.write_idx.store(shared.advance(write, n), Ordering::Release);
        n
    }

    /// Bytes that can currently be written without truncation.
    pub fn free(&self) -> usize {
        self.shared.capacity - self.shared.count()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

/// Reading half, owned by the device facade.
pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingConsumer {
    /// Drain up to `buf.len()` bytes in FIFO order into `buf`.
    ///
    /// Returns the number of bytes copied; zero if the ring is empty.
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let shared = &*self.shared;
        let read = shared.read_idx.load(Ordering::Relaxed);
        let write = shared.write_idx.load(Ordering::Acquire);
        let n = shared.distance(write, read).min(buf.len());

        for (i, out) in buf[..n].iter_mut().enumerate() {
            let slot = shared.slot(shared.advance(read, i));
            // SAFETY: slot lies inside [read, write), published by the producer
            *out = unsafe { *slot.get() };
        }

        shared.read_idx.store(shared.advance(read, n), Ordering::Release);
        n
    }

    /// Drain up to `max_len` bytes in FIFO order.
    pub fn read(&mut self, max_len: usize) -> Vec<u8> {
        let mut out = vec![0u8; max_len.min(self.len())];
        let n = self.read_into(&mut out);
        out.truncate(n);
        out
    }

    /// Bytes currently waiting to be read.
    pub fn len(&self) -> usize {
        self.shared.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}
