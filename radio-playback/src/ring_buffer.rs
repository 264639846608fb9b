//! # Ring Buffer for PCM Bytes
//!
//! Bounded circular byte buffer between the stream reader (producer) and the
//! output sink (consumer).
//!
//! ## Design
//!
//! - **Locking**: one `parking_lot::Mutex` guards storage and cursors; it is
//!   held only for the copy, never across an await
//! - **Capacity**: fixed at creation, every byte usable
//! - **Overflow**: [`OverflowPolicy::DiscardNewest`] drops the tail of the
//!   incoming write and keeps what is already buffered;
//!   [`OverflowPolicy::OverwriteOldest`] drops the oldest buffered bytes
//! - Neither `write` nor `read` ever blocks
//!
//! ## Usage
//!
//! ```rust
//! use radio_playback::ring_buffer::RingBuffer;
//!
//! // One second of 44.1 kHz stereo 16-bit PCM
//! let buffer = RingBuffer::new(176_400);
//!
//! buffer.write(&[0x10, 0x00, 0xF0, 0xFF]);
//!
//! let mut output = [0u8; 1024];
//! let read = buffer.read(&mut output);
//! assert_eq!(read, 4);
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

/// What happens to bytes that do not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the newest incoming bytes; buffered audio is preserved.
    #[default]
    DiscardNewest,
    /// Drop the oldest buffered bytes to make room.
    OverwriteOldest,
}

#[derive(Clone)]
pub struct RingBuffer {
    inner: Arc<RingBufferInner>,
}

struct RingBufferInner {
    state: Mutex<RingState>,
    capacity: usize,
    policy: OverflowPolicy,
}

struct RingState {
    storage: Box<[u8]>,
    read_pos: usize,
    len: usize,
    discarded: u64,
}

impl RingState {
    fn write_pos(&self, capacity: usize) -> usize {
        (self.read_pos + self.len) % capacity
    }

    /// Copies `data` in at the write cursor. Caller guarantees it fits.
    fn push(&mut self, data: &[u8], capacity: usize) {
        let start = self.write_pos(capacity);
        let first = data.len().min(capacity - start);
        self.storage[start..start + first].copy_from_slice(&data[..first]);
        self.storage[..data.len() - first].copy_from_slice(&data[first..]);
        self.len += data.len();
    }

    fn pop(&mut self, output: &mut [u8], capacity: usize) -> usize {
        let to_read = self.len.min(output.len());
        let first = to_read.min(capacity - self.read_pos);
        output[..first].copy_from_slice(&self.storage[self.read_pos..self.read_pos + first]);
        output[first..to_read].copy_from_slice(&self.storage[..to_read - first]);
        self.advance(to_read, capacity);
        to_read
    }

    fn advance(&mut self, count: usize, capacity: usize) {
        self.read_pos = (self.read_pos + count) % capacity;
        self.len -= count;
        if self.len == 0 {
            self.read_pos = 0;
        }
    }
}

impl RingBuffer {
    /// Create a ring buffer holding `capacity` bytes that discards newest on overflow.
    ///
    /// A zero capacity is bumped to one byte.
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, OverflowPolicy::DiscardNewest)
    }

    /// Create a ring buffer with an explicit overflow policy.
    pub fn with_policy(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(RingBufferInner {
                state: Mutex::new(RingState {
                    storage: vec![0u8; capacity].into_boxed_slice(),
                    read_pos: 0,
                    len: 0,
                    discarded: 0,
                }),
                capacity,
                policy,
            }),
        }
    }

    /// Write bytes to the ring buffer.
    ///
    /// Returns the number of incoming bytes that were stored. Under
    /// `DiscardNewest` this is at most `free_space()`; under
    /// `OverwriteOldest` the most recent `capacity` bytes of `data` are
    /// always kept.
    pub fn write(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        let capacity = self.inner.capacity;
        let mut state = self.inner.state.lock();

        match self.inner.policy {
            OverflowPolicy::DiscardNewest => {
                let accepted = data.len().min(capacity - state.len);
                state.push(&data[..accepted], capacity);
                state.discarded += (data.len() - accepted) as u64;
                accepted
            }
            OverflowPolicy::OverwriteOldest => {
                let data = if data.len() > capacity {
                    state.discarded += (data.len() - capacity) as u64;
                    &data[data.len() - capacity..]
                } else {
                    data
                };
                let overflow = (state.len + data.len()).saturating_sub(capacity);
                if overflow > 0 {
                    state.advance(overflow, capacity);
                    state.discarded += overflow as u64;
                }
                state.push(data, capacity);
                data.len()
            }
        }
    }

    /// Read bytes from the front of the ring buffer.
    ///
    /// Fills `output` with as many bytes as available, up to `output.len()`.
    /// Returns the number of bytes read, 0 when empty.
    pub fn read(&self, output: &mut [u8]) -> usize {
        if output.is_empty() {
            return 0;
        }
        let capacity = self.inner.capacity;
        self.inner.state.lock().pop(output, capacity)
    }

    /// Returns the number of bytes currently available to read.
    pub fn buffered_bytes(&self) -> usize {
        self.inner.state.lock().len
    }

    /// Returns the total capacity of the buffer in bytes.
    pub fn capacity_bytes(&self) -> usize {
        self.inner.capacity
    }

    /// Returns the number of bytes that can be written without overflow.
    pub fn free_space(&self) -> usize {
        self.inner.capacity - self.buffered_bytes()
    }

    /// Returns `buffered_bytes / capacity_bytes` (0.0 to 1.0).
    pub fn fill_ratio(&self) -> f64 {
        self.buffered_bytes() as f64 / self.inner.capacity as f64
    }

    /// Total bytes dropped by the overflow policy since creation.
    pub fn discarded_bytes(&self) -> u64 {
        self.inner.state.lock().discarded
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.inner.policy
    }

    /// Drop all buffered bytes.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.read_pos = 0;
        state.len = 0;
    }

    /// Returns `true` if the buffer has no bytes available.
    pub fn is_empty(&self) -> bool {
        self.buffered_bytes() == 0
    }

    /// Returns `true` if the buffer is full.
    pub fn is_full(&self) -> bool {
        self.buffered_bytes() >= self.inner.capacity
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RingBuffer")
            .field("capacity", &self.inner.capacity)
            .field("buffered", &state.len)
            .field("policy", &self.inner.policy)
            .finish()
    }
}
