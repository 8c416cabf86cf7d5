//! Fixed-capacity circular store for recent log lines.

use parking_lot::RwLock;

/// Default number of lines retained per session.
pub const DEFAULT_RING_BUFFER_LINES: usize = 500;

/// Circular buffer of log lines with concurrent append and snapshot read.
///
/// Appends are O(1) and evict the oldest line once the buffer is full.
/// Readers get a consistent snapshot; interleaving across simultaneous
/// writers is unspecified beyond per-line atomicity.
pub struct RingBuffer {
    inner: RwLock<RingState>,
}

struct RingState {
    buf: Vec<String>,
    head: usize,
    count: usize,
}

impl RingBuffer {
    /// Create a ring buffer; a capacity of 0 falls back to the default.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_RING_BUFFER_LINES
        } else {
            capacity
        };

        Self {
            inner: RwLock::new(RingState {
                buf: vec![String::new(); capacity],
                head: 0,
                count: 0,
            }),
        }
    }

    /// Store one line, evicting the oldest line when full.
    pub fn append(&self, line: impl Into<String>) {
        let mut state = self.inner.write();
        let capacity = state.buf.len();
        let head = state.head;
        state.buf[head] = line.into();
        state.head = (head + 1) % capacity;
        if state.count < capacity {
            state.count += 1;
        }
    }

    /// Return up to the last `n` lines, ordered oldest to newest.
    pub fn last(&self, n: usize) -> Vec<String> {
        if n == 0 {
            return Vec::new();
        }

        let state = self.inner.read();
        if state.count == 0 {
            return Vec::new();
        }

        let n = n.min(state.count);
        let capacity = state.buf.len();
        let start = (state.head + capacity - n) % capacity;

        (0..n)
            .map(|i| state.buf[(start + i) % capacity].clone())
            .collect()
    }

    /// Number of lines currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
