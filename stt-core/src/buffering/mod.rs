//! Bounded FIFO ring buffer for audio samples (C1).
//!
//! Single-producer (capture callback) / single-consumer (pipeline task),
//! guarded by a short `parking_lot::Mutex` critical section around the
//! index bookkeeping — the critical section is a handful of index/copy
//! operations, never a blocking call, so it stays safe to use from the
//! capture callback's `write`.

pub mod frame;

use parking_lot::Mutex;

struct Inner {
    buf: Vec<f32>,
    head: usize,
    tail: usize,
    count: usize,
}

/// Fixed-capacity ring buffer of `f32` PCM samples.
///
/// `write` never blocks and never overwrites: it writes up to the available
/// space and returns a short count when full, leaving the drop decision to
/// the caller (the capture callback increments its own drop counter).
pub struct RingBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                buf: vec![0.0; capacity],
                head: 0,
                tail: 0,
                count: 0,
            }),
            capacity,
        }
    }

    /// Write as many samples as fit. Returns the number actually written.
    /// Never blocks.
    pub fn write(&self, samples: &[f32]) -> usize {
        let mut inner = self.inner.lock();
        let space = self.capacity - inner.count;
        let n = samples.len().min(space);
        for &s in &samples[..n] {
            let head = inner.head;
            inner.buf[head] = s;
            inner.head = (head + 1) % self.capacity;
        }
        inner.count += n;
        n
    }

    /// Read up to `n` samples in FIFO order. Returns fewer if not enough
    /// are available; returns an empty vec if the buffer is empty.
    pub fn read(&self, n: usize) -> Vec<f32> {
        let mut inner = self.inner.lock();
        let n = n.min(inner.count);
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let tail = inner.tail;
            out.push(inner.buf[tail]);
            inner.tail = (tail + 1) % self.capacity;
        }
        inner.count -= n;
        out
    }

    /// Number of samples currently available to read.
    pub fn available(&self) -> usize {
        self.inner.lock().count
    }

    /// Drop all buffered samples without reading them.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.head = 0;
        inner.tail = 0;
        inner.count = 0;
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().count == self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_preserves_fifo_order() {
        let rb = RingBuffer::new(8);
        assert_eq!(rb.write(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(rb.available(), 3);
        assert_eq!(rb.read(2), vec![1.0, 2.0]);
        assert_eq!(rb.available(), 1);
        assert_eq!(rb.read(10), vec![3.0]);
        assert_eq!(rb.available(), 0);
    }

    #[test]
    fn write_returns_short_count_when_full() {
        let rb = RingBuffer::new(4);
        assert_eq!(rb.write(&[1.0, 2.0, 3.0, 4.0]), 4);
        assert!(rb.is_full());
        // no room left: short write
        assert_eq!(rb.write(&[5.0, 6.0]), 0);
    }

    #[test]
    fn read_empty_returns_empty() {
        let rb = RingBuffer::new(4);
        assert!(rb.read(3).is_empty());
    }

    #[test]
    fn clear_resets_state() {
        let rb = RingBuffer::new(4);
        rb.write(&[1.0, 2.0]);
        rb.clear();
        assert_eq!(rb.available(), 0);
        assert!(!rb.is_full());
    }

    #[test]
    fn wraps_around_after_partial_reads() {
        let rb = RingBuffer::new(4);
        rb.write(&[1.0, 2.0, 3.0]);
        rb.read(2); // tail advances past index 1
        rb.write(&[4.0, 5.0]); // wraps head around
        assert_eq!(rb.available(), 3);
        assert_eq!(rb.read(3), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn available_equals_written_minus_read_clamped() {
        let rb = RingBuffer::new(4);
        let w = rb.write(&[1.0, 2.0, 3.0, 4.0, 5.0]); // capacity 4, short write
        let r = rb.read(2);
        assert_eq!(rb.available(), w.min(4) - r.len());
    }
}
