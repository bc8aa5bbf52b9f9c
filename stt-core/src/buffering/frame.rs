//! Frame and Utterance Buffer types (§3).

/// Default frame length in samples, as drained from the Ring Buffer per
/// pipeline iteration.
pub const DEFAULT_FRAME_LENGTH: usize = 512;

/// A fixed-size block of mono PCM samples at the pipeline's sample rate.
#[derive(Debug, Clone)]
pub struct Frame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Frame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Ordered sample sequence accumulated across one speech segment.
///
/// Invariant: `len() <= capacity`. Appended by the Pipeline Processor;
/// consumed and cleared once handed off to the Transcriber.
#[derive(Debug, Clone)]
pub struct UtteranceBuffer {
    samples: Vec<f32>,
    capacity: usize,
    pub sample_rate: u32,
}

impl UtteranceBuffer {
    pub fn new(capacity: usize, sample_rate: u32) -> Self {
        Self {
            samples: Vec::with_capacity(capacity.min(1 << 20)),
            capacity,
            sample_rate,
        }
    }

    /// Append samples, truncating to `capacity` if they would overflow it.
    /// Returns `true` if the buffer reached capacity as a result.
    pub fn append(&mut self, samples: &[f32]) -> bool {
        let remaining = self.capacity.saturating_sub(self.samples.len());
        let take = samples.len().min(remaining);
        self.samples.extend_from_slice(&samples[..take]);
        debug_assert!(self.samples.len() <= self.capacity);
        self.samples.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Take the accumulated samples, leaving the buffer empty and ready for
    /// the next utterance.
    pub fn take(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_respects_capacity() {
        let mut buf = UtteranceBuffer::new(4, 16_000);
        assert!(!buf.append(&[1.0, 2.0]));
        assert!(buf.append(&[3.0, 4.0, 5.0]));
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.samples(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn take_clears_buffer() {
        let mut buf = UtteranceBuffer::new(8, 16_000);
        buf.append(&[1.0, 2.0]);
        let taken = buf.take();
        assert_eq!(taken, vec![1.0, 2.0]);
        assert!(buf.is_empty());
    }
}
