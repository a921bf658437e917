/// One peripheral read's worth of raw samples.
///
/// Samples keep the peripheral's 24-in-32 left-justified framing; the
/// recording writer owns the shift down to 16-bit PCM. A short read simply
/// produces a shorter vector, so the length is always the valid count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub samples: Vec<i32>,
}

impl AudioFrame {
    pub fn new(samples: Vec<i32>) -> Self {
        Self { samples }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Bytes this frame occupies once converted to 16-bit PCM.
    pub fn pcm_len(&self) -> usize {
        self.samples.len() * 2
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
