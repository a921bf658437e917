use std::thread;
use std::time::{Duration, Instant};

use fieldrec_foundation::AudioError;

use crate::constants::{SAMPLE_RATE_HZ, SAMPLE_SHIFT};
use crate::source::BlockSource;

/// Deterministic signal source for runs without a microphone.
///
/// Produces a square wave alternating +amplitude / -amplitude on every
/// sample, delivered in the same 24-in-32 framing as the real peripheral.
/// In paced mode blocks become available at the nominal 16 kHz rate;
/// unpaced mode returns them immediately, which tests use to push minutes
/// of audio through the pipeline in milliseconds.
pub struct SyntheticSource {
    amplitude_raw: i32,
    produced: u64,
    started: Option<Instant>,
    paced: bool,
}

impl SyntheticSource {
    /// Paced source; `amplitude` is in 16-bit units.
    pub fn new(amplitude: i16) -> Self {
        Self {
            amplitude_raw: (amplitude as i32) << SAMPLE_SHIFT,
            produced: 0,
            started: None,
            paced: true,
        }
    }

    /// Unpaced source for tests.
    pub fn unpaced(amplitude: i16) -> Self {
        Self {
            paced: false,
            ..Self::new(amplitude)
        }
    }
}

impl BlockSource for SyntheticSource {
    fn read_block(&mut self, out: &mut [i32], timeout: Duration) -> Result<usize, AudioError> {
        if self.paced {
            let started = *self.started.get_or_insert_with(Instant::now);
            let due =
                started + Duration::from_micros(self.produced * 1_000_000 / SAMPLE_RATE_HZ as u64);
            let now = Instant::now();
            if due > now {
                let wait = due - now;
                if wait > timeout {
                    thread::sleep(timeout);
                    return Ok(0);
                }
                thread::sleep(wait);
            }
        }

        for (i, slot) in out.iter_mut().enumerate() {
            let index = self.produced + i as u64;
            *slot = if index % 2 == 0 {
                self.amplitude_raw
            } else {
                -self.amplitude_raw
            };
        }
        self.produced += out.len() as u64;
        Ok(out.len())
    }

    fn describe(&self) -> String {
        format!(
            "synthetic square wave (amplitude {})",
            self.amplitude_raw >> SAMPLE_SHIFT
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternates_sign_across_block_boundaries() {
        let mut source = SyntheticSource::unpaced(1000);
        let mut a = [0i32; 3];
        let mut b = [0i32; 3];
        assert_eq!(source.read_block(&mut a, Duration::ZERO).unwrap(), 3);
        assert_eq!(source.read_block(&mut b, Duration::ZERO).unwrap(), 3);

        let raw = 1000i32 << SAMPLE_SHIFT;
        assert_eq!(a, [raw, -raw, raw]);
        // Continues the alternation where the previous block stopped.
        assert_eq!(b, [-raw, raw, -raw]);
    }

    #[test]
    fn paced_source_respects_the_timeout() {
        let mut source = SyntheticSource::new(100);
        let mut block = [0i32; 1024];
        // First block is due immediately.
        assert_eq!(
            source
                .read_block(&mut block, Duration::from_millis(100))
                .unwrap(),
            1024
        );
        // The second is 64 ms away; a 5 ms timeout must come back empty.
        let start = Instant::now();
        let n = source
            .read_block(&mut block, Duration::from_millis(5))
            .unwrap();
        assert_eq!(n, 0);
        assert!(start.elapsed() < Duration::from_millis(60));
    }
}
