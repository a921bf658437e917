use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::error;

use fieldrec_audio::constants::{FRAME_POP_TIMEOUT, FRAME_SIZE_SAMPLES, SAMPLE_SHIFT};
use fieldrec_audio::frame::AudioFrame;
use fieldrec_audio::queue::FramePopper;
use fieldrec_foundation::{DeviceState, FaultCause, LevelSink, StateManager, StorageError};
use fieldrec_telemetry::RecorderMetrics;

use crate::gateway::StorageGateway;
use crate::session::RecordingSession;

/// Where finalized recordings are announced. The upload queue implements
/// this; submission may block when the queue is full.
pub trait FinishedRecordings: Send + Sync {
    fn submit(&self, filename: String);
}

/// The consumer side of one recording session.
///
/// Drains the frame queue into the session file while the device is
/// `Recording`, then keeps draining whatever is left after the stop request
/// before finalizing. A failed write aborts the session but never skips the
/// finalize: the bytes already on the medium stay reachable.
pub struct WriterThread {
    handle: JoinHandle<()>,
}

impl WriterThread {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        queue: FramePopper,
        mut session: RecordingSession,
        gateway: Arc<StorageGateway>,
        state: StateManager,
        levels: Arc<dyn LevelSink>,
        finished: Arc<dyn FinishedRecordings>,
        metrics: RecorderMetrics,
    ) -> Result<Self, StorageError> {
        let handle = thread::Builder::new()
            .name("recording-writer".to_string())
            .spawn(move || {
                let mut pcm = Vec::with_capacity(FRAME_SIZE_SAMPLES * 2);
                let mut faulted = false;

                while state.current() == DeviceState::Recording || !queue.is_empty() {
                    let Some(frame) = queue.pop_timeout(FRAME_POP_TIMEOUT) else {
                        continue;
                    };
                    if faulted {
                        // Session is dead; drain the leftovers unrecorded.
                        continue;
                    }

                    let stats = convert_frame(&frame, &mut pcm);
                    levels.report_level(stats.sum, stats.peak, stats.sample_count);
                    metrics.frame_level(stats.sum, stats.peak, stats.sample_count);

                    match session.append_pcm(&gateway, &pcm) {
                        Ok(()) => {
                            metrics.frames_written.fetch_add(1, Ordering::Relaxed);
                            metrics
                                .bytes_recorded
                                .fetch_add(pcm.len() as u64, Ordering::Relaxed);
                        }
                        Err(e) => {
                            error!("Storage write failed, aborting session: {}", e);
                            metrics.write_faults.fetch_add(1, Ordering::Relaxed);
                            faulted = true;
                            if let Err(te) =
                                state.transition(DeviceState::Error(FaultCause::StorageWrite))
                            {
                                error!("Fault transition rejected: {}", te);
                            }
                        }
                    }
                }

                if let Some(filename) = session.finalize(&gateway) {
                    metrics.sessions_finalized.fetch_add(1, Ordering::Relaxed);
                    finished.submit(filename);
                }
            })
            .map_err(StorageError::Io)?;

        Ok(Self { handle })
    }

    /// Waits for the drain and finalize to complete.
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("Recording writer thread panicked");
        }
    }
}

struct FrameStats {
    sum: u64,
    peak: i32,
    sample_count: usize,
}

/// Converts one frame of 24-in-32 samples to little-endian 16-bit PCM.
///
/// Level stats are taken from the shifted value before clipping, so an
/// overdriven input reads loud even though the written sample saturates.
fn convert_frame(frame: &AudioFrame, pcm: &mut Vec<u8>) -> FrameStats {
    pcm.clear();
    let mut sum: u64 = 0;
    let mut peak: i32 = 0;

    for &raw in &frame.samples {
        let sample = raw >> SAMPLE_SHIFT;
        let magnitude = sample.abs();
        sum += magnitude as u64;
        if magnitude > peak {
            peak = magnitude;
        }
        let clipped = sample.clamp(-32768, 32767) as i16;
        pcm.extend_from_slice(&clipped.to_le_bytes());
    }

    FrameStats {
        sum,
        peak,
        sample_count: frame.samples.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(samples: Vec<i32>) -> (Vec<i16>, FrameStats) {
        let mut pcm = Vec::new();
        let stats = convert_frame(&AudioFrame::new(samples), &mut pcm);
        let decoded = pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        (decoded, stats)
    }

    #[test]
    fn in_range_samples_survive_the_shift_exactly() {
        let (decoded, stats) = convert(vec![1000 << 8, -(1000 << 8), 0]);
        assert_eq!(decoded, [1000, -1000, 0]);
        assert_eq!(stats.sum, 2000);
        assert_eq!(stats.peak, 1000);
        assert_eq!(stats.sample_count, 3);
    }

    #[test]
    fn loud_samples_clip_to_i16_bounds() {
        let (decoded, stats) = convert(vec![40_000 << 8, -(40_000 << 8)]);
        assert_eq!(decoded, [32_767, -32_768]);
        // Levels see the pre-clip magnitude.
        assert_eq!(stats.peak, 40_000);
        assert_eq!(stats.sum, 80_000);
    }

    #[test]
    fn low_byte_noise_is_discarded() {
        let (decoded, _) = convert(vec![(123 << 8) | 0x7F]);
        assert_eq!(decoded, [123]);
    }

    #[test]
    fn empty_frame_produces_no_bytes() {
        let (decoded, stats) = convert(Vec::new());
        assert!(decoded.is_empty());
        assert_eq!(stats.sample_count, 0);
        assert_eq!(stats.peak, 0);
    }
}
