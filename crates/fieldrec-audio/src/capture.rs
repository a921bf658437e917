use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use fieldrec_foundation::{AudioError, DeviceState, StateManager};
use fieldrec_telemetry::RecorderMetrics;

use crate::constants::{BLOCK_READ_TIMEOUT, CAPTURE_STALL_TIMEOUT, FRAME_SIZE_SAMPLES};
use crate::frame::AudioFrame;
use crate::queue::FramePusher;
use crate::source::BlockSource;
use crate::watchdog::CaptureWatchdog;

/// The producer side of one recording session.
///
/// Owns a dedicated thread that reads blocks from the source and pushes
/// them onto the frame queue until the device leaves `Recording`. The
/// source is returned on join so the next session can reuse it.
pub struct CaptureThread {
    handle: JoinHandle<Box<dyn BlockSource>>,
}

impl CaptureThread {
    pub fn spawn(
        mut source: Box<dyn BlockSource>,
        queue: FramePusher,
        state: StateManager,
        metrics: RecorderMetrics,
    ) -> Result<Self, AudioError> {
        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                info!("Capture started on {}", source.describe());
                let mut watchdog = CaptureWatchdog::new(CAPTURE_STALL_TIMEOUT, metrics.clone());
                watchdog.start();

                let mut block = vec![0i32; FRAME_SIZE_SAMPLES];
                while state.current() == DeviceState::Recording {
                    match source.read_block(&mut block, BLOCK_READ_TIMEOUT) {
                        Ok(0) => {
                            // Timed out empty; loop around and re-check state.
                        }
                        Ok(n) => {
                            watchdog.feed();
                            metrics.frames_captured.fetch_add(1, Ordering::Relaxed);
                            if !queue.push(AudioFrame::new(block[..n].to_vec())) {
                                metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(e) => {
                            // One bad read skips a frame, never the session.
                            debug!("Peripheral read failed: {}", e);
                            metrics.capture_read_errors.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }

                watchdog.stop();
                info!("Capture stopped");
                source
            })
            .map_err(|e| AudioError::Fatal(format!("Failed to spawn capture thread: {}", e)))?;

        Ok(Self { handle })
    }

    /// Waits for the loop to observe the state change and exit, handing the
    /// source back for the next session. `None` means the thread panicked.
    pub fn join(self) -> Option<Box<dyn BlockSource>> {
        match self.handle.join() {
            Ok(source) => Some(source),
            Err(_) => {
                error!("Capture thread panicked");
                None
            }
        }
    }
}
