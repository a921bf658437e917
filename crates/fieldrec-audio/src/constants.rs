//! Capture-path constants shared across the recorder pipeline.

use std::time::Duration;

/// Peripheral sample rate in Hz. The mic hardware is clocked at 16 kHz and
/// the pipeline performs no resampling.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Samples per peripheral read. One frame holds at most this many.
pub const FRAME_SIZE_SAMPLES: usize = 1024;

/// Right shift that drops the unused low byte of the 24-in-32 left-justified
/// framing the peripheral delivers.
pub const SAMPLE_SHIFT: u32 = 8;

/// Capacity of the bounded frame queue between capture and writer.
pub const FRAME_QUEUE_CAPACITY: usize = 64;

/// Upper bound on a single blocking peripheral read.
pub const BLOCK_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Writer-side pop timeout, kept short so the drain condition is re-checked
/// promptly after a stop request.
pub const FRAME_POP_TIMEOUT: Duration = Duration::from_millis(10);

/// Duration of one full frame at the fixed rate (1024 / 16000 = 64 ms).
pub const FRAME_DURATION_MS: u64 = (FRAME_SIZE_SAMPLES as u64 * 1000) / SAMPLE_RATE_HZ as u64;

/// Capture is considered stalled after this long without a successful read.
pub const CAPTURE_STALL_TIMEOUT: Duration = Duration::from_secs(5);
