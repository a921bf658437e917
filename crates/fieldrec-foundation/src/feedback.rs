//! Seams between the recorder core and whatever front panel the host
//! provides. The device build drives an LED from these; the host build logs.

use crate::state::FaultCause;

/// What the status display should show right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIndicator {
    Booting,
    Ready,
    Recording,
    Uploading,
    DockDraining,
    DockComplete,
    Fault(FaultCause),
}

/// Receives per-frame loudness from the recording writer.
///
/// `sum` is the sum of absolute pre-clip sample values, `peak` the largest
/// of them. Both are taken after the samples are shifted down to 16-bit
/// range but before clipping, so a slammed input still reads as loud.
pub trait LevelSink: Send + Sync {
    fn report_level(&self, sum: u64, peak: i32, sample_count: usize);
}

/// Receives status changes.
pub trait StatusSink: Send + Sync {
    fn set_status(&self, indicator: StatusIndicator);
}

/// A debounced on/off control, polled once per control tick.
pub trait ControlInput: Send {
    fn is_triggered(&self) -> bool;
}

/// Discards levels; used in tests and headless runs.
pub struct NullLevelSink;

impl LevelSink for NullLevelSink {
    fn report_level(&self, _sum: u64, _peak: i32, _sample_count: usize) {}
}

/// Discards status changes.
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn set_status(&self, _indicator: StatusIndicator) {}
}
