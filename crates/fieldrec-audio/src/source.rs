use std::time::Duration;

use fieldrec_foundation::AudioError;

/// A blocking audio peripheral delivering fixed-size blocks of raw samples.
///
/// `read_block` fills `out` from the front and returns the number of valid
/// samples, waiting at most `timeout` for data. An elapsed timeout is an
/// empty read (`Ok(0)`), not an error; the caller uses the gap to re-check
/// whether the session is still running. Implementations must never block
/// longer than `timeout`.
pub trait BlockSource: Send {
    fn read_block(&mut self, out: &mut [i32], timeout: Duration) -> Result<usize, AudioError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}
