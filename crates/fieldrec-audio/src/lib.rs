pub mod capture;
pub mod constants;
pub mod frame;
pub mod mic;
pub mod queue;
pub mod source;
pub mod synthetic;
pub mod watchdog;

pub use capture::CaptureThread;
pub use frame::AudioFrame;
pub use mic::CpalSource;
pub use queue::{frame_queue, FramePopper, FramePusher};
pub use source::BlockSource;
pub use synthetic::SyntheticSource;
pub use watchdog::CaptureWatchdog;
