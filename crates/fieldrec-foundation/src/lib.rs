pub mod config;
pub mod error;
pub mod feedback;
pub mod shutdown;
pub mod state;

pub use config::{
    parse_remote, RecorderConfig, RemoteSpec, StorageSection, UploadSection, DEFAULT_CONFIG_PATH,
};
pub use error::{AudioError, ConfigError, DeviceError, StorageError, UploadError};
pub use feedback::{
    ControlInput, LevelSink, NullLevelSink, NullStatusSink, StatusIndicator, StatusSink,
};
pub use shutdown::{install_signal_handlers, ShutdownToken};
pub use state::{DeviceState, FaultCause, StateManager};
