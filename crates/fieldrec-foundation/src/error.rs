use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::state::FaultCause;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Audio subsystem error: {0}")]
    Audio(#[from] AudioError),

    #[error("Storage subsystem error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upload subsystem error: {0}")]
    Upload(#[from] UploadError),

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

impl DeviceError {
    /// Maps a startup failure to the Error-state family it puts the device
    /// in. Returns `None` for errors that are not init faults.
    pub fn fault_cause(&self) -> Option<FaultCause> {
        match self {
            DeviceError::Audio(_) => Some(FaultCause::MicInit),
            DeviceError::Storage(StorageError::ShortWrite { .. }) => {
                Some(FaultCause::StorageWrite)
            }
            DeviceError::Storage(_) => Some(FaultCause::StorageInit),
            DeviceError::Config(_) => Some(FaultCause::ConfigRead),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No input device available: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("Peripheral read failed: {0}")]
    ReadFailed(String),

    #[error("Sample format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("No audio data received for {duration:?}")]
    NoDataTimeout { duration: Duration },

    #[error("Stream error: {0}")]
    Stream(#[from] cpal::StreamError),

    #[error("Build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Default stream config error: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Fatal audio error: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage mount failed at {path}: {source}")]
    MountFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create {name}: {source}")]
    CreateFailed {
        name: String,
        source: std::io::Error,
    },

    #[error("Failed to open {name}: {source}")]
    OpenFailed {
        name: String,
        source: std::io::Error,
    },

    #[error("Short write: wrote {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    #[error("Recording file is not open")]
    NotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file {path} was missing; wrote a template, edit it and restart")]
    TemplateCreated { path: PathBuf },

    #[error("Failed to read config {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Not connected to remote store")]
    NotConnected,

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Remote refused {command}: {reply}")]
    Refused { command: String, reply: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transfer interrupted after {sent} of {total} bytes")]
    Interrupted { sent: u64, total: u64 },

    #[error("Local read failed: {0}")]
    LocalRead(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
