//! Recorder configuration.
//!
//! The config lives in a small TOML file next to the binary. When the file
//! is missing the loader writes a commented template and fails, so a fresh
//! deployment always boots into the config-fault state until someone has
//! looked at the file at least once.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "fieldrec.toml";

const CONFIG_TEMPLATE: &str = r#"# fieldrec configuration
# Edit the device identity before first use.

# Name prefixed to every recording filename.
device_name = "recorder"

[storage]
# Directory standing in for the removable medium.
root = "recordings"

[upload]
# Enable background upload of finished recordings.
enabled = true
# Remote drop point: "dir:<path>" or "tcp:<host>:<port>".
remote = "dir:remote"
# Fixed delay between upload retry attempts, in seconds.
retry_backoff_secs = 5
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub upload: UploadSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_backoff_secs")]
    pub retry_backoff_secs: u64,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            enabled: true,
            remote: default_remote(),
            retry_backoff_secs: default_backoff_secs(),
        }
    }
}

fn default_device_name() -> String {
    "recorder".to_string()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("recordings")
}

fn default_true() -> bool {
    true
}

fn default_remote() -> String {
    "dir:remote".to_string()
}

fn default_backoff_secs() -> u64 {
    5
}

impl RecorderConfig {
    /// Loads the config file, writing the template first if it is missing.
    ///
    /// A freshly written template is an error: the device must not record
    /// under a name nobody chose.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            fs::write(path, CONFIG_TEMPLATE).map_err(|source| ConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
            return Err(ConfigError::TemplateCreated {
                path: path.to_path_buf(),
            });
        }

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.is_empty() {
            return Err(ConfigError::Invalid("device_name must not be empty".into()));
        }
        if self.device_name.contains(['/', '\\']) || self.device_name.contains(char::is_whitespace)
        {
            return Err(ConfigError::Invalid(format!(
                "device_name {:?} must not contain separators or whitespace",
                self.device_name
            )));
        }
        if self.upload.enabled {
            parse_remote(&self.upload.remote)?;
        }
        Ok(())
    }
}

/// Parsed form of the `upload.remote` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSpec {
    Dir(PathBuf),
    Tcp(String),
}

pub fn parse_remote(spec: &str) -> Result<RemoteSpec, ConfigError> {
    if let Some(path) = spec.strip_prefix("dir:") {
        if path.is_empty() {
            return Err(ConfigError::Invalid("remote dir path is empty".into()));
        }
        return Ok(RemoteSpec::Dir(PathBuf::from(path)));
    }
    if let Some(addr) = spec.strip_prefix("tcp:") {
        if !addr.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "remote tcp spec {:?} must be host:port",
                addr
            )));
        }
        return Ok(RemoteSpec::Tcp(addr.to_string()));
    }
    Err(ConfigError::Invalid(format!(
        "remote {:?} must start with dir: or tcp:",
        spec
    )))
}
