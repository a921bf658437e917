use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use fieldrec_foundation::UploadError;

use crate::remote::RemoteStore;

/// Remote store backed by a local directory, the default drop point for
/// host runs. It keeps the same temp-then-rename discipline as the network
/// store so consumers watching the directory never see partial files.
pub struct DirStore {
    root: PathBuf,
    current: Option<File>,
    connected: bool,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: None,
            connected: false,
        }
    }
}

impl RemoteStore for DirStore {
    fn ensure_connected(&mut self) -> Result<(), UploadError> {
        if !self.connected {
            fs::create_dir_all(&self.root)?;
            self.connected = true;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn begin_file(&mut self, name: &str) -> Result<(), UploadError> {
        if !self.connected {
            return Err(UploadError::NotConnected);
        }
        // Truncates a stale leftover from an interrupted attempt.
        self.current = Some(File::create(self.root.join(name))?);
        Ok(())
    }

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), UploadError> {
        let Some(file) = self.current.as_mut() else {
            return Err(UploadError::Protocol("no file in progress".into()));
        };
        file.write_all(data)?;
        Ok(())
    }

    fn finish_file(&mut self) -> Result<(), UploadError> {
        if let Some(file) = self.current.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), UploadError> {
        fs::rename(self.root.join(from), self.root.join(to))?;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.current = None;
        self.connected = false;
    }

    fn describe(&self) -> String {
        format!("dir:{}", self.root.display())
    }
}
