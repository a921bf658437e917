use chrono::{DateTime, Local};
use tracing::{info, warn};

use fieldrec_audio::constants::SAMPLE_RATE_HZ;
use fieldrec_foundation::StorageError;

use crate::gateway::StorageGateway;

/// Anything a recording can be written into. Production uses `std::fs::File`;
/// tests inject handles with programmed failures.
pub trait StorageFile: std::io::Write + std::io::Seek + Send {}

impl<T: std::io::Write + std::io::Seek + Send> StorageFile for T {}

/// One recording, from file creation to finalize.
///
/// Tracks the confirmed PCM byte count; the header patch at the end uses
/// exactly this number, so a session that faulted mid-write still ends up
/// with a header describing the bytes that actually landed.
pub struct RecordingSession {
    filename: String,
    file: Option<Box<dyn StorageFile>>,
    data_size: u32,
    started_at: DateTime<Local>,
}

impl RecordingSession {
    /// Creates `<device>_<seq:08>.wav` under the gateway root with a
    /// placeholder header.
    pub fn create(
        gateway: &StorageGateway,
        device_name: &str,
        sequence: u32,
    ) -> Result<Self, StorageError> {
        let filename = format!("{}_{:08}.wav", device_name, sequence);
        let mut file = gateway.create(&filename)?;
        gateway.write_placeholder(&mut file, SAMPLE_RATE_HZ)?;
        info!("Recording started: {}", filename);
        Ok(Self::from_file(filename, Box::new(file)))
    }

    /// Wraps an already-open file positioned after its header.
    pub fn from_file(filename: String, file: Box<dyn StorageFile>) -> Self {
        Self {
            filename,
            file: Some(file),
            data_size: 0,
            started_at: Local::now(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Appends one frame's PCM block through the gateway. The byte counter
    /// only advances on a confirmed full write.
    pub fn append_pcm(&mut self, gateway: &StorageGateway, pcm: &[u8]) -> Result<(), StorageError> {
        let Some(file) = self.file.as_mut() else {
            return Err(StorageError::NotOpen);
        };
        let written = gateway.write_frame(file.as_mut(), pcm)?;
        self.data_size += written as u32;
        Ok(())
    }

    /// Patches the header, closes the file and returns the filename so it
    /// can be queued for upload. Runs at most once; later calls get `None`.
    ///
    /// A failing header patch is logged but does not keep the recording
    /// from being handed on: the PCM bytes are on the medium either way.
    pub fn finalize(&mut self, gateway: &StorageGateway) -> Option<String> {
        let mut file = self.file.take()?;
        if let Err(e) = gateway.patch_header(Some(file.as_mut()), SAMPLE_RATE_HZ, self.data_size) {
            warn!("Header patch failed on {}: {}", self.filename, e);
        }
        drop(file);

        let elapsed = Local::now().signed_duration_since(self.started_at);
        info!(
            "Recording finished: {} ({} audio bytes, {} s)",
            self.filename,
            self.data_size,
            elapsed.num_seconds()
        );
        Some(self.filename.clone())
    }
}

/// Highest `<device>_<NNNNNNNN>.wav` sequence already on the medium, or 0.
/// Numbering continues above it so old recordings are never overwritten.
pub fn highest_sequence(gateway: &StorageGateway, device_name: &str) -> Result<u32, StorageError> {
    let prefix = format!("{}_", device_name);
    let mut highest = 0;
    for name in gateway.list_names()? {
        if let Some(seq) = parse_sequence(&name, &prefix) {
            highest = highest.max(seq);
        }
    }
    Ok(highest)
}

fn parse_sequence(name: &str, prefix: &str) -> Option<u32> {
    let digits = name.strip_prefix(prefix)?.strip_suffix(".wav")?;
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
