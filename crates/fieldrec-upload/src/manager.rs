use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use fieldrec_foundation::{DeviceState, ShutdownToken, StateManager, StorageError, UploadError};
use fieldrec_storage::StorageGateway;
use fieldrec_telemetry::RecorderMetrics;

use crate::queue::UploadQueue;
use crate::remote::RemoteStore;

/// One storage-lock-bounded read per network write. Matches the largest
/// chunk the medium is allowed to serve an upload in one lock hold.
pub const CHUNK_SIZE: usize = 2000;

/// Poll interval while the queue is empty.
const IDLE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub device_name: String,
    pub retry_backoff: Duration,
}

/// Background drain of the upload queue.
///
/// Uploads the head entry, acks it only after the remote rename confirms
/// the transfer, and retries forever on failure with a fixed backoff. A
/// retried transfer restarts from byte zero; the remote side sees at least
/// one copy of every recording, possibly more, never a truncated one.
pub struct UploadManager {
    handle: JoinHandle<()>,
}

impl UploadManager {
    pub fn spawn(
        queue: Arc<UploadQueue>,
        gateway: Arc<StorageGateway>,
        mut store: Box<dyn RemoteStore>,
        state: StateManager,
        config: UploadConfig,
        metrics: RecorderMetrics,
        shutdown: ShutdownToken,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name("upload-manager".to_string())
            .spawn(move || {
                info!("Upload manager started, remote {}", store.describe());
                run(
                    &queue,
                    &gateway,
                    store.as_mut(),
                    &state,
                    &config,
                    &metrics,
                    &shutdown,
                );
                store.disconnect();
                info!("Upload manager stopped");
            })?;

        Ok(Self { handle })
    }

    pub fn join(self) {
        if self.handle.join().is_err() {
            tracing::error!("Upload manager thread panicked");
        }
    }
}

fn run(
    queue: &UploadQueue,
    gateway: &StorageGateway,
    store: &mut dyn RemoteStore,
    state: &StateManager,
    config: &UploadConfig,
    metrics: &RecorderMetrics,
    shutdown: &ShutdownToken,
) {
    loop {
        if shutdown.is_requested() {
            break;
        }

        let Some(filename) = queue.peek() else {
            // Empty queue while docked means the drain is complete: tell
            // the collection side with the device marker, exactly once per
            // dock session (the transition removes the condition).
            if state.current() == DeviceState::DockUploading {
                match send_marker(store, &config.device_name) {
                    Ok(()) => {
                        metrics.markers_sent.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = state.transition(DeviceState::DockIdle) {
                            warn!("Dock-complete transition rejected: {}", e);
                        }
                    }
                    Err(e) => {
                        warn!("Marker upload failed, will retry: {}", e);
                        store.disconnect();
                        if shutdown.wait_timeout(config.retry_backoff) {
                            break;
                        }
                    }
                }
                continue;
            }
            if shutdown.wait_timeout(IDLE_POLL) {
                break;
            }
            continue;
        };

        match upload_one(gateway, store, &filename, metrics, shutdown) {
            Ok(Outcome::Sent) => {
                metrics.uploads_completed.fetch_add(1, Ordering::Relaxed);
                if !queue.ack(&filename) {
                    warn!("Uploaded {} was no longer at the queue head", filename);
                }
            }
            Ok(Outcome::MissingLocal) => {
                warn!("{} vanished from storage; dropping queue entry", filename);
                metrics.uploads_discarded.fetch_add(1, Ordering::Relaxed);
                queue.ack(&filename);
            }
            Err(e) => {
                warn!(
                    "Upload of {} failed, retrying in {:?}: {}",
                    filename, config.retry_backoff, e
                );
                metrics.upload_retries.fetch_add(1, Ordering::Relaxed);
                store.disconnect();
                if shutdown.wait_timeout(config.retry_backoff) {
                    break;
                }
            }
        }
    }
}

enum Outcome {
    Sent,
    MissingLocal,
}

fn upload_one(
    gateway: &StorageGateway,
    store: &mut dyn RemoteStore,
    filename: &str,
    metrics: &RecorderMetrics,
    shutdown: &ShutdownToken,
) -> Result<Outcome, UploadError> {
    let size = match gateway.file_size(filename) {
        Ok(size) => size,
        Err(StorageError::OpenFailed { ref source, .. })
            if source.kind() == io::ErrorKind::NotFound =>
        {
            return Ok(Outcome::MissingLocal);
        }
        Err(e) => return Err(UploadError::LocalRead(e.to_string())),
    };
    let mut file = match gateway.open_for_read(filename) {
        Ok(file) => file,
        Err(StorageError::OpenFailed { ref source, .. })
            if source.kind() == io::ErrorKind::NotFound =>
        {
            return Ok(Outcome::MissingLocal);
        }
        Err(e) => return Err(UploadError::LocalRead(e.to_string())),
    };

    let temp_name = format!("{}.temp", filename);
    info!("Uploading {} ({} bytes)", filename, size);
    metrics.uploads_started.fetch_add(1, Ordering::Relaxed);

    store.ensure_connected()?;
    store.begin_file(&temp_name)?;

    let mut buf = [0u8; CHUNK_SIZE];
    let mut sent: u64 = 0;
    while sent < size {
        if shutdown.is_requested() {
            return Err(UploadError::Interrupted { sent, total: size });
        }
        let n = gateway
            .read_chunk(&mut file, &mut buf)
            .map_err(|e| UploadError::LocalRead(e.to_string()))?;
        if n == 0 {
            // File ended early; re-peek and start over.
            return Err(UploadError::Interrupted { sent, total: size });
        }
        store.write_chunk(&buf[..n])?;
        sent += n as u64;
        metrics.upload_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    store.finish_file()?;
    store.rename(&temp_name, filename)?;
    debug!("Upload of {} complete", filename);
    Ok(Outcome::Sent)
}

/// Empty `<device>.done` marker, streamed with the same temp-then-rename
/// discipline as a recording.
fn send_marker(store: &mut dyn RemoteStore, device_name: &str) -> Result<(), UploadError> {
    let name = format!("{}.done", device_name);
    let temp = format!("{}.temp", name);
    store.ensure_connected()?;
    store.begin_file(&temp)?;
    store.finish_file()?;
    store.rename(&temp, &name)?;
    info!("Dock drain complete, marker {} uploaded", name);
    Ok(())
}
