use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fieldrec_foundation::{DeviceState, ShutdownToken, StateManager, UploadError};
use fieldrec_storage::StorageGateway;
use fieldrec_telemetry::RecorderMetrics;
use fieldrec_upload::{DirStore, RemoteStore, UploadConfig, UploadManager, UploadQueue};
use tempfile::TempDir;

#[derive(Default)]
struct FakeState {
    files: HashMap<String, Vec<u8>>,
    open: Option<String>,
    begins: Vec<String>,
    renames: Vec<(String, String)>,
    /// Accept this many bytes of the current attempt, then fail once.
    fail_after_bytes: Option<u64>,
    attempt_bytes: u64,
}

/// Scriptable in-memory remote; the test keeps a handle on the shared
/// state while the manager owns the store.
#[derive(Clone, Default)]
struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRemote {
    fn fail_after(bytes: u64) -> Self {
        let fake = Self::default();
        fake.state.lock().fail_after_bytes = Some(bytes);
        fake
    }
}

impl RemoteStore for FakeRemote {
    fn ensure_connected(&mut self) -> Result<(), UploadError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn begin_file(&mut self, name: &str) -> Result<(), UploadError> {
        let mut state = self.state.lock();
        state.begins.push(name.to_string());
        state.files.insert(name.to_string(), Vec::new());
        state.open = Some(name.to_string());
        state.attempt_bytes = 0;
        Ok(())
    }

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), UploadError> {
        let mut state = self.state.lock();
        if let Some(limit) = state.fail_after_bytes {
            if state.attempt_bytes + data.len() as u64 > limit {
                state.fail_after_bytes = None;
                return Err(UploadError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "link dropped",
                )));
            }
        }
        let Some(open) = state.open.clone() else {
            return Err(UploadError::Protocol("no file in progress".into()));
        };
        state.attempt_bytes += data.len() as u64;
        state.files.get_mut(&open).unwrap().extend_from_slice(data);
        Ok(())
    }

    fn finish_file(&mut self) -> Result<(), UploadError> {
        self.state.lock().open = None;
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), UploadError> {
        let mut state = self.state.lock();
        let Some(content) = state.files.remove(from) else {
            return Err(UploadError::Protocol(format!("no such file {from}")));
        };
        state.files.insert(to.to_string(), content);
        state.renames.push((from.to_string(), to.to_string()));
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn idle_state() -> StateManager {
    let state = StateManager::new();
    state.transition(DeviceState::Idle).unwrap();
    state
}

fn spawn_manager(
    queue: &Arc<UploadQueue>,
    gateway: &Arc<StorageGateway>,
    store: Box<dyn RemoteStore>,
    state: &StateManager,
    metrics: &RecorderMetrics,
    shutdown: &ShutdownToken,
) -> UploadManager {
    UploadManager::spawn(
        queue.clone(),
        gateway.clone(),
        store,
        state.clone(),
        UploadConfig {
            device_name: "unit7".to_string(),
            retry_backoff: Duration::from_millis(50),
        },
        metrics.clone(),
        shutdown.clone(),
    )
    .unwrap()
}

#[test]
fn interrupted_transfer_retries_from_byte_zero() {
    let dir = TempDir::new().unwrap();
    let gateway = Arc::new(StorageGateway::mount(dir.path()).unwrap());
    let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(dir.path().join("unit7_00000001.wav"), &payload).unwrap();

    let queue = Arc::new(UploadQueue::new(20));
    queue.push_blocking("unit7_00000001.wav".to_string());

    // The link dies after 30000 bytes of the first attempt.
    let fake = FakeRemote::fail_after(30_000);
    let probe = fake.clone();
    let state = idle_state();
    let metrics = RecorderMetrics::new();
    let shutdown = ShutdownToken::new();

    let manager = spawn_manager(
        &queue,
        &gateway,
        Box::new(fake),
        &state,
        &metrics,
        &shutdown,
    );

    assert!(wait_until(Duration::from_secs(5), || queue.is_empty()));
    shutdown.request();
    manager.join();

    let remote = probe.state.lock();
    // Two attempts, both starting over under the temp name.
    assert_eq!(
        remote.begins,
        ["unit7_00000001.wav.temp", "unit7_00000001.wav.temp"]
    );
    assert_eq!(
        remote.renames,
        [(
            "unit7_00000001.wav.temp".to_string(),
            "unit7_00000001.wav".to_string()
        )]
    );
    // The delivered file is complete and identical, not stitched together.
    assert_eq!(remote.files.get("unit7_00000001.wav"), Some(&payload));
    assert!(!remote.files.contains_key("unit7_00000001.wav.temp"));

    assert_eq!(metrics.upload_retries.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.uploads_completed.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.uploads_started.load(Ordering::Relaxed), 2);
}

#[test]
fn dock_drain_uploads_everything_then_one_marker() {
    let dir = TempDir::new().unwrap();
    let gateway = Arc::new(StorageGateway::mount(dir.path()).unwrap());
    std::fs::write(dir.path().join("unit7_00000001.wav"), vec![1u8; 3000]).unwrap();
    std::fs::write(dir.path().join("unit7_00000002.wav"), vec![2u8; 5000]).unwrap();

    let queue = Arc::new(UploadQueue::new(20));
    queue.push_blocking("unit7_00000001.wav".to_string());
    queue.push_blocking("unit7_00000002.wav".to_string());

    let remote_dir = TempDir::new().unwrap();
    let state = idle_state();
    state.transition(DeviceState::DockUploading).unwrap();
    let metrics = RecorderMetrics::new();
    let shutdown = ShutdownToken::new();

    let manager = spawn_manager(
        &queue,
        &gateway,
        Box::new(DirStore::new(remote_dir.path())),
        &state,
        &metrics,
        &shutdown,
    );

    assert!(wait_until(Duration::from_secs(5), || {
        state.current() == DeviceState::DockIdle
    }));

    // Everything delivered, in order, plus exactly one marker.
    assert_eq!(
        std::fs::read(remote_dir.path().join("unit7_00000001.wav")).unwrap(),
        vec![1u8; 3000]
    );
    assert_eq!(
        std::fs::read(remote_dir.path().join("unit7_00000002.wav")).unwrap(),
        vec![2u8; 5000]
    );
    let marker = remote_dir.path().join("unit7.done");
    assert!(marker.exists());
    assert_eq!(std::fs::metadata(&marker).unwrap().len(), 0);
    assert!(queue.is_empty());

    // Staying docked does not repeat the marker.
    thread::sleep(Duration::from_millis(300));
    assert_eq!(metrics.markers_sent.load(Ordering::Relaxed), 1);

    // No temp leftovers remain visible.
    for entry in std::fs::read_dir(remote_dir.path()).unwrap() {
        let name = entry.unwrap().file_name();
        assert!(!name.to_string_lossy().ends_with(".temp"), "{name:?}");
    }

    shutdown.request();
    manager.join();
}

#[test]
fn missing_local_file_is_dropped_with_a_warning() {
    let dir = TempDir::new().unwrap();
    let gateway = Arc::new(StorageGateway::mount(dir.path()).unwrap());

    let queue = Arc::new(UploadQueue::new(20));
    queue.push_blocking("ghost.wav".to_string());

    let fake = FakeRemote::default();
    let probe = fake.clone();
    let state = idle_state();
    let metrics = RecorderMetrics::new();
    let shutdown = ShutdownToken::new();

    let manager = spawn_manager(
        &queue,
        &gateway,
        Box::new(fake),
        &state,
        &metrics,
        &shutdown,
    );

    assert!(wait_until(Duration::from_secs(5), || queue.is_empty()));
    shutdown.request();
    manager.join();

    assert_eq!(metrics.uploads_discarded.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.uploads_started.load(Ordering::Relaxed), 0);
    assert!(probe.state.lock().begins.is_empty());
}

#[test]
fn no_marker_outside_the_dock() {
    let dir = TempDir::new().unwrap();
    let gateway = Arc::new(StorageGateway::mount(dir.path()).unwrap());
    let queue = Arc::new(UploadQueue::new(20));

    let fake = FakeRemote::default();
    let probe = fake.clone();
    let state = idle_state();
    let metrics = RecorderMetrics::new();
    let shutdown = ShutdownToken::new();

    let manager = spawn_manager(
        &queue,
        &gateway,
        Box::new(fake),
        &state,
        &metrics,
        &shutdown,
    );

    // Idle with an empty queue: the manager just polls.
    thread::sleep(Duration::from_millis(300));
    shutdown.request();
    manager.join();

    assert_eq!(metrics.markers_sent.load(Ordering::Relaxed), 0);
    assert!(probe.state.lock().files.is_empty());
}
