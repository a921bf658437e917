//! The control loop: initializes the device, polls the switches every tick,
//! and moves the state machine between idle, recording and the dock modes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, error, info, warn};

use fieldrec_audio::constants::FRAME_QUEUE_CAPACITY;
use fieldrec_audio::{frame_queue, BlockSource, CaptureThread, CpalSource, SyntheticSource};
use fieldrec_foundation::{
    parse_remote, AudioError, ConfigError, ControlInput, DeviceError, DeviceState, FaultCause,
    LevelSink, RecorderConfig, RemoteSpec, ShutdownToken, StateManager, StatusIndicator,
    StatusSink,
};
use fieldrec_storage::{
    highest_sequence, FinishedRecordings, RecordingSession, StorageGateway, WriterThread,
};
use fieldrec_telemetry::RecorderMetrics;
use fieldrec_upload::{
    DirStore, RemoteStore, TcpStore, UploadConfig, UploadManager, UploadQueue,
    UPLOAD_QUEUE_CAPACITY,
};

use crate::control::ConsoleControl;
use crate::feedback::{LevelMeter, LogStatusSink};

/// How often the control loop polls the switches and the device state.
const CONTROL_TICK: Duration = Duration::from_millis(10);

/// Upper bound on waiting for the upload drain at the end of a scripted run.
const SCRIPTED_DRAIN_CAP: Duration = Duration::from_secs(30);

/// Square wave amplitude for the synthetic source, in 16-bit terms.
const SYNTH_AMPLITUDE: i16 = 1000;

/// Which audio source backs the capture thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MicBackend {
    /// The default input device through the host audio layer.
    Cpal,
    /// A built-in square wave, for benches without a microphone.
    Synth,
}

/// Options assembled from the command line.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub config_path: PathBuf,
    /// Overrides `storage.root` from the config when set.
    pub data_dir: Option<PathBuf>,
    pub mic: MicBackend,
    pub device: Option<String>,
    /// Overrides `upload.remote` from the config when set.
    pub remote_override: Option<String>,
    /// Record for this long, wait for the upload drain, then exit.
    pub auto_record: Option<Duration>,
}

pub struct ControlLoop {
    opts: RuntimeOptions,
    state: StateManager,
    metrics: RecorderMetrics,
    shutdown: ShutdownToken,
}

/// The capture/writer pair of one recording session.
struct SessionTasks {
    capture: CaptureThread,
    writer: WriterThread,
}

impl SessionTasks {
    /// Joins both halves in pipeline order and hands the source back for
    /// the next session.
    fn finish(self) -> Option<Box<dyn BlockSource>> {
        let source = self.capture.join();
        self.writer.join();
        source
    }
}

/// Sink for finished recordings when upload is disabled.
struct KeepLocalSink;

impl FinishedRecordings for KeepLocalSink {
    fn submit(&self, filename: String) {
        info!("Upload disabled, {} stays on local storage", filename);
    }
}

impl ControlLoop {
    pub fn new(
        opts: RuntimeOptions,
        state: StateManager,
        metrics: RecorderMetrics,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            opts,
            state,
            metrics,
            shutdown,
        }
    }

    pub fn run(self) -> anyhow::Result<()> {
        let status: Arc<dyn StatusSink> = Arc::new(LogStatusSink);
        status.set_status(StatusIndicator::Booting);

        // 1) Configuration
        let config = match RecorderConfig::load(&self.opts.config_path) {
            Ok(config) => config,
            Err(e) => return self.hold_fault(e.into(), &status),
        };
        info!("Configured as device {:?}", config.device_name);

        // 2) Storage
        let storage_root = self
            .opts
            .data_dir
            .clone()
            .unwrap_or_else(|| config.storage.root.clone());
        let gateway = match StorageGateway::mount(storage_root) {
            Ok(gateway) => Arc::new(gateway),
            Err(e) => return self.hold_fault(e.into(), &status),
        };
        let mut sequence = match highest_sequence(&gateway, &config.device_name) {
            Ok(sequence) => sequence,
            Err(e) => return self.hold_fault(e.into(), &status),
        };

        // 3) Audio source
        let mut source: Option<Box<dyn BlockSource>> = match self.open_source() {
            Ok(source) => Some(source),
            Err(e) => return self.hold_fault(e.into(), &status),
        };

        // 4) Upload
        let upload_queue = Arc::new(UploadQueue::new(UPLOAD_QUEUE_CAPACITY));
        let finished: Arc<dyn FinishedRecordings> = if config.upload.enabled {
            upload_queue.clone()
        } else {
            Arc::new(KeepLocalSink)
        };
        let uploader = if config.upload.enabled {
            let spec = self
                .opts
                .remote_override
                .as_deref()
                .unwrap_or(&config.upload.remote);
            let store = match build_store(spec) {
                Ok(store) => store,
                Err(e) => return self.hold_fault(e.into(), &status),
            };
            let manager = UploadManager::spawn(
                upload_queue.clone(),
                gateway.clone(),
                store,
                self.state.clone(),
                UploadConfig {
                    device_name: config.device_name.clone(),
                    retry_backoff: Duration::from_secs(config.upload.retry_backoff_secs),
                },
                self.metrics.clone(),
                self.shutdown.clone(),
            )
            .context("Failed to spawn upload manager")?;
            Some(manager)
        } else {
            info!("Upload disabled by config");
            None
        };

        // 5) Ready
        self.state
            .transition(DeviceState::Idle)
            .context("Could not leave the init state")?;
        status.set_status(StatusIndicator::Ready);

        let controls = if self.opts.auto_record.is_some() {
            ConsoleControl::detached()
        } else {
            ConsoleControl::start(self.shutdown.clone())
                .context("Failed to start console control")?
        };
        let levels: Arc<dyn LevelSink> = Arc::new(LevelMeter::new());

        let mut auto_stop_at = None;
        let mut auto_drain_deadline: Option<Instant> = None;
        if let Some(length) = self.opts.auto_record {
            info!("Scripted run: recording for {:?}", length);
            controls.record.force(true);
            auto_stop_at = Some(Instant::now() + length);
        }

        let mut session: Option<SessionTasks> = None;
        let mut record_was_on = false;
        let mut shown = StatusIndicator::Ready;

        while !self.shutdown.wait_timeout(CONTROL_TICK) {
            if let Some(stop_at) = auto_stop_at {
                if Instant::now() >= stop_at {
                    controls.record.force(false);
                    auto_stop_at = None;
                    auto_drain_deadline = Some(Instant::now() + SCRIPTED_DRAIN_CAP);
                }
            }

            let record_on = controls.record.is_triggered();
            let record_pressed = record_on && !record_was_on;
            record_was_on = record_on;
            let docked = controls.dock.is_triggered();

            match self.state.current() {
                DeviceState::Idle => {
                    if record_pressed {
                        match source.take() {
                            Some(src) => {
                                sequence += 1;
                                match self.start_session(
                                    src,
                                    &gateway,
                                    &config.device_name,
                                    sequence,
                                    &levels,
                                    &finished,
                                ) {
                                    Ok(tasks) => {
                                        session = Some(tasks);
                                        show(&status, &mut shown, StatusIndicator::Recording);
                                    }
                                    Err((returned, e)) => {
                                        error!("Could not start recording: {:#}", e);
                                        source = returned;
                                        show(
                                            &status,
                                            &mut shown,
                                            StatusIndicator::Fault(FaultCause::StorageWrite),
                                        );
                                    }
                                }
                            }
                            None => error!("No audio source available, cannot record"),
                        }
                    } else if docked {
                        if let Err(e) = self.state.transition(DeviceState::DockUploading) {
                            warn!("Dock transition rejected: {}", e);
                        } else {
                            show(&status, &mut shown, StatusIndicator::DockDraining);
                        }
                    } else {
                        let want = if uploader.is_some() && !upload_queue.is_empty() {
                            StatusIndicator::Uploading
                        } else {
                            StatusIndicator::Ready
                        };
                        show(&status, &mut shown, want);
                    }
                }
                DeviceState::Recording => {
                    if !record_on {
                        if let Err(e) = self.state.transition(DeviceState::Idle) {
                            // The writer faulted in the same tick; the
                            // Error arm below cleans up instead.
                            debug!("Stop transition deferred: {}", e);
                        } else {
                            if let Some(tasks) = session.take() {
                                source = tasks.finish();
                            }
                            show(&status, &mut shown, StatusIndicator::Ready);
                        }
                    }
                }
                DeviceState::Error(FaultCause::StorageWrite) => {
                    // The writer drains and finalizes on its own; collect
                    // the threads, then wait for the switch release.
                    if let Some(tasks) = session.take() {
                        source = tasks.finish();
                    }
                    show(
                        &status,
                        &mut shown,
                        StatusIndicator::Fault(FaultCause::StorageWrite),
                    );
                    if !record_on {
                        if let Err(e) = self.state.transition(DeviceState::Idle) {
                            warn!("Recovery transition rejected: {}", e);
                        } else {
                            show(&status, &mut shown, StatusIndicator::Ready);
                        }
                    }
                }
                DeviceState::DockUploading => {
                    if !docked {
                        // Undocked mid-drain; uploads continue in the
                        // background. The manager may have reached DockIdle
                        // in the same tick, which also accepts Idle.
                        if let Err(e) = self.state.transition(DeviceState::Idle) {
                            warn!("Undock transition rejected: {}", e);
                        }
                    }
                }
                DeviceState::DockIdle => {
                    show(&status, &mut shown, StatusIndicator::DockComplete);
                    if !docked {
                        if let Err(e) = self.state.transition(DeviceState::Idle) {
                            warn!("Undock transition rejected: {}", e);
                        }
                    }
                }
                DeviceState::Initializing | DeviceState::Error(_) => {}
            }

            if let Some(deadline) = auto_drain_deadline {
                if session.is_none() && self.state.current() == DeviceState::Idle {
                    let drained = uploader.is_none() || upload_queue.is_empty();
                    if drained || Instant::now() >= deadline {
                        if !drained {
                            warn!(
                                "Scripted run leaving {} queued uploads behind",
                                upload_queue.len()
                            );
                        }
                        info!("Scripted run complete");
                        self.shutdown.request();
                    }
                }
            }
        }

        info!("Shutting down");
        if self.state.current() == DeviceState::Recording {
            if let Err(e) = self.state.transition(DeviceState::Idle) {
                warn!("Stop transition rejected during shutdown: {}", e);
            }
        }
        if let Some(tasks) = session.take() {
            let _ = tasks.finish();
        }
        if let Some(manager) = uploader {
            manager.join();
        }
        info!("Shutdown complete");
        Ok(())
    }

    fn open_source(&self) -> Result<Box<dyn BlockSource>, AudioError> {
        match self.opts.mic {
            MicBackend::Cpal => Ok(Box::new(CpalSource::open(self.opts.device.clone())?)),
            MicBackend::Synth => Ok(Box::new(SyntheticSource::new(SYNTH_AMPLITUDE))),
        }
    }

    /// Opens the session file, flips the state to `Recording` and spawns the
    /// capture/writer pair. On failure the error comes back together with
    /// the source, when it could be recovered, and the state is unwound.
    fn start_session(
        &self,
        src: Box<dyn BlockSource>,
        gateway: &Arc<StorageGateway>,
        device_name: &str,
        sequence: u32,
        levels: &Arc<dyn LevelSink>,
        finished: &Arc<dyn FinishedRecordings>,
    ) -> Result<SessionTasks, (Option<Box<dyn BlockSource>>, anyhow::Error)> {
        let recording = match RecordingSession::create(gateway, device_name, sequence) {
            Ok(recording) => recording,
            Err(e) => return Err((Some(src), e.into())),
        };

        // Capture and writer both key off the state, so it must be
        // `Recording` before either thread starts.
        if let Err(e) = self.state.transition(DeviceState::Recording) {
            return Err((Some(src), e.into()));
        }

        let (pusher, popper) = frame_queue(FRAME_QUEUE_CAPACITY);
        let capture =
            match CaptureThread::spawn(src, pusher, self.state.clone(), self.metrics.clone()) {
                Ok(capture) => capture,
                Err(e) => {
                    if let Err(te) = self.state.transition(DeviceState::Idle) {
                        warn!("Unwind transition rejected: {}", te);
                    }
                    return Err((None, e.into()));
                }
            };
        let writer = match WriterThread::spawn(
            popper,
            recording,
            gateway.clone(),
            self.state.clone(),
            levels.clone(),
            finished.clone(),
            self.metrics.clone(),
        ) {
            Ok(writer) => writer,
            Err(e) => {
                // Leaving Recording makes the capture thread exit on its own.
                if let Err(te) = self.state.transition(DeviceState::Idle) {
                    warn!("Unwind transition rejected: {}", te);
                }
                let src = capture.join();
                return Err((src, e.into()));
            }
        };

        Ok(SessionTasks { capture, writer })
    }

    /// Parks the device in the terminal init fault matching the error: log
    /// it, show it, and sit until the process is asked to stop.
    fn hold_fault(&self, error: DeviceError, status: &Arc<dyn StatusSink>) -> anyhow::Result<()> {
        let Some(cause) = error.fault_cause() else {
            error!("Fatal during init: {}", error);
            return Err(error.into());
        };
        error!("Entering fault state {:?}: {}", cause, error);
        if let Err(e) = self.state.transition(DeviceState::Error(cause)) {
            warn!("Fault transition rejected: {}", e);
        }
        status.set_status(StatusIndicator::Fault(cause));
        while !self.shutdown.wait_timeout(Duration::from_secs(1)) {}
        Err(error.into())
    }
}

fn build_store(spec: &str) -> Result<Box<dyn RemoteStore>, ConfigError> {
    Ok(match parse_remote(spec)? {
        RemoteSpec::Dir(path) => Box::new(DirStore::new(path)),
        RemoteSpec::Tcp(addr) => Box::new(TcpStore::new(addr)),
    })
}

fn show(status: &Arc<dyn StatusSink>, shown: &mut StatusIndicator, want: StatusIndicator) {
    if *shown != want {
        *shown = want;
        status.set_status(want);
    }
}
