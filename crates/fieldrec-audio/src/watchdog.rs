use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::error;

use fieldrec_telemetry::RecorderMetrics;

/// Watchdog for the capture loop.
///
/// The capture thread feeds it on every successful peripheral read; a
/// checker thread raises an alarm once feeds stop for longer than the
/// timeout. The alarm is a log line and a counter, not a restart: a stalled
/// peripheral on this hardware never comes back without a power cycle.
pub struct CaptureWatchdog {
    timeout: Duration,
    last_feed: Arc<RwLock<Option<Instant>>>,
    triggered: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    metrics: RecorderMetrics,
    checker: Option<JoinHandle<()>>,
}

impl CaptureWatchdog {
    pub fn new(timeout: Duration, metrics: RecorderMetrics) -> Self {
        Self {
            timeout,
            last_feed: Arc::new(RwLock::new(None)),
            triggered: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            metrics,
            checker: None,
        }
    }

    pub fn start(&mut self) {
        self.running.store(true, Ordering::SeqCst);
        *self.last_feed.write() = Some(Instant::now());

        let timeout = self.timeout;
        let last_feed = Arc::clone(&self.last_feed);
        let triggered = Arc::clone(&self.triggered);
        let running = Arc::clone(&self.running);
        let metrics = self.metrics.clone();

        let spawned = thread::Builder::new()
            .name("capture-watchdog".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(100));
                    let last = *last_feed.read();
                    let stalled = last.map(|l| l.elapsed() > timeout).unwrap_or(false);
                    if stalled && !triggered.swap(true, Ordering::SeqCst) {
                        error!(
                            "No audio data for over {:?}; capture appears stalled",
                            timeout
                        );
                        metrics.capture_stalls.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });

        match spawned {
            Ok(handle) => self.checker = Some(handle),
            Err(e) => error!("Failed to spawn capture-watchdog thread: {}", e),
        }
    }

    pub fn feed(&self) {
        *self.last_feed.write() = Some(Instant::now());
        self.triggered.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(checker) = self.checker.take() {
            let _ = checker.join();
        }
        self.triggered.store(false, Ordering::SeqCst);
        *self.last_feed.write() = None;
    }
}

impl Drop for CaptureWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
