use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::DeviceError;

/// Process-wide stop flag with an interruptible wait.
///
/// Worker loops sleep through [`ShutdownToken::wait_timeout`] so Ctrl-C
/// wakes them immediately instead of at the end of a backoff interval.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<ShutdownInner>,
}

#[derive(Default)]
struct ShutdownInner {
    requested: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock();
        self.inner.cond.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Sleeps up to `timeout`. Returns true when shutdown was requested,
    /// either before the call or while waiting.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if self.is_requested() {
            return true;
        }
        self.inner.cond.wait_for(&mut guard, timeout);
        self.is_requested()
    }
}

/// Installs the Ctrl-C handler and a panic hook that logs before dying.
pub fn install_signal_handlers(token: &ShutdownToken) -> Result<(), DeviceError> {
    let original_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("PANIC: {}", panic_info);
        original_panic(panic_info);
    }));

    let ctrlc_token = token.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown requested via Ctrl-C");
        ctrlc_token.request();
    })
    .map_err(|e| DeviceError::Fatal(format!("Failed to install Ctrl-C handler: {}", e)))
}
