//! Console stand-ins for the record switch and the dock contact.
//!
//! On the bench there is no physical switch to poll, so a small stdin
//! reader flips latching flags instead. The control loop polls these
//! through the same [`ControlInput`] trait the device build would use.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{info, warn};

use fieldrec_foundation::{ControlInput, ShutdownToken};

/// One latching on/off switch, settable from the console thread or from code.
#[derive(Clone, Default)]
pub struct ConsoleSwitch {
    flag: Arc<AtomicBool>,
}

impl ConsoleSwitch {
    pub fn force(&self, on: bool) {
        self.flag.store(on, Ordering::Release);
    }
}

impl ControlInput for ConsoleSwitch {
    fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// The pair of switches the control loop polls every tick.
pub struct ConsoleControl {
    pub record: ConsoleSwitch,
    pub dock: ConsoleSwitch,
}

impl ConsoleControl {
    /// Spawn the stdin reader. The thread is left detached; it exits on
    /// `quit`, on EOF, or when the process ends.
    pub fn start(shutdown: ShutdownToken) -> std::io::Result<Self> {
        let record = ConsoleSwitch::default();
        let dock = ConsoleSwitch::default();

        let record_in = record.clone();
        let dock_in = dock.clone();
        thread::Builder::new()
            .name("console-control".into())
            .spawn(move || {
                info!("Console control ready: rec on|off, dock on|off, quit");
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(_) => break,
                    };
                    match line.trim() {
                        "rec on" => record_in.force(true),
                        "rec off" => record_in.force(false),
                        "dock on" => dock_in.force(true),
                        "dock off" => dock_in.force(false),
                        "quit" | "q" => {
                            shutdown.request();
                            break;
                        }
                        "" => {}
                        other => warn!("Unknown command {:?} (try: rec on|off, dock on|off, quit)", other),
                    }
                }
            })?;

        Ok(Self { record, dock })
    }

    /// Switches without a reader thread, for scripted runs and tests.
    pub fn detached() -> Self {
        Self {
            record: ConsoleSwitch::default(),
            dock: ConsoleSwitch::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_latches_until_forced_off() {
        let switch = ConsoleSwitch::default();
        assert!(!switch.is_triggered());

        switch.force(true);
        assert!(switch.is_triggered());
        assert!(switch.is_triggered());

        switch.force(false);
        assert!(!switch.is_triggered());
    }

    #[test]
    fn detached_controls_start_released() {
        let controls = ConsoleControl::detached();
        assert!(!controls.record.is_triggered());
        assert!(!controls.dock.is_triggered());
    }
}
