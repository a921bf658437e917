use crate::error::DeviceError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Why the device is in an `Error` state.
///
/// The three init causes are terminal for the boot cycle; `StorageWrite`
/// only aborts the current recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCause {
    MicInit,
    StorageInit,
    ConfigRead,
    StorageWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Initializing,
    Idle,
    Recording,
    DockUploading,
    DockIdle,
    Error(FaultCause),
}

impl DeviceState {
    pub fn is_recording(&self) -> bool {
        matches!(self, DeviceState::Recording)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DeviceState::Error(_))
    }
}

/// Shared device state with validated transitions.
///
/// Cloning is cheap; every worker holds a clone and reads the current state
/// each loop iteration instead of caching it.
#[derive(Clone)]
pub struct StateManager {
    state: Arc<RwLock<DeviceState>>,
    state_tx: Sender<DeviceState>,
    state_rx: Receiver<DeviceState>,
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(DeviceState::Initializing)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: DeviceState) -> Result<(), DeviceError> {
        use DeviceState::*;
        use FaultCause::*;

        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (Initializing, Idle)
                | (Initializing, Error(MicInit | StorageInit | ConfigRead))
                | (Idle, Recording)
                | (Idle, DockUploading)
                | (Recording, Idle)
                | (Recording, Error(StorageWrite))
                | (Error(StorageWrite), Idle)
                | (DockUploading, DockIdle)
                | (DockUploading, Idle)
                | (DockIdle, Idle)
        );

        if !valid {
            return Err(DeviceError::Fatal(format!(
                "Invalid state transition: {:?} -> {:?}",
                *current, new_state
            )));
        }

        tracing::info!("State transition: {:?} -> {:?}", *current, new_state);
        *current = new_state;

        // Broadcast state change; receiver may not exist yet
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> DeviceState {
        *self.state.read()
    }

    pub fn subscribe(&self) -> Receiver<DeviceState> {
        self.state_rx.clone()
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}
