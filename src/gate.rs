//! Radio gate.
//!
//! At most one scan or probe drives the radio at a time. A request that finds
//! the gate held is rejected immediately instead of waiting.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Error, Result};

/// Non-blocking mutual exclusion over the radio.
#[derive(Debug, Clone, Default)]
pub struct RadioGate {
    lock: Arc<Mutex<()>>,
}

/// Proof of holding the radio; released on drop.
#[derive(Debug)]
pub struct RadioGuard {
    _guard: OwnedMutexGuard<()>,
}

impl RadioGate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate, or fail with [`Error::Busy`] if it is held.
    pub fn try_acquire(&self) -> Result<RadioGuard> {
        self.lock
            .clone()
            .try_lock_owned()
            .map(|guard| RadioGuard { _guard: guard })
            .map_err(|_| Error::Busy)
    }

    /// Check if a radio operation is running.
    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
