//! Job control plane: the pause gate and cancel flag a running job checks at
//! every checkpoint.
//!
//! The worker running a job and any number of controllers share one
//! [`JobControl`] through cloneable [`JobHandle`]s. Requests are only accepted
//! while a run is armed; outside a run they are no-ops.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Gate {
    running: bool,
    paused: bool,
    cancelled: bool,
}

/// Outcome of waiting at the pause gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Resumed,
    Cancelled,
}

/// Shared pause/cancel signalling for a single job.
#[derive(Debug, Default)]
pub struct JobControl {
    gate: Mutex<Gate>,
    changed: Condvar,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting requests for a new run, clearing any left over from the last one.
    pub fn arm(&self) {
        let mut gate = self.gate.lock();
        *gate = Gate { running: true, paused: false, cancelled: false };
    }

    /// Stop accepting requests and release anyone waiting at the gate.
    pub fn disarm(&self) {
        let mut gate = self.gate.lock();
        gate.running = false;
        gate.paused = false;
        self.changed.notify_all();
    }

    /// Request a pause. Returns false if the job is not running, already
    /// paused, or being cancelled.
    pub fn pause(&self) -> bool {
        let mut gate = self.gate.lock();
        if !gate.running || gate.paused || gate.cancelled {
            return false;
        }
        gate.paused = true;
        true
    }

    /// Release a pause. Returns false unless the job is paused.
    pub fn resume(&self) -> bool {
        let mut gate = self.gate.lock();
        if !gate.running || !gate.paused || gate.cancelled {
            return false;
        }
        gate.paused = false;
        self.changed.notify_all();
        true
    }

    /// Request cancellation. Returns false if the job is not running or
    /// cancellation was already requested.
    pub fn cancel(&self) -> bool {
        let mut gate = self.gate.lock();
        if !gate.running || gate.cancelled {
            return false;
        }
        gate.cancelled = true;
        self.changed.notify_all();
        true
    }

    pub fn is_running(&self) -> bool {
        self.gate.lock().running
    }

    pub fn is_paused(&self) -> bool {
        self.gate.lock().paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.lock().cancelled
    }

    /// Block until the pause is released or the job is cancelled.
    ///
    /// Returns immediately if no pause is pending.
    pub fn wait_while_paused(&self) -> GateOutcome {
        let mut gate = self.gate.lock();
        while gate.paused && !gate.cancelled {
            self.changed.wait(&mut gate);
        }
        if gate.cancelled {
            GateOutcome::Cancelled
        } else {
            GateOutcome::Resumed
        }
    }
}

/// Cloneable, thread-safe handle for pausing, resuming and cancelling a job
/// from outside the thread running it.
#[derive(Debug, Clone, Default)]
pub struct JobHandle {
    control: Arc<JobControl>,
}

impl JobHandle {
    pub(crate) fn new(control: Arc<JobControl>) -> Self {
        JobHandle { control }
    }

    pub fn pause(&self) -> bool {
        self.control.pause()
    }

    pub fn resume(&self) -> bool {
        self.control.resume()
    }

    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }
}
