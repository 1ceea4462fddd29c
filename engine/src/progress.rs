//! Progress reporting.
//!
//! A job holds at most one [`ProgressListener`]. It is called synchronously on
//! the thread running the job, after every visited file and at every state
//! transition, with a fresh [`JobSnapshot`].
//!
//! An error returned by the listener stops the run and is handed back to the
//! caller of `Job::execute`. Listeners that must never hold the walker up can
//! forward snapshots through a [`ChannelListener`] instead and do the slow work
//! on another thread.

use crossbeam_channel::Sender;

use crate::error::EngineError;
use crate::model::JobSnapshot;

/// Receives a snapshot of the job each time its progress or state changes.
pub trait ProgressListener: Send {
    fn on_progress(&mut self, snapshot: &JobSnapshot) -> Result<(), EngineError>;
}

impl<F> ProgressListener for F
where
    F: FnMut(&JobSnapshot) -> Result<(), EngineError> + Send,
{
    fn on_progress(&mut self, snapshot: &JobSnapshot) -> Result<(), EngineError> {
        self(snapshot)
    }
}

/// Forwards snapshots onto a channel.
///
/// Sending never blocks the walker (use an unbounded channel) and a dropped
/// receiver is ignored, so this listener never fails.
pub struct ChannelListener {
    sender: Sender<JobSnapshot>,
}

impl ChannelListener {
    pub fn new(sender: Sender<JobSnapshot>) -> Self {
        ChannelListener { sender }
    }
}

impl ProgressListener for ChannelListener {
    fn on_progress(&mut self, snapshot: &JobSnapshot) -> Result<(), EngineError> {
        let _ = self.sender.send(snapshot.clone());
        Ok(())
    }
}
