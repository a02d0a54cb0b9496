//! HostActor - the host mixer's serialized execution context
//!
//! Every mixer-affecting operation runs here, one task at a time, in the
//! order it was queued. The HTTP listener thread never calls the mixer; it
//! reserves a queue slot and hands over a [`HostTask`] (fire-and-forget).

use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{PositionUpdate, TransitionController};

/// Work item for the host context
#[derive(Debug)]
pub enum HostTask {
    /// Run the transition state machine for one decoded `/tbar` POST
    Position(PositionUpdate),
    /// Acknowledge once every task queued before this one has run
    Flush { done: oneshot::Sender<()> },
}

/// The host queue cannot accept a task
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("host task queue is full")]
    Full,
    #[error("host task queue is closed")]
    Closed,
}

impl From<mpsc::error::TrySendError<()>> for QueueError {
    fn from(e: mpsc::error::TrySendError<()>) -> Self {
        match e {
            mpsc::error::TrySendError::Full(()) => QueueError::Full,
            mpsc::error::TrySendError::Closed(()) => QueueError::Closed,
        }
    }
}

/// Handle for queueing work onto the host context
///
/// Cheap to clone; usable from plain threads (no runtime needed to send).
#[derive(Clone)]
pub struct HostActorHandle {
    tx: mpsc::Sender<HostTask>,
}

impl HostActorHandle {
    pub(crate) fn from_sender(tx: mpsc::Sender<HostTask>) -> Self {
        Self { tx }
    }

    /// Reserve a queue slot without blocking
    ///
    /// Reserving first lets callers publish side effects only once the
    /// task is guaranteed to be accepted.
    pub fn try_reserve(&self) -> Result<mpsc::Permit<'_, HostTask>, QueueError> {
        Ok(self.tx.try_reserve()?)
    }

    /// Wait until everything queued so far has been applied
    pub async fn flush(&self) -> Result<(), QueueError> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(HostTask::Flush { done })
            .await
            .map_err(|_| QueueError::Closed)?;
        rx.await.map_err(|_| QueueError::Closed)
    }
}

/// Owns the transition controller and drains the host queue
pub struct HostActor {
    controller: TransitionController,
    rx: mpsc::Receiver<HostTask>,
    processed: u64,
}

impl HostActor {
    /// Spawn the actor on the current tokio runtime
    ///
    /// The actor exits once every [`HostActorHandle`] has been dropped and
    /// the queue is drained.
    pub fn spawn(
        controller: TransitionController,
        capacity: usize,
    ) -> (HostActorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let actor = Self {
            controller,
            rx,
            processed: 0,
        };
        let task = tokio::spawn(actor.run());
        (HostActorHandle::from_sender(tx), task)
    }

    async fn run(mut self) {
        info!(
            "Host actor started (mixer: {})",
            self.controller.mixer().name()
        );

        while let Some(task) = self.rx.recv().await {
            match task {
                HostTask::Position(update) => {
                    self.controller.apply(update, Instant::now()).await;
                    self.processed += 1;
                }
                HostTask::Flush { done } => {
                    let _ = done.send(());
                }
            }
        }

        debug!("Host actor stopped after {} update(s)", self.processed);
    }
}
