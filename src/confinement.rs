//! Execution confinement: where a context's object graph may be touched.
//!
//! Two kinds exist. A private queue owns a dedicated serial worker thread. An
//! owner-thread confinement is bound to the thread that created it and is
//! serviced by that thread's run loop. Both are reached through a
//! [`Dispatcher`], a cheap cloneable handle that sends boxed jobs.

pub mod run_loop;
pub mod serial_queue;

use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread::ThreadId;
use tokio::sync::mpsc::UnboundedSender;

/// Unit of work sent to a confinement
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Confinement mode of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfinementKind {
    /// Confined to the creating thread, serviced by its run loop
    OwnerThread,
    /// Confined to a private serial background queue
    PrivateQueue,
}

impl fmt::Display for ConfinementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfinementKind::OwnerThread => f.write_str("owner-thread"),
            ConfinementKind::PrivateQueue => f.write_str("private-queue"),
        }
    }
}

/// Handle for sending jobs to one confinement.
#[derive(Clone)]
pub struct Dispatcher {
    kind: ConfinementKind,
    thread: ThreadId,
    label: String,
    sender: UnboundedSender<Job>,
}

impl Dispatcher {
    pub(crate) fn new(
        kind: ConfinementKind,
        thread: ThreadId,
        label: impl Into<String>,
        sender: UnboundedSender<Job>,
    ) -> Self {
        Self {
            kind,
            thread,
            label: label.into(),
            sender,
        }
    }

    pub fn kind(&self) -> ConfinementKind {
        self.kind
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// True when the calling thread is this confinement's thread
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread
    }

    /// Enqueue a job. Fails only when the confinement's thread is gone.
    pub fn dispatch<F>(&self, job: F) -> Result<(), ContextError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(Box::new(job))
            .map_err(|_| ContextError::ConfinementClosed(self.label.clone()))
    }

    /// Whether two handles address the same confinement
    pub fn same_confinement(&self, other: &Dispatcher) -> bool {
        self.thread == other.thread && self.sender.same_channel(&other.sender)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kind", &self.kind)
            .field("thread", &self.thread)
            .field("label", &self.label)
            .finish()
    }
}
