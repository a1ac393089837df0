//! Private serial queues: one worker thread draining jobs in FIFO order.

use super::{ConfinementKind, Dispatcher, Job};
use crate::error::ContextError;
use tokio::sync::mpsc::unbounded_channel;
use tracing::debug;

/// Spawn a serial queue named `label`.
///
/// The worker exits once every [`Dispatcher`] for the queue has been dropped
/// and the remaining jobs have run.
pub fn spawn(label: impl Into<String>) -> Result<Dispatcher, ContextError> {
    let label = label.into();
    let (sender, mut receiver) = unbounded_channel::<Job>();
    let worker_label = label.clone();

    let handle = std::thread::Builder::new()
        .name(label.clone())
        .spawn(move || {
            while let Some(job) = receiver.blocking_recv() {
                job();
            }
            debug!(queue = %worker_label, "Serial queue drained and closed");
        })
        .map_err(|e| {
            ContextError::ConfinementClosed(format!("failed to spawn queue {}: {}", label, e))
        })?;

    Ok(Dispatcher::new(
        ConfinementKind::PrivateQueue,
        handle.thread().id(),
        label,
        sender,
    ))
}
