//! Per-thread run loop backing owner-thread confinement.
//!
//! Every thread lazily gets one loop. Any thread may dispatch into it; only
//! the owning thread drains it, through [`run_pending`] or [`run_for`].

use super::{ConfinementKind, Dispatcher, Job};
use std::cell::RefCell;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::trace;

struct RunLoop {
    dispatcher: Dispatcher,
    receiver: RefCell<UnboundedReceiver<Job>>,
}

impl RunLoop {
    fn new() -> Self {
        let thread = std::thread::current();
        let label = thread
            .name()
            .map(|name| format!("run-loop:{}", name))
            .unwrap_or_else(|| format!("run-loop:{:?}", thread.id()));
        let (sender, receiver) = unbounded_channel();
        Self {
            dispatcher: Dispatcher::new(ConfinementKind::OwnerThread, thread.id(), label, sender),
            receiver: RefCell::new(receiver),
        }
    }
}

thread_local! {
    static CURRENT: RunLoop = RunLoop::new();
}

/// Dispatcher for the calling thread's run loop
pub fn current() -> Dispatcher {
    CURRENT.with(|run_loop| run_loop.dispatcher.clone())
}

fn next_job() -> Option<Job> {
    // The borrow ends before the job runs, so jobs may dispatch or drain.
    CURRENT.with(|run_loop| run_loop.receiver.borrow_mut().try_recv().ok())
}

/// Run every job queued on the calling thread's loop, including jobs enqueued
/// while draining. Returns the number of jobs run.
pub fn run_pending() -> usize {
    let mut ran = 0;
    while let Some(job) = next_job() {
        job();
        ran += 1;
    }
    if ran > 0 {
        trace!(jobs = ran, "Drained run loop");
    }
    ran
}

/// Keep draining the calling thread's loop until `timeout` elapses.
pub fn run_for(timeout: Duration) -> usize {
    let deadline = Instant::now() + timeout;
    let mut ran = 0;
    loop {
        ran += run_pending();
        if Instant::now() >= deadline {
            return ran;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Drain until `done` returns true or `timeout` elapses. Returns whether
/// `done` was satisfied.
pub fn run_until<F>(timeout: Duration, mut done: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        run_pending();
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
