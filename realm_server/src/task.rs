//! Deferred work queue.
//!
//! Network and plugin code never touches simulation state directly. It
//! submits a task through a [`TaskSender`]; the scheduler drains the
//! [`TaskQueue`] at the start of every tick and runs each task with exclusive
//! access to the simulation context.
//!
//! Ordering: tasks run in submission order. A task submitted while a drain is
//! in progress may run in that drain or in the next one.

use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::error;

/// A unit of work executed once on the simulation context.
pub type Task<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Producer handle. Cheap to clone and usable from any thread.
pub struct TaskSender<C> {
    tx: mpsc::UnboundedSender<Task<C>>,
}

impl<C> Clone for TaskSender<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C> TaskSender<C> {
    /// Appends a task. Never blocks.
    ///
    /// If the queue has already been dropped (server stopped) the task is
    /// discarded.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let _ = self.tx.send(Box::new(task));
    }
}

/// Consumer side, owned by the scheduler.
pub struct TaskQueue<C> {
    rx: mpsc::UnboundedReceiver<Task<C>>,
}

impl<C> TaskQueue<C> {
    /// Creates an empty queue and its producer handle.
    pub fn new() -> (Self, TaskSender<C>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, TaskSender { tx })
    }

    /// Runs queued tasks until the queue reports empty. Returns how many ran.
    ///
    /// A panicking task is logged and skipped; the rest of the drain goes on.
    pub fn drain_and_run_all(&mut self, ctx: &mut C) -> usize {
        let mut ran = 0;
        loop {
            let task = match self.rx.try_recv() {
                Ok(task) => task,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            ran += 1;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(ctx))) {
                error!(panic = %panic_message(payload.as_ref()), "Deferred task panicked");
            }
        }
        ran
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
