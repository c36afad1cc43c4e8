//! Cancellable delayed tasks.
//!
//! Every task scheduled on a [`TaskSet`] can be cancelled on its own through
//! its [`TaskHandle`], or together with all others through
//! [`TaskSet::cancel_all`]. Dropping the set cancels whatever is still pending.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct TaskHandle {
    abort: AbortHandle,
}

impl TaskHandle {
    pub fn cancel(&self) {
        self.abort.abort();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

#[derive(Debug)]
struct Pending {
    abort: AbortHandle,
    join: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub struct TaskSet {
    pending: Mutex<Vec<Pending>>,
    closed: AtomicBool,
}

impl TaskSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless cancelled first.
    ///
    /// Must be called from within a tokio runtime. Scheduling on a closed set
    /// yields an already-cancelled handle and never runs `task`.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let (abort, registration) = AbortHandle::new_pair();
        let handle = TaskHandle {
            abort: abort.clone(),
        };

        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            abort.abort();
            return handle;
        }
        pending.retain(|p| !p.join.is_finished());

        let delayed = Abortable::new(
            async move {
                tokio::time::sleep(delay).await;
                task();
            },
            registration,
        );
        let join = tokio::spawn(async move {
            let _ = delayed.await;
        });
        pending.push(Pending { abort, join });
        handle
    }

    /// Cancel every pending task. Returns how many were still pending.
    pub fn cancel_all(&self) -> usize {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut cancelled = 0;
        for task in pending.drain(..) {
            if !task.join.is_finished() && !task.abort.is_aborted() {
                cancelled += 1;
            }
            task.abort.abort();
        }
        cancelled
    }

    /// Cancel everything and refuse further scheduling.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel_all()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tasks neither finished nor cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|p| !p.join.is_finished() && !p.abort.is_aborted())
            .count()
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.close();
    }
}
