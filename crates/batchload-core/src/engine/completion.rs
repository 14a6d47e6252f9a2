//! Completion counter - a countdown latch for one batch
//!
//! The orchestrator creates the counter with the number of workers and hands
//! each worker one [`CompletionHandle`]. Dropping a handle counts down, so a
//! worker signals exactly once whether it succeeds, fails or panics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct CompletionCounter {
    inner: Arc<CounterInner>,
}

struct CounterInner {
    remaining: AtomicUsize,
    notify: Notify,
}

/// One worker's share of the counter
pub struct CompletionHandle {
    inner: Arc<CounterInner>,
}

impl CompletionCounter {
    pub fn new(count: usize) -> Self {
        Self {
            inner: Arc::new(CounterInner {
                remaining: AtomicUsize::new(count),
                notify: Notify::new(),
            }),
        }
    }

    /// Hand out a handle for one worker
    ///
    /// Callers must mint exactly as many handles as the initial count.
    pub fn handle(&self) -> CompletionHandle {
        CompletionHandle {
            inner: self.inner.clone(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    /// Wait until the count reaches zero
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a count down in between is not missed
            notified.as_mut().enable();

            if self.remaining() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        let previous = self
            .inner
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        if previous == Ok(1) {
            self.inner.notify.notify_waiters();
        }
    }
}
