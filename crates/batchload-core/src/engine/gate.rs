//! Concurrency gate - bounds how many workers transfer at the same time
//!
//! Acquiring yields a [`GatePermit`]; dropping the permit is the only way to
//! release a slot, so a worker that never got a slot can never free one.

use crate::error::LoaderError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Per-batch admission control
#[derive(Clone)]
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    /// Holders between acquire and release
    active: AtomicUsize,
    /// Highest value `active` reached
    peak: AtomicUsize,
    /// Wakes `closed()` waiters
    on_close: Notify,
}

/// A held slot; released on drop
pub struct GatePermit {
    inner: Arc<GateInner>,
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                on_close: Notify::new(),
            }),
        }
    }

    /// Wait for a free slot
    ///
    /// Fails with [`LoaderError::Interrupted`] once the gate is closed.
    pub async fn acquire(&self) -> Result<GatePermit, LoaderError> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LoaderError::Interrupted("a concurrency slot"))?;

        let active = self.inner.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.peak.fetch_max(active, Ordering::AcqRel);
        debug!("Gate: {}/{} slots in use", active, self.inner.capacity);

        Ok(GatePermit {
            inner: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Stop admitting; every pending and future `acquire` fails
    ///
    /// Permits already handed out stay valid until dropped.
    pub fn close(&self) {
        self.inner.semaphore.close();
        self.inner.on_close.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.semaphore.is_closed()
    }

    /// Resolves once the gate has been closed
    ///
    /// Lets other wait points of a worker observe the same shutdown as
    /// [`ConcurrencyGate::acquire`].
    pub async fn closed(&self) {
        loop {
            let notified = self.inner.on_close.notified();
            tokio::pin!(notified);
            // Register before checking so a close in between is not missed
            notified.as_mut().enable();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::Acquire)
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        // Runs before the semaphore permit field is dropped, so `active`
        // never counts a slot that has already been handed to someone else
        self.inner.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_gate_never_exceeds_capacity() {
        let gate = ConcurrencyGate::new(2);
        let overshoot = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let gate = gate.clone();
            let overshoot = overshoot.clone();
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await.unwrap();
                if gate.active() > gate.capacity() {
                    overshoot.fetch_add(1, Ordering::Relaxed);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(overshoot.load(Ordering::Relaxed), 0);
        assert_eq!(gate.peak(), 2);
        assert_eq!(gate.active(), 0);
    }

    #[tokio::test]
    async fn test_gate_release_frees_exactly_one_slot() {
        let gate = ConcurrencyGate::new(1);
        let first = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap().unwrap();
        assert_eq!(gate.active(), 0);
    }

    #[tokio::test]
    async fn test_closed_gate_interrupts_waiters() {
        let gate = ConcurrencyGate::new(1);
        let held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;

        gate.close();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(LoaderError::Interrupted(_))));

        // The permit handed out before closing still releases cleanly
        drop(held);
        assert_eq!(gate.active(), 0);
        assert!(gate.is_closed());
    }

    #[tokio::test]
    async fn test_closed_resolves_for_waiters_and_after_close() {
        let gate = ConcurrencyGate::new(1);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.closed().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        gate.close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Already closed: returns immediately
        tokio::time::timeout(Duration::from_secs(1), gate.closed())
            .await
            .unwrap();
    }
}
