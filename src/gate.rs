//! Process-wide serialization of probes
//!
//! Chrome and Lighthouse are not safe to drive concurrently from one
//! exporter, so every request passes through a single `Gate`. Waiters are
//! served in arrival order (tokio's mutex is fair) and the lock is released
//! when the returned `GateGuard` is dropped, whichever way the holder exits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
pub struct Gate {
    lock: Arc<Mutex<()>>,
    waiting: Arc<AtomicUsize>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until the gate is free and take exclusive hold of it.
    pub async fn acquire(&self) -> GateGuard {
        self.waiting.fetch_add(1, Ordering::Relaxed);
        let guard = self.lock.clone().lock_owned().await;
        self.waiting.fetch_sub(1, Ordering::Relaxed);

        GateGuard { _guard: guard }
    }

    /// Take the gate only if nobody holds it.
    pub fn try_acquire(&self) -> Option<GateGuard> {
        self.lock
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| GateGuard { _guard: guard })
    }

    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Number of callers currently suspended in `acquire`.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }
}

/// Exclusive hold on a `Gate`; dropping it hands the gate to the next waiter.
#[derive(Debug)]
pub struct GateGuard {
    _guard: OwnedMutexGuard<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_holder() {
        let gate = Gate::new();
        let guard = gate.acquire().await;

        assert!(gate.is_held());
        assert!(gate.try_acquire().is_none());

        drop(guard);
        assert!(!gate.is_held());
        assert!(gate.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_waiters_are_served_in_order() {
        let gate = Gate::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let first = gate.acquire().await;

        let mut tasks = Vec::new();
        for i in 0..4 {
            let waiter = gate.clone();
            let order = order.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = waiter.acquire().await;
                order.lock().unwrap().push(i);
            }));
            // Let each task reach the wait queue before spawning the next one.
            while gate.waiting() < i + 1 {
                tokio::task::yield_now().await;
            }
        }

        assert_eq!(gate.waiting(), 4);
        drop(first);

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test]
    async fn test_release_on_panic() {
        let gate = Gate::new();
        let holder = gate.clone();

        let result = tokio::spawn(async move {
            let _guard = holder.acquire().await;
            panic!("probe blew up");
        })
        .await;
        assert!(result.is_err());

        let guard = tokio::time::timeout(Duration::from_secs(1), gate.acquire()).await;
        assert!(guard.is_ok());
    }

    #[tokio::test]
    async fn test_independent_gates() {
        let a = Gate::new();
        let b = Gate::new();
        let _held = a.acquire().await;
        assert!(b.try_acquire().is_some());
    }
}
