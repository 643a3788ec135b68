//! Concurrency admission controller
//!
//! Bounds how many jobs may sit in the expensive image-generation phase at
//! once. Waiters queue FIFO (tokio's semaphore is fair), so a job never
//! starves behind a stream of later arrivals. Permits are RAII guards:
//! release happens on every exit path, including failures.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Scoped right to perform concurrent image-generation calls.
/// Dropping the permit frees the slot.
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Suspend until a generation slot is free, FIFO among waiters.
    pub async fn acquire(&self) -> AdmissionPermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("admission semaphore is never closed");
        AdmissionPermit { _permit: permit }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_capacity_bounds_concurrency() {
        let controller = Arc::new(AdmissionController::new(2));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let controller = controller.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            handles.push(tokio::spawn(async move {
                let _permit = controller.acquire().await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(max_active.load(Ordering::SeqCst) <= 2);
        assert_eq!(controller.available(), 2);
    }

    #[tokio::test]
    async fn test_waiters_are_served_fifo() {
        let controller = Arc::new(AdmissionController::new(1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Hold the only permit while the waiters queue up in order.
        let blocker = controller.acquire().await;

        let mut handles = Vec::new();
        for i in 0..4u32 {
            let controller = controller.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let _permit = controller.acquire().await;
                tx.send(i).unwrap();
            }));
            // Let each waiter enqueue before spawning the next.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        drop(blocker);
        for handle in handles {
            handle.await.unwrap();
        }
        drop(tx);

        let mut order = Vec::new();
        while let Some(i) = rx.recv().await {
            order.push(i);
        }
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_permit_released_when_holder_fails() {
        let controller = AdmissionController::new(1);
        {
            let _permit = controller.acquire().await;
            assert_eq!(controller.available(), 0);
            // Holder bails out with an error; the guard still releases.
        }
        assert_eq!(controller.available(), 1);
    }
}
