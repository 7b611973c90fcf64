use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// Runs one task per item with at most `capacity` of them in flight.
///
/// All tasks are spawned up front and wait on the semaphore for admission.
/// The handles are kept in input order and awaited one after the other, so
/// the output lines up with the input no matter which task finishes first.
pub struct TaskPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl TaskPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn run<I, T, F, Fut>(&self, items: impl IntoIterator<Item = I>, task: F) -> Vec<Result<T, JoinError>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut handles = vec![];
        for item in items {
            let permits = Arc::clone(&self.permits);
            let work = task(item);
            let handle = tokio::spawn(async move {
                // the semaphore is never closed, so acquiring only waits
                let _permit = permits.acquire_owned().await;
                work.await
            });
            handles.push(handle);
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await);
        }
        results
    }
}
