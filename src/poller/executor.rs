//! Poll Executor
//!
//! Bounded pool that runs one unit of device I/O per device and joins them
//! as a barrier. Results come back in input order.

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Errors from a pool run
#[derive(Debug, Error)]
pub enum PollError {
    #[error("poll executor is shutting down")]
    ShuttingDown,

    #[error("poll worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Bounded worker pool for device I/O
#[derive(Debug)]
pub struct PollExecutor {
    permits: Arc<Semaphore>,
    workers: usize,
    cancel: CancellationToken,
}

impl PollExecutor {
    pub fn new(workers: usize, cancel: CancellationToken) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            cancel,
        }
    }

    /// Two workers per device, at least two
    pub fn for_devices(device_count: usize, cancel: CancellationToken) -> Self {
        Self::new((device_count * 2).max(2), cancel)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `f` over every item and wait for all of them
    ///
    /// Once the cancellation token fires, outstanding work is aborted and
    /// `ShuttingDown` is returned instead of partial results.
    pub async fn map<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> Result<Vec<R>, PollError>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        if self.cancel.is_cancelled() || self.permits.is_closed() {
            return Err(PollError::ShuttingDown);
        }

        let len = items.len();
        let mut tasks = JoinSet::new();
        for (index, item) in items.into_iter().enumerate() {
            let permits = Arc::clone(&self.permits);
            let work = f(item);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                Some((index, work.await))
            });
        }

        let mut results: Vec<Option<R>> = (0..len).map(|_| None).collect();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(PollError::ShuttingDown);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Some((index, value)))) => results[index] = Some(value),
                    Some(Ok(None)) => {
                        tasks.abort_all();
                        return Err(PollError::ShuttingDown);
                    }
                    Some(Err(e)) => {
                        tasks.abort_all();
                        return Err(PollError::Worker(e));
                    }
                },
            }
        }

        results
            .into_iter()
            .collect::<Option<Vec<R>>>()
            .ok_or(PollError::ShuttingDown)
    }

    /// Refuse all further work
    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_pool_size() {
        let cancel = CancellationToken::new();
        assert_eq!(PollExecutor::for_devices(0, cancel.clone()).workers(), 2);
        assert_eq!(PollExecutor::for_devices(1, cancel.clone()).workers(), 2);
        assert_eq!(PollExecutor::for_devices(5, cancel).workers(), 10);
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let executor = PollExecutor::new(4, CancellationToken::new());
        let results = executor
            .map(vec![30u64, 10, 20], |delay| async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay
            })
            .await
            .unwrap();
        assert_eq!(results, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let executor = PollExecutor::new(2, CancellationToken::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        executor
            .map((0..8).collect::<Vec<_>>(), |_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_outstanding_work() {
        let cancel = CancellationToken::new();
        let executor = PollExecutor::new(2, cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = executor
            .map(vec![(); 2], |_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
            .await;
        assert!(matches!(result, Err(PollError::ShuttingDown)));

        let result = executor.map(vec![1], |v| async move { v }).await;
        assert!(matches!(result, Err(PollError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_work() {
        let executor = PollExecutor::new(2, CancellationToken::new());
        executor.close();
        let result = executor.map(vec![1], |v| async move { v }).await;
        assert!(matches!(result, Err(PollError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_worker_panic_is_reported() {
        let executor = PollExecutor::new(2, CancellationToken::new());
        let result = executor
            .map(vec![1, 2], |v| async move {
                if v == 2 {
                    panic!("device driver bug");
                }
                v
            })
            .await;
        assert!(matches!(result, Err(PollError::Worker(e)) if e.is_panic()));
    }
}
