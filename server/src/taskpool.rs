use futures_util::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

/// Runs detached background jobs and keeps track of them.
///
/// Jobs are never cancelled once started. `max_tasks` optionally bounds how
/// many run at once; further jobs wait for a free slot.
pub struct TaskPool {
    tracker: TaskTracker,
    semaphore: Option<Arc<Semaphore>>,
}

impl TaskPool {
    pub fn new(max_tasks: Option<usize>) -> TaskPool {
        TaskPool {
            tracker: TaskTracker::new(),
            semaphore: max_tasks.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    pub fn unbounded() -> TaskPool {
        Self::new(None)
    }

    pub fn execute<F>(&self, func: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        self.tracker.spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };
            func.await;
        });
    }

    /// Number of jobs spawned and not yet finished.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every job spawned so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_idle_waits_for_all_jobs() {
        let pool = TaskPool::unbounded();
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            let done = done.clone();
            pool.execute(async move {
                tokio::time::sleep(Duration::from_millis(10 * i)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.wait_idle().await;

        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(pool.running(), 0);
    }

    #[tokio::test]
    async fn test_bounded_pool_limits_concurrency() {
        let pool = TaskPool::new(Some(2));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let active = active.clone();
            let peak = peak.clone();
            pool.execute(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }

        pool.wait_idle().await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_pool_reusable_after_wait() {
        let pool = TaskPool::unbounded();
        pool.wait_idle().await;

        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        pool.execute(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        pool.wait_idle().await;

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
