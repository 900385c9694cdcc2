//! Sharing of one pipeline run between concurrent identical requests.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::error::AppResult;

/// Drops a key's cell once the caller holding this guard is done with it.
///
/// A finished cell is always removed so later requests go through the cache.
/// An unfinished one is removed only when no other caller still holds it.
struct Release<'a, T> {
    calls: &'a DashMap<String, Arc<OnceCell<T>>>,
    key: &'a str,
    cell: Arc<OnceCell<T>>,
}

impl<T> Drop for Release<'_, T> {
    fn drop(&mut self) {
        self.calls.remove_if(self.key, |_, current| {
            // One reference in the map, one in this guard
            Arc::ptr_eq(current, &self.cell)
                && (self.cell.initialized() || Arc::strong_count(current) <= 2)
        });
    }
}

/// Map of keys currently being computed.
///
/// The first caller for a key runs its work; callers arriving while it runs
/// wait for and clone its value. A failed or cancelled run leaves the value
/// unset, so the next waiter runs its own work instead of sharing the error.
pub struct InFlight<T> {
    calls: DashMap<String, Arc<OnceCell<T>>>,
}

impl<T> Default for InFlight<T> {
    fn default() -> Self {
        Self {
            calls: DashMap::new(),
        }
    }
}

impl<T: Clone> InFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut>(&self, key: &str, work: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let cell = self
            .calls
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        // Dropped on completion and on cancellation alike
        let release = Release {
            calls: &self.calls,
            key,
            cell,
        };

        let result = release.cell.get_or_try_init(work).await.cloned();
        drop(release);
        result
    }

    /// Number of keys with a run in progress
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_concurrent_runs_share_one_execution() {
        let inflight = Arc::new(InFlight::<String>::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let spawn = |inflight: Arc<InFlight<String>>, executions: Arc<AtomicUsize>| {
            tokio::spawn(async move {
                inflight
                    .run("totoro", || async {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok("result".to_string())
                    })
                    .await
            })
        };

        let first = spawn(inflight.clone(), executions.clone());
        let second = spawn(inflight.clone(), executions.clone());

        assert_eq!(first.await.unwrap().unwrap(), "result");
        assert_eq!(second.await.unwrap().unwrap(), "result");
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(inflight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let inflight = InFlight::<usize>::new();

        let (a, b) = tokio::join!(
            inflight.run("a", || async { Ok(1) }),
            inflight.run("b", || async { Ok(2) }),
        );

        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_remembered() {
        let inflight = InFlight::<usize>::new();

        assert_err!(
            inflight
                .run("key", || async { Err(AppError::ExternalApi("down".to_string())) })
                .await
        );

        let retried = assert_ok!(inflight.run("key", || async { Ok(7) }).await);
        assert_eq!(retried, 7);
        assert_eq!(inflight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_releases_its_key() {
        let inflight = InFlight::<usize>::new();

        let outcome = tokio::time::timeout(
            Duration::from_millis(10),
            inflight.run("key", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            }),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(inflight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_keeps_leader_key() {
        let inflight = Arc::new(InFlight::<usize>::new());

        let leader = {
            let inflight = inflight.clone();
            tokio::spawn(async move {
                inflight
                    .run("key", || async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiter = tokio::time::timeout(
            Duration::from_millis(10),
            inflight.run("key", || async { Ok(2) }),
        )
        .await;
        assert!(waiter.is_err());
        assert_eq!(inflight.in_flight(), 1);

        assert_eq!(leader.await.unwrap().unwrap(), 1);
        assert_eq!(inflight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_runs_execute_again() {
        let inflight = InFlight::<usize>::new();
        let executions = AtomicUsize::new(0);

        for _ in 0..2 {
            inflight
                .run("key", || async {
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await
                .unwrap();
        }

        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }
}
