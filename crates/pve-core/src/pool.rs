use std::{
    fmt,
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{runtime::Handle, sync::Semaphore, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, warn};

use crate::ApiError;

static SHARED: Mutex<Option<WorkerPool>> = Mutex::new(None);

/// Pool of lightweight tasks that run task polls and completion callbacks.
///
/// Cheap to clone; clones share the same pool. After shutdown every
/// [`spawn`](WorkerPool::spawn) fails with [`ApiError::ShutDown`], and work still
/// in flight is abandoned (its join handle resolves to `None`).
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    closed: AtomicBool,
    /// Present for bounded pools.
    permits: Option<Arc<Semaphore>>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.inner.name)
            .field("in_flight", &self.in_flight())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl WorkerPool {
    /// Unbounded pool: every submission starts right away.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// At most `max_in_flight` submissions run at once; the rest wait for a slot.
    pub fn bounded(name: impl Into<String>, max_in_flight: usize) -> Self {
        let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
        Self::build(name.into(), Some(permits))
    }

    fn build(name: String, permits: Option<Arc<Semaphore>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                closed: AtomicBool::new(false),
                permits,
            }),
        }
    }

    /// Process-wide default pool, created on first use.
    pub fn shared() -> WorkerPool {
        lock_shared()
            .get_or_insert_with(|| WorkerPool::new("shared"))
            .clone()
    }

    /// Install `pool` as the process-wide default and shut the previous one down.
    pub fn replace_shared(pool: WorkerPool) {
        let previous = lock_shared().replace(pool);
        if let Some(previous) = previous {
            previous.shutdown_now();
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of submissions not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles refer to the same pool.
    pub fn ptr_eq(&self, other: &WorkerPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `fut` on the pool.
    ///
    /// The handle resolves to `None` if the pool shuts down before `fut` completes.
    pub fn spawn<F>(&self, fut: F) -> Result<JoinHandle<Option<F::Output>>, ApiError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_shut_down() {
            return Err(ApiError::ShutDown);
        }
        let handle = Handle::try_current().map_err(|e| ApiError::Internal(e.to_string()))?;

        let shutdown = self.inner.shutdown.clone();
        let permits = self.inner.permits.clone();

        Ok(self.inner.tracker.spawn_on(
            async move {
                let _permit = match permits {
                    Some(sem) => tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return None,
                        permit = sem.acquire_owned() => permit.ok(),
                    },
                    None => None,
                };

                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => None,
                    out = fut => Some(out),
                }
            },
            &handle,
        ))
    }

    /// Stop accepting work, wait up to `grace` for in-flight work, then abandon the rest.
    ///
    /// Idempotent.
    pub async fn shutdown(&self, grace: Duration) {
        self.close();

        if tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                target: "pve.core.pool",
                pool = %self.inner.name,
                in_flight = self.in_flight(),
                grace_ms = grace.as_millis() as u64,
                "grace period elapsed; abandoning in-flight work"
            );
        }
        self.inner.shutdown.cancel();
    }

    /// Stop accepting work and abandon everything in flight.
    ///
    /// Synchronous and idempotent; safe to call from an exit hook.
    pub fn shutdown_now(&self) {
        self.close();
        self.inner.shutdown.cancel();
    }

    fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.tracker.close();
            debug!(target: "pve.core.pool", pool = %self.inner.name, in_flight = self.in_flight(), "pool closed");
        }
    }
}

/// Shut the process-wide default pool down, if it was ever created.
///
/// Later calls to [`WorkerPool::shared`] return the closed pool until a new one is
/// installed with [`WorkerPool::replace_shared`].
pub fn shutdown_shared() {
    let current = lock_shared().clone();
    if let Some(pool) = current {
        pool.shutdown_now();
    }
}

fn lock_shared() -> MutexGuard<'static, Option<WorkerPool>> {
    SHARED.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn spawn_returns_output() {
        let pool = WorkerPool::new("test");
        let out = pool.spawn(async { 40 + 2 }).unwrap().await.unwrap();
        assert_eq!(out, Some(42));
    }

    #[tokio::test]
    async fn spawn_after_shutdown_fails_fast() {
        let pool = WorkerPool::new("test");
        pool.shutdown_now();
        pool.shutdown_now();
        assert!(pool.is_shut_down());
        assert!(matches!(pool.spawn(async {}), Err(ApiError::ShutDown)));
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_lets_short_work_finish() {
        let pool = WorkerPool::new("test");
        let h = pool
            .spawn(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                "done"
            })
            .unwrap();

        pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(h.await.unwrap(), Some("done"));
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_long_work_after_grace() {
        let pool = WorkerPool::new("test");
        let h = pool
            .spawn(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
            .unwrap();

        pool.shutdown(Duration::from_millis(100)).await;
        assert_eq!(h.await.unwrap(), None);

        // second call is a no-op
        pool.shutdown(Duration::from_millis(100)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_pool_limits_concurrency() {
        let pool = WorkerPool::bounded("test", 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                pool.spawn(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        for h in handles {
            assert_eq!(h.await.unwrap(), Some(()));
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shared_pool_is_lazy_and_replaceable() {
        let a = WorkerPool::shared();
        let b = WorkerPool::shared();
        assert!(a.ptr_eq(&b));

        let fresh = WorkerPool::new("replacement");
        WorkerPool::replace_shared(fresh.clone());
        assert!(a.is_shut_down());
        assert!(WorkerPool::shared().ptr_eq(&fresh));

        shutdown_shared();
        shutdown_shared();
        assert!(fresh.is_shut_down());
        assert!(matches!(WorkerPool::shared().spawn(async {}), Err(ApiError::ShutDown)));
    }
}
