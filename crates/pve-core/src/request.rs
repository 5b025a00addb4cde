use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
    time::Duration,
};

use pve_model::{RetryPolicy, TaskStatus, Upid};
use serde::Serialize;
use tokio::{sync::oneshot, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{ApiError, StatusSource, TaskPoller, TimeoutGuard, WorkerPool, extract::find_task};

/// One attempt of the underlying request.
pub type CallFuture<T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send>>;

type Call<T> = Box<dyn FnMut() -> CallFuture<T> + Send>;
type Callback = Box<dyn FnOnce(Result<TaskStatus, ApiError>) + Send>;

/// Defaults applied to every request a client builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDefaults {
    pub retry: RetryPolicy,
    pub task_check_delay: Duration,
    pub task_timeout: Option<Duration>,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            task_check_delay: Duration::from_secs(1),
            task_timeout: None,
        }
    }
}

/// A single logical API request.
///
/// `execute` runs up to `retries + 1` strictly sequential attempts, retrying only
/// transient failures. If the result carries a task identity it then either
/// waits for the task ([`wait_for_completion`](Self::wait_for_completion)) or
/// tracks it in the background and reports to a callback
/// ([`on_completion`](Self::on_completion)). With neither, no polling happens.
pub struct ApiRequest<T> {
    call: Call<T>,
    retry: RetryPolicy,
    check_delay: Duration,
    timeout: Option<Duration>,
    wait: bool,
    callback: Option<Callback>,
    status: Option<Arc<dyn StatusSource>>,
    pool: Option<WorkerPool>,
    cancel: CancellationToken,
}

impl<T> fmt::Debug for ApiRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("retry", &self.retry)
            .field("check_delay", &self.check_delay)
            .field("timeout", &self.timeout)
            .field("wait", &self.wait)
            .field("callback", &self.callback.is_some())
            .finish_non_exhaustive()
    }
}

/// Result of [`ApiRequest::submit`].
#[derive(Debug)]
pub struct Submitted<T> {
    /// Value returned by the successful attempt.
    pub value: T,
    /// Task detected in `value`, if any.
    pub upid: Option<Upid>,
    /// Background tracking outcome; present only when a completion callback was registered.
    pub completion: Option<Completion>,
}

impl<T> Submitted<T> {
    fn untracked(value: T, upid: Option<Upid>) -> Self {
        Self {
            value,
            upid,
            completion: None,
        }
    }
}

/// Outcome of background task tracking.
///
/// Resolves to [`ApiError::Cancelled`] if the tracking was cancelled or abandoned.
/// May be dropped; the tracking continues regardless.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<TaskStatus, ApiError>>,
}

impl Future for Completion {
    type Output = Result<TaskStatus, ApiError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.rx).poll(cx)) {
            Ok(outcome) => Poll::Ready(outcome),
            Err(_) => Poll::Ready(Err(ApiError::Cancelled)),
        }
    }
}

impl<T> ApiRequest<T>
where
    T: Serialize + Send + 'static,
{
    /// Wrap a single-shot call; it is invoked once per attempt.
    pub fn new<F, Fut>(mut call: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let defaults = RequestDefaults::default();
        Self {
            call: Box::new(move || -> CallFuture<T> { Box::pin(call()) }),
            retry: defaults.retry,
            check_delay: defaults.task_check_delay,
            timeout: defaults.task_timeout,
            wait: false,
            callback: None,
            status: None,
            pool: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: &RequestDefaults) -> Self {
        self.retry = defaults.retry;
        self.check_delay = defaults.task_check_delay;
        self.timeout = defaults.task_timeout;
        self
    }

    /// Source used to poll a detected task.
    pub fn with_status_source(mut self, source: Arc<dyn StatusSource>) -> Self {
        self.status = Some(source);
        self
    }

    /// Number of retries after the first attempt.
    pub fn retry(mut self, retries: u32) -> Self {
        self.retry.retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry.delay = delay;
        self
    }

    /// Interval between task status reads.
    pub fn task_check_delay(mut self, delay: Duration) -> Self {
        self.check_delay = delay;
        self
    }

    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Block `execute` until the detected task finishes.
    ///
    /// Takes precedence over [`on_completion`](Self::on_completion).
    pub fn wait_for_completion(mut self) -> Self {
        self.wait = true;
        self
    }

    /// Track the detected task in the background and hand its outcome to `callback`.
    ///
    /// The callback runs at most once, off the caller's task. A panic inside it is
    /// contained and logged. It is never invoked when the tracking is cancelled.
    pub fn on_completion<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Result<TaskStatus, ApiError>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Cancelling `token` stops further attempts, the task poll and any pending callback.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Pool for polls and callbacks; defaults to [`WorkerPool::shared`].
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Run the request and return the value of the successful attempt.
    pub async fn execute(self) -> Result<T, ApiError> {
        self.submit().await.map(|s| s.value)
    }

    /// Like [`execute`](Self::execute), but also returns the detected task and the
    /// background completion handle.
    pub async fn submit(mut self) -> Result<Submitted<T>, ApiError> {
        let value = self.attempts().await?;

        let Some(found) = find_task(&value) else {
            return Ok(Submitted::untracked(value, None));
        };
        let upid = found.upid;

        if !self.wait && self.callback.is_none() {
            return Ok(Submitted::untracked(value, Some(upid)));
        }
        if found.heuristic.is_low_confidence() {
            warn!(
                target: "pve.core.request",
                upid = %upid,
                heuristic = %found.heuristic,
                "tracking a task token recovered by free-text scan"
            );
        }
        let Some(source) = self.status.take() else {
            warn!(target: "pve.core.request", upid = %upid, "task tracking requested without a status source; not polling");
            return Ok(Submitted::untracked(value, Some(upid)));
        };

        let pool = self.pool.take().unwrap_or_else(WorkerPool::shared);
        let poller = TaskPoller::new(source, self.check_delay, pool.clone());
        let guard = TimeoutGuard::new(self.timeout);

        if self.wait {
            let handle = poller.spawn(upid.clone(), self.cancel.clone())?;
            let status = guard.watch(handle).await?;
            debug!(target: "pve.core.request", upid = %upid, exit_status = status.exit_status().unwrap_or_default(), "task completed");
            return Ok(Submitted::untracked(value, Some(upid)));
        }

        let (tx, rx) = oneshot::channel();
        let callback = self.callback.take();
        let cancel = self.cancel.clone();
        let tracked = upid.clone();

        pool.spawn(async move {
            let outcome = guard.watch(poller.run(tracked.clone(), cancel.clone())).await;
            if cancel.is_cancelled() || matches!(outcome, Err(ApiError::Cancelled)) {
                debug!(target: "pve.core.request", upid = %tracked, "task tracking cancelled");
                return;
            }

            let _ = tx.send(outcome.clone());
            if let Some(callback) = callback {
                run_callback(&tracked, callback, outcome).await;
            }
        })?;

        Ok(Submitted {
            value,
            upid: Some(upid),
            completion: Some(Completion { rx }),
        })
    }

    async fn attempts(&mut self) -> Result<T, ApiError> {
        let cancel = self.cancel.clone();
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let call = (self.call)();
            let out = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                out = call => out,
            };

            match out {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    debug!(
                        target: "pve.core.request",
                        attempt,
                        max_attempts,
                        delay_ms = self.retry.delay.as_millis() as u64,
                        reason = %e,
                        "transient failure; retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                        _ = sleep(self.retry.delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn run_callback(upid: &Upid, callback: Callback, outcome: Result<TaskStatus, ApiError>) {
    match tokio::task::spawn_blocking(move || callback(outcome)).await {
        Ok(()) => trace!(target: "pve.core.request", upid = %upid, "completion callback done"),
        Err(e) if e.is_panic() => {
            warn!(target: "pve.core.request", upid = %upid, "completion callback panicked")
        }
        Err(_) => {}
    }
}
