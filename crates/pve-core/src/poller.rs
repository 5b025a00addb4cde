use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
    time::Duration,
};

use async_trait::async_trait;
use pve_model::{TaskStatus, Upid};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

use crate::{ApiError, WorkerPool};

/// Reads the current status of a server task.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn task_status(&self, upid: &Upid) -> Result<TaskStatus, ApiError>;
}

/// Polls a task's status at a fixed interval until it finishes.
///
/// Holds no reference to the request that produced the task. A failed status
/// read ends the poll; retrying is up to the caller.
#[derive(Clone)]
pub struct TaskPoller {
    source: Arc<dyn StatusSource>,
    interval: Duration,
    pool: WorkerPool,
}

impl TaskPoller {
    pub fn new(source: Arc<dyn StatusSource>, interval: Duration, pool: WorkerPool) -> Self {
        Self {
            source,
            interval,
            pool,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll `upid` on the current task until it finishes.
    ///
    /// Dropping the returned future stops the poll.
    pub async fn run(&self, upid: Upid, cancel: CancellationToken) -> Result<TaskStatus, ApiError> {
        check_pollable(&upid)?;
        poll_loop(self.source.clone(), upid, self.interval, cancel)
            .await
            .unwrap_or(Err(ApiError::Cancelled))
    }

    /// Start polling `upid` on the pool.
    ///
    /// The poll stops at its next checkpoint when `cancel` fires or the returned
    /// handle is dropped.
    pub fn spawn(&self, upid: Upid, cancel: CancellationToken) -> Result<PollHandle, ApiError> {
        check_pollable(&upid)?;

        let token = cancel.child_token();
        let join = self.pool.spawn(poll_loop(
            self.source.clone(),
            upid,
            self.interval,
            token.clone(),
        ))?;

        Ok(PollHandle {
            join,
            _guard: token.drop_guard(),
        })
    }
}

/// Eventual outcome of a task poll.
///
/// Resolves to the final status on success, [`ApiError::OperationFailed`] when the
/// task finished unsuccessfully, or [`ApiError::Cancelled`] when the poll was
/// abandoned. Dropping the handle cancels the poll.
pub struct PollHandle {
    join: JoinHandle<Option<Option<Result<TaskStatus, ApiError>>>>,
    _guard: DropGuard,
}

impl Future for PollHandle {
    type Output = Result<TaskStatus, ApiError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let out = match ready!(Pin::new(&mut this.join).poll(cx)) {
            Ok(Some(Some(out))) => out,
            Ok(_) => Err(ApiError::Cancelled),
            Err(e) if e.is_panic() => Err(ApiError::Internal("task poll panicked".into())),
            Err(_) => Err(ApiError::Cancelled),
        };
        Poll::Ready(out)
    }
}

fn check_pollable(upid: &Upid) -> Result<(), ApiError> {
    if upid.is_pollable() {
        Ok(())
    } else {
        Err(ApiError::InvalidRequest(format!("task {upid} has no owning node")))
    }
}

async fn poll_loop(
    source: Arc<dyn StatusSource>,
    upid: Upid,
    interval: Duration,
    cancel: CancellationToken,
) -> Option<Result<TaskStatus, ApiError>> {
    let mut tick: u64 = 0;

    loop {
        tick += 1;
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(target: "pve.core.poller", upid = %upid, tick, "poll cancelled");
                return None;
            }
            read = source.task_status(&upid) => read,
        };

        let status = match read {
            Ok(status) => status,
            Err(e) => {
                debug!(target: "pve.core.poller", upid = %upid, tick, error = %e, "status read failed");
                return Some(Err(e));
            }
        };
        trace!(target: "pve.core.poller", upid = %upid, tick, finished = status.is_finished(), "status read");

        if status.is_finished() {
            debug!(
                target: "pve.core.poller",
                upid = %upid,
                tick,
                success = status.is_success(),
                exit_status = status.exit_status().unwrap_or_default(),
                "task finished"
            );
            if status.is_success() {
                return Some(Ok(status));
            }
            let exit_status = status.exit_status().map(str::to_string);
            return Some(Err(ApiError::OperationFailed { upid, exit_status }));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(target: "pve.core.poller", upid = %upid, tick, "poll cancelled");
                return None;
            }
            _ = sleep(interval) => {}
        }
    }
}
