use std::{future::Future, time::Duration};

use tracing::debug;

use crate::ApiError;

/// Races a pending result against an optional deadline.
///
/// Without a deadline no timer is created. When the deadline elapses the wrapped
/// future is dropped, which for a [`PollHandle`](crate::PollHandle) also cancels
/// the poll; the timer is released as soon as the wrapped future resolves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutGuard {
    deadline: Option<Duration>,
}

impl TimeoutGuard {
    pub fn new(deadline: Option<Duration>) -> Self {
        Self { deadline }
    }

    pub fn after(deadline: Duration) -> Self {
        Self::new(Some(deadline))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub async fn watch<F, T>(&self, fut: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let Some(deadline) = self.deadline else {
            return fut.await;
        };

        match tokio::time::timeout(deadline, fut).await {
            Ok(out) => out,
            Err(_) => {
                debug!(target: "pve.core.timeout", deadline_ms = deadline.as_millis() as u64, "deadline elapsed");
                Err(ApiError::Timeout(deadline))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, sleep};

    #[tokio::test(start_paused = true)]
    async fn no_deadline_waits_for_result() {
        let out = TimeoutGuard::default()
            .watch(async {
                sleep(Duration::from_secs(3600)).await;
                Ok::<_, ApiError>(7)
            })
            .await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_timeout() {
        let start = Instant::now();
        let out = TimeoutGuard::after(Duration::from_millis(100))
            .watch(std::future::pending::<Result<(), ApiError>>())
            .await;

        assert!(matches!(out, Err(ApiError::Timeout(d)) if d == Duration::from_millis(100)));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(start.elapsed() < Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn inner_error_passes_through() {
        let out = TimeoutGuard::after(Duration::from_secs(1))
            .watch(async { Err::<(), _>(ApiError::Cancelled) })
            .await;
        assert!(matches!(out, Err(ApiError::Cancelled)));
    }
}
