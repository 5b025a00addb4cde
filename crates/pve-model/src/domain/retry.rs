use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for the outer request.
///
/// Applies to transient failures of the request itself, never to the task poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Fixed delay between attempts.
    #[serde(rename = "delayMs", with = "duration_ms")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Total number of attempts, including the first.
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_single_attempt() {
        let p = RetryPolicy::default();
        assert_eq!(p.retries, 0);
        assert_eq!(p.max_attempts(), 1);
        assert_eq!(p.delay, Duration::from_secs(1));
    }

    #[test]
    fn max_attempts_saturates() {
        assert_eq!(RetryPolicy::none().with_retries(2).max_attempts(), 3);
        assert_eq!(RetryPolicy::none().with_retries(u32::MAX).max_attempts(), u32::MAX);
    }

    #[test]
    fn serde_uses_millis() {
        let p = RetryPolicy::new(3, Duration::from_millis(250));
        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json, serde_json::json!({"retries": 3, "delayMs": 250}));

        let back: RetryPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
