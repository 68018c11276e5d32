//! Bounded retry and polling policies
//!
//! Remote calls are attempted once unless a policy says otherwise. Neither
//! policy is unbounded: both give up after a fixed number of attempts.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{AttachConfig, DetachConfig};
use crate::error::Result;

/// Retry an operation a fixed number of times with a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Run `op` until it succeeds or attempts are exhausted.
    ///
    /// The error from the last attempt is returned.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!(attempt, error = %e, "{} failed, retrying in {:?}", what, self.delay);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl From<&DetachConfig> for RetryPolicy {
    fn from(config: &DetachConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: config.delay,
        }
    }
}

/// Poll a condition a bounded number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    /// Poll until `check` returns `Ok(true)`.
    ///
    /// Sleeps `interval` between polls, never after the last one. Returns
    /// `Ok(false)` when attempts run out; errors from `check` stop polling.
    pub async fn until<F, Fut>(&self, what: &str, mut check: F) -> Result<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        for attempt in 1..=self.attempts {
            if check().await? {
                debug!(attempt, "{} reached", what);
                return Ok(true);
            }
            if attempt < self.attempts {
                debug!(attempt, "{} not reached, next poll in {:?}", what, self.interval);
                tokio::time::sleep(self.interval).await;
            }
        }
        Ok(false)
    }
}

impl From<&AttachConfig> for PollPolicy {
    fn from(config: &AttachConfig) -> Self {
        Self {
            attempts: config.poll_attempts,
            interval: config.poll_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use std::cell::Cell;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_second_attempt() {
        let calls = Cell::new(0);
        let result = quick(2)
            .run("detach", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n == 1 {
                        Err(DriverError::RemoteTransport("busy".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let calls = Cell::new(0);
        let result: Result<()> = quick(2)
            .run("detach", || {
                calls.set(calls.get() + 1);
                async { Err(DriverError::RemoteTransport("down".to_string())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_single_attempt_does_not_retry() {
        let calls = Cell::new(0);
        let _: Result<()> = quick(1)
            .run("op", || {
                calls.set(calls.get() + 1);
                async { Err(DriverError::NotFound("x".to_string())) }
            })
            .await;
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_poll_stops_when_ready() {
        let calls = Cell::new(0);
        let policy = PollPolicy {
            attempts: 10,
            interval: Duration::from_millis(1),
        };
        let ready = policy
            .until("ready", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Ok(n == 3) }
            })
            .await
            .unwrap();
        assert!(ready);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_poll_gives_up_after_attempts() {
        let calls = Cell::new(0);
        let policy = PollPolicy {
            attempts: 4,
            interval: Duration::ZERO,
        };
        let ready = policy
            .until("ready", || {
                calls.set(calls.get() + 1);
                async { Ok(false) }
            })
            .await
            .unwrap();
        assert!(!ready);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_policies_from_config() {
        let detach = RetryPolicy::from(&DetachConfig::default());
        assert_eq!(detach.max_attempts, 2);
        assert_eq!(detach.delay, Duration::from_secs(1));

        let attach = PollPolicy::from(&AttachConfig::default());
        assert_eq!(attach.attempts, 10);
        assert_eq!(attach.interval, Duration::from_secs(30));
    }
}
