use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{MonitorError, Result};

/// Delay schedule between attempts, 0-indexed by the attempt that just failed.
pub type Backoff = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Bounded-retry policy for fallible engine calls.
///
/// Fixed delay by default; a custom backoff function can be plugged in when a
/// caller wants something smarter. The policy itself never emits events --
/// callers decide what an exhausted retry means.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub attempts: u32,
    pub delay: Duration,
    backoff: Option<Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            delay: Duration::from_millis(500),
            backoff: None,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("attempts", &self.attempts)
            .field("delay", &self.delay)
            .field("custom_backoff", &self.backoff.is_some())
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
            backoff: None,
        }
    }

    /// Single attempt, no delays.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Delay after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Some(backoff) => backoff(attempt),
            None => self.delay,
        }
    }
}

/// Run `op` up to `policy.attempts` times, sleeping between attempts.
///
/// Only transport-class failures are retried; a `NotFound`/`Config`/`Engine`
/// error is the caller's problem and comes back immediately. Exhausting the
/// attempts surfaces the last transport error.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_err = MonitorError::Transport("no attempts made".to_string());

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transport() => {
                debug!("attempt {}/{} failed: {}", attempt + 1, attempts, err);
                last_err = err;
                if attempt + 1 < attempts {
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err)
}
