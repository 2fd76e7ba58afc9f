//! Request pacing and retry for the discovery API.
//!
//! [`RateLimitedClient`] does two things around every outbound call:
//!
//! 1. **Pacing.** Consecutive requests are spaced at least `request_delay`
//!    apart, globally across all workers sharing the client.
//! 2. **Retry.** Retryable failures (429, timeouts, network errors, 5xx) are
//!    retried with exponential backoff per [`BackoffPolicy`]. When the
//!    attempt budget is spent the caller gets
//!    [`DiscoveryError::RateLimitExhausted`] carrying the last error.
//!
//! Time is read through the [`Clock`] trait so tests can run without
//! actually sleeping.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use ragrag_core::backoff::BackoffPolicy;

use crate::discovery::DiscoveryError;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `tokio::time::sleep`.
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct RateLimitedClient {
    policy: BackoffPolicy,
    request_delay: Duration,
    clock: Arc<dyn Clock>,
    /// Time of the last request; held across the pacing sleep so workers
    /// queue behind each other.
    last_request: Mutex<Option<Instant>>,
}

impl RateLimitedClient {
    pub fn new(policy: BackoffPolicy, request_delay: Duration) -> Self {
        Self::with_clock(policy, request_delay, Arc::new(TokioClock))
    }

    pub fn with_clock(policy: BackoffPolicy, request_delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            request_delay,
            clock,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until at least `request_delay` has passed since the previous request.
    pub async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = self.clock.now().saturating_duration_since(prev);
            if elapsed < self.request_delay {
                self.clock.sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(self.clock.now());
    }

    /// Run `op` with pacing and retry.
    ///
    /// `op` is invoked once per attempt. Non-retryable errors are returned
    /// immediately.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, DiscoveryError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, DiscoveryError>> + Send,
    {
        let mut attempts = 0u32;
        loop {
            self.pace().await;
            attempts += 1;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if !self.policy.should_retry(attempts) {
                warn!(request = what, attempts, error = %err, "retry budget exhausted");
                return Err(DiscoveryError::RateLimitExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.delay_for(attempts - 1);
            warn!(
                request = what,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retryable failure, backing off"
            );
            self.clock.sleep(delay).await;
            debug!(request = what, "retrying");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Clock whose time only moves when something sleeps on it.
    struct FakeClock {
        start: Instant,
        offset: StdMutex<Duration>,
        sleeps: StdMutex<Vec<Duration>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                offset: StdMutex::new(Duration::ZERO),
                sleeps: StdMutex::new(Vec::new()),
            }
        }

        fn advance(&self, d: Duration) {
            *self.offset.lock().unwrap() += d;
        }

        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.start + *self.offset.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            self.advance(duration);
        }
    }

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(3, Duration::from_secs(2), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_pace_enforces_minimum_gap() {
        let clock = Arc::new(FakeClock::new());
        let client =
            RateLimitedClient::with_clock(policy(), Duration::from_millis(500), clock.clone());

        client.pace().await;
        assert!(clock.sleeps().is_empty());

        clock.advance(Duration::from_millis(200));
        client.pace().await;
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(300)]);

        clock.advance(Duration::from_secs(1));
        client.pace().await;
        assert_eq!(clock.sleeps().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_rate_limit_then_succeeds() {
        let clock = Arc::new(FakeClock::new());
        let client = RateLimitedClient::with_clock(policy(), Duration::ZERO, clock.clone());
        let calls = AtomicU32::new(0);

        let result = client
            .run("search", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DiscoveryError::RateLimited)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        let clock = Arc::new(FakeClock::new());
        let client = RateLimitedClient::with_clock(policy(), Duration::ZERO, clock.clone());
        let calls = AtomicU32::new(0);

        let err = client
            .run("search", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DiscoveryError::RateLimited) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            DiscoveryError::RateLimitExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, DiscoveryError::RateLimited));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let clock = Arc::new(FakeClock::new());
        let client = RateLimitedClient::with_clock(policy(), Duration::ZERO, clock.clone());
        let calls = AtomicU32::new(0);

        let err = client
            .run("fetch", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DiscoveryError::NotFound("x".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DiscoveryError::NotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());
    }
}
