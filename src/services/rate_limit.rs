use std::time::Duration;

use crate::coordination::{CoordinationError, Coordinator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { limit: u64, remaining: u64, reset_after: Duration },
    Limited { limit: u64, retry_after: Duration },
    /// Counter service unavailable; the request is let through.
    Bypassed,
}

/// Fixed-window request counter keyed per client.
///
/// Fails open: if the counter service cannot be reached, every request is
/// allowed, since taking bookings matters more than throttling them.
#[derive(Clone)]
pub struct RateLimiter {
    coordinator: Coordinator,
    max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(coordinator: Coordinator, max_requests: u64, window: Duration) -> Self {
        Self {
            coordinator,
            max_requests,
            window,
        }
    }

    /// Counts one request for `client_key` in the window that began with its first request.
    pub async fn increment(&self, client_key: &str, window: Duration) -> Result<u64, CoordinationError> {
        let client = self.coordinator.client().ok_or(CoordinationError::Unavailable)?;
        client.increment(&format!("ratelimit:{client_key}"), window).await
    }

    pub async fn check(&self, client_key: &str) -> RateDecision {
        let count = match self.increment(client_key, self.window).await {
            Ok(count) => count,
            Err(CoordinationError::Unavailable) => return RateDecision::Bypassed,
            Err(e) => {
                tracing::warn!(client = client_key, error = %e, "rate limiter unavailable, allowing request");
                return RateDecision::Bypassed;
            }
        };

        if count > self.max_requests {
            tracing::info!(client = client_key, count, limit = self.max_requests, "rate limit exceeded");
            return RateDecision::Limited {
                limit: self.max_requests,
                retry_after: self.window,
            };
        }

        RateDecision::Allowed {
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(count),
            reset_after: self.window,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::coordination::CoordinationClient;

    const WINDOW: Duration = Duration::from_secs(60);

    struct BrokenCoordination;

    #[async_trait]
    impl CoordinationClient for BrokenCoordination {
        async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, CoordinationError> {
            Err(CoordinationError::Unreachable("connection reset".to_string()))
        }
        async fn get(&self, _: &str) -> Result<Option<String>, CoordinationError> {
            Err(CoordinationError::Unreachable("connection reset".to_string()))
        }
        async fn delete(&self, _: &str) -> Result<(), CoordinationError> {
            Err(CoordinationError::Unreachable("connection reset".to_string()))
        }
        async fn delete_if_equals(&self, _: &str, _: &str) -> Result<bool, CoordinationError> {
            Err(CoordinationError::Unreachable("connection reset".to_string()))
        }
        async fn increment(&self, _: &str, _: Duration) -> Result<u64, CoordinationError> {
            Err(CoordinationError::Unreachable("connection reset".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_over_limit_is_rejected() {
        let limiter = RateLimiter::new(Coordinator::in_memory(), 5, WINDOW);

        for i in 1..=5u64 {
            match limiter.check("10.0.0.1").await {
                RateDecision::Allowed { remaining, .. } => assert_eq!(remaining, 5 - i),
                other => panic!("request {i} should pass, got {other:?}"),
            }
        }

        assert_eq!(
            limiter.check("10.0.0.1").await,
            RateDecision::Limited {
                limit: 5,
                retry_after: WINDOW
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_first_request_expires() {
        let limiter = RateLimiter::new(Coordinator::in_memory(), 2, WINDOW);

        limiter.check("10.0.0.1").await;
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.check("10.0.0.1").await;
        assert!(matches!(limiter.check("10.0.0.1").await, RateDecision::Limited { .. }));

        // window is anchored at the first request, not the latest
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(limiter.increment("10.0.0.1", WINDOW).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_counted_separately() {
        let limiter = RateLimiter::new(Coordinator::in_memory(), 1, WINDOW);
        assert!(matches!(limiter.check("a").await, RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check("b").await, RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check("a").await, RateDecision::Limited { .. }));
    }

    #[tokio::test]
    async fn test_fails_open_without_coordinator() {
        let limiter = RateLimiter::new(Coordinator::Unavailable, 1, WINDOW);
        for _ in 0..10 {
            assert_eq!(limiter.check("10.0.0.1").await, RateDecision::Bypassed);
        }
    }

    #[tokio::test]
    async fn test_fails_open_on_runtime_errors() {
        let limiter = RateLimiter::new(
            Coordinator::Available(Arc::new(BrokenCoordination)),
            1,
            WINDOW,
        );
        assert_eq!(limiter.check("10.0.0.1").await, RateDecision::Bypassed);
        assert_eq!(limiter.check("10.0.0.1").await, RateDecision::Bypassed);
    }
}
