//! Access to the shared coordination service (locks and counters).
//!
//! The service is optional. [`Coordinator::connect`] decides once, at
//! startup, whether it is reachable; everything downstream only ever sees
//! the resulting [`Coordinator`] variant.

pub mod memory;
pub mod redis_client;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryCoordination;
pub use redis_client::RedisCoordination;

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("coordination service unavailable")]
    Unavailable,

    #[error("coordination service unreachable: {0}")]
    Unreachable(String),

    #[error("coordination command failed: {0}")]
    Command(String),
}

/// Primitives the lock and the rate limiter are built from.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Sets `key` only if it does not exist, expiring after `ttl`. Returns whether it was set.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError>;

    /// Removes `key`; removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CoordinationError>;

    /// Removes `key` only while it still holds `expected`. Returns whether it was removed.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, CoordinationError>;

    /// Increments the counter at `key`. Only the increment that creates the
    /// key attaches the `ttl`, so the window is anchored at the first hit.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CoordinationError>;
}

#[derive(Clone)]
pub enum Coordinator {
    Available(Arc<dyn CoordinationClient>),
    Unavailable,
}

impl Coordinator {
    /// Connects to Redis at `url`. An empty URL or a failed connection yields
    /// [`Coordinator::Unavailable`]; the caller keeps running without it.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Self {
        if url.is_empty() {
            tracing::info!("no coordination service configured");
            return Coordinator::Unavailable;
        }

        match RedisCoordination::connect(url, connect_timeout).await {
            Ok(client) => {
                tracing::info!("coordination service connected");
                Coordinator::Available(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!(error = %e, "coordination service unavailable");
                Coordinator::Unavailable
            }
        }
    }

    /// Process-local coordinator, for single-node runs and tests.
    pub fn in_memory() -> Self {
        Coordinator::Available(Arc::new(MemoryCoordination::new()))
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Coordinator::Available(_))
    }

    /// Issues a cheap read against the service. Unlike [`Coordinator::is_available`]
    /// this reflects the connection as it is now, not as it was at startup.
    pub async fn is_reachable(&self, timeout: Duration) -> bool {
        let Some(client) = self.client() else {
            return false;
        };
        match tokio::time::timeout(timeout, client.get("health:ping")).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "coordination health check failed");
                false
            }
            Err(_) => {
                tracing::warn!("coordination health check timed out");
                false
            }
        }
    }

    pub fn client(&self) -> Option<&Arc<dyn CoordinationClient>> {
        match self {
            Coordinator::Available(client) => Some(client),
            Coordinator::Unavailable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_url_is_unavailable() {
        let coordinator = Coordinator::connect("", Duration::from_millis(50)).await;
        assert!(!coordinator.is_available());
    }

    #[tokio::test]
    async fn test_invalid_url_is_unavailable() {
        let coordinator = Coordinator::connect("not a url", Duration::from_millis(50)).await;
        assert!(!coordinator.is_available());
    }

    #[test]
    fn test_in_memory_is_available() {
        assert!(Coordinator::in_memory().is_available());
    }

    struct DroppedConnection;

    #[async_trait]
    impl CoordinationClient for DroppedConnection {
        async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, CoordinationError> {
            Err(CoordinationError::Unreachable("broken pipe".to_string()))
        }
        async fn get(&self, _: &str) -> Result<Option<String>, CoordinationError> {
            Err(CoordinationError::Unreachable("broken pipe".to_string()))
        }
        async fn delete(&self, _: &str) -> Result<(), CoordinationError> {
            Err(CoordinationError::Unreachable("broken pipe".to_string()))
        }
        async fn delete_if_equals(&self, _: &str, _: &str) -> Result<bool, CoordinationError> {
            Err(CoordinationError::Unreachable("broken pipe".to_string()))
        }
        async fn increment(&self, _: &str, _: Duration) -> Result<u64, CoordinationError> {
            Err(CoordinationError::Unreachable("broken pipe".to_string()))
        }
    }

    #[tokio::test]
    async fn test_reachability_is_checked_live() {
        let timeout = Duration::from_millis(50);
        assert!(Coordinator::in_memory().is_reachable(timeout).await);
        assert!(!Coordinator::Unavailable.is_reachable(timeout).await);

        let dropped = Coordinator::Available(Arc::new(DroppedConnection));
        assert!(dropped.is_available());
        assert!(!dropped.is_reachable(timeout).await);
    }
}
