use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use crate::coordination::{CoordinationClient, Coordinator};

pub fn slot_lock_key(slot_id: i64) -> String {
    format!("slot:{slot_id}:lock")
}

pub fn date_lock_key(date: NaiveDate) -> String {
    format!("date:{}:lock", date.format("%Y-%m-%d"))
}

/// Result of a single, non-blocking lock attempt.
pub enum LockAttempt {
    Acquired(LockGuard),
    Held,
    /// No coordination service; the caller proceeds on the store transaction alone.
    Unavailable,
}

/// Best-effort distributed mutex with a TTL.
///
/// The lock only cuts down on wasted contention. Correctness always comes
/// from the store transaction, so any coordination failure is reported as
/// [`LockAttempt::Unavailable`] rather than as an error.
#[derive(Clone)]
pub struct LockCoordinator {
    coordinator: Coordinator,
}

impl LockCoordinator {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    pub async fn acquire(&self, key: &str, ttl: Duration) -> LockAttempt {
        let Some(client) = self.coordinator.client() else {
            return LockAttempt::Unavailable;
        };

        let token = format!("{:016x}", rand::random::<u64>());
        match client.set_if_absent(key, &token, ttl).await {
            Ok(true) => {
                tracing::debug!(key, "lock acquired");
                LockAttempt::Acquired(LockGuard {
                    key: key.to_string(),
                    token,
                    client: Some(Arc::clone(client)),
                })
            }
            Ok(false) => {
                tracing::debug!(key, "lock held elsewhere");
                LockAttempt::Held
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "lock acquire failed, continuing unlocked");
                LockAttempt::Unavailable
            }
        }
    }

    /// Deletes `key`. Safe on keys that are not held.
    pub async fn release(&self, key: &str) {
        let Some(client) = self.coordinator.client() else {
            return;
        };
        if let Err(e) = client.delete(key).await {
            tracing::warn!(key, error = %e, "lock release failed, key will expire");
        }
    }
}

/// A held lock.
///
/// Released at most once: explicitly through [`LockGuard::release`], or,
/// if the owning future is dropped first, by a release task spawned from
/// `Drop`. Release only deletes the key while it still carries this
/// guard's token, so a guard that outlived its TTL leaves the next
/// holder's lock alone.
pub struct LockGuard {
    key: String,
    token: String,
    client: Option<Arc<dyn CoordinationClient>>,
}

impl LockGuard {
    pub async fn release(mut self) {
        if let Some(client) = self.client.take() {
            release_owned(client.as_ref(), &self.key, &self.token).await;
        }
    }
}

async fn release_owned(client: &dyn CoordinationClient, key: &str, token: &str) {
    match client.delete_if_equals(key, token).await {
        Ok(true) => tracing::debug!(key, "lock released"),
        Ok(false) => tracing::warn!(key, "lock expired before release"),
        Err(e) => tracing::warn!(key, error = %e, "lock release failed, key will expire"),
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    release_owned(client.as_ref(), &key, &token).await;
                });
            }
            Err(_) => {
                tracing::warn!(key = %key, "no runtime to release lock, key will expire");
            }
        }
    }
}
