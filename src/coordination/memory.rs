use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CoordinationClient, CoordinationError};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process stand-in for the coordination service.
///
/// Expiry follows the tokio clock, so paused-time tests can step through
/// lock TTLs and rate-limit windows.
#[derive(Default)]
pub struct MemoryCoordination {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCoordination {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live_entries<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T,
    ) -> Result<T, CoordinationError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CoordinationError::Command("memory store poisoned".to_string()))?;
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(f(&mut entries, now))
    }
}

#[async_trait]
impl CoordinationClient for MemoryCoordination {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        self.with_live_entries(key, |entries, now| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: now + ttl,
                },
            );
            true
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        self.with_live_entries(key, |entries, _| entries.get(key).map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        self.with_live_entries(key, |entries, _| {
            entries.remove(key);
        })
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, CoordinationError> {
        self.with_live_entries(key, |entries, _| {
            if entries.get(key).is_some_and(|e| e.value == expected) {
                entries.remove(key);
                true
            } else {
                false
            }
        })
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CoordinationError> {
        self.with_live_entries(key, |entries, now| match entries.get_mut(key) {
            Some(entry) => {
                let count = entry
                    .value
                    .parse::<u64>()
                    .map_err(|_| CoordinationError::Command(format!("{key} is not a counter")))?
                    + 1;
                entry.value = count.to_string();
                Ok(count)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(1)
            }
        })?
    }
}
