use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, Script};

use super::{CoordinationClient, CoordinationError};

/// Redis-backed coordination client.
///
/// Holds one multiplexed connection. The connection is not re-established
/// if it drops; calls fail and callers fall back to running uncoordinated.
#[derive(Clone)]
pub struct RedisCoordination {
    conn: MultiplexedConnection,
}

impl RedisCoordination {
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, CoordinationError> {
        let client = Client::open(url)
            .map_err(|e| CoordinationError::Unreachable(format!("invalid Redis URL: {e}")))?;

        let connect = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, RedisError>(conn)
        };

        let conn = tokio::time::timeout(connect_timeout, connect)
            .await
            .map_err(|_| {
                CoordinationError::Unreachable(format!(
                    "connect timed out after {}ms",
                    connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| CoordinationError::Unreachable(e.to_string()))?;

        Ok(Self { conn })
    }
}

fn command_error(e: RedisError) -> CoordinationError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        CoordinationError::Unreachable(e.to_string())
    } else {
        CoordinationError::Command(e.to_string())
    }
}

// GET and DEL must run as one step, or a key that expired and was re-acquired
// in between would be deleted.
const DELETE_IF_EQUALS: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CoordinationClient for RedisCoordination {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(command_error)?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(command_error)?;
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, CoordinationError> {
        let mut conn = self.conn.clone();
        let removed: i64 = Script::new(DELETE_IF_EQUALS)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(removed == 1)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CoordinationError> {
        let mut conn = self.conn.clone();
        // SET NX EX only succeeds for the first hit of a window, so the expiry
        // is attached exactly once and INCR never resets it.
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .ignore()
            .incr(key, 1)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(count)
    }
}
