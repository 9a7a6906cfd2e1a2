//! Redis-backed [`ListStore`] over a shared multiplexed connection.

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};
use tracing::debug;

use super::{ListStore, ReplaceError, ReplaceStep};
use crate::error::StoreError;

/// Cloning is cheap and shares the underlying connection.
#[derive(Clone)]
pub struct RedisListStore {
    conn: MultiplexedConnection,
}

impl RedisListStore {
    pub fn new(conn: MultiplexedConnection) -> Self { Self { conn } }

    /// Open a multiplexed connection from a client the caller keeps owning.
    pub async fn connect(client: &redis::Client) -> Result<Self, StoreError> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    /// Handle to the shared connection, e.g. for running other commands next to the adapter.
    pub fn connection(&self) -> MultiplexedConnection { self.conn.clone() }
}

// The whole MULTI/EXEC batch failed before the server could answer: blame the first step.
fn failed_in_transport(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

impl ListStore for RedisListStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn range_all(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        // bytes, so one element that is not UTF-8 cannot fail the whole read
        let items: Vec<Vec<u8>> = conn.lrange(key, 0, -1).await?;
        Ok(items)
    }

    async fn push(&self, key: &str, values: &[String]) -> Result<(), StoreError> {
        if values.is_empty() { return Ok(()); }
        let mut conn = self.conn.clone();
        let len: i64 = conn.rpush(key, values).await?;
        debug!(target: "redis_policy_adapter::storage", "RPUSH {} +{} -> len={}", key, values.len(), len);
        Ok(())
    }

    async fn remove_first(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.lrem(key, 1, value).await?;
        Ok(removed > 0)
    }

    async fn remove_each_first(&self, key: &str, values: &[String]) -> Result<usize, StoreError> {
        if values.is_empty() { return Ok(0); }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for v in values { pipe.lrem(key, 1, v); }
        let counts: Vec<i64> = pipe.query_async(&mut conn).await?;
        Ok(counts.into_iter().filter(|c| *c > 0).count())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _deleted: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn replace(&self, key: &str, values: &[String]) -> Result<(), ReplaceError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().del(key);
        if !values.is_empty() { pipe.rpush(key, values); }
        let res: redis::RedisResult<Vec<i64>> = pipe.query_async(&mut conn).await;
        match res {
            Ok(_) => Ok(()),
            Err(e) if failed_in_transport(&e) => Err(ReplaceError::new(ReplaceStep::Delete, e)),
            Err(e) => Err(ReplaceError::new(ReplaceStep::Append, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use redis::{FromRedisValue, Value};

    #[test]
    fn lrange_reply_keeps_non_utf8_elements() {
        let reply = Value::Array(vec![
            Value::BulkString(b"p, alice, data1, read".to_vec()),
            Value::BulkString(vec![b'p', b',', b' ', 0xff, 0xfe]),
        ]);
        let items = Vec::<Vec<u8>>::from_redis_value(&reply).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], b"p, alice, data1, read");
        assert_eq!(items[1], [b'p', b',', b' ', 0xff, 0xfe]);
    }
}
