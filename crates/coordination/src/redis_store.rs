//! Redis-backed lock store and job queue.
//!
//! The lock store is a thin wrapper over `SET NX PX`; release goes through
//! a holder-checked Lua script so one actor can never delete another's
//! lock. The queue is a sorted set scored by priority with `ZPOPMIN` as
//! the single-delivery claim.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use sniper_core::{LockStore, SnipeError};

use crate::queue::{BuyJob, JobQueue};

const RELEASE_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end";

fn lock_err(err: redis::RedisError) -> SnipeError {
    SnipeError::LockStore(err.to_string())
}

fn queue_err(err: redis::RedisError) -> SnipeError {
    SnipeError::Queue(err.to_string())
}

pub struct RedisLockStore {
    conn: ConnectionManager,
    release_script: redis::Script,
}

impl RedisLockStore {
    /// Connects and returns a store sharing one multiplexed connection.
    ///
    /// # Errors
    /// Returns an error if the Redis URL is invalid or the initial
    /// connection fails.
    pub async fn connect(url: &str) -> Result<Self, SnipeError> {
        let client = redis::Client::open(url).map_err(lock_err)?;
        let conn = ConnectionManager::new(client).await.map_err(lock_err)?;
        Ok(Self::new(conn))
    }

    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            release_script: redis::Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, SnipeError> {
        let mut conn = self.conn.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(lock_err)?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, holder: &str) -> Result<(), SnipeError> {
        let mut conn = self.conn.clone();
        let _deleted: i64 = self
            .release_script
            .key(key)
            .arg(holder)
            .invoke_async(&mut conn)
            .await
            .map_err(lock_err)?;
        Ok(())
    }

    async fn holder(&self, key: &str) -> Result<Option<String>, SnipeError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(lock_err)
    }
}

#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
    key: String,
}

impl RedisJobQueue {
    /// # Errors
    /// Returns an error if the Redis URL is invalid or the initial
    /// connection fails.
    pub async fn connect(url: &str, key: &str) -> Result<Self, SnipeError> {
        let client = redis::Client::open(url).map_err(queue_err)?;
        let conn = ConnectionManager::new(client).await.map_err(queue_err)?;
        Ok(Self::new(conn, key))
    }

    #[must_use]
    pub fn new(conn: ConnectionManager, key: &str) -> Self {
        Self {
            conn,
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &BuyJob) -> Result<bool, SnipeError> {
        let payload =
            serde_json::to_string(job).map_err(|err| SnipeError::Queue(err.to_string()))?;
        let mut conn = self.conn.clone();
        // NX: a redelivered identical job (same id, same payload) is a
        // no-op instead of a second queue entry.
        let added: i64 = redis::cmd("ZADD")
            .arg(&self.key)
            .arg("NX")
            .arg(job.priority)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;
        Ok(added == 1)
    }

    async fn claim(&self) -> Result<Option<BuyJob>, SnipeError> {
        let mut conn = self.conn.clone();
        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMIN")
            .arg(&self.key)
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;
        let Some((payload, _score)) = popped.into_iter().next() else {
            return Ok(None);
        };
        let job = serde_json::from_str(&payload)
            .map_err(|err| SnipeError::Queue(format!("malformed job payload: {err}")))?;
        Ok(Some(job))
    }

    async fn depth(&self) -> Result<usize, SnipeError> {
        let mut conn = self.conn.clone();
        let depth: usize = redis::cmd("ZCARD")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;
        Ok(depth)
    }
}
