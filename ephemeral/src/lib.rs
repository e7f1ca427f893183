//! Redis-backed Ephemeral Store. Its loss only degrades the system: rate
//! limits reset and caches refill, so every method here maps a connection
//! failure onto [`PoolError::TransientLedgerError`] rather than a distinct
//! "ES down" variant — callers already treat transient ledger failures as
//! retry-on-next-tick.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poolcore_domain::{EphemeralPort, PoolError, PoolResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const RATE_COUNTER_TTL_SECS: i64 = 60;
const MINUTE_MARKER_TTL_SECS: i64 = 120;
const NONCE_TTL_SECS: i64 = 30;
const RATE_CACHE_TTL_SECS: i64 = 60;
const LAST_SIGNAL_MIRROR_TTL_SECS: i64 = 300;

pub struct RedisEphemeralStore {
    conn: ConnectionManager,
}

impl RedisEphemeralStore {
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(RedisEphemeralStore { conn })
    }

    fn rate_key(user_id: i64, bucket_start: i64) -> String {
        format!("poolcore:rate:{user_id}:{bucket_start}")
    }

    fn marker_key(user_id: i64, bucket_start: i64) -> String {
        format!("poolcore:minute:{user_id}:{bucket_start}")
    }

    fn nonce_key(nonce: &str) -> String {
        format!("poolcore:nonce:{nonce}")
    }

    fn rate_cache_key(user_id: i64) -> String {
        format!("poolcore:rate_cache:{user_id}")
    }

    fn last_signal_key(user_id: i64) -> String {
        format!("poolcore:last_signal:{user_id}")
    }
}

fn map_redis_error(err: redis::RedisError) -> PoolError {
    PoolError::TransientLedgerError(err.to_string())
}

#[async_trait]
impl EphemeralPort for RedisEphemeralStore {
    async fn incr_rate_counter(&self, user_id: i64, bucket_start: i64) -> PoolResult<u32> {
        let mut conn = self.conn.clone();
        let key = Self::rate_key(user_id, bucket_start);
        // INCR then seed the TTL only on first creation (value == 1), so a
        // late-arriving SET EXPIRE never extends an already-running window.
        let count: i64 = conn.incr(&key, 1).await.map_err(map_redis_error)?;
        if count == 1 {
            let _: () = conn
                .expire(&key, RATE_COUNTER_TTL_SECS)
                .await
                .map_err(map_redis_error)?;
        }
        Ok(count.max(0) as u32)
    }

    async fn claim_minute_marker(&self, user_id: i64, bucket_start: i64) -> PoolResult<bool> {
        let mut conn = self.conn.clone();
        let key = Self::marker_key(user_id, bucket_start);
        let claimed: bool = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(MINUTE_MARKER_TTL_SECS)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(map_redis_error)?
            .is_some();
        Ok(claimed)
    }

    async fn claim_nonce(&self, nonce: &str) -> PoolResult<bool> {
        let mut conn = self.conn.clone();
        let key = Self::nonce_key(nonce);
        let claimed: bool = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(NONCE_TTL_SECS)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(map_redis_error)?
            .is_some();
        Ok(claimed)
    }

    async fn cache_rate(&self, user_id: i64, rate: i64) -> PoolResult<()> {
        let mut conn = self.conn.clone();
        let key = Self::rate_cache_key(user_id);
        let _: () = conn
            .set_ex(&key, rate, RATE_CACHE_TTL_SECS as u64)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn cached_rate(&self, user_id: i64) -> PoolResult<Option<i64>> {
        let mut conn = self.conn.clone();
        let key = Self::rate_cache_key(user_id);
        conn.get(&key).await.map_err(map_redis_error)
    }

    async fn mirror_last_signal(&self, user_id: i64, now: DateTime<Utc>) -> PoolResult<()> {
        let mut conn = self.conn.clone();
        let key = Self::last_signal_key(user_id);
        let _: () = conn
            .set_ex(&key, now.timestamp_millis(), LAST_SIGNAL_MIRROR_TTL_SECS as u64)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn cached_last_signal(&self, user_id: i64) -> PoolResult<Option<DateTime<Utc>>> {
        let mut conn = self.conn.clone();
        let key = Self::last_signal_key(user_id);
        let millis: Option<i64> = conn.get(&key).await.map_err(map_redis_error)?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }
}
