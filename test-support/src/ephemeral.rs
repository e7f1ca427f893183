use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use poolcore_domain::{Clock, EphemeralPort, PoolResult};
use std::collections::HashMap;
use std::sync::Arc;

const RATE_COUNTER_TTL_SECS: i64 = 60;
const MINUTE_MARKER_TTL_SECS: i64 = 120;
const NONCE_TTL_SECS: i64 = 30;
const RATE_CACHE_TTL_SECS: i64 = 60;
const LAST_SIGNAL_MIRROR_TTL_SECS: i64 = 300;

struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

/// In-memory stand-in for `RedisEphemeralStore`, driven by an injected
/// [`Clock`] so tests control TTL expiry without sleeping.
pub struct InMemoryEphemeral {
    clock: Arc<dyn Clock>,
    counters: Mutex<HashMap<(i64, i64), Expiring<u32>>>,
    markers: Mutex<HashMap<(i64, i64), DateTime<Utc>>>,
    nonces: Mutex<HashMap<String, DateTime<Utc>>>,
    rate_cache: Mutex<HashMap<i64, Expiring<i64>>>,
    last_signal: Mutex<HashMap<i64, Expiring<DateTime<Utc>>>>,
}

impl InMemoryEphemeral {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        InMemoryEphemeral {
            clock,
            counters: Mutex::new(HashMap::new()),
            markers: Mutex::new(HashMap::new()),
            nonces: Mutex::new(HashMap::new()),
            rate_cache: Mutex::new(HashMap::new()),
            last_signal: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl EphemeralPort for InMemoryEphemeral {
    async fn incr_rate_counter(&self, user_id: i64, bucket_start: i64) -> PoolResult<u32> {
        let now = self.clock.now();
        let mut counters = self.counters.lock();
        let entry = counters.entry((user_id, bucket_start)).or_insert(Expiring {
            value: 0,
            expires_at: now,
        });
        if now >= entry.expires_at {
            entry.value = 0;
            entry.expires_at = now + Duration::seconds(RATE_COUNTER_TTL_SECS);
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn claim_minute_marker(&self, user_id: i64, bucket_start: i64) -> PoolResult<bool> {
        let now = self.clock.now();
        let mut markers = self.markers.lock();
        if let Some(expires_at) = markers.get(&(user_id, bucket_start)) {
            if now < *expires_at {
                return Ok(false);
            }
        }
        markers.insert((user_id, bucket_start), now + Duration::seconds(MINUTE_MARKER_TTL_SECS));
        Ok(true)
    }

    async fn claim_nonce(&self, nonce: &str) -> PoolResult<bool> {
        let now = self.clock.now();
        let mut nonces = self.nonces.lock();
        if let Some(expires_at) = nonces.get(nonce) {
            if now < *expires_at {
                return Ok(false);
            }
        }
        nonces.insert(nonce.to_string(), now + Duration::seconds(NONCE_TTL_SECS));
        Ok(true)
    }

    async fn cache_rate(&self, user_id: i64, rate: i64) -> PoolResult<()> {
        let now = self.clock.now();
        self.rate_cache.lock().insert(
            user_id,
            Expiring { value: rate, expires_at: now + Duration::seconds(RATE_CACHE_TTL_SECS) },
        );
        Ok(())
    }

    async fn cached_rate(&self, user_id: i64) -> PoolResult<Option<i64>> {
        let now = self.clock.now();
        let cache = self.rate_cache.lock();
        Ok(cache.get(&user_id).filter(|e| now < e.expires_at).map(|e| e.value))
    }

    async fn mirror_last_signal(&self, user_id: i64, now: DateTime<Utc>) -> PoolResult<()> {
        let clock_now = self.clock.now();
        self.last_signal.lock().insert(
            user_id,
            Expiring { value: now, expires_at: clock_now + Duration::seconds(LAST_SIGNAL_MIRROR_TTL_SECS) },
        );
        Ok(())
    }

    async fn cached_last_signal(&self, user_id: i64) -> PoolResult<Option<DateTime<Utc>>> {
        let now = self.clock.now();
        let mirror = self.last_signal.lock();
        Ok(mirror.get(&user_id).filter(|e| now < e.expires_at).map(|e| e.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolcore_domain::TestClock;

    #[tokio::test]
    async fn rate_counter_resets_after_ttl() {
        let clock = Arc::new(TestClock::at(Utc::now()));
        let es = InMemoryEphemeral::new(clock.clone());
        for _ in 0..15 {
            es.incr_rate_counter(1, 100).await.unwrap();
        }
        assert_eq!(es.incr_rate_counter(1, 100).await.unwrap(), 16);

        clock.advance(Duration::seconds(61));
        assert_eq!(es.incr_rate_counter(1, 100).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn minute_marker_claims_once_per_window() {
        let clock = Arc::new(TestClock::at(Utc::now()));
        let es = InMemoryEphemeral::new(clock.clone());
        assert!(es.claim_minute_marker(1, 100).await.unwrap());
        assert!(!es.claim_minute_marker(1, 100).await.unwrap());

        clock.advance(Duration::seconds(121));
        assert!(es.claim_minute_marker(1, 100).await.unwrap());
    }

    #[tokio::test]
    async fn nonce_is_single_use() {
        let clock = Arc::new(TestClock::at(Utc::now()));
        let es = InMemoryEphemeral::new(clock);
        assert!(es.claim_nonce("abc").await.unwrap());
        assert!(!es.claim_nonce("abc").await.unwrap());
    }

    #[tokio::test]
    async fn last_signal_mirror_expires_after_ttl() {
        let clock = Arc::new(TestClock::at(Utc::now()));
        let es = InMemoryEphemeral::new(clock.clone());
        let signalled_at = clock.now();
        es.mirror_last_signal(1, signalled_at).await.unwrap();
        assert_eq!(es.cached_last_signal(1).await.unwrap(), Some(signalled_at));

        clock.advance(Duration::seconds(301));
        assert_eq!(es.cached_last_signal(1).await.unwrap(), None);
    }
}
