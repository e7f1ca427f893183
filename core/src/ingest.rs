//! Activity Ingest: records a worker's per-minute signal, rate-limits it,
//! and keeps liveness up to date.

use chrono::{DateTime, Duration, TimeZone, Utc};
use poolcore_domain::{
    ActivityRecord, Clock, ConfigPort, EphemeralPort, LedgerPort, Money, PoolError, PoolResult,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Signals beyond this count within one minute fail with `RateLimited`.
pub const MAX_SIGNALS_PER_MINUTE: u32 = 15;

fn minute_bucket(now: DateTime<Utc>) -> i64 {
    now.timestamp() / 60
}

fn minute_start(bucket: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(bucket * 60, 0).single().expect("valid minute boundary")
}

/// `record_signal` and its collaborators. Generic over the injected
/// ports: each component depends on interfaces injected at construction
/// time, not concrete backends.
pub struct ActivityIngest<L, E, CP> {
    ledger: Arc<L>,
    ephemeral: Arc<E>,
    config: Arc<CP>,
    clock: Arc<dyn Clock>,
}

impl<L, E, CP> ActivityIngest<L, E, CP>
where
    L: LedgerPort,
    E: EphemeralPort,
    CP: ConfigPort,
{
    pub fn new(ledger: Arc<L>, ephemeral: Arc<E>, config: Arc<CP>, clock: Arc<dyn Clock>) -> Self {
        ActivityIngest { ledger, ephemeral, config, clock }
    }

    /// Validates the user exists, rate-limits at 15/minute, marks the
    /// worker online, and writes at most one activity row per (user,
    /// minute). Never blocks on anything beyond the ledger and ephemeral
    /// store.
    #[instrument(skip(self, _source_address), fields(correlation_id = %Uuid::new_v4()))]
    pub async fn record_signal(&self, user_id: i64, _source_address: Option<&str>) -> PoolResult<()> {
        let user = self
            .ledger
            .get_user(user_id)
            .await?
            .ok_or(PoolError::UserNotFound)?;

        let now = self.clock.now();
        let bucket = minute_bucket(now);

        let count = self.ephemeral.incr_rate_counter(user_id, bucket).await?;
        if count > MAX_SIGNALS_PER_MINUTE {
            return Err(PoolError::RateLimited);
        }

        self.ledger.touch_liveness(user_id, now).await?;
        self.ephemeral.mirror_last_signal(user_id, now).await?;

        let claimed = self.ephemeral.claim_minute_marker(user_id, bucket).await?;
        if !claimed {
            return Ok(());
        }

        let config = self.config.get().await?;
        let minute = minute_start(bucket);
        let record = ActivityRecord {
            user_id,
            minute_start: minute,
            rate_snapshot: user.reported_rate,
            reward_credited: Money::ZERO,
            expires_at: minute + Duration::days(config.retention_days as i64),
        };

        match self.ledger.insert_activity_record(&record).await {
            Err(PoolError::PartitionMissing) => {
                self.ledger.ensure_activity_partition(minute).await?;
                self.ledger.insert_activity_record(&record).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use poolcore_config::CachedConfigPlane;
    use poolcore_domain::TestClock;
    use poolcore_test_support::{InMemoryEphemeral, InMemoryLedger};

    fn harness() -> (
        Arc<InMemoryLedger>,
        Arc<InMemoryEphemeral>,
        Arc<CachedConfigPlane<InMemoryLedger, TestClock>>,
        Arc<TestClock>,
    ) {
        let clock = Arc::new(TestClock::at(Utc::now()));
        let ledger = Arc::new(InMemoryLedger::new());
        let ephemeral = Arc::new(InMemoryEphemeral::new(clock.clone() as Arc<dyn Clock>));
        let config = Arc::new(CachedConfigPlane::new(ledger.clone(), clock.clone()));
        (ledger, ephemeral, config, clock)
    }

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let (ledger, ephemeral, config, clock) = harness();
        let ingest = ActivityIngest::new(ledger, ephemeral, config, clock.clone() as Arc<dyn Clock>);
        let err = ingest.record_signal(42, None).await.unwrap_err();
        assert_eq!(err, PoolError::UserNotFound);
    }

    #[tokio::test]
    async fn sixteenth_signal_in_a_minute_is_rate_limited() {
        let (ledger, ephemeral, config, clock) = harness();
        let user_id = ledger.seed_user("0x1111111111111111111111111111111111111111", 0);
        let ingest = ActivityIngest::new(ledger, ephemeral, config, clock.clone() as Arc<dyn Clock>);

        for _ in 0..MAX_SIGNALS_PER_MINUTE {
            ingest.record_signal(user_id, None).await.unwrap();
        }
        let err = ingest.record_signal(user_id, None).await.unwrap_err();
        assert_eq!(err, PoolError::RateLimited);
    }

    #[tokio::test]
    async fn only_one_activity_row_per_minute() {
        let (ledger, ephemeral, config, clock) = harness();
        let user_id = ledger.seed_user("0x2222222222222222222222222222222222222222", 0);
        ledger.set_reported_rate(user_id, 100);
        let ingest =
            ActivityIngest::new(ledger.clone(), ephemeral, config, clock.clone() as Arc<dyn Clock>);

        for _ in 0..5 {
            ingest.record_signal(user_id, None).await.unwrap();
        }

        let now = clock.now();
        let window_start = now - Duration::minutes(1);
        let window_end = now + Duration::minutes(1);
        let rows = ledger.eligible_activity_rows(window_start, window_end).await.unwrap();
        assert_eq!(rows.iter().filter(|r| r.user_id == user_id).count(), 1);
    }

    #[tokio::test]
    async fn a_new_minute_allows_a_new_row_and_resets_the_rate_limit() {
        let (ledger, ephemeral, config, clock) = harness();
        let user_id = ledger.seed_user("0x3333333333333333333333333333333333333333", 0);
        let ingest =
            ActivityIngest::new(ledger.clone(), ephemeral, config, clock.clone() as Arc<dyn Clock>);

        ingest.record_signal(user_id, None).await.unwrap();
        clock.advance(Duration::seconds(61));
        ingest.record_signal(user_id, None).await.unwrap();

        let now = clock.now();
        let rows = ledger
            .eligible_activity_rows(now - Duration::minutes(5), now + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
