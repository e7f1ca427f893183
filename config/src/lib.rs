//! Config Plane: a cache over the small set of numeric tunables in
//! [`ConfigKey`], refreshed from the ledger on a 30-second TTL and
//! invalidated on admin write. Downstream components read a snapshot
//! once at the start of an operation and hold it constant for that
//! operation's duration — this crate only owns the cache, not that
//! discipline, which lives with each caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poolcore_domain::{Clock, ConfigKey, ConfigPort, ConfigSnapshot, LedgerPort, PoolResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;

const TTL_SECS: i64 = 30;

/// Defaults applied when a key has never been written to the `config`
/// table (`block_reward = 2`, `block_time_seconds = 5` ⇒
/// `emission_per_minute = 24`); recorded as an Open Question resolution
/// in DESIGN.md.
fn default_for(key: ConfigKey) -> Option<Decimal> {
    match key {
        ConfigKey::MinWithdrawal => Some(dec(100)),
        ConfigKey::RewardIntervalMinutes => Some(dec(10)),
        ConfigKey::RetentionDays => Some(dec(30)),
        ConfigKey::OfflineThresholdSeconds => Some(dec(120)),
        ConfigKey::DailyWithdrawalCap => None,
        ConfigKey::BlockReward => Some(dec(2)),
        ConfigKey::BlockTimeSeconds => Some(dec(5)),
    }
}

fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}

fn to_u32(value: Decimal, fallback: u32) -> u32 {
    value.trunc().to_u32().unwrap_or(fallback)
}

/// Generic over the injected [`LedgerPort`] and [`Clock`] so both the real
/// `PgLedgerStore` and `poolcore-test-support`'s in-memory fake drive the
/// same cache logic: a scoped cache object owned by its component, with a
/// documented TTL, that test suites can drive with a fake clock.
pub struct CachedConfigPlane<L, C> {
    ledger: Arc<L>,
    clock: Arc<C>,
    cache: Mutex<Option<(DateTime<Utc>, ConfigSnapshot)>>,
}

impl<L, C> CachedConfigPlane<L, C>
where
    L: LedgerPort,
    C: Clock,
{
    pub fn new(ledger: Arc<L>, clock: Arc<C>) -> Self {
        CachedConfigPlane {
            ledger,
            clock,
            cache: Mutex::new(None),
        }
    }

    async fn load(&self) -> PoolResult<ConfigSnapshot> {
        let entries = self.ledger.get_config_entries().await?;
        let mut values: std::collections::HashMap<ConfigKey, Option<Decimal>> = ConfigKey::ALL
            .iter()
            .map(|k| (*k, default_for(*k)))
            .collect();
        for (key, value) in entries {
            values.insert(key, value);
        }

        let min_withdrawal = values[&ConfigKey::MinWithdrawal].unwrap_or_else(|| dec(1));
        let reward_interval_minutes =
            to_u32(values[&ConfigKey::RewardIntervalMinutes].unwrap_or_else(|| dec(10)), 10);
        let retention_days = to_u32(values[&ConfigKey::RetentionDays].unwrap_or_else(|| dec(30)), 30);
        let offline_threshold_seconds = to_u32(
            values[&ConfigKey::OfflineThresholdSeconds].unwrap_or_else(|| dec(120)),
            120,
        );
        let daily_withdrawal_cap = values[&ConfigKey::DailyWithdrawalCap];
        let block_reward = values[&ConfigKey::BlockReward].unwrap_or_else(|| dec(2));
        let block_time_seconds =
            to_u32(values[&ConfigKey::BlockTimeSeconds].unwrap_or_else(|| dec(5)), 5);

        Ok(ConfigSnapshot {
            min_withdrawal,
            reward_interval_minutes,
            retention_days,
            offline_threshold_seconds,
            daily_withdrawal_cap,
            block_reward,
            block_time_seconds,
        })
    }
}

#[async_trait]
impl<L, C> ConfigPort for CachedConfigPlane<L, C>
where
    L: LedgerPort,
    C: Clock,
{
    async fn get(&self) -> PoolResult<ConfigSnapshot> {
        let now = self.clock.now();
        {
            let guard = self.cache.lock().expect("config cache mutex poisoned");
            if let Some((fetched_at, snapshot)) = guard.as_ref() {
                if (now - *fetched_at).num_seconds() < TTL_SECS {
                    return Ok(snapshot.clone());
                }
            }
        }

        let snapshot = self.load().await?;
        debug!(?snapshot, "config plane cache refreshed");
        *self.cache.lock().expect("config cache mutex poisoned") = Some((now, snapshot.clone()));
        Ok(snapshot)
    }

    fn invalidate(&self) {
        *self.cache.lock().expect("config cache mutex poisoned") = None;
    }
}

/// Convenience used by Admin Ops when validating a `set()` call against
/// the closed key/bounds contract before it ever reaches the ledger.
pub fn validate_update(key: ConfigKey, raw_value: Option<&str>) -> poolcore_domain::PoolResult<Option<Decimal>> {
    let value = raw_value
        .map(Decimal::from_str)
        .transpose()
        .map_err(|e| poolcore_domain::PoolError::InvalidInput(e.to_string()))?;
    key.validate(value)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use poolcore_domain::{
        ActivityRecord, Money, PoolError, RetentionStats, SweepStats, TestClock, User,
        WalletAddress, Withdrawal, WithdrawalRequestOutcome,
    };

    /// Minimal ledger fake exercising only the config methods `get()`
    /// needs; the rest panic if ever called, since this test never
    /// touches them.
    struct ConfigOnlyLedger {
        entries: Mutex<Vec<(ConfigKey, Option<Decimal>)>>,
    }

    #[async_trait]
    impl LedgerPort for ConfigOnlyLedger {
        async fn create_user(&self, _: &WalletAddress, _: Option<&str>) -> poolcore_domain::PoolResult<User> {
            unimplemented!()
        }
        async fn get_user(&self, _: i64) -> poolcore_domain::PoolResult<Option<User>> {
            unimplemented!()
        }
        async fn get_user_by_wallet(&self, _: &WalletAddress) -> poolcore_domain::PoolResult<Option<User>> {
            unimplemented!()
        }
        async fn touch_liveness(&self, _: i64, _: DateTime<Utc>) -> poolcore_domain::PoolResult<()> {
            unimplemented!()
        }
        async fn ensure_activity_partition(&self, _: DateTime<Utc>) -> poolcore_domain::PoolResult<()> {
            unimplemented!()
        }
        async fn insert_activity_record(&self, _: &ActivityRecord) -> poolcore_domain::PoolResult<()> {
            unimplemented!()
        }
        async fn eligible_activity_rows(
            &self,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> poolcore_domain::PoolResult<Vec<ActivityRecord>> {
            unimplemented!()
        }
        async fn credit_user_reward(
            &self,
            _: i64,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
            _: Money,
            _: u32,
        ) -> poolcore_domain::PoolResult<()> {
            unimplemented!()
        }
        async fn sweep_offline(&self, _: DateTime<Utc>) -> poolcore_domain::PoolResult<SweepStats> {
            unimplemented!()
        }
        async fn request_withdrawal(
            &self,
            _: i64,
            _: Money,
            _: &WalletAddress,
            _: Option<&str>,
            _: Option<Decimal>,
            _: DateTime<Utc>,
        ) -> poolcore_domain::PoolResult<WithdrawalRequestOutcome> {
            unimplemented!()
        }
        async fn get_withdrawal(&self, _: i64) -> poolcore_domain::PoolResult<Option<Withdrawal>> {
            unimplemented!()
        }
        async fn claim_settlement_job(&self, _: DateTime<Utc>) -> poolcore_domain::PoolResult<Option<Withdrawal>> {
            unimplemented!()
        }
        async fn complete_withdrawal(&self, _: i64, _: &str, _: DateTime<Utc>) -> poolcore_domain::PoolResult<()> {
            unimplemented!()
        }
        async fn fail_withdrawal(&self, _: i64, _: &str) -> poolcore_domain::PoolResult<()> {
            unimplemented!()
        }
        async fn retry_withdrawal(&self, _: i64, _: DateTime<Utc>) -> poolcore_domain::PoolResult<()> {
            unimplemented!()
        }
        async fn force_fail_withdrawal(&self, _: i64, _: &str, _: DateTime<Utc>) -> poolcore_domain::PoolResult<()> {
            unimplemented!()
        }
        async fn get_config_entries(&self) -> poolcore_domain::PoolResult<Vec<(ConfigKey, Option<Decimal>)>> {
            Ok(self.entries.lock().unwrap().clone())
        }
        async fn upsert_config_entry(&self, key: ConfigKey, value: Option<Decimal>, _: DateTime<Utc>) -> poolcore_domain::PoolResult<()> {
            let mut entries = self.entries.lock().unwrap();
            entries.retain(|(k, _)| *k != key);
            entries.push((key, value));
            Ok(())
        }
        async fn run_retention_sweep(&self, _: DateTime<Utc>) -> poolcore_domain::PoolResult<RetentionStats> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn falls_back_to_defaults_when_unset() {
        let ledger = Arc::new(ConfigOnlyLedger { entries: Mutex::new(vec![]) });
        let clock = Arc::new(TestClock::at(Utc::now()));
        let plane = CachedConfigPlane::new(ledger, clock);
        let snapshot = plane.get().await.unwrap();
        assert_eq!(snapshot.block_reward, dec(2));
        assert_eq!(snapshot.block_time_seconds, 5);
        assert_eq!(snapshot.daily_withdrawal_cap, None);
    }

    #[tokio::test]
    async fn caches_until_ttl_elapses_then_refreshes() {
        let ledger = Arc::new(ConfigOnlyLedger {
            entries: Mutex::new(vec![(ConfigKey::MinWithdrawal, Some(dec(100)))]),
        });
        let clock = Arc::new(TestClock::at(Utc::now()));
        let plane = CachedConfigPlane::new(ledger.clone(), clock.clone());

        let first = plane.get().await.unwrap();
        assert_eq!(first.min_withdrawal, dec(100));

        ledger
            .upsert_config_entry(ConfigKey::MinWithdrawal, Some(dec(250)), clock.now())
            .await
            .unwrap();

        // Still within TTL: stale value served from cache.
        let still_cached = plane.get().await.unwrap();
        assert_eq!(still_cached.min_withdrawal, dec(100));

        clock.advance(chrono::Duration::seconds(31));
        let refreshed = plane.get().await.unwrap();
        assert_eq!(refreshed.min_withdrawal, dec(250));
    }

    #[tokio::test]
    async fn invalidate_forces_immediate_refresh() {
        let ledger = Arc::new(ConfigOnlyLedger {
            entries: Mutex::new(vec![(ConfigKey::MinWithdrawal, Some(dec(100)))]),
        });
        let clock = Arc::new(TestClock::at(Utc::now()));
        let plane = CachedConfigPlane::new(ledger.clone(), clock.clone());
        plane.get().await.unwrap();

        ledger
            .upsert_config_entry(ConfigKey::MinWithdrawal, Some(dec(999)), clock.now())
            .await
            .unwrap();
        plane.invalidate();

        let refreshed = plane.get().await.unwrap();
        assert_eq!(refreshed.min_withdrawal, dec(999));
    }

    #[test]
    fn validate_update_rejects_out_of_range() {
        let err = validate_update(ConfigKey::RewardIntervalMinutes, Some("90")).unwrap_err();
        assert!(matches!(err, PoolError::InvalidInput(_)));
    }

    #[test]
    fn validate_update_allows_null_only_for_nullable_key() {
        assert!(validate_update(ConfigKey::DailyWithdrawalCap, None).is_ok());
        assert!(validate_update(ConfigKey::MinWithdrawal, None).is_err());
    }
}
