use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use parking_lot::Mutex;
use poolcore_domain::{
    ActivityRecord, ConfigKey, LedgerPort, LivenessStatus, Money, PoolError, PoolResult,
    RetentionStats, SweepStats, User, WalletAddress, Withdrawal, WithdrawalRequestOutcome,
    WithdrawalStatus,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    next_user_id: i64,
    users: HashMap<i64, User>,
    activities: HashMap<(i64, DateTime<Utc>), ActivityRecord>,
    next_withdrawal_id: i64,
    withdrawals: Vec<Withdrawal>,
    config: HashMap<ConfigKey, Option<Decimal>>,
}

/// In-memory stand-in for `PgLedgerStore`. Every method locks the whole
/// store for its duration, which is what gives each call the atomicity a
/// real transaction would.
#[derive(Default)]
pub struct InMemoryLedger {
    inner: Mutex<Inner>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        InMemoryLedger::default()
    }

    /// Test convenience: registers a user and sets their starting balance
    /// directly, bypassing the reward/withdrawal paths that would
    /// otherwise be the only way to move balances.
    pub fn seed_user(&self, wallet_address: &str, available_balance: i64) -> i64 {
        let mut inner = self.inner.lock();
        inner.next_user_id += 1;
        let id = inner.next_user_id;
        inner.users.insert(
            id,
            User {
                user_id: id,
                wallet_address: WalletAddress::parse(wallet_address).expect("valid test wallet"),
                device_type: None,
                reported_rate: 0,
                available_balance: Money::from_i64(available_balance),
                lifetime_earned: Money::ZERO,
                last_signal_at: None,
                status: LivenessStatus::Offline,
            },
        );
        id
    }

    pub fn set_reported_rate(&self, user_id: i64, rate: i64) {
        let mut inner = self.inner.lock();
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.reported_rate = rate;
        }
    }
}

fn utc_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}

#[async_trait]
impl LedgerPort for InMemoryLedger {
    async fn create_user(
        &self,
        wallet_address: &WalletAddress,
        device_type: Option<&str>,
    ) -> PoolResult<User> {
        let mut inner = self.inner.lock();
        if inner.users.values().any(|u| &u.wallet_address == wallet_address) {
            return Err(PoolError::InvalidInput("wallet already registered".into()));
        }
        inner.next_user_id += 1;
        let id = inner.next_user_id;
        let user = User {
            user_id: id,
            wallet_address: wallet_address.clone(),
            device_type: device_type.map(str::to_string),
            reported_rate: 0,
            available_balance: Money::ZERO,
            lifetime_earned: Money::ZERO,
            last_signal_at: None,
            status: LivenessStatus::Offline,
        };
        inner.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: i64) -> PoolResult<Option<User>> {
        Ok(self.inner.lock().users.get(&user_id).cloned())
    }

    async fn get_user_by_wallet(&self, wallet_address: &WalletAddress) -> PoolResult<Option<User>> {
        Ok(self
            .inner
            .lock()
            .users
            .values()
            .find(|u| &u.wallet_address == wallet_address)
            .cloned())
    }

    async fn touch_liveness(&self, user_id: i64, now: DateTime<Utc>) -> PoolResult<()> {
        let mut inner = self.inner.lock();
        let user = inner.users.get_mut(&user_id).ok_or(PoolError::UserNotFound)?;
        user.last_signal_at = Some(now);
        user.status = LivenessStatus::Online;
        Ok(())
    }

    async fn ensure_activity_partition(&self, _minute_start: DateTime<Utc>) -> PoolResult<()> {
        // Partitioning is a Postgres physical-storage concern; the fake
        // has no notion of missing partitions.
        Ok(())
    }

    async fn insert_activity_record(&self, record: &ActivityRecord) -> PoolResult<()> {
        let mut inner = self.inner.lock();
        inner
            .activities
            .entry((record.user_id, record.minute_start))
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn eligible_activity_rows(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> PoolResult<Vec<ActivityRecord>> {
        let inner = self.inner.lock();
        Ok(inner
            .activities
            .values()
            .filter(|r| {
                r.minute_start >= window_start
                    && r.minute_start < window_end
                    && r.reward_credited.is_zero()
            })
            .cloned()
            .collect())
    }

    async fn credit_user_reward(
        &self,
        user_id: i64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        total_reward: Money,
        minutes_credited: u32,
    ) -> PoolResult<()> {
        if minutes_credited == 0 || total_reward.is_zero() {
            return Ok(());
        }
        let per_row = total_reward.div_floor(minutes_credited as u64);
        let mut inner = self.inner.lock();

        if let Some(user) = inner.users.get_mut(&user_id) {
            user.available_balance += total_reward;
            user.lifetime_earned += total_reward;
        }

        for record in inner.activities.values_mut() {
            if record.user_id == user_id
                && record.minute_start >= window_start
                && record.minute_start < window_end
                && record.reward_credited.is_zero()
            {
                record.reward_credited = per_row;
            }
        }
        Ok(())
    }

    async fn sweep_offline(&self, threshold: DateTime<Utc>) -> PoolResult<SweepStats> {
        let mut inner = self.inner.lock();
        let mut swept = 0u64;
        for user in inner.users.values_mut() {
            if user.status == LivenessStatus::Online
                && user.last_signal_at.map(|t| t < threshold).unwrap_or(true)
            {
                user.status = LivenessStatus::Offline;
                swept += 1;
            }
        }
        Ok(SweepStats { users_marked_offline: swept })
    }

    async fn request_withdrawal(
        &self,
        user_id: i64,
        amount: Money,
        destination_wallet: &WalletAddress,
        idempotency_key: Option<&str>,
        daily_cap: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> PoolResult<WithdrawalRequestOutcome> {
        let mut inner = self.inner.lock();
        if !inner.users.contains_key(&user_id) {
            return Err(PoolError::UserNotFound);
        }

        if let Some(key) = idempotency_key {
            if let Some(existing) = inner
                .withdrawals
                .iter()
                .find(|w| w.user_id == user_id && w.idempotency_key.as_deref() == Some(key))
            {
                return Ok(WithdrawalRequestOutcome::Existing(existing.clone()));
            }
        }

        if let Some(cap) = daily_cap {
            let day_start = utc_day_start(now);
            let already: Decimal = inner
                .withdrawals
                .iter()
                .filter(|w| {
                    w.user_id == user_id
                        && w.requested_at >= day_start
                        && matches!(
                            w.status,
                            WithdrawalStatus::Pending
                                | WithdrawalStatus::Processing
                                | WithdrawalStatus::Completed
                        )
                })
                .map(|w| w.amount.inner())
                .sum();
            if already + amount.inner() > cap {
                return Err(PoolError::DailyLimitExceeded);
            }
        }

        let user = inner.users.get_mut(&user_id).expect("checked above");
        if user.available_balance < amount {
            return Err(PoolError::InsufficientBalance);
        }
        user.available_balance = user.available_balance - amount;

        inner.next_withdrawal_id += 1;
        let id = inner.next_withdrawal_id;
        let withdrawal = Withdrawal {
            id,
            user_id,
            amount,
            destination_wallet: destination_wallet.clone(),
            status: WithdrawalStatus::Pending,
            tx_id: None,
            requested_at: now,
            completed_at: None,
            error_text: None,
            idempotency_key: idempotency_key.map(str::to_string),
        };
        inner.withdrawals.push(withdrawal.clone());
        Ok(WithdrawalRequestOutcome::Created(withdrawal))
    }

    async fn get_withdrawal(&self, id: i64) -> PoolResult<Option<Withdrawal>> {
        Ok(self.inner.lock().withdrawals.iter().find(|w| w.id == id).cloned())
    }

    async fn claim_settlement_job(
        &self,
        stale_lease_threshold: DateTime<Utc>,
    ) -> PoolResult<Option<Withdrawal>> {
        let mut inner = self.inner.lock();

        let pending_idx = inner
            .withdrawals
            .iter()
            .enumerate()
            .filter(|(_, w)| w.status == WithdrawalStatus::Pending)
            .min_by_key(|(_, w)| w.requested_at)
            .map(|(i, _)| i);

        let idx = pending_idx.or_else(|| {
            inner
                .withdrawals
                .iter()
                .enumerate()
                .filter(|(_, w)| {
                    w.status == WithdrawalStatus::Processing && w.requested_at < stale_lease_threshold
                })
                .min_by_key(|(_, w)| w.requested_at)
                .map(|(i, _)| i)
        });

        match idx {
            Some(i) => {
                inner.withdrawals[i].status = WithdrawalStatus::Processing;
                Ok(Some(inner.withdrawals[i].clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete_withdrawal(&self, id: i64, tx_id: &str, completed_at: DateTime<Utc>) -> PoolResult<()> {
        let mut inner = self.inner.lock();
        if let Some(w) = inner.withdrawals.iter_mut().find(|w| w.id == id) {
            w.status = WithdrawalStatus::Completed;
            w.tx_id = Some(tx_id.to_string());
            w.completed_at = Some(completed_at);
        }
        Ok(())
    }

    async fn fail_withdrawal(&self, id: i64, error_text: &str) -> PoolResult<()> {
        let mut inner = self.inner.lock();
        let (user_id, amount) = {
            let w = match inner.withdrawals.iter_mut().find(|w| w.id == id) {
                Some(w) if w.status == WithdrawalStatus::Processing => w,
                _ => return Ok(()),
            };
            w.status = WithdrawalStatus::Failed;
            w.error_text = Some(error_text.to_string());
            (w.user_id, w.amount)
        };
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.available_balance += amount;
        }
        Ok(())
    }

    async fn retry_withdrawal(&self, id: i64, now: DateTime<Utc>) -> PoolResult<()> {
        let mut inner = self.inner.lock();
        let (user_id, amount) = {
            let w = inner
                .withdrawals
                .iter()
                .find(|w| w.id == id)
                .ok_or(PoolError::WithdrawalNotFound)?;
            if w.status != WithdrawalStatus::Failed {
                return Err(PoolError::InvalidWithdrawalState(w.status.as_str().to_string()));
            }
            (w.user_id, w.amount)
        };

        let user = inner.users.get_mut(&user_id).ok_or(PoolError::UserNotFound)?;
        if user.available_balance < amount {
            return Err(PoolError::InsufficientBalance);
        }
        user.available_balance = user.available_balance - amount;

        let w = inner.withdrawals.iter_mut().find(|w| w.id == id).expect("checked above");
        w.status = WithdrawalStatus::Pending;
        w.tx_id = None;
        w.error_text = None;
        w.requested_at = now;
        Ok(())
    }

    async fn force_fail_withdrawal(&self, id: i64, reason: &str, _now: DateTime<Utc>) -> PoolResult<()> {
        let mut inner = self.inner.lock();
        let (already_failed, user_id, amount) = {
            let w = inner
                .withdrawals
                .iter()
                .find(|w| w.id == id)
                .ok_or(PoolError::WithdrawalNotFound)?;
            (w.status == WithdrawalStatus::Failed, w.user_id, w.amount)
        };

        if !already_failed {
            if let Some(user) = inner.users.get_mut(&user_id) {
                user.available_balance += amount;
            }
        }
        let w = inner.withdrawals.iter_mut().find(|w| w.id == id).expect("checked above");
        w.status = WithdrawalStatus::Failed;
        w.error_text = Some(reason.to_string());
        Ok(())
    }

    async fn get_config_entries(&self) -> PoolResult<Vec<(ConfigKey, Option<Decimal>)>> {
        Ok(self.inner.lock().config.iter().map(|(k, v)| (*k, *v)).collect())
    }

    async fn upsert_config_entry(
        &self,
        key: ConfigKey,
        value: Option<Decimal>,
        _now: DateTime<Utc>,
    ) -> PoolResult<()> {
        self.inner.lock().config.insert(key, value);
        Ok(())
    }

    async fn run_retention_sweep(&self, now: DateTime<Utc>) -> PoolResult<RetentionStats> {
        let mut inner = self.inner.lock();
        let before = inner.activities.len();
        inner.activities.retain(|_, r| r.expires_at >= now);
        let activity_rows_deleted = (before - inner.activities.len()) as u64;

        let horizon = now - Duration::days(90);
        let before = inner.withdrawals.len();
        inner.withdrawals.retain(|w| {
            !(w.status == WithdrawalStatus::Completed
                && w.completed_at.map(|c| c < horizon).unwrap_or(false))
        });
        let withdrawals_deleted = (before - inner.withdrawals.len()) as u64;

        Ok(RetentionStats { activity_rows_deleted, withdrawals_deleted })
    }
}
