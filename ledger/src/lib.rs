//! Postgres-backed Ledger Store. Every mutating [`LedgerPort`] method here
//! owns its own transaction and locking discipline; callers never see a
//! raw connection or transaction handle.

mod activity;
mod config;
mod error;
mod users;
mod withdrawals;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poolcore_domain::{
    ActivityRecord, ConfigKey, PoolResult, RetentionStats, SweepStats, User, WalletAddress,
    Withdrawal, WithdrawalRequestOutcome,
};
use rust_decimal::Decimal;
use poolcore_domain::{LedgerPort, Money};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(PgLedgerStore { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgLedgerStore { pool }
    }

    /// Runs the workspace's bundled migrations. Intended for daemon
    /// startup and integration tests against a scratch database.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerPort for PgLedgerStore {
    async fn create_user(
        &self,
        wallet_address: &WalletAddress,
        device_type: Option<&str>,
    ) -> PoolResult<User> {
        users::create_user(&self.pool, wallet_address, device_type).await
    }

    async fn get_user(&self, user_id: i64) -> PoolResult<Option<User>> {
        users::get_user(&self.pool, user_id).await
    }

    async fn get_user_by_wallet(&self, wallet_address: &WalletAddress) -> PoolResult<Option<User>> {
        users::get_user_by_wallet(&self.pool, wallet_address).await
    }

    async fn touch_liveness(&self, user_id: i64, now: DateTime<Utc>) -> PoolResult<()> {
        users::touch_liveness(&self.pool, user_id, now).await
    }

    async fn ensure_activity_partition(&self, minute_start: DateTime<Utc>) -> PoolResult<()> {
        activity::ensure_activity_partition(&self.pool, minute_start).await
    }

    async fn insert_activity_record(&self, record: &ActivityRecord) -> PoolResult<()> {
        activity::insert_activity_record(&self.pool, record).await
    }

    async fn eligible_activity_rows(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> PoolResult<Vec<ActivityRecord>> {
        activity::eligible_activity_rows(&self.pool, window_start, window_end).await
    }

    async fn credit_user_reward(
        &self,
        user_id: i64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        total_reward: Money,
        minutes_credited: u32,
    ) -> PoolResult<()> {
        activity::credit_user_reward(
            &self.pool,
            user_id,
            window_start,
            window_end,
            total_reward,
            minutes_credited,
        )
        .await
    }

    async fn sweep_offline(&self, threshold: DateTime<Utc>) -> PoolResult<SweepStats> {
        users::sweep_offline(&self.pool, threshold).await
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
        withdrawals::request_withdrawal(
            &self.pool,
            user_id,
            amount,
            destination_wallet,
            idempotency_key,
            daily_cap,
            now,
        )
        .await
    }

    async fn get_withdrawal(&self, id: i64) -> PoolResult<Option<Withdrawal>> {
        withdrawals::get_withdrawal(&self.pool, id).await
    }

    async fn claim_settlement_job(
        &self,
        stale_lease_threshold: DateTime<Utc>,
    ) -> PoolResult<Option<Withdrawal>> {
        withdrawals::claim_settlement_job(&self.pool, stale_lease_threshold).await
    }

    async fn complete_withdrawal(
        &self,
        id: i64,
        tx_id: &str,
        completed_at: DateTime<Utc>,
    ) -> PoolResult<()> {
        withdrawals::complete_withdrawal(&self.pool, id, tx_id, completed_at).await
    }

    async fn fail_withdrawal(&self, id: i64, error_text: &str) -> PoolResult<()> {
        withdrawals::fail_withdrawal(&self.pool, id, error_text).await
    }

    async fn retry_withdrawal(&self, id: i64, now: DateTime<Utc>) -> PoolResult<()> {
        withdrawals::retry_withdrawal(&self.pool, id, now).await
    }

    async fn force_fail_withdrawal(
        &self,
        id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> PoolResult<()> {
        withdrawals::force_fail_withdrawal(&self.pool, id, reason, now).await
    }

    async fn get_config_entries(&self) -> PoolResult<Vec<(ConfigKey, Option<Decimal>)>> {
        config::get_config_entries(&self.pool).await
    }

    async fn upsert_config_entry(
        &self,
        key: ConfigKey,
        value: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> PoolResult<()> {
        config::upsert_config_entry(&self.pool, key, value, now).await
    }

    async fn run_retention_sweep(&self, now: DateTime<Utc>) -> PoolResult<RetentionStats> {
        activity::run_retention_sweep(&self.pool, now).await
    }
}
