//! Interface seams between components: each component depends on traits
//! rather than concrete backends, injected at construction time.

use crate::config_keys::{ConfigKey, ConfigSnapshot};
use crate::error::PoolResult;
use crate::model::{ActivityRecord, SweepStats, User, Withdrawal};
use crate::money::Money;
use crate::wallet::WalletAddress;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Outcome of the atomic withdrawal-request transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawalRequestOutcome {
    /// A brand-new withdrawal row was created and debited.
    Created(Withdrawal),
    /// An idempotency key matched an existing row; no new debit occurred.
    Existing(Withdrawal),
}

/// Durable transactional store of users, balances, activity and
/// withdrawals (Ledger Store). Every mutating method here corresponds to
/// one atomic unit of work; implementations are responsible for the
/// transaction/locking discipline described alongside each operation.
#[async_trait]
pub trait LedgerPort: Send + Sync {
    async fn create_user(
        &self,
        wallet_address: &WalletAddress,
        device_type: Option<&str>,
    ) -> PoolResult<User>;

    async fn get_user(&self, user_id: i64) -> PoolResult<Option<User>>;

    async fn get_user_by_wallet(&self, wallet_address: &WalletAddress) -> PoolResult<Option<User>>;

    /// Sets `last_signal_at = now`, `status = online`.
    async fn touch_liveness(&self, user_id: i64, now: DateTime<Utc>) -> PoolResult<()>;

    /// Ensures the monthly partition for `minute_start` exists. Idempotent.
    async fn ensure_activity_partition(&self, minute_start: DateTime<Utc>) -> PoolResult<()>;

    /// Inserts one activity record. Returns `Err(PartitionMissing)` if the
    /// target partition does not exist yet; the caller ensures the
    /// partition and retries once.
    async fn insert_activity_record(&self, record: &ActivityRecord) -> PoolResult<()>;

    /// Every activity row with `reward_credited = 0` whose `minute_start`
    /// falls in `[window_start, window_end)`.
    async fn eligible_activity_rows(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> PoolResult<Vec<ActivityRecord>>;

    /// Atomically credits `total_reward` to the user's `available_balance`
    /// and `lifetime_earned`, and marks every activity row of `user_id` in
    /// `[window_start, window_end)` still at `reward_credited = 0` with
    /// `total_reward / minutes_credited`. The `WHERE reward_credited = 0`
    /// clause lives in the implementation and is the idempotency guard;
    /// re-invoking over the same window is a no-op.
    async fn credit_user_reward(
        &self,
        user_id: i64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        total_reward: Money,
        minutes_credited: u32,
    ) -> PoolResult<()>;

    /// Marks offline every user whose `last_signal_at` predates `threshold`.
    /// A single statement; no per-user round trips.
    async fn sweep_offline(&self, threshold: DateTime<Utc>) -> PoolResult<SweepStats>;

    /// The full request-withdrawal transaction: row-locks the user,
    /// enforces the daily cap if `daily_cap` is set,
    /// conditionally debits, and either returns the existing row for
    /// `idempotency_key` or inserts a new `pending` row.
    async fn request_withdrawal(
        &self,
        user_id: i64,
        amount: Money,
        destination_wallet: &WalletAddress,
        idempotency_key: Option<&str>,
        daily_cap: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> PoolResult<WithdrawalRequestOutcome>;

    async fn get_withdrawal(&self, id: i64) -> PoolResult<Option<Withdrawal>>;

    /// Selects and locks the next settlement job: a `pending` row ordered
    /// by `requested_at`, or failing that a `processing` row older than
    /// `stale_lease_threshold`; transitions it to `processing` and commits.
    async fn claim_settlement_job(
        &self,
        stale_lease_threshold: DateTime<Utc>,
    ) -> PoolResult<Option<Withdrawal>>;

    async fn complete_withdrawal(
        &self,
        id: i64,
        tx_id: &str,
        completed_at: DateTime<Utc>,
    ) -> PoolResult<()>;

    /// Sets `status = failed` and credits `amount` back, guarded by
    /// `WHERE status = 'processing'` so a racing completion is never
    /// double-compensated.
    async fn fail_withdrawal(&self, id: i64, error_text: &str) -> PoolResult<()>;

    /// Admin retry of a `failed` withdrawal.
    async fn retry_withdrawal(&self, id: i64, now: DateTime<Utc>) -> PoolResult<()>;

    /// Admin force-fail of any non-`failed` withdrawal, or an error-text
    /// update on an already-`failed` one.
    async fn force_fail_withdrawal(
        &self,
        id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> PoolResult<()>;

    async fn get_config_entries(&self) -> PoolResult<Vec<(ConfigKey, Option<Decimal>)>>;

    async fn upsert_config_entry(
        &self,
        key: ConfigKey,
        value: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> PoolResult<()>;

    /// Deletes activity rows past their retention horizon and completed
    /// withdrawals older than 90 days.
    async fn run_retention_sweep(
        &self,
        now: DateTime<Utc>,
    ) -> PoolResult<crate::model::RetentionStats>;
}

/// Fast coordination surface for rate limiting, minute dedup and caches
/// (Ephemeral Store). Its loss only degrades the system: rate limits
/// reset, caches refill.
#[async_trait]
pub trait EphemeralPort: Send + Sync {
    /// Atomically increments the per-worker-per-minute counter, creating
    /// it with a 60s TTL if absent, and returns the new count.
    async fn incr_rate_counter(&self, user_id: i64, bucket_start: i64) -> PoolResult<u32>;

    /// Attempts to claim the "already recorded this minute" marker with a
    /// 120s TTL; returns `true` only if this call created it.
    async fn claim_minute_marker(&self, user_id: i64, bucket_start: i64) -> PoolResult<bool>;

    /// Single-use nonce marker with a 30s TTL; returns `true` only if this
    /// call claimed the nonce.
    async fn claim_nonce(&self, nonce: &str) -> PoolResult<bool>;

    async fn cache_rate(&self, user_id: i64, rate: i64) -> PoolResult<()>;

    async fn cached_rate(&self, user_id: i64) -> PoolResult<Option<i64>>;

    /// Non-authoritative mirror of `last_signal_at`, TTL 300s. The ledger
    /// remains the system of record; this mirror is written alongside
    /// `touch_liveness` so a future read-heavy path (e.g. a liveness probe)
    /// can answer from here instead of a round trip to the ledger.
    async fn mirror_last_signal(&self, user_id: i64, now: DateTime<Utc>) -> PoolResult<()>;

    async fn cached_last_signal(&self, user_id: i64) -> PoolResult<Option<DateTime<Utc>>>;
}

/// Outbound interface to the settlement chain (Chain Gateway).
#[async_trait]
pub trait ChainPort: Send + Sync {
    /// Submits a native-asset transfer, trying each configured endpoint in
    /// order and returning the identifier once the first one acknowledges
    /// the submission. Propagates the last endpoint's failure verbatim if
    /// every endpoint is exhausted.
    async fn submit(&self, to_address: &WalletAddress, amount: Money) -> PoolResult<String>;
}

/// Cache over the dynamic tunables (Config Plane).
#[async_trait]
pub trait ConfigPort: Send + Sync {
    /// Returns a frozen snapshot, refreshed from the ledger on a 30s TTL.
    async fn get(&self) -> PoolResult<ConfigSnapshot>;

    /// Clears the cache; the next `get()` re-reads the ledger.
    fn invalidate(&self);
}

/// Recovers the signing address from a wallet-signature request.
/// Challenge issuance and key custody live outside the core; this port is
/// the narrow seam the core calls into to verify one already-issued
/// signature.
#[async_trait]
pub trait SignatureVerifierPort: Send + Sync {
    async fn recover_address(&self, message: &str, signature: &str) -> PoolResult<WalletAddress>;
}
