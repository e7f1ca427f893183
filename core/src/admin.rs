//! Admin Ops: the operator surface for retrying/force-failing a
//! withdrawal and writing a config entry. Every write here is expected to
//! sit behind the wallet-signature check in
//! [`crate::signature::RequestVerifier`] at the boundary, not here — this
//! module only does the underlying state transition.

use poolcore_domain::{truncate_error_text, ConfigKey, ConfigPort, LedgerPort, PoolResult};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct AdminOps<L, CP> {
    ledger: Arc<L>,
    config_port: Arc<CP>,
    clock: Arc<dyn poolcore_domain::Clock>,
}

impl<L, CP> AdminOps<L, CP>
where
    L: LedgerPort,
    CP: ConfigPort,
{
    pub fn new(ledger: Arc<L>, config_port: Arc<CP>, clock: Arc<dyn poolcore_domain::Clock>) -> Self {
        AdminOps { ledger, config_port, clock }
    }

    /// Re-enqueues a `failed` withdrawal as `pending`, re-debiting the
    /// user's balance.
    #[instrument(skip(self))]
    pub async fn retry(&self, withdrawal_id: i64) -> PoolResult<()> {
        self.ledger.retry_withdrawal(withdrawal_id, self.clock.now()).await?;
        info!(withdrawal_id, "withdrawal retried by operator");
        Ok(())
    }

    /// Forces any non-`failed` withdrawal to `failed`, crediting back the
    /// debited amount, or just updates the recorded reason on one already
    /// `failed`.
    #[instrument(skip(self, reason))]
    pub async fn force_fail(&self, withdrawal_id: i64, reason: &str) -> PoolResult<()> {
        let reason = truncate_error_text(reason);
        self.ledger.force_fail_withdrawal(withdrawal_id, &reason, self.clock.now()).await?;
        info!(withdrawal_id, "withdrawal force-failed by operator");
        Ok(())
    }

    /// Validates and writes one config entry, then invalidates the cache
    /// so the next read observes it immediately.
    #[instrument(skip(self, raw_value))]
    pub async fn set_config(&self, key: ConfigKey, raw_value: Option<&str>) -> PoolResult<()> {
        let value = poolcore_config::validate_update(key, raw_value)?;
        self.ledger.upsert_config_entry(key, value, self.clock.now()).await?;
        self.config_port.invalidate();
        info!(key = key.as_str(), "config entry updated by operator");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use poolcore_config::CachedConfigPlane;
    use poolcore_domain::{Clock, PoolError, TestClock, WithdrawalRequestOutcome, WithdrawalStatus};
    use poolcore_test_support::InMemoryLedger;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn retry_reopens_a_failed_withdrawal() {
        let clock = Arc::new(TestClock::at(Utc::now()));
        let ledger = Arc::new(InMemoryLedger::new());
        let config = Arc::new(CachedConfigPlane::new(ledger.clone(), clock.clone()));
        let user = ledger.seed_user("0x1111111111111111111111111111111111111111", 200);
        let dest = poolcore_domain::WalletAddress::parse("0x2222222222222222222222222222222222222222").unwrap();

        let outcome = ledger
            .request_withdrawal(user, poolcore_domain::Money::from_i64(100), &dest, None, None, clock.now())
            .await
            .unwrap();
        let withdrawal = match outcome {
            WithdrawalRequestOutcome::Created(w) => w,
            _ => panic!("expected created"),
        };

        // fail_withdrawal only acts on a `processing` row; claim it first.
        ledger.claim_settlement_job(clock.now()).await.unwrap();
        ledger.fail_withdrawal(withdrawal.id, "chain unreachable").await.unwrap();

        let admin = AdminOps::new(ledger.clone(), config, clock.clone() as Arc<dyn Clock>);
        admin.retry(withdrawal.id).await.unwrap();
        let reopened = ledger.get_withdrawal(withdrawal.id).await.unwrap().unwrap();
        assert_eq!(reopened.status, WithdrawalStatus::Pending);
        assert_eq!(ledger.get_user(user).await.unwrap().unwrap().available_balance, poolcore_domain::Money::from_i64(100));
    }

    #[tokio::test]
    async fn force_fail_credits_back_a_pending_withdrawal() {
        let clock = Arc::new(TestClock::at(Utc::now()));
        let ledger = Arc::new(InMemoryLedger::new());
        let config = Arc::new(CachedConfigPlane::new(ledger.clone(), clock.clone()));
        let user = ledger.seed_user("0x3333333333333333333333333333333333333333", 200);
        let dest = poolcore_domain::WalletAddress::parse("0x4444444444444444444444444444444444444444").unwrap();
        let outcome = ledger
            .request_withdrawal(user, poolcore_domain::Money::from_i64(100), &dest, None, None, clock.now())
            .await
            .unwrap();
        let withdrawal = match outcome {
            WithdrawalRequestOutcome::Created(w) => w,
            _ => panic!("expected created"),
        };

        let admin = AdminOps::new(ledger.clone(), config, clock.clone() as Arc<dyn Clock>);
        admin.force_fail(withdrawal.id, "operator cancelled").await.unwrap();

        let failed = ledger.get_withdrawal(withdrawal.id).await.unwrap().unwrap();
        assert_eq!(failed.status, WithdrawalStatus::Failed);
        assert_eq!(ledger.get_user(user).await.unwrap().unwrap().available_balance, poolcore_domain::Money::from_i64(200));
    }

    #[tokio::test]
    async fn set_config_rejects_out_of_range_values() {
        let clock = Arc::new(TestClock::at(Utc::now()));
        let ledger = Arc::new(InMemoryLedger::new());
        let config = Arc::new(CachedConfigPlane::new(ledger.clone(), clock.clone()));
        let admin = AdminOps::new(ledger, config, clock as Arc<dyn Clock>);

        let err = admin.set_config(ConfigKey::RewardIntervalMinutes, Some("9000")).await.unwrap_err();
        assert!(matches!(err, PoolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn set_config_is_visible_on_the_very_next_read() {
        let clock = Arc::new(TestClock::at(Utc::now()));
        let ledger = Arc::new(InMemoryLedger::new());
        let config = Arc::new(CachedConfigPlane::new(ledger.clone(), clock.clone()));
        config.get().await.unwrap();

        let admin = AdminOps::new(ledger, config.clone(), clock.clone() as Arc<dyn Clock>);
        admin.set_config(ConfigKey::MinWithdrawal, Some("250")).await.unwrap();

        let snapshot = config.get().await.unwrap();
        assert_eq!(snapshot.min_withdrawal, Decimal::from(250));
    }
}
