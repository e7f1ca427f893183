//! Withdrawal Pipeline: the request path and background settlement
//! scheduler. Admin operations (retry, force-fail) live in
//! [`crate::admin`].

use chrono::Duration;
use poolcore_domain::{
    ChainPort, Clock, ConfigPort, LedgerPort, Money, PoolError, PoolResult, WalletAddress,
    Withdrawal, WithdrawalRequestOutcome,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Stale-lease threshold for settlement jobs stuck in `processing`.
pub const STALE_LEASE_MINUTES: i64 = 5;

pub struct WithdrawalPipeline<L, CP, CG> {
    ledger: Arc<L>,
    config: Arc<CP>,
    chain: Arc<CG>,
    clock: Arc<dyn Clock>,
}

impl<L, CP, CG> WithdrawalPipeline<L, CP, CG>
where
    L: LedgerPort,
    CP: ConfigPort,
    CG: ChainPort,
{
    pub fn new(ledger: Arc<L>, config: Arc<CP>, chain: Arc<CG>, clock: Arc<dyn Clock>) -> Self {
        WithdrawalPipeline { ledger, config, chain, clock }
    }

    /// Validates the minimum, then delegates the atomic debit-and-enqueue
    /// (or idempotent return) to the ledger.
    #[instrument(skip(self, destination_wallet, idempotency_key), fields(correlation_id = %Uuid::new_v4()))]
    pub async fn request_withdrawal(
        &self,
        user_id: i64,
        amount: Money,
        destination_wallet: &WalletAddress,
        idempotency_key: Option<&str>,
    ) -> PoolResult<WithdrawalRequestOutcome> {
        let config = self.config.get().await?;
        if amount < config.min_withdrawal.into() {
            return Err(PoolError::BelowMinimum);
        }
        self.ledger
            .request_withdrawal(
                user_id,
                amount,
                destination_wallet,
                idempotency_key,
                config.daily_withdrawal_cap,
                self.clock.now(),
            )
            .await
    }

    /// One tick of the background settlement scheduler: claims at most
    /// one job, then calls the Chain Gateway outside the claiming
    /// transaction. Returns `Ok(None)` when there is no job to settle —
    /// callers tick this on an interval, pulling at most one job per
    /// tick.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> PoolResult<Option<SettlementOutcome>> {
        let stale_lease_threshold = self.clock.now() - Duration::minutes(STALE_LEASE_MINUTES);
        let job = match self.ledger.claim_settlement_job(stale_lease_threshold).await? {
            Some(job) => job,
            None => return Ok(None),
        };

        let outcome = self.settle(&job).await?;
        Ok(Some(outcome))
    }

    async fn settle(&self, job: &Withdrawal) -> PoolResult<SettlementOutcome> {
        match self.chain.submit(&job.destination_wallet, job.amount).await {
            Ok(tx_id) => {
                let completed_at = self.clock.now();
                self.ledger.complete_withdrawal(job.id, &tx_id, completed_at).await?;
                info!(withdrawal_id = job.id, tx_id, "withdrawal settled");
                Ok(SettlementOutcome::Completed { withdrawal_id: job.id, tx_id })
            }
            Err(err) => {
                warn!(withdrawal_id = job.id, error = %err, "withdrawal settlement failed, compensating");
                self.ledger.fail_withdrawal(job.id, &err.to_string()).await?;
                Ok(SettlementOutcome::Failed { withdrawal_id: job.id, error: err.to_string() })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Completed { withdrawal_id: i64, tx_id: String },
    Failed { withdrawal_id: i64, error: String },
}
