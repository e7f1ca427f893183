//! Periodic task loops, each running independently with no global lock.
//! Each loop follows a sleep-then-tick-then-log pattern: on error it logs
//! a warning and keeps going rather than tearing down the process.

use poolcore_core::{LivenessSweeper, RewardEngine, WithdrawalPipeline};
use poolcore_domain::{ChainPort, ConfigPort, LedgerPort};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The reward cycle schedules itself by setting the next tick to
/// `reward_interval_minutes` after the previous completion; on error it
/// retries after `error_retry_seconds`.
pub async fn run_reward_cycle_loop<L, CP>(
    engine: Arc<RewardEngine<L, CP>>,
    config: Arc<CP>,
    error_retry_seconds: u64,
) where
    L: LedgerPort,
    CP: ConfigPort,
{
    loop {
        let interval_minutes = match config.get().await {
            Ok(snapshot) => snapshot.reward_interval_minutes,
            Err(err) => {
                warn!(error = %err, "failed to read reward_interval_minutes, retrying shortly");
                tokio::time::sleep(Duration::from_secs(error_retry_seconds)).await;
                continue;
            }
        };

        match engine.run_cycle(interval_minutes).await {
            Ok(stats) => {
                info!(?stats, "reward cycle completed");
                tokio::time::sleep(Duration::from_secs(interval_minutes as u64 * 60)).await;
            }
            Err(err) => {
                warn!(error = %err, "reward cycle failed, retrying shortly");
                tokio::time::sleep(Duration::from_secs(error_retry_seconds)).await;
            }
        }
    }
}

/// One statement per tick; the interval itself is an operational choice —
/// `offline_threshold_seconds` is re-read from the Config Plane inside
/// `run_sweep` on every tick.
pub async fn run_liveness_sweep_loop<L, CP>(sweeper: Arc<LivenessSweeper<L, CP>>, interval_seconds: u64)
where
    L: LedgerPort,
    CP: ConfigPort,
{
    loop {
        tokio::time::sleep(Duration::from_secs(interval_seconds)).await;
        match sweeper.run_sweep().await {
            Ok(stats) if stats.users_marked_offline > 0 => {
                info!(?stats, "liveness sweep completed");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "liveness sweep failed"),
        }
    }
}

/// Ticks on an interval (~2 seconds), claiming and settling at most one
/// job per tick as a backpressure measure.
pub async fn run_withdrawal_settlement_loop<L, CP, CG>(
    pipeline: Arc<WithdrawalPipeline<L, CP, CG>>,
    tick_seconds: u64,
) where
    L: LedgerPort,
    CP: ConfigPort,
    CG: ChainPort,
{
    loop {
        tokio::time::sleep(Duration::from_secs(tick_seconds)).await;
        match pipeline.tick().await {
            Ok(Some(outcome)) => info!(?outcome, "withdrawal settlement tick"),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "withdrawal settlement tick failed"),
        }
    }
}

/// Deletes activity rows older than `retention_days` and completed
/// withdrawals older than 90 days. Each activity row's own `expires_at`
/// (set from `retention_days` at insert time) is what the ledger
/// actually compares against, so this loop only needs the current time.
pub async fn run_retention_sweep_loop<L>(ledger: Arc<L>, clock: Arc<dyn poolcore_domain::Clock>, interval_hours: u64)
where
    L: LedgerPort,
{
    loop {
        tokio::time::sleep(Duration::from_secs(interval_hours * 3600)).await;
        match ledger.run_retention_sweep(clock.now()).await {
            Ok(stats) => info!(?stats, "retention sweep completed"),
            Err(err) => warn!(error = %err, "retention sweep failed"),
        }
    }
}
