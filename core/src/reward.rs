//! Reward Engine: converts unrewarded activity rows into proportional
//! balance credits on a fixed cadence, using a globally fixed emission
//! rate re-derived from the config snapshot held constant for the whole
//! cycle.

use chrono::{DateTime, Duration, TimeZone, Utc};
use poolcore_domain::{
    ActivityRecord, Clock, ConfigPort, LedgerPort, Money, PoolResult, RunCycleStats,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};

fn align_to_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt((now.timestamp() / 60) * 60, 0).single().expect("valid minute boundary")
}

pub struct RewardEngine<L, CP> {
    ledger: Arc<L>,
    config: Arc<CP>,
    clock: Arc<dyn Clock>,
}

impl<L, CP> RewardEngine<L, CP>
where
    L: LedgerPort,
    CP: ConfigPort,
{
    pub fn new(ledger: Arc<L>, config: Arc<CP>, clock: Arc<dyn Clock>) -> Self {
        RewardEngine { ledger, config, clock }
    }

    /// The window `[now - interval_minutes, now)` is aligned to whole
    /// minutes; only rows with `reward_credited = 0` participate. One
    /// user's transaction failure is logged and rolled back without
    /// aborting the rest of the cycle.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self, interval_minutes: u32) -> PoolResult<RunCycleStats> {
        let config = self.config.get().await?;
        let window_end = align_to_minute(self.clock.now());
        let window_start = window_end - Duration::minutes(interval_minutes as i64);
        let emission_per_minute = config.emission_per_minute();

        let rows = self.ledger.eligible_activity_rows(window_start, window_end).await?;

        let mut minute_pool_rate: HashMap<DateTime<Utc>, i64> = HashMap::new();
        for row in &rows {
            *minute_pool_rate.entry(row.minute_start).or_insert(0) += row.rate_snapshot;
        }

        let mut per_user: HashMap<i64, Vec<&ActivityRecord>> = HashMap::new();
        for row in &rows {
            per_user.entry(row.user_id).or_default().push(row);
        }

        let mut stats = RunCycleStats {
            minutes_considered: minute_pool_rate.len() as u32,
            ..Default::default()
        };

        for (user_id, user_rows) in per_user {
            let mut total_reward = Money::ZERO;
            for row in &user_rows {
                let pool = minute_pool_rate[&row.minute_start];
                if pool > 0 {
                    total_reward += emission_per_minute
                        .proportional(Decimal::from(row.rate_snapshot), Decimal::from(pool));
                }
            }
            let minutes_credited = user_rows.len() as u32;

            if total_reward.is_zero() || minutes_credited == 0 {
                stats.users_skipped_zero_reward += 1;
                continue;
            }

            match self
                .ledger
                .credit_user_reward(user_id, window_start, window_end, total_reward, minutes_credited)
                .await
            {
                Ok(()) => {
                    stats.users_credited += 1;
                    stats.total_emitted += total_reward;
                }
                Err(err) => {
                    warn!(user_id, error = %err, "reward credit failed for user, continuing cycle");
                    stats.users_failed += 1;
                }
            }
        }

        Ok(stats)
    }
}
