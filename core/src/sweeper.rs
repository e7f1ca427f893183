//! Liveness Sweeper: marks offline any user whose last signal predates
//! the configured threshold. One statement per tick, no per-user round
//! trips, no reads leaked between sweeps — each tick acts only on the
//! state as of that tick's clock read.

use chrono::Duration;
use poolcore_domain::{Clock, ConfigPort, LedgerPort, PoolResult, SweepStats};
use std::sync::Arc;
use tracing::instrument;

pub struct LivenessSweeper<L, CP> {
    ledger: Arc<L>,
    config: Arc<CP>,
    clock: Arc<dyn Clock>,
}

impl<L, CP> LivenessSweeper<L, CP>
where
    L: LedgerPort,
    CP: ConfigPort,
{
    pub fn new(ledger: Arc<L>, config: Arc<CP>, clock: Arc<dyn Clock>) -> Self {
        LivenessSweeper { ledger, config, clock }
    }

    #[instrument(skip(self))]
    pub async fn run_sweep(&self) -> PoolResult<SweepStats> {
        let config = self.config.get().await?;
        let threshold = self.clock.now() - Duration::seconds(config.offline_threshold_seconds as i64);
        self.ledger.sweep_offline(threshold).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use poolcore_config::CachedConfigPlane;
    use poolcore_domain::{ConfigKey, LivenessStatus, TestClock};
    use poolcore_test_support::InMemoryLedger;

    #[tokio::test]
    async fn marks_stale_users_offline_without_touching_fresh_ones() {
        let clock = Arc::new(TestClock::at(Utc::now()));
        let ledger = Arc::new(InMemoryLedger::new());
        let config = Arc::new(CachedConfigPlane::new(ledger.clone(), clock.clone()));
        config
            .get()
            .await
            .unwrap();
        ledger
            .upsert_config_entry(ConfigKey::OfflineThresholdSeconds, Some(rust_decimal::Decimal::from(60)), clock.now())
            .await
            .unwrap();
        config.invalidate();

        let stale = ledger.seed_user("0x1111111111111111111111111111111111111111", 0);
        let fresh = ledger.seed_user("0x2222222222222222222222222222222222222222", 0);
        ledger.touch_liveness(stale, clock.now()).await.unwrap();
        clock.advance(Duration::seconds(120));
        ledger.touch_liveness(fresh, clock.now()).await.unwrap();

        let sweeper = LivenessSweeper::new(ledger.clone(), config, clock.clone() as Arc<dyn Clock>);
        let stats = sweeper.run_sweep().await.unwrap();
        assert_eq!(stats.users_marked_offline, 1);

        assert_eq!(ledger.get_user(stale).await.unwrap().unwrap().status, LivenessStatus::Offline);
        assert_eq!(ledger.get_user(fresh).await.unwrap().unwrap().status, LivenessStatus::Online);
    }
}
