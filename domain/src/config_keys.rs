//! The closed set of dynamic tunables served by the Config Plane: a
//! closed enum with a declared min/max/nullable contract per key, rather
//! than an open key/value blob. Unknown keys are rejected at the
//! boundary.

use crate::error::PoolError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigKey {
    MinWithdrawal,
    RewardIntervalMinutes,
    RetentionDays,
    OfflineThresholdSeconds,
    DailyWithdrawalCap,
    BlockReward,
    BlockTimeSeconds,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 7] = [
        ConfigKey::MinWithdrawal,
        ConfigKey::RewardIntervalMinutes,
        ConfigKey::RetentionDays,
        ConfigKey::OfflineThresholdSeconds,
        ConfigKey::DailyWithdrawalCap,
        ConfigKey::BlockReward,
        ConfigKey::BlockTimeSeconds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::MinWithdrawal => "min_withdrawal",
            ConfigKey::RewardIntervalMinutes => "reward_interval_minutes",
            ConfigKey::RetentionDays => "retention_days",
            ConfigKey::OfflineThresholdSeconds => "offline_threshold_seconds",
            ConfigKey::DailyWithdrawalCap => "daily_withdrawal_cap",
            ConfigKey::BlockReward => "block_reward",
            ConfigKey::BlockTimeSeconds => "block_time_seconds",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, PoolError> {
        match raw {
            "min_withdrawal" => Ok(ConfigKey::MinWithdrawal),
            "reward_interval_minutes" => Ok(ConfigKey::RewardIntervalMinutes),
            "retention_days" => Ok(ConfigKey::RetentionDays),
            "offline_threshold_seconds" => Ok(ConfigKey::OfflineThresholdSeconds),
            "daily_withdrawal_cap" => Ok(ConfigKey::DailyWithdrawalCap),
            "block_reward" => Ok(ConfigKey::BlockReward),
            "block_time_seconds" => Ok(ConfigKey::BlockTimeSeconds),
            other => Err(PoolError::InvalidInput(format!("unknown config key {other:?}"))),
        }
    }

    /// `(min, max)` bounds, expressed in the key's natural unit (tokens,
    /// minutes, days, seconds).
    pub fn bounds(&self) -> (Decimal, Decimal) {
        match self {
            ConfigKey::MinWithdrawal => (dec(1), dec(1_000_000)),
            ConfigKey::RewardIntervalMinutes => (dec(1), dec(60)),
            ConfigKey::RetentionDays => (dec(1), dec(365)),
            ConfigKey::OfflineThresholdSeconds => (dec(30), dec(600)),
            ConfigKey::DailyWithdrawalCap => (dec(0), dec(5_000_000)),
            ConfigKey::BlockReward => (Decimal::new(1, 18), dec(1_000_000)), // > 0
            ConfigKey::BlockTimeSeconds => (dec(1), dec(60)),
        }
    }

    pub fn nullable(&self) -> bool {
        matches!(self, ConfigKey::DailyWithdrawalCap)
    }

    pub fn validate(&self, value: Option<Decimal>) -> Result<(), PoolError> {
        match value {
            None => {
                if self.nullable() {
                    Ok(())
                } else {
                    Err(PoolError::InvalidInput(format!(
                        "{} may not be null",
                        self.as_str()
                    )))
                }
            }
            Some(v) => {
                let (min, max) = self.bounds();
                if v < min || v > max {
                    Err(PoolError::InvalidInput(format!(
                        "{} = {v} is out of range [{min}, {max}]",
                        self.as_str()
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}

impl FromStr for ConfigKey {
    type Err = PoolError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::parse(s)
    }
}

/// A frozen snapshot of every tunable, as returned by the Config Plane's
/// `get()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub min_withdrawal: Decimal,
    pub reward_interval_minutes: u32,
    pub retention_days: u32,
    pub offline_threshold_seconds: u32,
    pub daily_withdrawal_cap: Option<Decimal>,
    pub block_reward: Decimal,
    pub block_time_seconds: u32,
}

impl ConfigSnapshot {
    /// `emission_per_minute = (60 / max(block_time_seconds, 1)) * block_reward`,
    /// computed with an intermediate rational division so the
    /// `60 / block_time_seconds` term is never truncated first.
    pub fn emission_per_minute(&self) -> crate::money::Money {
        let block_time = self.block_time_seconds.max(1);
        crate::money::Money::new(self.block_reward)
            .proportional(Decimal::from(60), Decimal::from(block_time))
    }
}
