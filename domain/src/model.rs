//! Persisted entities: users, activity records, withdrawals, and the
//! counters each periodic task returns.

use crate::money::Money;
use crate::wallet::WalletAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LivenessStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub wallet_address: WalletAddress,
    pub device_type: Option<String>,
    pub reported_rate: i64,
    pub available_balance: Money,
    pub lifetime_earned: Money,
    pub last_signal_at: Option<DateTime<Utc>>,
    pub status: LivenessStatus,
}

/// Upper bound on `reported_rate`.
pub const MAX_REPORTED_RATE: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub user_id: i64,
    pub minute_start: DateTime<Utc>,
    pub rate_snapshot: i64,
    pub reward_credited: Money,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: i64,
    pub user_id: i64,
    pub amount: Money,
    pub destination_wallet: WalletAddress,
    pub status: WithdrawalStatus,
    pub tx_id: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_text: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Bound applied to admin-supplied failure reasons.
pub const ERROR_TEXT_MAX_LEN: usize = 500;

pub fn truncate_error_text(reason: &str) -> String {
    if reason.len() <= ERROR_TEXT_MAX_LEN {
        reason.to_string()
    } else {
        reason.chars().take(ERROR_TEXT_MAX_LEN).collect()
    }
}

/// Per-cycle counters returned by the reward engine and logged by the
/// caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCycleStats {
    pub minutes_considered: u32,
    pub users_credited: u32,
    pub users_skipped_zero_reward: u32,
    pub users_failed: u32,
    pub total_emitted: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepStats {
    pub users_marked_offline: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionStats {
    pub activity_rows_deleted: u64,
    pub withdrawals_deleted: u64,
}
