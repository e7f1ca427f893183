//! Error kinds shared by every poolcore component.

use thiserror::Error;

/// Stable, user-facing error code. Never carries an internal identifier;
/// a correlation id is attached by the caller when logging.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("user not found")]
    UserNotFound,

    #[error("rate limited")]
    RateLimited,

    #[error("amount below minimum withdrawal")]
    BelowMinimum,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("daily withdrawal limit exceeded")]
    DailyLimitExceeded,

    #[error("stale or reused request")]
    StaleOrReusedRequest,

    #[error("transient ledger error: {0}")]
    TransientLedgerError(String),

    #[error("chain submission failed: {0}")]
    ChainFailure(String),

    #[error("activity partition missing")]
    PartitionMissing,

    #[error("withdrawal not found")]
    WithdrawalNotFound,

    #[error("withdrawal in state {0} cannot be retried")]
    InvalidWithdrawalState(String),
}

impl PoolError {
    /// Stable machine-readable code for the boundary. Each variant maps to
    /// exactly one code, regardless of the message text it carries.
    pub fn code(&self) -> &'static str {
        match self {
            PoolError::InvalidInput(_) => "invalid_input",
            PoolError::UserNotFound => "user_not_found",
            PoolError::RateLimited => "rate_limited",
            PoolError::BelowMinimum => "below_minimum",
            PoolError::InsufficientBalance => "insufficient_balance",
            PoolError::DailyLimitExceeded => "daily_limit_exceeded",
            PoolError::StaleOrReusedRequest => "stale_or_reused_request",
            PoolError::TransientLedgerError(_) => "transient_ledger_error",
            PoolError::ChainFailure(_) => "chain_failure",
            PoolError::PartitionMissing => "partition_missing",
            PoolError::WithdrawalNotFound => "withdrawal_not_found",
            PoolError::InvalidWithdrawalState(_) => "invalid_withdrawal_state",
        }
    }

    /// Whether a periodic task should retry this failure on its next tick
    /// rather than surfacing it to a one-shot caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::TransientLedgerError(_) | PoolError::PartitionMissing
        )
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
