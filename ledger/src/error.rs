//! Maps `sqlx` failures onto the closed [`PoolError`] contract.

use poolcore_domain::PoolError;

/// Postgres SQLSTATE for `undefined_table`, raised when an insert targets
/// a monthly activity partition that hasn't been created yet.
const UNDEFINED_TABLE: &str = "42P01";

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> PoolError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNDEFINED_TABLE) {
            return PoolError::PartitionMissing;
        }
        if is_transient(db_err.as_ref()) {
            return PoolError::TransientLedgerError(db_err.to_string());
        }
    }
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            PoolError::TransientLedgerError(err.to_string())
        }
        _ => PoolError::TransientLedgerError(err.to_string()),
    }
}

fn is_transient(db_err: &dyn sqlx::error::DatabaseError) -> bool {
    // 40001 serialization_failure, 40P01 deadlock_detected, 08006 connection_failure
    matches!(db_err.code().as_deref(), Some("40001") | Some("40P01") | Some("08006"))
}
