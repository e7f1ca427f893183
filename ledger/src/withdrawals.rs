use crate::error::map_sqlx_error;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use poolcore_domain::{
    Money, PoolError, PoolResult, WalletAddress, Withdrawal, WithdrawalRequestOutcome,
    WithdrawalStatus,
};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

#[derive(FromRow)]
struct WithdrawalRow {
    id: i64,
    user_id: i64,
    amount: Decimal,
    destination_wallet: String,
    status: String,
    tx_id: Option<String>,
    requested_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error_text: Option<String>,
    idempotency_key: Option<String>,
}

impl WithdrawalRow {
    fn into_withdrawal(self) -> PoolResult<Withdrawal> {
        Ok(Withdrawal {
            id: self.id,
            user_id: self.user_id,
            amount: Money::new(self.amount),
            destination_wallet: WalletAddress::parse(&self.destination_wallet)?,
            status: parse_status(&self.status),
            tx_id: self.tx_id,
            requested_at: self.requested_at,
            completed_at: self.completed_at,
            error_text: self.error_text,
            idempotency_key: self.idempotency_key,
        })
    }
}

fn parse_status(s: &str) -> WithdrawalStatus {
    match s {
        "pending" => WithdrawalStatus::Pending,
        "processing" => WithdrawalStatus::Processing,
        "completed" => WithdrawalStatus::Completed,
        _ => WithdrawalStatus::Failed,
    }
}

const WITHDRAWAL_COLUMNS: &str = "id, user_id, amount, destination_wallet, status, tx_id, \
     requested_at, completed_at, error_text, idempotency_key";

pub(crate) async fn get_withdrawal(pool: &PgPool, id: i64) -> PoolResult<Option<Withdrawal>> {
    let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = $1");
    let row: Option<WithdrawalRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx_error)?;
    row.map(WithdrawalRow::into_withdrawal).transpose()
}

/// `(start of the UTC calendar day containing `now`)`. Daily caps use UTC
/// day boundaries uniformly rather than a per-user local day (see
/// DESIGN.md Open Question resolution).
fn utc_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}

pub(crate) async fn request_withdrawal(
    pool: &PgPool,
    user_id: i64,
    amount: Money,
    destination_wallet: &WalletAddress,
    idempotency_key: Option<&str>,
    daily_cap: Option<Decimal>,
    now: DateTime<Utc>,
) -> PoolResult<WithdrawalRequestOutcome> {
    let mut tx: Transaction<'_, Postgres> = pool.begin().await.map_err(map_sqlx_error)?;

    let locked = sqlx::query("SELECT 1 FROM users WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
    if locked.is_none() {
        return Err(PoolError::UserNotFound);
    }

    if let Some(key) = idempotency_key {
        let sql = format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE user_id = $1 AND idempotency_key = $2"
        );
        let existing: Option<WithdrawalRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if let Some(row) = existing {
            tx.commit().await.map_err(map_sqlx_error)?;
            return Ok(WithdrawalRequestOutcome::Existing(row.into_withdrawal()?));
        }
    }

    if let Some(cap) = daily_cap {
        let day_start = utc_day_start(now);
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total FROM withdrawals \
             WHERE user_id = $1 AND requested_at >= $2 \
             AND status IN ('pending', 'processing', 'completed')",
        )
        .bind(user_id)
        .bind(day_start)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let already: Decimal = sqlx::Row::get(&row, "total");
        if already + amount.inner() > cap {
            return Err(PoolError::DailyLimitExceeded);
        }
    }

    let debited = sqlx::query(
        "UPDATE users SET available_balance = available_balance - $1 \
         WHERE user_id = $2 AND available_balance >= $1",
    )
    .bind(amount.inner())
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(map_sqlx_error)?;
    if debited.rows_affected() == 0 {
        return Err(PoolError::InsufficientBalance);
    }

    let sql = format!(
        "INSERT INTO withdrawals (user_id, amount, destination_wallet, status, requested_at, idempotency_key) \
         VALUES ($1, $2, $3, 'pending', $4, $5) RETURNING {WITHDRAWAL_COLUMNS}"
    );
    let inserted: WithdrawalRow = sqlx::query_as(&sql)
        .bind(user_id)
        .bind(amount.inner())
        .bind(destination_wallet.as_str())
        .bind(now)
        .bind(idempotency_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

    tx.commit().await.map_err(map_sqlx_error)?;
    Ok(WithdrawalRequestOutcome::Created(inserted.into_withdrawal()?))
}

pub(crate) async fn claim_settlement_job(
    pool: &PgPool,
    stale_lease_threshold: DateTime<Utc>,
) -> PoolResult<Option<Withdrawal>> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    let pending_sql = format!(
        "UPDATE withdrawals SET status = 'processing' WHERE id = ( \
             SELECT id FROM withdrawals WHERE status = 'pending' \
             ORDER BY requested_at ASC FOR UPDATE SKIP LOCKED LIMIT 1 \
         ) RETURNING {WITHDRAWAL_COLUMNS}"
    );
    let claimed: Option<WithdrawalRow> = sqlx::query_as(&pending_sql)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

    let claimed = if let Some(row) = claimed {
        Some(row)
    } else {
        let stale_sql = format!(
            "UPDATE withdrawals SET status = 'processing' WHERE id = ( \
                 SELECT id FROM withdrawals WHERE status = 'processing' AND requested_at < $1 \
                 ORDER BY requested_at ASC FOR UPDATE SKIP LOCKED LIMIT 1 \
             ) RETURNING {WITHDRAWAL_COLUMNS}"
        );
        sqlx::query_as(&stale_sql)
            .bind(stale_lease_threshold)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
    };

    tx.commit().await.map_err(map_sqlx_error)?;
    claimed.map(WithdrawalRow::into_withdrawal).transpose()
}

pub(crate) async fn complete_withdrawal(
    pool: &PgPool,
    id: i64,
    tx_id: &str,
    completed_at: DateTime<Utc>,
) -> PoolResult<()> {
    sqlx::query(
        "UPDATE withdrawals SET status = 'completed', tx_id = $1, completed_at = $2 WHERE id = $3",
    )
    .bind(tx_id)
    .bind(completed_at)
    .bind(id)
    .execute(pool)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

pub(crate) async fn fail_withdrawal(pool: &PgPool, id: i64, error_text: &str) -> PoolResult<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    // `WHERE status = 'processing'` guards against double compensation if a
    // racing worker already observed this job `completed`.
    let row = sqlx::query(
        "UPDATE withdrawals SET status = 'failed', error_text = $1 \
         WHERE id = $2 AND status = 'processing' RETURNING user_id, amount",
    )
    .bind(error_text)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(map_sqlx_error)?;

    if let Some(row) = row {
        use sqlx::Row;
        let user_id: i64 = row.get("user_id");
        let amount: Decimal = row.get("amount");
        sqlx::query("UPDATE users SET available_balance = available_balance + $1 WHERE user_id = $2")
            .bind(amount)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
    }

    tx.commit().await.map_err(map_sqlx_error)?;
    Ok(())
}

pub(crate) async fn retry_withdrawal(pool: &PgPool, id: i64, now: DateTime<Utc>) -> PoolResult<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = $1 FOR UPDATE");
    let row: Option<WithdrawalRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
    let row = row.ok_or(PoolError::WithdrawalNotFound)?;
    if parse_status(&row.status) != WithdrawalStatus::Failed {
        return Err(PoolError::InvalidWithdrawalState(row.status));
    }

    let debited = sqlx::query(
        "UPDATE users SET available_balance = available_balance - $1 \
         WHERE user_id = $2 AND available_balance >= $1",
    )
    .bind(row.amount)
    .bind(row.user_id)
    .execute(&mut *tx)
    .await
    .map_err(map_sqlx_error)?;
    if debited.rows_affected() == 0 {
        return Err(PoolError::InsufficientBalance);
    }

    sqlx::query(
        "UPDATE withdrawals SET status = 'pending', tx_id = NULL, error_text = NULL, requested_at = $1 \
         WHERE id = $2",
    )
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(map_sqlx_error)?;

    tx.commit().await.map_err(map_sqlx_error)?;
    Ok(())
}

pub(crate) async fn force_fail_withdrawal(
    pool: &PgPool,
    id: i64,
    reason: &str,
    _now: DateTime<Utc>,
) -> PoolResult<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = $1 FOR UPDATE");
    let row: Option<WithdrawalRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
    let row = row.ok_or(PoolError::WithdrawalNotFound)?;

    if parse_status(&row.status) == WithdrawalStatus::Failed {
        sqlx::query("UPDATE withdrawals SET error_text = $1 WHERE id = $2")
            .bind(reason)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
    } else {
        sqlx::query(
            "UPDATE users SET available_balance = available_balance + $1 WHERE user_id = $2",
        )
        .bind(row.amount)
        .bind(row.user_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        sqlx::query("UPDATE withdrawals SET status = 'failed', error_text = $1 WHERE id = $2")
            .bind(reason)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
    }
    tx.commit().await.map_err(map_sqlx_error)?;
    Ok(())
}
