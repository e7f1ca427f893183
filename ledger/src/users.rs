use crate::error::map_sqlx_error;
use chrono::{DateTime, Utc};
use poolcore_domain::{LivenessStatus, Money, PoolError, PoolResult, SweepStats, User, WalletAddress};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

#[derive(FromRow)]
struct UserRow {
    user_id: i64,
    wallet_address: String,
    device_type: Option<String>,
    reported_rate: i64,
    available_balance: Decimal,
    lifetime_earned: Decimal,
    last_signal_at: Option<DateTime<Utc>>,
    status: String,
}

impl UserRow {
    fn into_user(self) -> PoolResult<User> {
        Ok(User {
            user_id: self.user_id,
            wallet_address: WalletAddress::parse(&self.wallet_address)?,
            device_type: self.device_type,
            reported_rate: self.reported_rate,
            available_balance: Money::new(self.available_balance),
            lifetime_earned: Money::new(self.lifetime_earned),
            last_signal_at: self.last_signal_at,
            status: if self.status == "online" {
                LivenessStatus::Online
            } else {
                LivenessStatus::Offline
            },
        })
    }
}

const USER_COLUMNS: &str = "user_id, wallet_address, device_type, reported_rate, \
     available_balance, lifetime_earned, last_signal_at, status";

pub(crate) async fn create_user(
    pool: &PgPool,
    wallet_address: &WalletAddress,
    device_type: Option<&str>,
) -> PoolResult<User> {
    let sql = format!(
        "INSERT INTO users (wallet_address, device_type) VALUES ($1, $2) \
         RETURNING {USER_COLUMNS}"
    );
    let row: UserRow = sqlx::query_as(&sql)
        .bind(wallet_address.as_str())
        .bind(device_type)
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;
    row.into_user()
}

pub(crate) async fn get_user(pool: &PgPool, user_id: i64) -> PoolResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
    let row: Option<UserRow> = sqlx::query_as(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx_error)?;
    row.map(UserRow::into_user).transpose()
}

pub(crate) async fn get_user_by_wallet(
    pool: &PgPool,
    wallet_address: &WalletAddress,
) -> PoolResult<Option<User>> {
    let sql =
        format!("SELECT {USER_COLUMNS} FROM users WHERE wallet_address_ci = lower($1)");
    let row: Option<UserRow> = sqlx::query_as(&sql)
        .bind(wallet_address.as_str())
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx_error)?;
    row.map(UserRow::into_user).transpose()
}

pub(crate) async fn touch_liveness(
    pool: &PgPool,
    user_id: i64,
    now: DateTime<Utc>,
) -> PoolResult<()> {
    let result =
        sqlx::query("UPDATE users SET last_signal_at = $1, status = 'online' WHERE user_id = $2")
            .bind(now)
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(map_sqlx_error)?;
    if result.rows_affected() == 0 {
        return Err(PoolError::UserNotFound);
    }
    Ok(())
}

pub(crate) async fn sweep_offline(pool: &PgPool, threshold: DateTime<Utc>) -> PoolResult<SweepStats> {
    // One statement, no per-user work.
    let result = sqlx::query(
        "UPDATE users SET status = 'offline' \
         WHERE status = 'online' AND (last_signal_at IS NULL OR last_signal_at < $1)",
    )
    .bind(threshold)
    .execute(pool)
    .await
    .map_err(map_sqlx_error)?;
    Ok(SweepStats {
        users_marked_offline: result.rows_affected(),
    })
}
