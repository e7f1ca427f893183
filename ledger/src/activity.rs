use crate::error::map_sqlx_error;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use poolcore_domain::{ActivityRecord, Money, PoolResult, RetentionStats};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

#[derive(FromRow)]
struct ActivityRow {
    user_id: i64,
    minute_start: DateTime<Utc>,
    rate_snapshot: i64,
    reward_credited: Decimal,
    expires_at: DateTime<Utc>,
}

impl From<ActivityRow> for ActivityRecord {
    fn from(r: ActivityRow) -> Self {
        ActivityRecord {
            user_id: r.user_id,
            minute_start: r.minute_start,
            rate_snapshot: r.rate_snapshot,
            reward_credited: Money::new(r.reward_credited),
            expires_at: r.expires_at,
        }
    }
}

fn partition_name(minute_start: DateTime<Utc>) -> String {
    format!("activities_y{:04}m{:02}", minute_start.year(), minute_start.month())
}

fn month_bounds(minute_start: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let year = minute_start.year();
    let month = minute_start.month();
    let start = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single().expect("valid month start");
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .expect("valid next month start");
    (start, end)
}

pub(crate) async fn ensure_activity_partition(
    pool: &PgPool,
    minute_start: DateTime<Utc>,
) -> PoolResult<()> {
    let name = partition_name(minute_start);
    let (start, end) = month_bounds(minute_start);
    // `name` is built entirely from validated integer year/month components,
    // never from external input, so string interpolation here is safe.
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {name} PARTITION OF activities \
         FOR VALUES FROM ($1) TO ($2)"
    );
    sqlx::query(&sql)
        .bind(start)
        .bind(end)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

pub(crate) async fn insert_activity_record(
    pool: &PgPool,
    record: &ActivityRecord,
) -> PoolResult<()> {
    sqlx::query(
        "INSERT INTO activities (user_id, minute_start, rate_snapshot, reward_credited, expires_at) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (user_id, minute_start) DO NOTHING",
    )
    .bind(record.user_id)
    .bind(record.minute_start)
    .bind(record.rate_snapshot)
    .bind(record.reward_credited.inner())
    .bind(record.expires_at)
    .execute(pool)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

pub(crate) async fn eligible_activity_rows(
    pool: &PgPool,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> PoolResult<Vec<ActivityRecord>> {
    let rows: Vec<ActivityRow> = sqlx::query_as(
        "SELECT user_id, minute_start, rate_snapshot, reward_credited, expires_at \
         FROM activities \
         WHERE minute_start >= $1 AND minute_start < $2 AND reward_credited = 0",
    )
    .bind(window_start)
    .bind(window_end)
    .fetch_all(pool)
    .await
    .map_err(map_sqlx_error)?;
    Ok(rows.into_iter().map(ActivityRecord::from).collect())
}

pub(crate) async fn credit_user_reward(
    pool: &PgPool,
    user_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    total_reward: Money,
    minutes_credited: u32,
) -> PoolResult<()> {
    if minutes_credited == 0 || total_reward.is_zero() {
        return Ok(());
    }
    let per_row = total_reward.div_floor(minutes_credited as u64);

    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    sqlx::query(
        "UPDATE users SET available_balance = available_balance + $1, \
         lifetime_earned = lifetime_earned + $1 WHERE user_id = $2",
    )
    .bind(total_reward.inner())
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(map_sqlx_error)?;

    // `WHERE reward_credited = 0` is the idempotency guard: re-running the
    // cycle over the same window credits nothing twice.
    sqlx::query(
        "UPDATE activities SET reward_credited = $1 \
         WHERE user_id = $2 AND minute_start >= $3 AND minute_start < $4 AND reward_credited = 0",
    )
    .bind(per_row.inner())
    .bind(user_id)
    .bind(window_start)
    .bind(window_end)
    .execute(&mut *tx)
    .await
    .map_err(map_sqlx_error)?;

    tx.commit().await.map_err(map_sqlx_error)?;
    Ok(())
}

pub(crate) async fn run_retention_sweep(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> PoolResult<RetentionStats> {
    let activity_result = sqlx::query("DELETE FROM activities WHERE expires_at < $1")
        .bind(now)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;

    let withdrawal_horizon = now - Duration::days(90);
    let withdrawal_result = sqlx::query(
        "DELETE FROM withdrawals WHERE status = 'completed' AND completed_at < $1",
    )
    .bind(withdrawal_horizon)
    .execute(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(RetentionStats {
        activity_rows_deleted: activity_result.rows_affected(),
        withdrawals_deleted: withdrawal_result.rows_affected(),
    })
}
