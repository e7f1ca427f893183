use crate::error::map_sqlx_error;
use chrono::{DateTime, Utc};
use poolcore_domain::{ConfigKey, PoolResult};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

#[derive(FromRow)]
struct ConfigRow {
    key: String,
    value: Option<Decimal>,
}

pub(crate) async fn get_config_entries(
    pool: &PgPool,
) -> PoolResult<Vec<(ConfigKey, Option<Decimal>)>> {
    let rows: Vec<ConfigRow> = sqlx::query_as("SELECT key, value FROM config")
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_error)?;
    rows.into_iter()
        .filter_map(|r| ConfigKey::parse(&r.key).ok().map(|k| Ok((k, r.value))))
        .collect()
}

pub(crate) async fn upsert_config_entry(
    pool: &PgPool,
    key: ConfigKey,
    value: Option<Decimal>,
    now: DateTime<Utc>,
) -> PoolResult<()> {
    sqlx::query(
        "INSERT INTO config (key, value, updated_at) VALUES ($1, $2, $3) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
    )
    .bind(key.as_str())
    .bind(value)
    .bind(now)
    .execute(pool)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}
