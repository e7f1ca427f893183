//! `poolcore` binary: wires the Ledger Store, Chain Gateway and Config
//! Plane together and either runs the long-lived daemon (reward cycle,
//! liveness sweep, withdrawal settlement, retention sweep) or performs
//! one Admin Op and exits.

mod cli;
mod config;
mod tasks;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use poolcore_chain::HttpChainGateway;
use poolcore_config::CachedConfigPlane;
use poolcore_core::{AdminOps, LivenessSweeper, RewardEngine, WithdrawalPipeline};
use poolcore_domain::{Clock, ConfigKey, SystemClock};
use poolcore_ledger::PgLedgerStore;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_logging(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.opts.config {
        Some(path) => config::Config::from_file(std::path::Path::new(path))
            .with_context(|| format!("loading config from {path}"))?,
        None => config::Config::default(),
    };
    if let Some(url) = &cli.opts.database_url {
        config.database.url = url.clone();
    }
    if let Some(url) = &cli.opts.redis_url {
        config.ephemeral.url = url.clone();
    }
    if let Some(filter) = &cli.opts.log_filter {
        config.log.filter = filter.clone();
    }

    init_logging(&config.log.filter);
    tracing::info!(database = %config.database.url, "starting poolcore");

    let ledger = Arc::new(
        PgLedgerStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("connecting to the ledger store")?,
    );
    ledger.run_migrations().await.context("running ledger migrations")?;

    // `CachedConfigPlane` is generic over a concrete clock type; every
    // downstream port constructor instead takes a type-erased `Arc<dyn
    // Clock>`, so both are kept side by side from the same `SystemClock`.
    let system_clock = Arc::new(SystemClock);
    let clock: Arc<dyn Clock> = system_clock.clone();
    let config_plane = Arc::new(CachedConfigPlane::new(ledger.clone(), system_clock));

    match cli.command {
        Some(Command::Retry { withdrawal_id }) => {
            let admin = AdminOps::new(ledger.clone(), config_plane.clone(), clock.clone());
            admin.retry(withdrawal_id).await.context("retrying withdrawal")?;
            println!("withdrawal {withdrawal_id} re-enqueued as pending");
        }
        Some(Command::ForceFail { withdrawal_id, reason }) => {
            let admin = AdminOps::new(ledger.clone(), config_plane.clone(), clock.clone());
            admin.force_fail(withdrawal_id, &reason).await.context("force-failing withdrawal")?;
            println!("withdrawal {withdrawal_id} force-failed");
        }
        Some(Command::SetConfig { key, value }) => {
            let key = ConfigKey::from_str(&key).context("parsing config key")?;
            let admin = AdminOps::new(ledger.clone(), config_plane.clone(), clock.clone());
            admin.set_config(key, value.as_deref()).await.context("updating config entry")?;
            println!("{} updated", key.as_str());
        }
        None => {
            run_daemon(ledger, config_plane, clock, &config).await?;
        }
    }

    Ok(())
}

/// Every periodic task runs independently, no global lock; cadences come
/// from [`config::SchedulingConfig`] except where a literal is
/// load-bearing (withdrawal tick ~2s, reward-cycle error retry 60s).
async fn run_daemon(
    ledger: Arc<PgLedgerStore>,
    config_plane: Arc<CachedConfigPlane<PgLedgerStore, SystemClock>>,
    clock: Arc<dyn Clock>,
    config: &config::Config,
) -> anyhow::Result<()> {
    let chain = Arc::new(HttpChainGateway::new(config.chain.endpoints.clone()));

    let reward_engine = Arc::new(RewardEngine::new(ledger.clone(), config_plane.clone(), clock.clone()));
    let sweeper = Arc::new(LivenessSweeper::new(ledger.clone(), config_plane.clone(), clock.clone()));
    let withdrawal_pipeline =
        Arc::new(WithdrawalPipeline::new(ledger.clone(), config_plane.clone(), chain.clone(), clock.clone()));

    // Activity Ingest and wallet-signature verification are driven by the
    // HTTP router, which lives outside this binary; it only starts the
    // periodic tasks that own no request/response cycle, so it never
    // touches the Ephemeral Store directly.
    let reward_loop = tokio::spawn(tasks::run_reward_cycle_loop(
        reward_engine,
        config_plane.clone(),
        config.scheduling.reward_cycle_error_retry_seconds,
    ));
    let sweep_loop =
        tokio::spawn(tasks::run_liveness_sweep_loop(sweeper, config.scheduling.liveness_sweep_seconds));
    let settlement_loop = tokio::spawn(tasks::run_withdrawal_settlement_loop(
        withdrawal_pipeline,
        config.scheduling.withdrawal_tick_seconds,
    ));
    let retention_loop = tokio::spawn(tasks::run_retention_sweep_loop(
        ledger,
        clock,
        config.scheduling.retention_sweep_interval_hours,
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
        result = reward_loop => result.context("reward cycle task panicked")?,
        result = sweep_loop => result.context("liveness sweep task panicked")?,
        result = settlement_loop => result.context("withdrawal settlement task panicked")?,
        result = retention_loop => result.context("retention sweep task panicked")?,
    }

    Ok(())
}
