//! CLI surface: `clap` for the daemon's `--config` flag and subcommands.
//! With no subcommand the binary runs as the long-lived daemon; each
//! `admin` subcommand performs one Admin Op and exits.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "poolcore", author, version, about = "Proof-of-contribution pool backend")]
pub struct Cli {
    #[command(flatten)]
    pub opts: CliOpts,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct CliOpts {
    /// A TOML file containing relevant configuration.
    #[arg(short, long)]
    pub config: Option<String>,
    /// Overrides `database.url`.
    #[arg(long)]
    pub database_url: Option<String>,
    /// Overrides `ephemeral.url`.
    #[arg(long)]
    pub redis_url: Option<String>,
    /// Overrides `log.filter`.
    #[arg(long)]
    pub log_filter: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Re-enqueue a `failed` withdrawal.
    Retry { withdrawal_id: i64 },
    /// Force any non-`failed` withdrawal to `failed`, crediting the user
    /// back.
    ForceFail { withdrawal_id: i64, reason: String },
    /// Write one Config Plane tunable. Pass no `value` to clear a
    /// nullable key.
    SetConfig { key: String, value: Option<String> },
}
