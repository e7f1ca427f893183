//! Business logic: Activity Ingest, Liveness Sweeper, Reward Engine,
//! Withdrawal Pipeline, Admin Ops, and wallet-signature request
//! verification. Each type here is generic over the port traits it needs
//! and constructed once by the binary that wires in the concrete Ledger
//! Store / Ephemeral Store / Chain Gateway / Config Plane.

pub mod admin;
pub mod ingest;
pub mod reward;
pub mod signature;
pub mod sweeper;
pub mod withdrawal;

pub use admin::AdminOps;
pub use ingest::{ActivityIngest, MAX_SIGNALS_PER_MINUTE};
pub use reward::RewardEngine;
pub use signature::RequestVerifier;
pub use sweeper::LivenessSweeper;
pub use withdrawal::{SettlementOutcome, WithdrawalPipeline, STALE_LEASE_MINUTES};
