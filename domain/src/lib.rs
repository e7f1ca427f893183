//! Shared domain types, error kinds, and port traits for poolcore: the
//! data model and interface seams every other crate in the workspace
//! builds against.

pub mod clock;
pub mod config_keys;
pub mod error;
pub mod model;
pub mod money;
pub mod ports;
pub mod request_signature;
pub mod wallet;

pub use clock::{Clock, SystemClock, TestClock};
pub use config_keys::{ConfigKey, ConfigSnapshot};
pub use error::{PoolError, PoolResult};
pub use model::*;
pub use money::Money;
pub use ports::{
    ChainPort, ConfigPort, EphemeralPort, LedgerPort, SignatureVerifierPort,
    WithdrawalRequestOutcome,
};
pub use wallet::WalletAddress;
