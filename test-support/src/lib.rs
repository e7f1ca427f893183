//! In-memory fakes of every port (`LedgerPort`, `EphemeralPort`,
//! `ChainPort`, `SignatureVerifierPort`), shared by every crate's test
//! suite. Each store is reached only through its trait, so no production
//! code branches on "am I in a test". Each fake holds its whole state
//! behind a single lock, so one call is one atomic unit of work — the
//! same guarantee the real transactional stores give, without simulating
//! row locks.

mod chain;
mod ephemeral;
mod ledger;
mod signature;

pub use chain::{ChainOutcome, InMemoryChain};
pub use ephemeral::InMemoryEphemeral;
pub use ledger::InMemoryLedger;
pub use signature::InMemorySignatureVerifier;
