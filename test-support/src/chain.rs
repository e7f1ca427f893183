use async_trait::async_trait;
use parking_lot::Mutex;
use poolcore_domain::{ChainPort, Money, PoolError, PoolResult, WalletAddress};
use std::collections::VecDeque;

/// A canned result consumed by one [`InMemoryChain::submit`] call.
#[derive(Debug, Clone)]
pub enum ChainOutcome {
    Success(String),
    Failure(String),
}

/// Scriptable fake of the Chain Gateway: tests push outcomes onto a queue
/// and assert on the calls the pipeline actually made.
#[derive(Default)]
pub struct InMemoryChain {
    outcomes: Mutex<VecDeque<ChainOutcome>>,
    calls: Mutex<Vec<(WalletAddress, Money)>>,
}

impl InMemoryChain {
    pub fn new() -> Self {
        InMemoryChain::default()
    }

    pub fn push_success(&self, tx_id: impl Into<String>) {
        self.outcomes.lock().push_back(ChainOutcome::Success(tx_id.into()));
    }

    pub fn push_failure(&self, error: impl Into<String>) {
        self.outcomes.lock().push_back(ChainOutcome::Failure(error.into()));
    }

    pub fn calls(&self) -> Vec<(WalletAddress, Money)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ChainPort for InMemoryChain {
    async fn submit(&self, to_address: &WalletAddress, amount: Money) -> PoolResult<String> {
        self.calls.lock().push((to_address.clone(), amount));
        match self.outcomes.lock().pop_front() {
            Some(ChainOutcome::Success(tx_id)) => Ok(tx_id),
            Some(ChainOutcome::Failure(err)) => Err(PoolError::ChainFailure(err)),
            None => Err(PoolError::ChainFailure("no canned outcome configured".into())),
        }
    }
}
