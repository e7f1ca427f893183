use async_trait::async_trait;
use parking_lot::Mutex;
use poolcore_domain::{PoolError, PoolResult, SignatureVerifierPort, WalletAddress};
use std::collections::HashMap;

/// Fake signature verifier: tests register which address a given
/// signature string recovers to, rather than doing real ECDSA recovery.
/// Key custody and signing live outside this codebase entirely.
#[derive(Default)]
pub struct InMemorySignatureVerifier {
    signatures: Mutex<HashMap<String, WalletAddress>>,
}

impl InMemorySignatureVerifier {
    pub fn new() -> Self {
        InMemorySignatureVerifier::default()
    }

    pub fn register(&self, signature: impl Into<String>, address: WalletAddress) {
        self.signatures.lock().insert(signature.into(), address);
    }
}

#[async_trait]
impl SignatureVerifierPort for InMemorySignatureVerifier {
    async fn recover_address(&self, _message: &str, signature: &str) -> PoolResult<WalletAddress> {
        self.signatures
            .lock()
            .get(signature)
            .cloned()
            .ok_or(PoolError::StaleOrReusedRequest)
    }
}
