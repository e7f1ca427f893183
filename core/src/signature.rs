//! Wallet-signature request verification: wires the timestamp check, the
//! single-use nonce, and recovered-address comparison into the one call
//! sites that accept signed admin/user requests use.

use poolcore_domain::request_signature::{build_message, check_timestamp};
use poolcore_domain::{Clock, EphemeralPort, PoolError, PoolResult, SignatureVerifierPort, WalletAddress};
use std::sync::Arc;
use tracing::instrument;

pub struct RequestVerifier<E, S> {
    ephemeral: Arc<E>,
    verifier: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<E, S> RequestVerifier<E, S>
where
    E: EphemeralPort,
    S: SignatureVerifierPort,
{
    pub fn new(ephemeral: Arc<E>, verifier: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        RequestVerifier { ephemeral, verifier, clock }
    }

    /// Rejects with `StaleOrReusedRequest` unless the timestamp is within
    /// skew, the nonce has never been seen, and the signature recovers to
    /// `claimed_address`.
    #[instrument(skip(self, nonce, signature))]
    pub async fn verify(
        &self,
        entity: &str,
        claimed_address: &WalletAddress,
        timestamp_ms: i64,
        nonce: &str,
        signature: &str,
    ) -> PoolResult<()> {
        check_timestamp(timestamp_ms, self.clock.now())?;

        if !self.ephemeral.claim_nonce(nonce).await? {
            return Err(PoolError::StaleOrReusedRequest);
        }

        let message = build_message(entity, claimed_address, timestamp_ms, nonce);
        let recovered = self
            .verifier
            .recover_address(&message, signature)
            .await
            .map_err(|_| PoolError::StaleOrReusedRequest)?;

        if &recovered != claimed_address {
            return Err(PoolError::StaleOrReusedRequest);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use poolcore_test_support::{InMemoryEphemeral, InMemorySignatureVerifier};

    fn addr(raw: &str) -> WalletAddress {
        WalletAddress::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn accepts_a_fresh_correctly_signed_request() {
        let clock = Arc::new(poolcore_domain::TestClock::at(Utc::now()));
        let ephemeral = Arc::new(InMemoryEphemeral::new(clock.clone() as Arc<dyn Clock>));
        let sig_verifier = Arc::new(InMemorySignatureVerifier::new());
        let address = addr("0x1111111111111111111111111111111111111111");
        sig_verifier.register("sig-abc", address.clone());

        let verifier = RequestVerifier::new(ephemeral, sig_verifier, clock.clone() as Arc<dyn Clock>);
        verifier
            .verify("withdrawal", &address, clock.now().timestamp_millis(), "nonce-1", "sig-abc")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_a_reused_nonce() {
        let clock = Arc::new(poolcore_domain::TestClock::at(Utc::now()));
        let ephemeral = Arc::new(InMemoryEphemeral::new(clock.clone() as Arc<dyn Clock>));
        let sig_verifier = Arc::new(InMemorySignatureVerifier::new());
        let address = addr("0x2222222222222222222222222222222222222222");
        sig_verifier.register("sig-abc", address.clone());
        let verifier = RequestVerifier::new(ephemeral, sig_verifier, clock.clone() as Arc<dyn Clock>);

        verifier
            .verify("withdrawal", &address, clock.now().timestamp_millis(), "nonce-1", "sig-abc")
            .await
            .unwrap();
        let err = verifier
            .verify("withdrawal", &address, clock.now().timestamp_millis(), "nonce-1", "sig-abc")
            .await
            .unwrap_err();
        assert_eq!(err, PoolError::StaleOrReusedRequest);
    }

    #[tokio::test]
    async fn rejects_a_stale_timestamp() {
        let clock = Arc::new(poolcore_domain::TestClock::at(Utc::now()));
        let ephemeral = Arc::new(InMemoryEphemeral::new(clock.clone() as Arc<dyn Clock>));
        let sig_verifier = Arc::new(InMemorySignatureVerifier::new());
        let address = addr("0x3333333333333333333333333333333333333333");
        sig_verifier.register("sig-abc", address.clone());
        let verifier = RequestVerifier::new(ephemeral, sig_verifier, clock.clone() as Arc<dyn Clock>);

        let stale_ts = (clock.now() - chrono::Duration::seconds(60)).timestamp_millis();
        let err = verifier.verify("withdrawal", &address, stale_ts, "nonce-1", "sig-abc").await.unwrap_err();
        assert_eq!(err, PoolError::StaleOrReusedRequest);
    }

    #[tokio::test]
    async fn rejects_a_signature_that_recovers_to_a_different_address() {
        let clock = Arc::new(poolcore_domain::TestClock::at(Utc::now()));
        let ephemeral = Arc::new(InMemoryEphemeral::new(clock.clone() as Arc<dyn Clock>));
        let sig_verifier = Arc::new(InMemorySignatureVerifier::new());
        let claimed = addr("0x4444444444444444444444444444444444444444");
        let actual = addr("0x5555555555555555555555555555555555555555");
        sig_verifier.register("sig-abc", actual);
        let verifier = RequestVerifier::new(ephemeral, sig_verifier, clock.clone() as Arc<dyn Clock>);

        let err = verifier
            .verify("withdrawal", &claimed, clock.now().timestamp_millis(), "nonce-1", "sig-abc")
            .await
            .unwrap_err();
        assert_eq!(err, PoolError::StaleOrReusedRequest);
    }
}
