//! Wallet-signature request scheme: message
//! `<entity>:<address>:<timestamp_ms>:<nonce>`, signed by the private key
//! matching `address`. Challenge issuance and key custody are a boundary
//! collaborator's responsibility; this module only builds the canonical
//! message and enforces the timestamp window, leaving signature recovery
//! to a [`crate::ports::SignatureVerifierPort`].

use crate::error::{PoolError, PoolResult};
use crate::wallet::WalletAddress;
use chrono::{DateTime, Utc};

/// Maximum allowed clock skew between the claimed timestamp and the
/// server's clock.
pub const SIGNATURE_TIMESTAMP_SKEW_SECS: i64 = 30;

/// Single-use nonce TTL.
pub const NONCE_TTL_SECS: i64 = 30;

pub fn build_message(entity: &str, address: &WalletAddress, timestamp_ms: i64, nonce: &str) -> String {
    format!("{entity}:{address}:{timestamp_ms}:{nonce}")
}

pub fn check_timestamp(timestamp_ms: i64, now: DateTime<Utc>) -> PoolResult<()> {
    let delta_ms = (now.timestamp_millis() - timestamp_ms).abs();
    if delta_ms > SIGNATURE_TIMESTAMP_SKEW_SECS * 1000 {
        return Err(PoolError::StaleOrReusedRequest);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn rejects_timestamp_outside_skew() {
        let now = Utc::now();
        let ok = now - Duration::seconds(29);
        let stale = now - Duration::seconds(31);
        assert!(check_timestamp(ok.timestamp_millis(), now).is_ok());
        assert!(check_timestamp(stale.timestamp_millis(), now).is_err());
    }

    #[test]
    fn message_is_colon_delimited() {
        let addr = WalletAddress::parse("0x1111111111111111111111111111111111111111").unwrap();
        let msg = build_message("withdrawal", &addr, 1_700_000_000_000, "abc");
        assert_eq!(
            msg,
            "withdrawal:0x1111111111111111111111111111111111111111:1700000000000:abc"
        );
    }
}
