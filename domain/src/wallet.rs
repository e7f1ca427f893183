//! Wallet address validation against `^0x[0-9a-fA-F]{40}$`.

use crate::error::PoolError;
use regex::Regex;
use std::sync::OnceLock;

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex is valid"))
}

/// A validated, lower-cased wallet address. Addresses are unique
/// case-insensitively, so every `WalletAddress` is normalized to
/// lowercase on construction and compares/hashes accordingly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn parse(raw: &str) -> Result<Self, PoolError> {
        if !address_re().is_match(raw) {
            return Err(PoolError::InvalidInput(format!(
                "wallet address {raw:?} does not match 0x + 40 hex chars"
            )));
        }
        Ok(WalletAddress(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_address() {
        let addr = WalletAddress::parse("0x1234567890abcdef1234567890ABCDEF12345678").unwrap();
        assert_eq!(addr.as_str(), "0x1234567890abcdef1234567890abcdef12345678");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(WalletAddress::parse("0x1234").is_err());
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(WalletAddress::parse("1234567890abcdef1234567890abcdef12345678").is_err());
    }

    #[test]
    fn case_insensitive_equality() {
        let a = WalletAddress::parse("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap();
        let b = WalletAddress::parse("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert_eq!(a, b);
    }
}
