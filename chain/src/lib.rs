//! HTTP-backed Chain Gateway. Submits a native-asset transfer to an
//! ordered, non-empty list of endpoints, trying each in turn and
//! returning the identifier once the first one acknowledges the
//! submission; on exhaustion the last endpoint's failure is propagated
//! verbatim. No internal retry loop beyond the endpoint fan-out — retries
//! belong to the withdrawal pipeline.

use async_trait::async_trait;
use poolcore_domain::{ChainPort, Money, PoolError, PoolResult, WalletAddress};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

/// Base-unit scale for chain-side amounts: converted to the chain's base
/// units with 18 fractional digits.
const BASE_UNIT_DECIMALS: u32 = 18;

#[derive(Debug, Serialize)]
struct SubmitRequest {
    to: String,
    /// Whole-token amount converted to the chain's base units, encoded as
    /// a decimal string so large values never lose precision in transit.
    amount_base_units: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    tx_id: String,
}

pub struct HttpChainGateway {
    endpoints: Vec<String>,
    client: Client,
}

impl HttpChainGateway {
    /// `endpoints` must be non-empty and ordered; the first is tried
    /// first on every call.
    pub fn new(endpoints: Vec<String>) -> Self {
        assert!(
            !endpoints.is_empty(),
            "Chain Gateway requires at least one endpoint"
        );
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builder with valid static config");
        HttpChainGateway { endpoints, client }
    }

    fn to_base_units(amount: Money) -> Decimal {
        amount.inner() * Decimal::from(10i64.pow(BASE_UNIT_DECIMALS))
    }
}

#[async_trait]
impl ChainPort for HttpChainGateway {
    #[instrument(skip(self), fields(endpoints = self.endpoints.len()))]
    async fn submit(&self, to_address: &WalletAddress, amount: Money) -> PoolResult<String> {
        // `to_address` is already validated against the `0x` + 40-hex
        // pattern at construction time (`WalletAddress::parse`), so
        // validating before any outbound call is a structural invariant
        // rather than a runtime check here.
        let body = SubmitRequest {
            to: to_address.to_string(),
            amount_base_units: Self::to_base_units(amount).to_string(),
        };

        let mut last_error = String::new();
        for (idx, endpoint) in self.endpoints.iter().enumerate() {
            match self.try_endpoint(endpoint, &body).await {
                Ok(tx_id) => return Ok(tx_id),
                Err(err) => {
                    warn!(endpoint_index = idx, endpoint, error = %err, "chain endpoint failed");
                    last_error = err;
                }
            }
        }
        Err(PoolError::ChainFailure(last_error))
    }
}

impl HttpChainGateway {
    async fn try_endpoint(&self, endpoint: &str, body: &SubmitRequest) -> Result<String, String> {
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("endpoint {endpoint} returned {}", response.status()));
        }

        let parsed: SubmitResponse = response.json().await.map_err(|e| e.to_string())?;
        if parsed.tx_id.is_empty() {
            return Err(format!("endpoint {endpoint} returned an empty tx_id"));
        }
        Ok(parsed.tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    #[should_panic(expected = "at least one endpoint")]
    fn rejects_empty_endpoint_list() {
        HttpChainGateway::new(vec![]);
    }

    #[test]
    fn base_unit_conversion_scales_by_18_decimals() {
        let amount = Money::new(Decimal::from_str("2.5").unwrap());
        let scaled = HttpChainGateway::to_base_units(amount);
        assert_eq!(scaled, Decimal::from_str("2500000000000000000").unwrap());
    }
}
