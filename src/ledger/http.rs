//! REST ledger backend
//!
//! Talks to the blockchain gateway service in front of the token chaincode:
//!
//! - `POST {endpoint}/api/blockchain/mint`
//! - `POST {endpoint}/api/blockchain/transfer`
//! - `POST {endpoint}/api/blockchain/burn`
//! - `GET  {endpoint}/api/blockchain/balance/{address}`
//! - `GET  {endpoint}/api/blockchain/health`
//!
//! Channel, chaincode and signing identity travel as headers on every request.
//! Transient failures are retried with exponential backoff; the overall bound
//! is enforced by the gateway's timeout.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::config::LedgerConfig;
use crate::error::{Error, Result};

use super::{LedgerBackend, LedgerOp, LedgerResult};

pub const CHANNEL_HEADER: &str = "X-Fabric-Channel";
pub const CHAINCODE_HEADER: &str = "X-Fabric-Chaincode";
pub const IDENTITY_HEADER: &str = "X-Fabric-Identity";

/// Submission body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    wallet: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<&'a str>,
    amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_hash: Option<&'a str>,
}

impl<'a> SubmitRequest<'a> {
    fn from_op(op: &'a LedgerOp) -> Self {
        match op {
            LedgerOp::Mint {
                address,
                amount,
                fingerprint,
            } => Self {
                wallet: Some(address),
                from: None,
                to: None,
                amount: amount.to_string(),
                token_hash: Some(fingerprint),
            },
            LedgerOp::Transfer { from, to, amount } => Self {
                wallet: None,
                from: Some(from),
                to: Some(to),
                amount: amount.to_string(),
                token_hash: None,
            },
            LedgerOp::Burn { address, amount } => Self {
                wallet: Some(address),
                from: None,
                to: None,
                amount: amount.to_string(),
                token_hash: None,
            },
        }
    }
}

/// Submission response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    tx_hash: Option<String>,
    status: Option<String>,
    block_hash: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

/// HTTP client for the blockchain gateway service
pub struct HttpLedgerBackend {
    client: Client,
    endpoint: String,
    retry_attempts: u32,
    retry_base_delay: Duration,
}

impl HttpLedgerBackend {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            (CHANNEL_HEADER, &config.channel),
            (CHAINCODE_HEADER, &config.chaincode),
            (IDENTITY_HEADER, &config.identity),
        ] {
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("Invalid {} header value: {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build ledger HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            retry_attempts: config.retry_attempts,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/blockchain/{}", self.endpoint, path)
    }

    /// Single submission attempt
    async fn submit_once(&self, op: &LedgerOp) -> Result<LedgerResult> {
        let body = SubmitRequest::from_op(op);
        let response = self.send(self.client.post(self.url(op.function())).json(&body)).await?;

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Failed to parse ledger response: {}", e)))?;

        if let Some(err) = parsed.error {
            return Err(Error::Ledger(err));
        }

        let committed = parsed
            .status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("success") || s.eq_ignore_ascii_case("confirmed"))
            .unwrap_or(false);

        match parsed.tx_hash {
            Some(tx_id) if committed && !tx_id.is_empty() => Ok(LedgerResult {
                tx_id,
                block_ref: parsed.block_hash,
                timestamp: Utc::now(),
            }),
            _ => Err(Error::Ledger(format!(
                "{} not committed (status {})",
                op.function(),
                parsed.status.unwrap_or_else(|| "missing".to_string())
            ))),
        }
    }

    /// Send a request, mapping HTTP failures into ledger errors
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.retry_base_delay,
            max_interval: self.retry_base_delay * 4,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// 5xx may clear up on retry; anything else is a final rejection
fn status_error(status: StatusCode, body: &str) -> Error {
    if status.is_server_error() {
        Error::Ledger(format!("HTTP {}: {}", status, body))
    } else {
        Error::LedgerRejected(format!("HTTP {}: {}", status, body))
    }
}

#[async_trait]
impl LedgerBackend for HttpLedgerBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn submit(&self, op: &LedgerOp) -> Result<LedgerResult> {
        let attempts = &AtomicU32::new(0);

        let result = retry(self.backoff(), || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("Ledger {} attempt {}", op.function(), attempt);

            match self.submit_once(op).await {
                Ok(result) => Ok(result),
                Err(e) if e.is_retryable() && attempt <= self.retry_attempts => {
                    warn!("Retryable ledger error on {}: {}", op.function(), e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => {
                    error!("Permanent ledger error on {}: {}", op.function(), e);
                    Err(backoff::Error::permanent(e))
                }
            }
        })
        .await?;

        Ok(result)
    }

    async fn balance_of(&self, address: &str) -> Result<Decimal> {
        let response = self
            .send(self.client.get(self.url(&format!("balance/{}", address))))
            .await?;

        let parsed: BalanceResponse = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Failed to parse balance response: {}", e)))?;

        Ok(parsed.balance)
    }

    async fn health(&self) -> Result<Duration> {
        let start = Instant::now();
        self.send(self.client.get(self.url("health"))).await?;
        Ok(start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op_json(op: &LedgerOp) -> serde_json::Value {
        serde_json::to_value(SubmitRequest::from_op(op)).unwrap()
    }

    #[test]
    fn test_mint_body() {
        let json = op_json(&LedgerOp::Mint {
            address: "addr-1".into(),
            amount: Decimal::new(100_000000, 6),
            fingerprint: "abc=".into(),
        });
        assert_eq!(json["wallet"], "addr-1");
        assert_eq!(json["amount"], "100.000000");
        assert_eq!(json["tokenHash"], "abc=");
        assert!(json.get("from").is_none());
    }

    #[test]
    fn test_transfer_body() {
        let json = op_json(&LedgerOp::Transfer {
            from: "a".into(),
            to: "b".into(),
            amount: Decimal::ONE,
        });
        assert_eq!(json["from"], "a");
        assert_eq!(json["to"], "b");
        assert!(json.get("wallet").is_none());
    }

    #[test]
    fn test_balance_accepts_string_amounts() {
        let parsed: BalanceResponse =
            serde_json::from_str(r#"{"address":"a","balance":"1000.0","currency":"cVND"}"#).unwrap();
        assert_eq!(parsed.balance, Decimal::new(1000, 0));
    }

    #[test]
    fn test_status_errors() {
        let rejected = status_error(StatusCode::UNPROCESSABLE_ENTITY, "insufficient balance");
        assert!(matches!(rejected, Error::LedgerRejected(_)));
        assert_eq!(rejected.kind(), "ledger");
        assert!(!rejected.is_retryable());

        let unavailable = status_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(unavailable, Error::Ledger(_)));
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn test_builds_with_default_config() {
        let config = LedgerConfig {
            endpoint: "http://localhost:8082/".into(),
            ..Default::default()
        };
        let backend = HttpLedgerBackend::new(&config).unwrap();
        assert_eq!(backend.url("mint"), "http://localhost:8082/api/blockchain/mint");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_errors() {
        let config = LedgerConfig {
            endpoint: "http://127.0.0.1:1".into(),
            retry_attempts: 0,
            ..Default::default()
        };
        let backend = HttpLedgerBackend::new(&config).unwrap();
        let op = LedgerOp::Burn {
            address: "addr-1".into(),
            amount: Decimal::ONE,
        };
        assert!(backend.submit(&op).await.is_err());
    }
}
