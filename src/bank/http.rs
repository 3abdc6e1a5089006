//! Core-banking REST client
//!
//! `POST {endpoint}/api/banking/transfer` with `{from, to, amount, type}`.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BankConfig;
use crate::error::{Error, Result};

use super::{BankSettlement, BankTransfer};

/// Clearing account credited by deposits
pub const SETTLEMENT_ACCOUNT: &str = "cvnd-reserve";

#[derive(Debug, Clone, Serialize)]
struct TransferRequest<'a> {
    from: &'a str,
    to: &'a str,
    amount: String,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferResponse {
    tx_hash: Option<String>,
    status: Option<String>,
    error: Option<String>,
}

/// HTTP client for the core-banking service
pub struct CoreBankingClient {
    client: Client,
    endpoint: String,
}

impl CoreBankingClient {
    pub fn new(config: &BankConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build bank HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BankSettlement for CoreBankingClient {
    fn name(&self) -> &'static str {
        "core-banking"
    }

    async fn transfer(&self, account_ref: Option<&str>, amount: Decimal) -> Result<BankTransfer> {
        let from = account_ref.unwrap_or_default();
        let request = TransferRequest {
            from,
            to: SETTLEMENT_ACCOUNT,
            amount: amount.to_string(),
            kind: "deposit",
        };

        debug!("Core banking transfer {} from {}", amount, from);

        let response = self
            .client
            .post(format!("{}/api/banking/transfer", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Bank(format!("HTTP request failed: {}", e)))?;

        let http_status = response.status();
        let body: TransferResponse = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Failed to parse bank response: {}", e)))?;

        if let Some(error) = body.error {
            warn!("Core banking declined transfer: {}", error);
            return Ok(BankTransfer {
                success: false,
                bank_ref: String::new(),
            });
        }

        let success = http_status.is_success()
            && body.status.as_deref().map(|s| s.eq_ignore_ascii_case("success")).unwrap_or(false);
        let bank_ref = body.tx_hash.unwrap_or_default();

        if success {
            info!("Core banking transfer settled: {}", bank_ref);
        } else {
            warn!("Core banking transfer not settled (HTTP {})", http_status);
        }

        Ok(BankTransfer { success, bank_ref })
    }
}
