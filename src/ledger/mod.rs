//! Ledger gateway
//!
//! Mint, transfer and burn reach the token chaincode through a
//! [`LedgerBackend`]. The [`LedgerGateway`] wraps a backend and never
//! surfaces an error: a failed, timed-out or panicking submission becomes a
//! [`LedgerOutcome::Fallback`] carrying a locally synthesized transaction id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::settlement::types::RecordStatus;

pub mod gateway;
pub mod http;

pub use gateway::LedgerGateway;
pub use http::HttpLedgerBackend;

/// A single chaincode submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerOp {
    Mint {
        address: String,
        amount: Decimal,
        /// Deposit fingerprint, passed through for chaincode-side dedup
        fingerprint: String,
    },
    Transfer {
        from: String,
        to: String,
        amount: Decimal,
    },
    Burn {
        address: String,
        amount: Decimal,
    },
}

impl LedgerOp {
    /// Chaincode function name
    pub fn function(&self) -> &'static str {
        match self {
            LedgerOp::Mint { .. } => "mint",
            LedgerOp::Transfer { .. } => "transfer",
            LedgerOp::Burn { .. } => "burn",
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            LedgerOp::Mint { amount, .. }
            | LedgerOp::Transfer { amount, .. }
            | LedgerOp::Burn { amount, .. } => *amount,
        }
    }
}

/// What the ledger (or the fallback path) reports for a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResult {
    pub tx_id: String,
    pub block_ref: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Gateway outcome. Callers branch on the variant, never on the id text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    Confirmed(LedgerResult),
    Fallback { result: LedgerResult, reason: String },
}

impl LedgerOutcome {
    pub fn result(&self) -> &LedgerResult {
        match self {
            LedgerOutcome::Confirmed(result) => result,
            LedgerOutcome::Fallback { result, .. } => result,
        }
    }

    pub fn tx_id(&self) -> &str {
        &self.result().tx_id
    }

    pub fn block_ref(&self) -> Option<&str> {
        self.result().block_ref.as_deref()
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, LedgerOutcome::Confirmed(_))
    }

    /// Record status this outcome maps to
    pub fn status(&self) -> RecordStatus {
        if self.is_confirmed() {
            RecordStatus::Success
        } else {
            RecordStatus::PendingLedger
        }
    }
}

/// Ledger backend contract
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Submit one operation and wait for its commit
    async fn submit(&self, op: &LedgerOp) -> Result<LedgerResult>;

    /// Authoritative token balance of an address
    async fn balance_of(&self, address: &str) -> Result<Decimal>;

    /// Probe the backend, returning its round-trip latency
    async fn health(&self) -> Result<Duration>;
}

/// Backend used when no ledger endpoint is configured
pub struct OfflineLedger;

#[async_trait]
impl LedgerBackend for OfflineLedger {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn submit(&self, op: &LedgerOp) -> Result<LedgerResult> {
        Err(Error::LedgerConnection(format!(
            "No ledger endpoint configured for {}",
            op.function()
        )))
    }

    async fn balance_of(&self, _address: &str) -> Result<Decimal> {
        Err(Error::LedgerConnection("No ledger endpoint configured".to_string()))
    }

    async fn health(&self) -> Result<Duration> {
        Err(Error::LedgerConnection("No ledger endpoint configured".to_string()))
    }
}

/// Build the configured ledger backend
pub fn backend_from_config(config: &LedgerConfig) -> Result<Arc<dyn LedgerBackend>> {
    if config.is_offline() {
        Ok(Arc::new(OfflineLedger))
    } else {
        Ok(Arc::new(HttpLedgerBackend::new(config)?))
    }
}
