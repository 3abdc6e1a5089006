//! Settlement records and receipts

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Money-movement kinds handled by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Bank settlement followed by mint
    Deposit,
    /// Ledger-only movement between two wallets
    Transfer,
    /// Ledger-only destruction of balance
    Burn,
}

impl OperationKind {
    /// Whether this kind settles with the bank before touching the ledger
    pub fn requires_bank_settlement(&self) -> bool {
        matches!(self, OperationKind::Deposit)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Deposit => write!(f, "deposit"),
            OperationKind::Transfer => write!(f, "transfer"),
            OperationKind::Burn => write!(f, "burn"),
        }
    }
}

/// Outcome recorded for an orchestration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    /// Ledger confirmed the submission
    Success,
    /// Ledger unreachable; the ledger id is a local fallback
    PendingLedger,
    /// Terminal failure. Not produced by the current flows.
    Failed,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Success => write!(f, "SUCCESS"),
            RecordStatus::PendingLedger => write!(f, "PENDING_LEDGER"),
            RecordStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for RecordStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "SUCCESS" => Ok(RecordStatus::Success),
            "PENDING_LEDGER" | "PENDING" => Ok(RecordStatus::PendingLedger),
            "FAILED" => Ok(RecordStatus::Failed),
            other => Err(Error::Validation(format!("Unknown record status: {}", other))),
        }
    }
}

/// Durable audit record of one orchestrated operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Internal identifier
    pub id: Uuid,

    /// Externally visible settlement reference (unique)
    pub tx_ref: String,

    #[serde(default = "default_kind")]
    pub kind: OperationKind,

    /// Source wallet (or the only wallet for deposit/burn)
    pub wallet_address: String,

    /// Destination wallet for transfers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,

    /// Amount at scale 6
    pub amount: Decimal,

    /// Bank settlement reference, deposits only
    pub bank_ref: Option<String>,

    /// Fingerprint over (amount, wallet address, tx_ref), unique
    pub token_hash: String,

    /// Ledger-issued or fallback transaction id
    pub blockchain_tx_id: String,

    pub block_hash: Option<String>,

    pub status: RecordStatus,

    pub created_at: DateTime<Utc>,
}

fn default_kind() -> OperationKind {
    OperationKind::Deposit
}

/// Response of a deposit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReceipt {
    pub tx_ref: String,
    pub ledger_tx_id: String,
    pub token_hash: String,
    pub status: RecordStatus,
    pub message: String,
}

/// Response of a transfer or burn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub ledger_tx_id: String,
    pub status: RecordStatus,
    /// Present when the operation was audited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
}

/// Response of wallet activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationReceipt {
    pub user_id: Uuid,
    pub address: String,
    pub status: crate::wallet::WalletStatus,
}
