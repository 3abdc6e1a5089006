//! Core types for wallet lifecycle
//!
//! Defines the wallet row and its activation status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wallet row owned by the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    /// Synthetic identifier
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Ledger address, unique and immutable once assigned
    pub address: String,

    /// Reported balance. Never mutated by the settlement flows; the
    /// authoritative balance lives on the ledger.
    pub balance: Decimal,

    /// Activation status
    pub status: WalletStatus,

    /// Bank account linked during activation, debited by deposits
    #[serde(default)]
    pub bank_account: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// New wallet in PENDING state with zero balance
    pub fn pending(user_id: Uuid, address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            address: address.into(),
            balance: Decimal::ZERO,
            status: WalletStatus::Pending,
            bank_account: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WalletStatus::Active
    }
}

/// Wallet activation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
    /// Created at registration, cannot move money
    Pending,

    /// Bank link confirmed
    Active,

    /// Declared for completeness; no modeled flow enters it
    Suspended,
}

impl WalletStatus {
    /// Check if this status allows deposit, transfer and burn
    pub fn can_move_funds(&self) -> bool {
        matches!(self, WalletStatus::Active)
    }
}

impl std::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletStatus::Pending => write!(f, "PENDING"),
            WalletStatus::Active => write!(f, "ACTIVE"),
            WalletStatus::Suspended => write!(f, "SUSPENDED"),
        }
    }
}
