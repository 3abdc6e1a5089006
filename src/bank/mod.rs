//! Off-chain bank settlement
//!
//! The orchestrator only sees [`BankSettlement::transfer`]. Any non-success,
//! including a transport error, is terminal for the deposit attempt.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::BankConfig;
use crate::error::Result;

pub mod http;
pub mod mock;

pub use http::CoreBankingClient;
pub use mock::MockBank;

/// Result of a bank funds movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransfer {
    pub success: bool,
    /// Settlement reference issued by the bank
    pub bank_ref: String,
}

/// Bank collaborator contract
#[async_trait]
pub trait BankSettlement: Send + Sync {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Move `amount` out of `account_ref`
    async fn transfer(&self, account_ref: Option<&str>, amount: Decimal) -> Result<BankTransfer>;
}

/// Build the configured bank collaborator
pub fn from_config(config: &BankConfig) -> Result<Arc<dyn BankSettlement>> {
    if config.endpoint.is_empty() {
        Ok(Arc::new(MockBank::from_config(config)))
    } else {
        Ok(Arc::new(CoreBankingClient::new(config)?))
    }
}
