//! In-process bank stub
//!
//! Sleeps for the configured latency and reports success, except for a
//! configurable fraction of calls that are reported as declined.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::BankConfig;
use crate::error::{Error, Result};

use super::{BankSettlement, BankTransfer};

/// Simulated bank
pub struct MockBank {
    latency: Duration,
    failure_rate: f64,
}

impl MockBank {
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        Self {
            latency,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &BankConfig) -> Self {
        Self::new(Duration::from_millis(config.latency_ms), config.failure_rate)
    }

    /// Bank that approves every transfer immediately
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, 0.0)
    }

    /// Bank that declines every transfer
    pub fn declining() -> Self {
        Self::new(Duration::ZERO, 1.0)
    }
}

#[async_trait]
impl BankSettlement for MockBank {
    fn name(&self) -> &'static str {
        "mock-bank"
    }

    async fn transfer(&self, account_ref: Option<&str>, amount: Decimal) -> Result<BankTransfer> {
        if amount <= Decimal::ZERO {
            return Err(Error::Validation(format!("Bank transfer amount {} must be positive", amount)));
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let bank_ref = format!("MBTX-{}", Utc::now().timestamp_millis());
        let declined = self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate);

        if declined {
            warn!(
                "[BANK MOCK] Transfer declined from {} amount {}",
                account_ref.unwrap_or("-"),
                amount
            );
            return Ok(BankTransfer {
                success: false,
                bank_ref,
            });
        }

        info!(
            "[BANK MOCK] Transfer success from {} amount {} ({})",
            account_ref.unwrap_or("-"),
            amount,
            bank_ref
        );

        Ok(BankTransfer {
            success: true,
            bank_ref,
        })
    }
}
