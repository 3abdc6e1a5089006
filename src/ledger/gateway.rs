//! Fallback-absorbing wrapper around a ledger backend

use futures::FutureExt;
use rust_decimal::Decimal;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{Error, Result};

use super::{LedgerBackend, LedgerOp, LedgerOutcome, LedgerResult};

/// Ledger gateway used by the orchestrator
pub struct LedgerGateway {
    backend: Arc<dyn LedgerBackend>,
    timeout: Duration,
    fallback_prefix: String,
}

impl LedgerGateway {
    pub fn new(backend: Arc<dyn LedgerBackend>, config: &LedgerConfig) -> Self {
        Self::with_timeout(backend, config.timeout(), &config.fallback_prefix)
    }

    pub fn with_timeout(backend: Arc<dyn LedgerBackend>, timeout: Duration, fallback_prefix: &str) -> Self {
        Self {
            backend,
            timeout,
            fallback_prefix: fallback_prefix.to_string(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Issue tokens to `address`
    pub async fn mint(&self, address: &str, amount: Decimal, fingerprint: &str) -> LedgerOutcome {
        self.submit(LedgerOp::Mint {
            address: address.to_string(),
            amount,
            fingerprint: fingerprint.to_string(),
        })
        .await
    }

    /// Move tokens between two addresses
    pub async fn transfer(&self, from: &str, to: &str, amount: Decimal) -> LedgerOutcome {
        self.submit(LedgerOp::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        })
        .await
    }

    /// Destroy tokens held by `address`
    pub async fn burn(&self, address: &str, amount: Decimal) -> LedgerOutcome {
        self.submit(LedgerOp::Burn {
            address: address.to_string(),
            amount,
        })
        .await
    }

    /// Submit an operation. Errors, timeouts and panics all degrade to a fallback.
    pub async fn submit(&self, op: LedgerOp) -> LedgerOutcome {
        let call = AssertUnwindSafe(self.backend.submit(&op)).catch_unwind();

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Ok(result))) if result.tx_id.is_empty() || result.tx_id.starts_with(&self.fallback_prefix) => {
                self.fallback(&op, format!("backend returned unusable tx id '{}'", result.tx_id))
            }
            Ok(Ok(Ok(result))) => {
                info!(
                    "Ledger {} committed: {} (amount {})",
                    op.function(),
                    result.tx_id,
                    op.amount()
                );
                LedgerOutcome::Confirmed(result)
            }
            Ok(Ok(Err(e))) => self.fallback(&op, e.to_string()),
            Ok(Err(panic)) => self.fallback(&op, format!("backend panicked: {}", panic_message(&*panic))),
            Err(_) => self.fallback(&op, Error::LedgerTimeout(self.timeout.as_millis() as u64).to_string()),
        }
    }

    /// Ledger balance of an address; zero when the ledger cannot answer
    pub async fn balance_of(&self, address: &str) -> Decimal {
        match tokio::time::timeout(self.timeout, self.backend.balance_of(address)).await {
            Ok(Ok(balance)) => balance,
            Ok(Err(e)) => {
                warn!("Balance query for {} failed, reporting 0: {}", address, e);
                Decimal::ZERO
            }
            Err(_) => {
                warn!("Balance query for {} timed out, reporting 0", address);
                Decimal::ZERO
            }
        }
    }

    /// Probe the backend
    pub async fn health(&self) -> Result<Duration> {
        tokio::time::timeout(self.timeout, self.backend.health())
            .await
            .map_err(|_| Error::LedgerTimeout(self.timeout.as_millis() as u64))?
    }

    fn fallback(&self, op: &LedgerOp, reason: String) -> LedgerOutcome {
        let tx_id = format!("{}{}", self.fallback_prefix, Uuid::new_v4());
        warn!(
            "Ledger {} via {} failed, using fallback id {}: {}",
            op.function(),
            self.backend.name(),
            tx_id,
            reason
        );

        LedgerOutcome::Fallback {
            result: LedgerResult {
                tx_id,
                block_ref: None,
                timestamp: Utc::now(),
            },
            reason,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
