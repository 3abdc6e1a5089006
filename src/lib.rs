//! cVND Settlement Library
//!
//! Orchestrates deposits, transfers and burns of a ledger-backed stored-value
//! token, with bank settlement, graceful ledger degradation and a durable
//! audit trail.

pub mod amount;
pub mod bank;
pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod session;
pub mod settlement;
pub mod store;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use settlement::SettlementOrchestrator;
