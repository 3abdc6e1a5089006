//! Settlement orchestration
//!
//! Deposit, transfer and burn share one saga: validate, gate on wallet
//! status, settle with the bank (deposits only), submit to the ledger and
//! write the audit record.

pub mod locks;
pub mod orchestrator;
pub mod types;

pub use locks::WalletLocks;
pub use orchestrator::{Settled, SettlementOrchestrator};
pub use types::{
    ActivationReceipt, DepositReceipt, LedgerReceipt, OperationKind, RecordStatus, TransactionRecord,
};
