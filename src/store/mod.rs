//! Local relational store
//!
//! Wallet rows and transaction records. Each write is a single-row insert or
//! update performed under one lock acquisition; the snapshot write happens
//! inside that boundary and is rolled back in memory if it fails. No store
//! call is ever held open across bank or ledger I/O.

pub mod json;
pub mod records;
pub mod wallets;

pub use records::{JsonRecordStore, RecordStore};
pub use wallets::{JsonWalletStore, WalletMutation, WalletStore};
