//! Wallet lifecycle module
//!
//! Wallets are created PENDING when a user registers and become ACTIVE once,
//! after a successful bank link. Deposit, transfer and burn refuse to run
//! against any wallet that is not ACTIVE.
//!
//! ```text
//! register_user ──► PENDING ──(link_bank / activate)──► ACTIVE
//! ```

pub mod manager;
pub mod types;

pub use manager::WalletManager;
pub use types::{Wallet, WalletStatus};
