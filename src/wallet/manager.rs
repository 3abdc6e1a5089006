//! Wallet manager - lifecycle and activation gating
//!
//! Owns wallet creation, the one-way PENDING -> ACTIVE transition, and the
//! ACTIVE check every money-moving operation goes through.

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::WalletConfig;
use crate::error::{Error, Result};
use crate::store::WalletStore;

use super::types::{Wallet, WalletStatus};

/// Core wallet lifecycle manager
pub struct WalletManager {
    /// Wallet rows
    store: Arc<dyn WalletStore>,

    /// Prefix of generated addresses
    address_prefix: String,

    /// Accepted address shape
    address_pattern: Regex,
}

impl WalletManager {
    /// Create a new wallet manager
    pub fn new(store: Arc<dyn WalletStore>, config: &WalletConfig) -> Result<Self> {
        let address_pattern = Regex::new(&config.address_pattern)
            .map_err(|e| Error::Config(format!("Invalid address_pattern: {}", e)))?;

        Ok(Self {
            store,
            address_prefix: config.address_prefix.clone(),
            address_pattern,
        })
    }

    /// Allocate a PENDING wallet with zero balance
    pub async fn create_pending_wallet(&self, user_id: Uuid, address: &str) -> Result<Wallet> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::Validation("walletAddress required".to_string()));
        }
        if !self.address_pattern.is_match(address) {
            return Err(Error::Validation(format!("Malformed wallet address: {}", address)));
        }

        if self.store.find_by_user(user_id).await?.is_some() {
            return Err(Error::Conflict(format!("User {} already has a wallet", user_id)));
        }

        let wallet = self.store.insert(Wallet::pending(user_id, address)).await?;
        info!("Created PENDING wallet {} for user {}", wallet.address, user_id);
        Ok(wallet)
    }

    /// Registration path: create a PENDING wallet under a generated address
    pub async fn register_user(&self, user_id: Uuid) -> Result<Wallet> {
        let address = format!("{}{}", self.address_prefix, Uuid::new_v4());
        self.create_pending_wallet(user_id, &address).await
    }

    /// Flip the user's wallet to ACTIVE. Idempotent.
    pub async fn activate(&self, user_id: Uuid) -> Result<Wallet> {
        let wallet = self
            .store
            .modify(
                user_id,
                Box::new(|wallet: &mut Wallet| {
                    if wallet.status == WalletStatus::Active {
                        return false;
                    }
                    wallet.status = WalletStatus::Active;
                    wallet.updated_at = Utc::now();
                    true
                }),
            )
            .await?;

        info!("Wallet {} active for user {}", wallet.address, user_id);
        Ok(wallet)
    }

    /// Record the bank account confirmed by a successful link
    pub async fn attach_bank_account(&self, user_id: Uuid, account_ref: &str) -> Result<Wallet> {
        let account_ref = account_ref.to_string();
        let wallet = self
            .store
            .modify(
                user_id,
                Box::new(move |wallet: &mut Wallet| {
                    if wallet.bank_account.as_deref() == Some(account_ref.as_str()) {
                        return false;
                    }
                    wallet.bank_account = Some(account_ref);
                    wallet.updated_at = Utc::now();
                    true
                }),
            )
            .await?;

        debug!("Bank account attached to {}", wallet.address);
        Ok(wallet)
    }

    /// Lookup by ledger address
    pub async fn get_by_address(&self, address: &str) -> Result<Wallet> {
        self.store
            .find_by_address(address)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Wallet not found for address {}", address)))
    }

    /// Lookup by owning user
    pub async fn get_by_user_id(&self, user_id: Uuid) -> Result<Wallet> {
        self.store
            .find_by_user(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Wallet not found for user {}", user_id)))
    }

    /// Resolve a wallet and require it to be ACTIVE
    pub async fn ensure_active(&self, address: &str) -> Result<Wallet> {
        let wallet = self.get_by_address(address).await?;
        if !wallet.status.can_move_funds() {
            return Err(Error::Precondition(format!(
                "Wallet not active: {} is {}",
                wallet.address, wallet.status
            )));
        }
        Ok(wallet)
    }

    /// List all wallets
    pub async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        self.store.list().await
    }
}
