//! Wallet persistence

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::json;
use crate::wallet::Wallet;

/// In-place edit of one wallet row. Returns `false` when nothing changed.
pub type WalletMutation = Box<dyn FnOnce(&mut Wallet) -> bool + Send>;

/// Storage for wallet rows, keyed by address
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Insert a new wallet; `Conflict` if the address is taken or the user already owns one
    async fn insert(&self, wallet: Wallet) -> Result<Wallet>;

    /// Apply `mutation` to the user's wallet as one read-modify-write; `NotFound` if absent
    async fn modify(&self, user_id: Uuid, mutation: WalletMutation) -> Result<Wallet>;

    async fn find_by_address(&self, address: &str) -> Result<Option<Wallet>>;

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>>;

    async fn list(&self) -> Result<Vec<Wallet>>;
}

/// In-memory wallet table with optional JSON snapshot persistence
pub struct JsonWalletStore {
    wallets: Arc<RwLock<HashMap<String, Wallet>>>,
    persistence_path: Option<PathBuf>,
}

impl JsonWalletStore {
    /// Volatile store, nothing touches disk
    pub fn in_memory() -> Self {
        Self {
            wallets: Arc::new(RwLock::new(HashMap::new())),
            persistence_path: None,
        }
    }

    /// Store backed by a snapshot file, loading any existing rows
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let wallets: HashMap<String, Wallet> = json::load(&path).await?.unwrap_or_default();
        info!("Loaded {} wallets from {}", wallets.len(), path.display());

        Ok(Self {
            wallets: Arc::new(RwLock::new(wallets)),
            persistence_path: Some(path),
        })
    }

    async fn persist(&self, wallets: &HashMap<String, Wallet>) -> Result<()> {
        if let Some(path) = &self.persistence_path {
            json::write_atomic(path, wallets).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl WalletStore for JsonWalletStore {
    async fn insert(&self, wallet: Wallet) -> Result<Wallet> {
        let mut wallets = self.wallets.write().await;

        if wallets.contains_key(&wallet.address) {
            return Err(Error::Conflict(format!(
                "Wallet address already in use: {}",
                wallet.address
            )));
        }
        if wallets.values().any(|w| w.user_id == wallet.user_id) {
            return Err(Error::Conflict(format!("User {} already has a wallet", wallet.user_id)));
        }

        let address = wallet.address.clone();
        wallets.insert(address.clone(), wallet.clone());

        if let Err(e) = self.persist(&wallets).await {
            wallets.remove(&address);
            return Err(e);
        }

        debug!("Inserted wallet {}", address);
        Ok(wallet)
    }

    async fn modify(&self, user_id: Uuid, mutation: WalletMutation) -> Result<Wallet> {
        let mut wallets = self.wallets.write().await;

        let previous = wallets
            .values()
            .find(|w| w.user_id == user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Wallet not found for user {}", user_id)))?;

        let mut wallet = previous.clone();
        if !mutation(&mut wallet) {
            return Ok(wallet);
        }
        wallets.insert(wallet.address.clone(), wallet.clone());

        if let Err(e) = self.persist(&wallets).await {
            wallets.insert(previous.address.clone(), previous);
            return Err(e);
        }

        debug!("Updated wallet {}", wallet.address);
        Ok(wallet)
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<Wallet>> {
        let wallets = self.wallets.read().await;
        Ok(wallets.get(address).cloned())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>> {
        let wallets = self.wallets.read().await;
        Ok(wallets.values().find(|w| w.user_id == user_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Wallet>> {
        let wallets = self.wallets.read().await;
        let mut all: Vec<Wallet> = wallets.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}
