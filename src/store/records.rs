//! Transaction record persistence

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::settlement::{RecordStatus, TransactionRecord};
use crate::store::json;

/// Append-only storage for transaction records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record; `Conflict` on duplicate `tx_ref` or `token_hash`
    async fn insert(&self, record: TransactionRecord) -> Result<TransactionRecord>;

    async fn find_by_ref(&self, tx_ref: &str) -> Result<Option<TransactionRecord>>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<TransactionRecord>>;

    /// Most recent first
    async fn list(&self, limit: usize) -> Result<Vec<TransactionRecord>>;

    async fn by_status(&self, status: RecordStatus) -> Result<Vec<TransactionRecord>>;

    async fn count(&self) -> Result<usize>;
}

/// In-memory record log with optional JSON snapshot persistence
pub struct JsonRecordStore {
    records: Arc<RwLock<Vec<TransactionRecord>>>,
    persistence_path: Option<PathBuf>,
}

impl JsonRecordStore {
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            persistence_path: None,
        }
    }

    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records: Vec<TransactionRecord> = json::load(&path).await?.unwrap_or_default();
        info!("Loaded {} transaction records from {}", records.len(), path.display());

        Ok(Self {
            records: Arc::new(RwLock::new(records)),
            persistence_path: Some(path),
        })
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn insert(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        let mut records = self.records.write().await;

        if records.iter().any(|r| r.tx_ref == record.tx_ref) {
            return Err(Error::Conflict(format!("Duplicate txRef {}", record.tx_ref)));
        }
        if records.iter().any(|r| r.token_hash == record.token_hash) {
            return Err(Error::Conflict(format!(
                "Duplicate tokenHash for txRef {}",
                record.tx_ref
            )));
        }

        records.push(record.clone());

        if let Some(path) = &self.persistence_path {
            if let Err(e) = json::write_atomic(path, &*records).await {
                records.pop();
                return Err(e);
            }
        }

        debug!("Persisted record {} ({})", record.tx_ref, record.status);
        Ok(record)
    }

    async fn find_by_ref(&self, tx_ref: &str) -> Result<Option<TransactionRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.tx_ref == tx_ref).cloned())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<TransactionRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.token_hash == token_hash).cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<TransactionRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    async fn by_status(&self, status: RecordStatus) -> Result<Vec<TransactionRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}
