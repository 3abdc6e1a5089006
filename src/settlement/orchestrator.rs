//! Settlement orchestrator
//!
//! Every money movement goes through one primitive, [`SettlementOrchestrator::settle`]:
//!
//! 1. validate the request (no collaborator is touched on failure)
//! 2. optionally lock the involved addresses
//! 3. gate on every involved wallet being ACTIVE
//! 4. on a spawned task, phase 1 (deposits only): bank settlement; failure
//!    aborts with no record
//! 5. on the same task, phase 2: ledger submission, then the audit record
//!
//! Both phases run detached from the caller's future, so dropping the request
//! once the bank call has started still gets the ledger call and the record
//! written.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::amount;
use crate::bank::{self, BankSettlement};
use crate::config::{Config, OrchestratorConfig};
use crate::error::{Error, Result};
use crate::hash;
use crate::ledger::{self, LedgerGateway, LedgerOp, LedgerOutcome};
use crate::session::{InMemorySessionStore, SessionStore};
use crate::store::{JsonRecordStore, JsonWalletStore, RecordStore};
use crate::wallet::{Wallet, WalletManager};

use super::locks::{WalletGuards, WalletLocks};
use super::types::{
    ActivationReceipt, DepositReceipt, LedgerReceipt, OperationKind, RecordStatus, TransactionRecord,
};

/// Outcome of the shared settlement primitive
#[derive(Debug, Clone)]
pub struct Settled {
    pub tx_ref: String,
    pub token_hash: String,
    pub outcome: LedgerOutcome,
    /// Set when an audit record was written
    pub record: Option<TransactionRecord>,
}

/// Saga coordinator for deposit, transfer and burn
pub struct SettlementOrchestrator {
    wallets: Arc<WalletManager>,
    records: Arc<dyn RecordStore>,
    ledger: Arc<LedgerGateway>,
    bank: Arc<dyn BankSettlement>,
    sessions: Arc<dyn SessionStore>,
    locks: Arc<WalletLocks>,
    policy: OrchestratorConfig,
    verification_amount: Decimal,
}

impl SettlementOrchestrator {
    pub fn new(
        wallets: Arc<WalletManager>,
        records: Arc<dyn RecordStore>,
        ledger: Arc<LedgerGateway>,
        bank: Arc<dyn BankSettlement>,
        sessions: Arc<dyn SessionStore>,
        policy: OrchestratorConfig,
    ) -> Self {
        Self {
            wallets,
            records,
            ledger,
            bank,
            sessions,
            locks: Arc::new(WalletLocks::new()),
            policy,
            verification_amount: Decimal::ONE,
        }
    }

    /// Amount moved by the bank when verifying a newly linked account
    pub fn with_verification_amount(mut self, amount: Decimal) -> Self {
        self.verification_amount = amount;
        self
    }

    /// Wire up every collaborator from configuration, with JSON stores under `store.data_dir`
    pub async fn from_config(config: &Config) -> Result<Self> {
        let wallet_store = Arc::new(JsonWalletStore::open(config.store.wallets_path()).await?);
        let records = Arc::new(JsonRecordStore::open(config.store.records_path()).await?);
        let wallets = Arc::new(WalletManager::new(wallet_store, &config.wallet)?);

        let backend = ledger::backend_from_config(&config.ledger)?;
        let gateway = Arc::new(LedgerGateway::new(backend, &config.ledger));
        let bank = bank::from_config(&config.bank)?;
        let sessions = Arc::new(InMemorySessionStore::from_config(&config.session));
        let verification_amount = amount::ensure_positive(amount::parse(&config.bank.verification_amount)?)?;

        info!(
            "Settlement orchestrator ready (ledger: {}, bank: {})",
            gateway.backend_name(),
            bank.name()
        );

        Ok(Self::new(wallets, records, gateway, bank, sessions, config.orchestrator.clone())
            .with_verification_amount(verification_amount))
    }

    pub fn wallets(&self) -> &WalletManager {
        &self.wallets
    }

    pub fn records(&self) -> &dyn RecordStore {
        self.records.as_ref()
    }

    pub fn ledger(&self) -> &LedgerGateway {
        &self.ledger
    }

    /// Issue tokens after settling the same amount with the bank
    pub async fn deposit(&self, wallet_address: &str, amount: Decimal) -> Result<DepositReceipt> {
        let settled = self.settle(OperationKind::Deposit, wallet_address, None, amount).await?;

        let message = match &settled.outcome {
            LedgerOutcome::Confirmed(_) => "Deposit settled".to_string(),
            LedgerOutcome::Fallback { .. } => "Deposit accepted, ledger submission pending".to_string(),
        };

        Ok(DepositReceipt {
            ledger_tx_id: settled.outcome.tx_id().to_string(),
            status: settled.outcome.status(),
            tx_ref: settled.tx_ref,
            token_hash: settled.token_hash,
            message,
        })
    }

    /// Move tokens between two ACTIVE wallets
    pub async fn transfer(&self, from: &str, to: &str, amount: Decimal) -> Result<LedgerReceipt> {
        let settled = self.settle(OperationKind::Transfer, from, Some(to), amount).await?;
        Ok(Self::ledger_receipt(settled))
    }

    /// Transfer from the wallet owned by the session's user
    pub async fn transfer_from_session(&self, token: &str, to: &str, amount: Decimal) -> Result<LedgerReceipt> {
        let user_id = self
            .sessions
            .get(token)
            .await?
            .ok_or_else(|| Error::Unauthorized("Invalid or expired session".to_string()))?;

        let wallet = self.wallets.get_by_user_id(user_id).await?;
        self.transfer(&wallet.address, to, amount).await
    }

    /// Destroy tokens held by an ACTIVE wallet
    pub async fn burn(&self, wallet_address: &str, amount: Decimal) -> Result<LedgerReceipt> {
        let settled = self.settle(OperationKind::Burn, wallet_address, None, amount).await?;
        Ok(Self::ledger_receipt(settled))
    }

    /// Create a PENDING wallet for a new user
    pub async fn register_user(&self, user_id: Uuid) -> Result<Wallet> {
        self.wallets.register_user(user_id).await
    }

    /// Bind a fresh session token to `user_id`
    pub async fn open_session(&self, user_id: Uuid) -> Result<String> {
        self.wallets.get_by_user_id(user_id).await?;

        let token = Uuid::new_v4().to_string();
        self.sessions.put(&token, user_id).await?;
        Ok(token)
    }

    pub async fn close_session(&self, token: &str) -> Result<()> {
        self.sessions.expire(token).await
    }

    pub async fn activate_wallet(&self, user_id: Uuid) -> Result<ActivationReceipt> {
        let wallet = self.wallets.activate(user_id).await?;
        Ok(ActivationReceipt {
            user_id,
            address: wallet.address,
            status: wallet.status,
        })
    }

    /// Verify a bank account with a small transfer, then attach it and activate the wallet
    pub async fn link_bank(&self, user_id: Uuid, account_ref: &str) -> Result<ActivationReceipt> {
        let account_ref = account_ref.trim();
        if account_ref.is_empty() {
            return Err(Error::Validation("bankAccount required".to_string()));
        }

        let wallet = self.wallets.get_by_user_id(user_id).await?;
        if wallet.is_active() && wallet.bank_account.as_deref() == Some(account_ref) {
            debug!("Bank account already linked for {}", wallet.address);
            return Ok(ActivationReceipt {
                user_id,
                address: wallet.address,
                status: wallet.status,
            });
        }

        if let Err(e) = settle_with_bank(self.bank.as_ref(), Some(account_ref), self.verification_amount).await {
            warn!("Bank link verification failed for {}: {}", wallet.address, e);
            return Err(e);
        }

        self.wallets.attach_bank_account(user_id, account_ref).await?;
        let receipt = self.activate_wallet(user_id).await?;

        info!("Bank account linked for {}", receipt.address);
        Ok(receipt)
    }

    /// Authoritative ledger balance of a known wallet
    pub async fn ledger_balance(&self, address: &str) -> Result<Decimal> {
        let wallet = self.wallets.get_by_address(address).await?;
        Ok(self.ledger.balance_of(&wallet.address).await)
    }

    /// Records still waiting for a ledger commit
    pub async fn pending_ledger_records(&self) -> Result<Vec<TransactionRecord>> {
        self.records.by_status(RecordStatus::PendingLedger).await
    }

    /// Shared settlement primitive
    pub async fn settle(
        &self,
        kind: OperationKind,
        wallet_address: &str,
        counterparty: Option<&str>,
        amount: Decimal,
    ) -> Result<Settled> {
        let wallet_address = required_address(wallet_address, "walletAddress")?;
        let counterparty = match (kind, counterparty) {
            (OperationKind::Transfer, Some(to)) => Some(required_address(to, "toAddress")?),
            (OperationKind::Transfer, None) => {
                return Err(Error::Validation("toAddress required".to_string()));
            }
            (_, _) => None,
        };
        if counterparty == Some(wallet_address) {
            return Err(Error::Validation("Cannot transfer to the same wallet".to_string()));
        }
        let amount = amount::ensure_positive(amount)?;

        let guards = if self.policy.serialize_per_wallet {
            let mut addresses = vec![wallet_address];
            addresses.extend(counterparty);
            self.locks.acquire(&addresses).await
        } else {
            WalletGuards::none()
        };

        let wallet = self.wallets.ensure_active(wallet_address).await?;
        if let Some(to) = counterparty {
            self.wallets.ensure_active(to).await?;
        }

        let tx_ref = hash::new_tx_ref();
        let token_hash = hash::token_hash(amount, &wallet.address, &tx_ref);

        let op = match kind {
            OperationKind::Deposit => LedgerOp::Mint {
                address: wallet.address.clone(),
                amount,
                fingerprint: token_hash.clone(),
            },
            OperationKind::Transfer => LedgerOp::Transfer {
                from: wallet.address.clone(),
                to: counterparty.unwrap_or_default().to_string(),
                amount,
            },
            OperationKind::Burn => LedgerOp::Burn {
                address: wallet.address.clone(),
                amount,
            },
        };

        let pending = TransactionRecord {
            id: Uuid::new_v4(),
            tx_ref: tx_ref.clone(),
            kind,
            wallet_address: wallet.address.clone(),
            counterparty: counterparty.map(str::to_string),
            amount,
            bank_ref: None,
            token_hash: token_hash.clone(),
            blockchain_tx_id: String::new(),
            block_hash: None,
            status: RecordStatus::PendingLedger,
            created_at: Utc::now(),
        };

        let audit = self.should_audit(kind);
        let record_ref = tx_ref.clone();
        let ledger = self.ledger.clone();
        let records = self.records.clone();
        let bank = kind.requires_bank_settlement().then(|| self.bank.clone());
        let bank_account = wallet.bank_account.clone();

        // Detached from the caller's future
        let settlement = tokio::spawn(async move {
            let _guards = guards;

            let bank_ref = match bank {
                Some(bank) => match settle_with_bank(bank.as_ref(), bank_account.as_deref(), amount).await {
                    Ok(bank_ref) => Some(bank_ref),
                    Err(e) => {
                        warn!("{} {} aborted before ledger: {}", kind, record_ref, e);
                        return Err(e);
                    }
                },
                None => None,
            };

            let outcome = ledger.submit(op).await;

            let record = if audit {
                let record = TransactionRecord {
                    blockchain_tx_id: outcome.tx_id().to_string(),
                    block_hash: outcome.block_ref().map(str::to_string),
                    status: outcome.status(),
                    bank_ref,
                    created_at: Utc::now(),
                    ..pending
                };
                match records.insert(record).await {
                    Ok(record) => Some(record),
                    Err(e) => {
                        error!(
                            "Failed to persist {} record {} (ledger id {}): {}",
                            kind,
                            record_ref,
                            outcome.tx_id(),
                            e
                        );
                        return Err(e);
                    }
                }
            } else {
                None
            };

            Ok::<_, Error>((outcome, record))
        });

        let (outcome, record) = settlement.await??;

        info!(
            "{} {} {} for {}: {} ({})",
            kind,
            tx_ref,
            outcome.status(),
            wallet.address,
            outcome.tx_id(),
            amount
        );

        Ok(Settled {
            tx_ref,
            token_hash,
            outcome,
            record,
        })
    }

    fn should_audit(&self, kind: OperationKind) -> bool {
        match kind {
            OperationKind::Deposit => true,
            OperationKind::Transfer => self.policy.audit_transfers,
            OperationKind::Burn => self.policy.audit_burns,
        }
    }

    fn ledger_receipt(settled: Settled) -> LedgerReceipt {
        LedgerReceipt {
            ledger_tx_id: settled.outcome.tx_id().to_string(),
            status: settled.outcome.status(),
            tx_ref: settled.record.map(|r| r.tx_ref),
        }
    }
}

async fn settle_with_bank(bank: &dyn BankSettlement, account_ref: Option<&str>, amount: Decimal) -> Result<String> {
    let transfer = bank
        .transfer(account_ref, amount)
        .await
        .map_err(|e| Error::Settlement(format!("{} unavailable: {}", bank.name(), e)))?;
    if !transfer.success {
        return Err(Error::Settlement(format!("{} declined the transfer", bank.name())));
    }
    Ok(transfer.bank_ref)
}

fn required_address<'a>(address: &'a str, field: &str) -> Result<&'a str> {
    let address = address.trim();
    if address.is_empty() {
        return Err(Error::Validation(format!("{} required", field)));
    }
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::BankTransfer;
    use crate::config::WalletConfig;
    use crate::ledger::{LedgerBackend, LedgerResult};
    use crate::store::JsonWalletStore;
    use crate::wallet::WalletStatus;
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Clone, Copy)]
    enum LedgerBehavior {
        Commit,
        Refuse,
        Hang,
        Panic,
        Slow(u64),
    }

    struct ScriptedLedger {
        behavior: LedgerBehavior,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedLedger {
        fn new(behavior: LedgerBehavior) -> Self {
            Self {
                behavior,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn committed() -> LedgerResult {
            LedgerResult {
                tx_id: "TX123".into(),
                block_ref: Some("block-1".into()),
                timestamp: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl LedgerBackend for ScriptedLedger {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn submit(&self, _op: &LedgerOp) -> Result<LedgerResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let result = match self.behavior {
                LedgerBehavior::Commit => Ok(Self::committed()),
                LedgerBehavior::Refuse => Err(Error::LedgerConnection("connection refused".into())),
                LedgerBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Self::committed())
                }
                LedgerBehavior::Panic => panic!("ledger client crashed"),
                LedgerBehavior::Slow(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(Self::committed())
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn balance_of(&self, _address: &str) -> Result<Decimal> {
            Ok(Decimal::new(42, 0))
        }

        async fn health(&self) -> Result<Duration> {
            Ok(Duration::ZERO)
        }
    }

    struct ScriptedBank {
        approve: bool,
        latency: Duration,
        calls: AtomicUsize,
        last_account: StdMutex<Option<String>>,
    }

    impl ScriptedBank {
        fn new(approve: bool) -> Self {
            Self {
                approve,
                latency: Duration::ZERO,
                calls: AtomicUsize::new(0),
                last_account: StdMutex::new(None),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BankSettlement for ScriptedBank {
        fn name(&self) -> &'static str {
            "scripted-bank"
        }

        async fn transfer(&self, account_ref: Option<&str>, _amount: Decimal) -> Result<BankTransfer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_account.lock().unwrap() = account_ref.map(str::to_string);
            tokio::time::sleep(self.latency).await;
            Ok(BankTransfer {
                success: self.approve,
                bank_ref: "MBTX-1".into(),
            })
        }
    }

    struct Harness {
        orchestrator: SettlementOrchestrator,
        ledger: Arc<ScriptedLedger>,
        bank: Arc<ScriptedBank>,
        records: Arc<JsonRecordStore>,
    }

    fn harness_with(ledger: LedgerBehavior, approve: bool, policy: OrchestratorConfig) -> Harness {
        harness_with_bank(ledger, ScriptedBank::new(approve), policy)
    }

    fn harness_with_bank(ledger: LedgerBehavior, bank: ScriptedBank, policy: OrchestratorConfig) -> Harness {
        let ledger = Arc::new(ScriptedLedger::new(ledger));
        let bank = Arc::new(bank);
        let records = Arc::new(JsonRecordStore::in_memory());
        let wallets = Arc::new(
            WalletManager::new(Arc::new(JsonWalletStore::in_memory()), &WalletConfig::default()).unwrap(),
        );
        let gateway = Arc::new(LedgerGateway::with_timeout(
            ledger.clone(),
            Duration::from_millis(300),
            "FALLBACK-",
        ));

        let orchestrator = SettlementOrchestrator::new(
            wallets,
            records.clone(),
            gateway,
            bank.clone(),
            Arc::new(InMemorySessionStore::new(None)),
            policy,
        );

        Harness {
            orchestrator,
            ledger,
            bank,
            records,
        }
    }

    fn harness(ledger: LedgerBehavior) -> Harness {
        harness_with(ledger, true, OrchestratorConfig::default())
    }

    async fn active_wallet(h: &Harness, address: &str) -> Uuid {
        let user = Uuid::new_v4();
        h.orchestrator.wallets().create_pending_wallet(user, address).await.unwrap();
        h.orchestrator.activate_wallet(user).await.unwrap();
        user
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_deposit_confirmed() {
        let h = harness(LedgerBehavior::Commit);
        active_wallet(&h, "addr-1").await;

        let receipt = h.orchestrator.deposit("addr-1", d("100.000000")).await.unwrap();
        assert_eq!(receipt.status, RecordStatus::Success);
        assert_eq!(receipt.ledger_tx_id, "TX123");
        assert_eq!(receipt.token_hash, hash::token_hash(d("100"), "addr-1", &receipt.tx_ref));

        let record = h.records.find_by_ref(&receipt.tx_ref).await.unwrap().unwrap();
        assert_eq!(record.amount.to_string(), "100.000000");
        assert_eq!(record.status, RecordStatus::Success);
        assert_eq!(record.blockchain_tx_id, "TX123");
        assert_eq!(record.block_hash.as_deref(), Some("block-1"));
        assert_eq!(record.bank_ref.as_deref(), Some("MBTX-1"));
        assert_eq!(h.records.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deposit_ledger_refused_falls_back() {
        let h = harness(LedgerBehavior::Refuse);
        active_wallet(&h, "addr-1").await;

        let receipt = h.orchestrator.deposit("addr-1", d("100")).await.unwrap();
        assert_eq!(receipt.status, RecordStatus::PendingLedger);
        assert!(receipt.ledger_tx_id.starts_with("FALLBACK-"));

        let record = h.records.find_by_ref(&receipt.tx_ref).await.unwrap().unwrap();
        assert_eq!(record.blockchain_tx_id, receipt.ledger_tx_id);
        assert_eq!(record.status, RecordStatus::PendingLedger);
        assert!(record.block_hash.is_none());
        assert_eq!(h.orchestrator.pending_ledger_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deposit_ledger_timeout_falls_back() {
        let h = harness(LedgerBehavior::Hang);
        active_wallet(&h, "addr-1").await;

        let receipt = h.orchestrator.deposit("addr-1", d("5")).await.unwrap();
        assert_eq!(receipt.status, RecordStatus::PendingLedger);
        assert!(receipt.ledger_tx_id.starts_with("FALLBACK-"));
        assert_eq!(h.records.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deposit_ledger_panic_still_persists() {
        let h = harness(LedgerBehavior::Panic);
        active_wallet(&h, "addr-1").await;

        let receipt = assert_ok!(h.orchestrator.deposit("addr-1", d("5")).await);
        assert_eq!(receipt.status, RecordStatus::PendingLedger);
        assert_eq!(h.records.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_positive_amount_touches_nothing() {
        let h = harness(LedgerBehavior::Commit);
        active_wallet(&h, "addr-1").await;
        active_wallet(&h, "addr-2").await;

        for amount in [d("0"), d("-5"), d("0.0000001")] {
            assert!(matches!(
                h.orchestrator.deposit("addr-1", amount).await,
                Err(Error::Validation(_))
            ));
            assert!(matches!(
                h.orchestrator.transfer("addr-1", "addr-2", amount).await,
                Err(Error::Validation(_))
            ));
            assert!(matches!(h.orchestrator.burn("addr-1", amount).await, Err(Error::Validation(_))));
        }

        assert_eq!(h.bank.calls(), 0);
        assert_eq!(h.ledger.calls(), 0);
        assert_eq!(h.records.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_addresses_are_validation_errors() {
        let h = harness(LedgerBehavior::Commit);
        assert!(matches!(h.orchestrator.deposit(" ", d("1")).await, Err(Error::Validation(_))));
        assert!(matches!(
            h.orchestrator.transfer("addr-1", "", d("1")).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            h.orchestrator.transfer("addr-1", "addr-1", d("1")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_wallet_is_gated() {
        let h = harness(LedgerBehavior::Commit);
        h.orchestrator
            .wallets()
            .create_pending_wallet(Uuid::new_v4(), "addr-pending")
            .await
            .unwrap();
        active_wallet(&h, "addr-2").await;

        let result = h.orchestrator.transfer("addr-pending", "addr-2", d("10")).await;
        assert!(matches!(result, Err(Error::Precondition(_))));

        let result = h.orchestrator.deposit("addr-pending", d("10")).await;
        assert!(matches!(result, Err(Error::Precondition(_))));

        let result = h.orchestrator.transfer("addr-2", "addr-pending", d("10")).await;
        assert!(matches!(result, Err(Error::Precondition(_))));

        assert_eq!(h.bank.calls(), 0);
        assert_eq!(h.ledger.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_wallet_is_not_found() {
        let h = harness(LedgerBehavior::Commit);
        let result = h.orchestrator.burn("nobody", d("1")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bank_decline_leaves_store_unchanged() {
        let h = harness_with(LedgerBehavior::Commit, false, OrchestratorConfig::default());
        active_wallet(&h, "addr-1").await;

        let result = h.orchestrator.deposit("addr-1", d("100")).await;
        assert!(matches!(result, Err(Error::Settlement(_))));
        assert_eq!(h.bank.calls(), 1);
        assert_eq!(h.ledger.calls(), 0);
        assert_eq!(h.records.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transfer_and_burn_not_audited_by_default() {
        let h = harness(LedgerBehavior::Commit);
        active_wallet(&h, "addr-1").await;
        active_wallet(&h, "addr-2").await;

        let transfer = h.orchestrator.transfer("addr-1", "addr-2", d("3")).await.unwrap();
        let burn = h.orchestrator.burn("addr-1", d("1")).await.unwrap();

        assert_eq!(transfer.ledger_tx_id, "TX123");
        assert!(transfer.tx_ref.is_none());
        assert_eq!(burn.status, RecordStatus::Success);
        assert_eq!(h.bank.calls(), 0);
        assert_eq!(h.ledger.calls(), 2);
        assert_eq!(h.records.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_audit_policy_persists_transfers_and_burns() {
        let policy = OrchestratorConfig {
            audit_transfers: true,
            audit_burns: true,
            ..Default::default()
        };
        let h = harness_with(LedgerBehavior::Refuse, true, policy);
        active_wallet(&h, "addr-1").await;
        active_wallet(&h, "addr-2").await;

        let transfer = h.orchestrator.transfer("addr-1", "addr-2", d("3")).await.unwrap();
        let tx_ref = transfer.tx_ref.expect("audited transfer has a reference");
        let record = h.records.find_by_ref(&tx_ref).await.unwrap().unwrap();
        assert_eq!(record.kind, OperationKind::Transfer);
        assert_eq!(record.counterparty.as_deref(), Some("addr-2"));
        assert_eq!(record.status, RecordStatus::PendingLedger);
        assert!(record.bank_ref.is_none());

        h.orchestrator.burn("addr-1", d("1")).await.unwrap();
        assert_eq!(h.records.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_deposit_still_persists() {
        let h = Arc::new(harness(LedgerBehavior::Slow(100)));
        active_wallet(&h, "addr-1").await;

        let request = {
            let h = h.clone();
            tokio::spawn(async move { h.orchestrator.deposit("addr-1", d("7")).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(250)).await;
        let records = h.records.list(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RecordStatus::Success);
    }

    #[tokio::test]
    async fn test_deposit_cancelled_during_bank_call_still_persists() {
        let bank = ScriptedBank {
            latency: Duration::from_millis(100),
            ..ScriptedBank::new(true)
        };
        let h = Arc::new(harness_with_bank(LedgerBehavior::Commit, bank, OrchestratorConfig::default()));
        active_wallet(&h, "addr-1").await;

        let request = {
            let h = h.clone();
            tokio::spawn(async move { h.orchestrator.deposit("addr-1", d("7")).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(h.bank.calls(), 1);
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(250)).await;
        let records = h.records.list(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bank_ref.as_deref(), Some("MBTX-1"));
        assert_eq!(records[0].status, RecordStatus::Success);
    }

    #[tokio::test]
    async fn test_serialized_operations_do_not_overlap() {
        let policy = OrchestratorConfig {
            serialize_per_wallet: true,
            ..Default::default()
        };
        let h = harness_with(LedgerBehavior::Slow(20), true, policy);
        active_wallet(&h, "addr-1").await;

        let deposits = (0..4).map(|_| h.orchestrator.deposit("addr-1", d("1")));
        for result in futures::future::join_all(deposits).await {
            assert_ok!(result);
        }

        assert_eq!(h.ledger.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(h.records.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_unserialized_operations_overlap() {
        let h = harness(LedgerBehavior::Slow(20));
        active_wallet(&h, "addr-1").await;

        let deposits = (0..4).map(|_| h.orchestrator.deposit("addr-1", d("1")));
        futures::future::join_all(deposits).await;

        assert!(h.ledger.max_in_flight.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_repeated_deposits_get_distinct_references() {
        let h = harness(LedgerBehavior::Commit);
        active_wallet(&h, "addr-1").await;

        let first = h.orchestrator.deposit("addr-1", d("1")).await.unwrap();
        let second = h.orchestrator.deposit("addr-1", d("1")).await.unwrap();
        assert_ne!(first.tx_ref, second.tx_ref);
        assert_ne!(first.token_hash, second.token_hash);
        assert_eq!(h.records.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_transfer_from_session() {
        let h = harness(LedgerBehavior::Commit);
        let user = active_wallet(&h, "addr-1").await;
        active_wallet(&h, "addr-2").await;

        let token = h.orchestrator.open_session(user).await.unwrap();
        let receipt = h
            .orchestrator
            .transfer_from_session(&format!("Bearer {}", token), "addr-2", d("5"))
            .await
            .unwrap();
        assert_eq!(receipt.status, RecordStatus::Success);

        h.orchestrator.close_session(&token).await.unwrap();
        let result = h.orchestrator.transfer_from_session(&token, "addr-2", d("5")).await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));
        assert_eq!(h.ledger.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_session_is_unauthorized() {
        let h = harness(LedgerBehavior::Commit);
        let result = h.orchestrator.transfer_from_session("not-a-token", "addr-2", d("5")).await;
        assert_err!(&result);
        assert!(matches!(result, Err(Error::Unauthorized(_))));
        assert_eq!(h.ledger.calls(), 0);
    }

    #[tokio::test]
    async fn test_link_bank_activates_and_deposits_debit_account() {
        let h = harness(LedgerBehavior::Commit);
        let user = Uuid::new_v4();
        let wallet = h.orchestrator.register_user(user).await.unwrap();
        assert_eq!(wallet.status, WalletStatus::Pending);

        let receipt = h.orchestrator.link_bank(user, "0123456789").await.unwrap();
        assert_eq!(receipt.status, WalletStatus::Active);
        assert_eq!(h.bank.calls(), 1);

        h.orchestrator.deposit(&wallet.address, d("10")).await.unwrap();
        assert_eq!(h.bank.last_account.lock().unwrap().as_deref(), Some("0123456789"));

        // relinking the same account is a no-op
        h.orchestrator.link_bank(user, "0123456789").await.unwrap();
        assert_eq!(h.bank.calls(), 2);
    }

    #[tokio::test]
    async fn test_link_bank_failure_keeps_wallet_pending() {
        let h = harness_with(LedgerBehavior::Commit, false, OrchestratorConfig::default());
        let user = Uuid::new_v4();
        h.orchestrator.register_user(user).await.unwrap();

        let result = h.orchestrator.link_bank(user, "0123456789").await;
        assert!(matches!(result, Err(Error::Settlement(_))));

        let wallet = h.orchestrator.wallets().get_by_user_id(user).await.unwrap();
        assert_eq!(wallet.status, WalletStatus::Pending);
        assert!(wallet.bank_account.is_none());
    }

    #[tokio::test]
    async fn test_ledger_balance() {
        let h = harness(LedgerBehavior::Commit);
        active_wallet(&h, "addr-1").await;

        assert_eq!(h.orchestrator.ledger_balance("addr-1").await.unwrap(), Decimal::new(42, 0));
        assert!(matches!(
            h.orchestrator.ledger_balance("nobody").await,
            Err(Error::NotFound(_))
        ));
    }
}
