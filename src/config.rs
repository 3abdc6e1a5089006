//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub bank: BankConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

/// Ledger backend connection
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// REST ledger gateway base URL; empty means offline (every call falls back)
    #[serde(default = "default_ledger_endpoint")]
    pub endpoint: String,
    /// Channel the token chaincode is installed on
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_chaincode")]
    pub chaincode: String,
    /// Connection profile handed to the ledger gateway
    #[serde(default = "default_network_config_path")]
    pub network_config_path: String,
    /// Signing identity the gateway submits as
    #[serde(default = "default_identity")]
    pub identity: String,
    /// Upper bound for a single submission, retries included
    #[serde(default = "default_ledger_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Literal prefix of synthesized transaction ids
    #[serde(default = "default_fallback_prefix")]
    pub fallback_prefix: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ledger_endpoint(),
            channel: default_channel(),
            chaincode: default_chaincode(),
            network_config_path: default_network_config_path(),
            identity: default_identity(),
            timeout_ms: default_ledger_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            fallback_prefix: default_fallback_prefix(),
        }
    }
}

impl LedgerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn is_offline(&self) -> bool {
        self.endpoint.trim().is_empty()
    }
}

/// Off-chain bank settlement
#[derive(Debug, Clone, Deserialize)]
pub struct BankConfig {
    /// Core-banking base URL; empty uses the in-process stub
    #[serde(default)]
    pub endpoint: String,
    /// Simulated processing latency of the stub
    #[serde(default = "default_bank_latency_ms")]
    pub latency_ms: u64,
    /// Probability (0.0 - 1.0) that the stub reports failure
    #[serde(default)]
    pub failure_rate: f64,
    /// Amount moved to verify a newly linked account
    #[serde(default = "default_verification_amount")]
    pub verification_amount: String,
    #[serde(default = "default_bank_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            latency_ms: default_bank_latency_ms(),
            failure_rate: 0.0,
            verification_amount: default_verification_amount(),
            timeout_ms: default_bank_timeout_ms(),
        }
    }
}

/// Orchestration policy switches
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestratorConfig {
    /// Persist a transaction record for transfers
    #[serde(default)]
    pub audit_transfers: bool,
    /// Persist a transaction record for burns
    #[serde(default)]
    pub audit_burns: bool,
    /// Hold a per-address lock for the duration of each operation
    #[serde(default)]
    pub serialize_per_wallet: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StoreConfig {
    pub fn wallets_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("wallets.json")
    }

    pub fn records_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("transactions.json")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds; 0 keeps sessions for the process lifetime
    #[serde(default)]
    pub ttl_secs: u64,
}

impl SessionConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Prefix of generated wallet addresses
    #[serde(default = "default_address_prefix")]
    pub address_prefix: String,
    /// Accepted address shape
    #[serde(default = "default_address_pattern")]
    pub address_pattern: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            address_prefix: default_address_prefix(),
            address_pattern: default_address_pattern(),
        }
    }
}

// Default value functions
fn default_ledger_endpoint() -> String {
    std::env::var("LEDGER_ENDPOINT").unwrap_or_default()
}

fn default_channel() -> String {
    "kindchannel".to_string()
}

fn default_chaincode() -> String {
    "cvnd-token".to_string()
}

fn default_network_config_path() -> String {
    std::env::var("FABRIC_NETWORKCONFIGPATH").unwrap_or_else(|_| {
        "/opt/gopath/src/github.com/hyperledger/fabric/peer/config/connection-profile.yaml".into()
    })
}

fn default_identity() -> String {
    std::env::var("FABRIC_USER").unwrap_or_else(|_| "Admin@mb.kindledger.com".into())
}

fn default_ledger_timeout_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_fallback_prefix() -> String {
    "FALLBACK-".to_string()
}

fn default_bank_latency_ms() -> u64 {
    300
}

fn default_verification_amount() -> String {
    "1".to_string()
}

fn default_bank_timeout_ms() -> u64 {
    10000
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_address_prefix() -> String {
    "klw-".to_string()
}

fn default_address_pattern() -> String {
    r"^[A-Za-z0-9][A-Za-z0-9_.:\-]{2,127}$".to_string()
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("ledger.timeout_ms", default_ledger_timeout_ms() as i64)?
            .set_default("ledger.fallback_prefix", default_fallback_prefix())?
            .set_default("store.data_dir", default_data_dir())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix CVND_)
            .add_source(
                config::Environment::with_prefix("CVND")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.ledger.timeout_ms == 0 {
            anyhow::bail!("ledger.timeout_ms must be positive");
        }

        if self.ledger.fallback_prefix.trim().is_empty() {
            anyhow::bail!("ledger.fallback_prefix cannot be empty");
        }

        if !self.ledger.is_offline() {
            url::Url::parse(&self.ledger.endpoint)
                .with_context(|| format!("Invalid ledger endpoint: {}", self.ledger.endpoint))?;
        }

        if !self.bank.endpoint.is_empty() {
            url::Url::parse(&self.bank.endpoint)
                .with_context(|| format!("Invalid bank endpoint: {}", self.bank.endpoint))?;
        }

        if !(0.0..=1.0).contains(&self.bank.failure_rate) {
            anyhow::bail!("bank.failure_rate must be between 0 and 1");
        }

        let verification = crate::amount::parse(&self.bank.verification_amount)
            .context("Invalid bank.verification_amount")?;
        crate::amount::ensure_positive(verification)
            .context("bank.verification_amount must be positive")?;

        let pattern = regex::Regex::new(&self.wallet.address_pattern)
            .with_context(|| format!("Invalid address_pattern regex: {}", self.wallet.address_pattern))?;

        let sample = format!("{}00000000-0000-0000-0000-000000000000", self.wallet.address_prefix);
        if !pattern.is_match(&sample) {
            anyhow::bail!(
                "Generated addresses with prefix '{}' would not match address_pattern",
                self.wallet.address_prefix
            );
        }

        if self.orchestrator.serialize_per_wallet {
            tracing::info!("Per-wallet serialization enabled - concurrent operations on one address will queue");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Ledger:
    endpoint: {}
    channel: {}
    chaincode: {}
    identity: {}
    timeout: {}ms
    retries: {}
    fallback_prefix: {}
  Bank:
    endpoint: {}
    latency: {}ms
    failure_rate: {}
  Orchestrator:
    audit_transfers: {}
    audit_burns: {}
    serialize_per_wallet: {}
  Store:
    data_dir: {}
  Session:
    ttl: {}
"#,
            if self.ledger.is_offline() {
                "(offline)".to_string()
            } else {
                mask_url(&self.ledger.endpoint)
            },
            self.ledger.channel,
            self.ledger.chaincode,
            self.ledger.identity,
            self.ledger.timeout_ms,
            self.ledger.retry_attempts,
            self.ledger.fallback_prefix,
            if self.bank.endpoint.is_empty() {
                "(stub)".to_string()
            } else {
                mask_url(&self.bank.endpoint)
            },
            self.bank.latency_ms,
            self.bank.failure_rate,
            self.orchestrator.audit_transfers,
            self.orchestrator.audit_burns,
            self.orchestrator.serialize_per_wallet,
            self.store.data_dir,
            match self.session.ttl_secs {
                0 => "process lifetime".to_string(),
                secs => format!("{}s", secs),
            },
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            bank: BankConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            store: StoreConfig::default(),
            session: SessionConfig::default(),
            wallet: WalletConfig::default(),
        }
    }
}
