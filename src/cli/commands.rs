//! CLI command implementations

use anyhow::Result;
use dialoguer::Confirm;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::amount;
use crate::config::Config;
use crate::settlement::{RecordStatus, SettlementOrchestrator, TransactionRecord};

async fn orchestrator(config: &Config) -> Result<SettlementOrchestrator> {
    SettlementOrchestrator::from_config(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize settlement: {}", e))
}

fn parse_user_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|e| anyhow::anyhow!("Invalid user id {}: {}", raw, e))
}

/// Register a user and allocate a PENDING wallet
pub async fn register(config: &Config, user_id: Option<String>) -> Result<()> {
    let user_id = match user_id {
        Some(raw) => parse_user_id(&raw)?,
        None => Uuid::new_v4(),
    };

    let orchestrator = orchestrator(config).await?;
    let wallet = orchestrator.register_user(user_id).await?;

    println!("\n=== USER REGISTERED ===\n");
    println!("User:    {}", wallet.user_id);
    println!("Wallet:  {}", wallet.address);
    println!("Status:  {}", wallet.status);
    println!("\nLink a bank account to activate: cvnd-settle link-bank {} <ACCOUNT>", wallet.user_id);
    Ok(())
}

/// Verify a bank account and activate the user's wallet
pub async fn link_bank(config: &Config, user_id: &str, account: &str) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    let orchestrator = orchestrator(config).await?;

    let receipt = orchestrator.link_bank(user_id, account).await?;
    println!("Bank account linked. Wallet {} is {}", receipt.address, receipt.status);
    Ok(())
}

/// Activate a wallet without a bank link
pub async fn activate(config: &Config, user_id: &str) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    let orchestrator = orchestrator(config).await?;

    let receipt = orchestrator.activate_wallet(user_id).await?;
    println!("Wallet {} is {}", receipt.address, receipt.status);
    Ok(())
}

/// Settle with the bank and mint
pub async fn deposit(config: &Config, address: &str, amount: &str) -> Result<()> {
    let amount = amount::parse(amount)?;
    let orchestrator = orchestrator(config).await?;

    let receipt = orchestrator.deposit(address, amount).await?;

    println!("\n=== DEPOSIT ===\n");
    println!("Reference:   {}", receipt.tx_ref);
    println!("Ledger tx:   {}", receipt.ledger_tx_id);
    println!("Token hash:  {}", receipt.token_hash);
    println!("Status:      {}", receipt.status);
    println!("{}", receipt.message);

    if receipt.status == RecordStatus::PendingLedger {
        warn!("Ledger unavailable, deposit {} recorded as PENDING_LEDGER", receipt.tx_ref);
    }
    Ok(())
}

/// Move tokens between wallets
pub async fn transfer(config: &Config, from: &str, to: &str, amount: &str) -> Result<()> {
    let amount = amount::parse(amount)?;
    let orchestrator = orchestrator(config).await?;

    let receipt = orchestrator.transfer(from, to, amount).await?;
    println!("Transfer {} -> {} ({}): {} [{}]", from, to, amount, receipt.ledger_tx_id, receipt.status);
    if let Some(tx_ref) = receipt.tx_ref {
        println!("Audit reference: {}", tx_ref);
    }
    Ok(())
}

/// Destroy tokens, with confirmation
pub async fn burn(config: &Config, address: &str, amount: &str, force: bool) -> Result<()> {
    let amount = amount::parse(amount)?;

    // Confirmation prompt (unless --force)
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Burn {} cVND from {}? This cannot be undone.", amount, address))
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Burn cancelled by user");
            return Ok(());
        }
    }

    let orchestrator = orchestrator(config).await?;
    let receipt = orchestrator.burn(address, amount).await?;
    println!("Burned {} from {}: {} [{}]", amount, address, receipt.ledger_tx_id, receipt.status);
    Ok(())
}

/// Show one wallet, or all wallets
pub async fn wallet(config: &Config, address: Option<String>) -> Result<()> {
    let orchestrator = orchestrator(config).await?;

    if let Some(address) = address {
        let wallet = orchestrator.wallets().get_by_address(&address).await?;

        println!("\n=== WALLET ===\n");
        println!("Address:       {}", wallet.address);
        println!("User:          {}", wallet.user_id);
        println!("Status:        {}", wallet.status);
        println!("Balance:       {} (reported)", wallet.balance);
        println!("Bank account:  {}", wallet.bank_account.as_deref().unwrap_or("(not linked)"));
        println!("Created:       {}", wallet.created_at.format("%Y-%m-%d %H:%M:%S"));
        return Ok(());
    }

    let mut wallets = orchestrator.wallets().list_wallets().await?;
    wallets.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    println!("\n=== WALLETS ===\n");
    println!("{:<46} {:<10} {:<38}", "ADDRESS", "STATUS", "USER");
    println!("{}", "-".repeat(94));
    for wallet in &wallets {
        println!("{:<46} {:<10} {:<38}", wallet.address, wallet.status.to_string(), wallet.user_id);
    }
    println!("\n{} wallet(s)", wallets.len());
    Ok(())
}

/// Query the ledger balance of a wallet
pub async fn balance(config: &Config, address: &str) -> Result<()> {
    let orchestrator = orchestrator(config).await?;

    let wallet = orchestrator.wallets().get_by_address(address).await?;
    let ledger_balance = orchestrator.ledger_balance(address).await?;

    println!("Ledger balance:   {} cVND", ledger_balance);
    println!("Reported balance: {} cVND", wallet.balance);
    Ok(())
}

/// List transaction records, newest first
pub async fn records(config: &Config, status: Option<String>, limit: usize) -> Result<()> {
    let orchestrator = orchestrator(config).await?;

    let records: Vec<TransactionRecord> = match status {
        Some(raw) => {
            let status: RecordStatus = raw.parse()?;
            let mut matching = orchestrator.records().by_status(status).await?;
            matching.truncate(limit);
            matching
        }
        None => orchestrator.records().list(limit).await?,
    };

    println!("\n=== TRANSACTION RECORDS ===\n");
    if records.is_empty() {
        println!("No records found.");
        return Ok(());
    }

    println!(
        "{:<20} {:<9} {:<16} {:>16} {:<15} {}",
        "DATE", "KIND", "REFERENCE", "AMOUNT", "STATUS", "LEDGER TX"
    );
    println!("{}", "-".repeat(110));

    for record in &records {
        println!(
            "{:<20} {:<9} {:<16} {:>16} {:<15} {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.kind.to_string(),
            shorten(&record.tx_ref, 16),
            record.amount.to_string(),
            record.status.to_string(),
            record.blockchain_tx_id
        );
    }

    println!();
    Ok(())
}

/// Show current configuration (endpoints masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check collaborator health
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let mut all_healthy = true;
    let orchestrator = orchestrator(config).await?;

    print!("Ledger ({})... ", orchestrator.ledger().backend_name());
    if config.ledger.is_offline() {
        println!("OFFLINE (no endpoint; submissions fall back)");
    } else {
        match orchestrator.ledger().health().await {
            Ok(latency) => println!("OK ({}ms)", latency.as_millis()),
            Err(e) => {
                println!("FAILED: {}", e);
                all_healthy = false;
            }
        }
    }

    print!("Bank... ");
    if config.bank.endpoint.is_empty() {
        println!("STUB (latency {}ms, failure rate {})", config.bank.latency_ms, config.bank.failure_rate);
    } else {
        println!("HTTP ({})", config.bank.endpoint);
    }

    print!("Record store... ");
    let start = Instant::now();
    match orchestrator.records().count().await {
        Ok(count) => println!("OK ({} records, {}ms)", count, start.elapsed().as_millis()),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Pending ledger records... ");
    match orchestrator.pending_ledger_records().await {
        Ok(pending) if pending.is_empty() => println!("none"),
        Ok(pending) => println!("{} awaiting reconciliation", pending.len()),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    println!();
    if all_healthy {
        println!("All systems healthy");
        Ok(())
    } else {
        Err(anyhow::anyhow!("One or more health checks failed"))
    }
}

fn shorten(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let head: String = value.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        value.to_string()
    }
}
