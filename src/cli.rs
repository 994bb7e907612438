use clap::{Parser, Subcommand};
use sqlx::PgPool;

use crate::adapters::PostgresTransactionRepository;
use crate::config::Config;
use crate::domain::TransactionRecord;
use crate::ports::TransactionRepository;

#[derive(Parser)]
#[command(name = "transfer-engine")]
#[command(about = "Transfer Engine - idempotent funds-transfer saga over a remote ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction inspection commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Print the configuration with secrets masked
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Show every leg recorded under one UTR
    Utr {
        #[arg(value_name = "UTR")]
        utr: String,
    },

    /// List records that need manual intervention
    Unresolved,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_utr(pool: &PgPool, utr: &str) -> anyhow::Result<()> {
    let repository = PostgresTransactionRepository::new(pool.clone());
    let legs = repository.find_by_utr(utr).await?;

    if legs.is_empty() {
        tracing::warn!(utr = %utr, "No legs found");
        anyhow::bail!("No transaction found for UTR {}", utr);
    }

    print_records(&legs);
    Ok(())
}

pub async fn handle_tx_unresolved(pool: &PgPool) -> anyhow::Result<()> {
    let repository = PostgresTransactionRepository::new(pool.clone());
    let records = crate::services::list_unresolved(&repository).await?;

    if records.is_empty() {
        println!("✓ No unresolved transactions");
        return Ok(());
    }

    println!("⚠️  {} record(s) need manual intervention:", records.len());
    print_records(&records);
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    tracing::info!("Database migrations completed");
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Database Max Connections: {}", config.database_max_connections);
    println!(
        "  Database Statement Timeout: {}ms",
        config.database_statement_timeout.as_millis()
    );
    println!("  Ledger Service URL: {}", config.ledger_service_url);
    println!("  Secrets Backend: {:?}", config.secrets_backend);
    println!(
        "  Internal Secret: {}",
        if config.internal_secret.is_some() { "****" } else { "(from vault)" }
    );
    println!("  Ledger Timeout: {} ms", config.ledger_timeout.as_millis());
    println!(
        "  Ledger Circuit Breaker: {} failures, {}s reset",
        config.ledger_cb_failure_threshold, config.ledger_cb_reset_secs
    );
    println!("  Persist Retry Attempts: {}", config.persist_retry_attempts);
    println!("  Log Format: {:?}", config.log_format);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn print_records(records: &[TransactionRecord]) {
    println!(
        "{:<38} {:<36} {:<14} {:<7} {:<10} {:>14} {:<13} {:<24}",
        "UTR", "ID", "Account", "Type", "Kind", "Amount", "Status", "Idempotency Key"
    );
    println!("{}", "-".repeat(163));

    for r in records {
        println!(
            "{:<38} {:<36} {:<14} {:<7} {:<10} {:>14} {:<13} {:<24}",
            r.utr,
            r.id,
            r.account_number,
            r.operation_type.as_str(),
            r.kind.as_str(),
            r.amount.to_string(),
            r.status.as_str(),
            r.idempotency_key
        );
    }
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
