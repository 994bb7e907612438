use crate::config::Config;
use crate::ledger::{LedgerClient, LedgerError};
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub ledger: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// The ledger is allowed to be down at boot; the breaker handles it.
    pub fn is_valid(&self) -> bool {
        self.environment && self.database
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Ledger Connectivity:   {}", status(self.ledger));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(
    config: &Config,
    pool: &PgPool,
    ledger: &dyn LedgerClient,
) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        ledger: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = validate_ledger(ledger).await {
        report.ledger = false;
        report.errors.push(format!("Ledger: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.ledger_service_url.is_empty() {
        anyhow::bail!("LEDGER_SERVICE_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.ledger_timeout.is_zero() {
        anyhow::bail!("LEDGER_TIMEOUT_MS must be greater than 0");
    }
    if config.database_statement_timeout.is_zero() {
        // Postgres reads 0 as "no timeout".
        anyhow::bail!("DATABASE_STATEMENT_TIMEOUT_MS must be greater than 0");
    }
    if config.ledger_cb_failure_threshold == 0 {
        anyhow::bail!("LEDGER_CB_FAILURE_THRESHOLD must be greater than 0");
    }

    url::Url::parse(&config.ledger_service_url)
        .context("LEDGER_SERVICE_URL is not a valid URL")?;

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_ledger(ledger: &dyn LedgerClient) -> Result<()> {
    match ledger.get_account("STARTUPPROBE0").await {
        Ok(_) | Err(LedgerError::AccountNotFound(_)) => Ok(()),
        Err(LedgerError::Unauthorized) => {
            anyhow::bail!("ledger rejected the internal secret")
        }
        Err(e) => Err(anyhow::Error::new(e).context("Failed to reach ledger service")),
    }
}
