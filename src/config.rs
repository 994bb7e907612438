use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::LegSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsBackend {
    Env,
    Vault,
}

impl FromStr for SecretsBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "env" => Ok(SecretsBackend::Env),
            "vault" => Ok(SecretsBackend::Vault),
            other => anyhow::bail!("SECRETS_BACKEND must be 'env' or 'vault', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_statement_timeout: Duration,
    pub ledger_service_url: String,
    /// Set when `SECRETS_BACKEND=env`; resolved from Vault at startup otherwise.
    pub internal_secret: Option<String>,
    pub secrets_backend: SecretsBackend,
    pub ledger_timeout: Duration,
    pub ledger_cb_failure_threshold: u32,
    pub ledger_cb_reset_secs: u64,
    pub persist_retry_attempts: u32,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        let secrets_backend: SecretsBackend = env_or("SECRETS_BACKEND", "env")?;
        let internal_secret = env::var("INTERNAL_SECRET").ok().filter(|s| !s.is_empty());
        if secrets_backend == SecretsBackend::Env && internal_secret.is_none() {
            anyhow::bail!("INTERNAL_SECRET is required when SECRETS_BACKEND=env");
        }

        Ok(Config {
            server_port: env_or("SERVER_PORT", "8083")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", "10")?,
            database_statement_timeout: Duration::from_millis(env_or(
                "DATABASE_STATEMENT_TIMEOUT_MS",
                "5000",
            )?),
            ledger_service_url: env::var("LEDGER_SERVICE_URL")
                .context("LEDGER_SERVICE_URL is required")?,
            internal_secret,
            secrets_backend,
            ledger_timeout: Duration::from_millis(env_or("LEDGER_TIMEOUT_MS", "5000")?),
            ledger_cb_failure_threshold: env_or("LEDGER_CB_FAILURE_THRESHOLD", "5")?,
            ledger_cb_reset_secs: env_or("LEDGER_CB_RESET_SECS", "30")?,
            persist_retry_attempts: env_or("PERSIST_RETRY_ATTEMPTS", "3")?,
            log_format: env_or("LOG_FORMAT", "pretty")?,
        })
    }

    pub fn leg_settings(&self) -> LegSettings {
        LegSettings {
            call_timeout: self.ledger_timeout,
            persist_attempts: self.persist_retry_attempts,
        }
    }
}

fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_backend_parse() {
        assert_eq!("env".parse::<SecretsBackend>().unwrap(), SecretsBackend::Env);
        assert_eq!("Vault".parse::<SecretsBackend>().unwrap(), SecretsBackend::Vault);
        assert!("file".parse::<SecretsBackend>().is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_env_or_uses_default_and_reports_bad_values() {
        let port: u16 = env_or("TRANSFER_ENGINE_TEST_UNSET_PORT", "8083").unwrap();
        assert_eq!(port, 8083);

        let err = env_or::<u16>("TRANSFER_ENGINE_TEST_UNSET_PORT", "not-a-port").unwrap_err();
        assert!(err.to_string().contains("TRANSFER_ENGINE_TEST_UNSET_PORT"));
    }
}
