//! Ledger collaborator contract.
//!
//! The ledger owns account balances. Each `credit`/`debit` is an atomic
//! read-modify-write on a single account that never lets the balance go
//! negative; the saga relies on that and adds no locking of its own.

pub mod client;
#[cfg(test)]
pub mod mock;

pub use client::HttpLedgerClient;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Insufficient funds in account {0}")]
    InsufficientFunds(String),
    #[error("Ledger rejected the internal credential")]
    Unauthorized,
    #[error("Ledger rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Ledger call timed out")]
    Timeout,
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid response from ledger: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl LedgerError {
    /// Whether the error says something about ledger health rather than about
    /// the specific request. Only these trip the circuit breaker.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Timeout
            | LedgerError::Unavailable(_)
            | LedgerError::InvalidResponse(_)
            | LedgerError::CircuitBreakerOpen(_) => true,
            LedgerError::Rejected { status, .. } => *status >= 500,
            LedgerError::AccountNotFound(_)
            | LedgerError::InsufficientFunds(_)
            | LedgerError::Unauthorized => false,
        }
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LedgerError::Timeout
        } else if err.is_decode() {
            LedgerError::InvalidResponse(err.to_string())
        } else {
            LedgerError::Unavailable(err.to_string())
        }
    }
}

/// Account view returned by every ledger endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub account_number: String,
    pub current_balance: BigDecimal,
    /// Owner of the account.
    pub user_id: i64,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_account(&self, account_number: &str) -> Result<AccountSnapshot, LedgerError>;

    /// Adds `amount`; returns the account with its post-mutation balance.
    async fn credit(&self, account_number: &str, amount: &BigDecimal) -> Result<AccountSnapshot, LedgerError>;

    /// Subtracts `amount`; fails with `InsufficientFunds` if that would make
    /// the balance negative.
    async fn debit(&self, account_number: &str, amount: &BigDecimal) -> Result<AccountSnapshot, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_errors_do_not_count_as_outages() {
        assert!(!LedgerError::InsufficientFunds("A".into()).is_transient());
        assert!(!LedgerError::AccountNotFound("A".into()).is_transient());
        assert!(!LedgerError::Rejected { status: 400, message: String::new() }.is_transient());
        assert!(LedgerError::Rejected { status: 503, message: String::new() }.is_transient());
        assert!(LedgerError::Timeout.is_transient());
    }

    #[test]
    fn test_account_snapshot_wire_format() {
        let snapshot: AccountSnapshot = serde_json::from_str(
            r#"{"accountNumber":"ACC1","currentBalance":"150.00","userId":7,"ifscCode":"X"}"#,
        )
        .unwrap();
        assert_eq!(snapshot.account_number, "ACC1");
        assert_eq!(snapshot.current_balance, "150".parse::<BigDecimal>().unwrap());
        assert_eq!(snapshot.user_id, 7);
    }
}
