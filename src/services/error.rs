//! Request-level failures.
//!
//! These abort a request before (or instead of) producing a record. A leg that
//! ran and failed is not an error: it comes back as a record with a FAILED,
//! COMPENSATING or REVERSED status.

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::ports::RepositoryError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Account {0} does not belong to the caller")]
    Forbidden(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Idempotency key {0} was already used for a different request")]
    IdempotencyConflict(String),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Transaction store error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<LedgerError> for ServiceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound(account) => ServiceError::AccountNotFound(account),
            other => ServiceError::Ledger(other),
        }
    }
}
