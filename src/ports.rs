//! Storage port for transaction legs.
//!
//! The repository doubles as the idempotency store: `claim_or_get` is the only
//! way a leg record comes into existence, and it must be atomic on the
//! (idempotency key, account, operation) triple.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Balances, LegKey, TransactionRecord, TransactionStatus};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Illegal status transition {from} -> {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result of an attempted claim.
#[derive(Debug, Clone)]
pub struct Claim {
    pub record: TransactionRecord,
    /// True only for the caller whose insert created the record.
    pub claimed: bool,
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Inserts `record` (status INITIATED) unless its key triple already
    /// exists, in which case the stored record is returned unchanged.
    async fn claim_or_get(&self, record: &TransactionRecord) -> RepositoryResult<Claim>;

    async fn find(&self, key: &LegKey) -> RepositoryResult<Option<TransactionRecord>>;

    async fn get(&self, id: Uuid) -> RepositoryResult<TransactionRecord>;

    /// Compare-and-set on status. Returns the updated record, or `None` when the
    /// stored status is no longer `from`. Balances are wiped when entering
    /// INITIATED or FAILED, replaced when `balances` is given, kept otherwise.
    async fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        balances: Option<Balances>,
    ) -> RepositoryResult<Option<TransactionRecord>>;

    async fn list_all(&self) -> RepositoryResult<Vec<TransactionRecord>>;

    async fn find_by_utr(&self, utr: &str) -> RepositoryResult<Vec<TransactionRecord>>;

    async fn find_by_account(&self, account_number: &str) -> RepositoryResult<Vec<TransactionRecord>>;

    async fn find_by_status(&self, status: TransactionStatus) -> RepositoryResult<Vec<TransactionRecord>>;

    async fn ping(&self) -> RepositoryResult<()>;
}
