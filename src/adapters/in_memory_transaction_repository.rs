//! In-process implementation of TransactionRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Balances, LegKey, TransactionRecord, TransactionStatus};
use crate::ports::{Claim, RepositoryError, RepositoryResult, TransactionRepository};

#[derive(Default)]
struct Inner {
    records: HashMap<Uuid, TransactionRecord>,
    by_key: HashMap<LegKey, Uuid>,
}

/// A thread-safe in-memory transaction store.
///
/// Check-and-insert happens under one write lock, which gives `claim_or_get`
/// the same at-most-one-claimer guarantee as the Postgres unique constraint.
#[derive(Default, Clone)]
pub struct InMemoryTransactionRepository {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn filtered<F>(&self, predicate: F) -> Vec<TransactionRecord>
    where
        F: Fn(&TransactionRecord) -> bool,
    {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner
            .records
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.timestamp);
        records
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn claim_or_get(&self, record: &TransactionRecord) -> RepositoryResult<Claim> {
        let mut inner = self.inner.write().await;
        let key = record.key();

        if let Some(id) = inner.by_key.get(&key) {
            let existing = inner
                .records
                .get(id)
                .cloned()
                .ok_or_else(|| RepositoryError::Corrupt(format!("dangling key index for {}", id)))?;
            return Ok(Claim {
                record: existing,
                claimed: false,
            });
        }

        inner.by_key.insert(key, record.id);
        inner.records.insert(record.id, record.clone());
        Ok(Claim {
            record: record.clone(),
            claimed: true,
        })
    }

    async fn find(&self, key: &LegKey) -> RepositoryResult<Option<TransactionRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_key
            .get(key)
            .and_then(|id| inner.records.get(id))
            .cloned())
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<TransactionRecord> {
        let inner = self.inner.read().await;
        inner
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        balances: Option<Balances>,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        if record.status != from {
            return Ok(None);
        }
        if !from.can_transition_to(to, record.operation_type) {
            return Err(RepositoryError::InvalidTransition { from, to });
        }

        record.apply_transition(to, balances);
        Ok(Some(record.clone()))
    }

    async fn list_all(&self) -> RepositoryResult<Vec<TransactionRecord>> {
        let mut records = self.filtered(|_| true).await;
        records.reverse();
        Ok(records)
    }

    async fn find_by_utr(&self, utr: &str) -> RepositoryResult<Vec<TransactionRecord>> {
        Ok(self.filtered(|r| r.utr == utr).await)
    }

    async fn find_by_account(&self, account_number: &str) -> RepositoryResult<Vec<TransactionRecord>> {
        let mut records = self.filtered(|r| r.account_number == account_number).await;
        records.reverse();
        Ok(records)
    }

    async fn find_by_status(&self, status: TransactionStatus) -> RepositoryResult<Vec<TransactionRecord>> {
        Ok(self.filtered(|r| r.status == status).await)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
