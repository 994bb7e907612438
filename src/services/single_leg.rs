//! Deposits and withdrawals: one leg against the caller's own account.

use std::sync::Arc;
use tracing::info;

use crate::domain::{new_utr, LegKey, OperationType, TransactionKind, TransactionRecord};
use crate::ports::TransactionRepository;

use super::leg::{LegProcessor, LegRequest};
use super::{ServiceError, SingleLegRequest};

pub struct SingleLegOperation {
    repository: Arc<dyn TransactionRepository>,
    legs: Arc<LegProcessor>,
}

impl SingleLegOperation {
    pub fn new(repository: Arc<dyn TransactionRepository>, legs: Arc<LegProcessor>) -> Self {
        Self { repository, legs }
    }

    /// Runs a CREDIT (deposit) or DEBIT (withdraw) under the caller's key.
    ///
    /// A replay reuses the stored UTR, so a retried FAILED leg keeps its identity.
    /// Keys are scoped to the operation's kind, so transfer legs are never matched.
    pub async fn run(
        &self,
        operation: OperationType,
        req: &SingleLegRequest,
    ) -> Result<TransactionRecord, ServiceError> {
        let kind = TransactionKind::single_leg(operation);
        let key = LegKey::new(&req.idempotency_key, &req.account_number, operation, kind);

        let utr = match self.repository.find(&key).await? {
            Some(existing) if existing.amount != req.amount => {
                return Err(ServiceError::IdempotencyConflict(req.idempotency_key.clone()));
            }
            Some(existing) => existing.utr,
            None => {
                let utr = new_utr();
                info!(
                    utr = %utr,
                    account = %req.account_number,
                    operation = %operation,
                    idempotency_key = %req.idempotency_key,
                    "Starting single-leg transaction"
                );
                utr
            }
        };

        self.legs
            .process(LegRequest {
                utr: &utr,
                account_number: &req.account_number,
                amount: &req.amount,
                operation,
                kind,
                idempotency_key: &req.idempotency_key,
            })
            .await
    }
}
