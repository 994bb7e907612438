pub mod error;
pub mod leg;
pub mod saga;
pub mod single_leg;

pub use error::ServiceError;
pub use leg::{LegProcessor, LegSettings};
pub use saga::TransferSaga;
pub use single_leg::SingleLegOperation;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{OperationType, TransactionRecord, TransactionStatus, REVERSAL_SUFFIX};
use crate::ledger::LedgerClient;
use crate::ports::TransactionRepository;
use crate::validation::{validate_single_leg, validate_transfer};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub sender_account_number: String,
    pub receiver_account_number: String,
    pub amount: BigDecimal,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleLegRequest {
    pub account_number: String,
    pub amount: BigDecimal,
    pub idempotency_key: String,
}

/// Entry point for every transaction operation.
///
/// Validates the request, confirms the caller owns the account being
/// debited or credited, then hands off to the saga or the single-leg runner.
pub struct TransactionService {
    repository: Arc<dyn TransactionRepository>,
    ledger: Arc<dyn LedgerClient>,
    saga: TransferSaga,
    single_leg: SingleLegOperation,
}

impl TransactionService {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        ledger: Arc<dyn LedgerClient>,
        settings: LegSettings,
    ) -> Self {
        let legs = Arc::new(LegProcessor::new(repository.clone(), ledger.clone(), settings));
        Self {
            saga: TransferSaga::new(repository.clone(), legs.clone()),
            single_leg: SingleLegOperation::new(repository.clone(), legs),
            repository,
            ledger,
        }
    }

    pub async fn transfer(
        &self,
        req: &TransferRequest,
        caller_user_id: i64,
    ) -> Result<TransactionRecord, ServiceError> {
        validate_transfer(
            &req.sender_account_number,
            &req.receiver_account_number,
            &req.amount,
            &req.idempotency_key,
        )?;
        self.ensure_owner(&req.sender_account_number, caller_user_id).await?;

        self.saga.run(req).await
    }

    pub async fn deposit(
        &self,
        req: &SingleLegRequest,
        caller_user_id: i64,
    ) -> Result<TransactionRecord, ServiceError> {
        self.single_leg_op(OperationType::Credit, req, caller_user_id).await
    }

    pub async fn withdraw(
        &self,
        req: &SingleLegRequest,
        caller_user_id: i64,
    ) -> Result<TransactionRecord, ServiceError> {
        self.single_leg_op(OperationType::Debit, req, caller_user_id).await
    }

    pub async fn list_all(&self) -> Result<Vec<TransactionRecord>, ServiceError> {
        Ok(self.repository.list_all().await?)
    }

    pub async fn find_by_utr(&self, utr: &str) -> Result<Vec<TransactionRecord>, ServiceError> {
        Ok(self.repository.find_by_utr(utr).await?)
    }

    pub async fn find_by_account(&self, account_number: &str) -> Result<Vec<TransactionRecord>, ServiceError> {
        Ok(self.repository.find_by_account(account_number).await?)
    }

    /// Records needing operator attention: debits stuck in COMPENSATING and
    /// the FAILED reversal credits that put them there.
    pub async fn unresolved(&self) -> Result<Vec<TransactionRecord>, ServiceError> {
        list_unresolved(self.repository.as_ref()).await
    }

    async fn single_leg_op(
        &self,
        operation: OperationType,
        req: &SingleLegRequest,
        caller_user_id: i64,
    ) -> Result<TransactionRecord, ServiceError> {
        validate_single_leg(&req.account_number, &req.amount, &req.idempotency_key)?;
        self.ensure_owner(&req.account_number, caller_user_id).await?;

        self.single_leg.run(operation, req).await
    }

    async fn ensure_owner(&self, account_number: &str, caller_user_id: i64) -> Result<(), ServiceError> {
        let account = self.ledger.get_account(account_number).await?;
        if account.user_id != caller_user_id {
            warn!(
                account = %account_number,
                caller_user_id,
                "Rejected request for an account the caller does not own"
            );
            return Err(ServiceError::Forbidden(account_number.to_string()));
        }

        info!(account = %account_number, caller_user_id, "Ownership verified");
        Ok(())
    }
}

/// Shared by the service and the `tx unresolved` CLI command.
pub async fn list_unresolved(
    repository: &dyn TransactionRepository,
) -> Result<Vec<TransactionRecord>, ServiceError> {
    let mut records: Vec<TransactionRecord> = repository
        .find_by_status(TransactionStatus::Compensating)
        .await?
        .into_iter()
        .filter(|r| r.operation_type == OperationType::Debit)
        .collect();

    records.extend(
        repository
            .find_by_status(TransactionStatus::Failed)
            .await?
            .into_iter()
            .filter(|r| {
                r.operation_type == OperationType::Credit
                    && r.idempotency_key.ends_with(REVERSAL_SUFFIX)
            }),
    );

    records.sort_by(|a, b| a.utr.cmp(&b.utr).then(a.timestamp.cmp(&b.timestamp)));
    Ok(records)
}
