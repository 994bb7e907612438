//! Single-leg execution.
//!
//! A leg is claimed through the repository before any remote call. Only the
//! claimer talks to the ledger; everyone else gets the stored record back.

use bigdecimal::BigDecimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::domain::{Balances, OperationType, TransactionKind, TransactionRecord, TransactionStatus};
use crate::ledger::{LedgerClient, LedgerError};
use crate::ports::{RepositoryError, TransactionRepository};

use super::ServiceError;

const PERSIST_BACKOFF: Duration = Duration::from_millis(50);

/// Parameters of one leg.
#[derive(Debug, Clone, Copy)]
pub struct LegRequest<'a> {
    pub utr: &'a str,
    pub account_number: &'a str,
    pub amount: &'a BigDecimal,
    pub operation: OperationType,
    pub kind: TransactionKind,
    pub idempotency_key: &'a str,
}

/// Outcome of a claim attempt.
#[derive(Debug, Clone)]
pub enum LegClaim {
    /// This caller owns the INITIATED record and must drive the remote call.
    Claimed(TransactionRecord),
    /// Someone else owns or already decided the leg; the record is authoritative.
    Observed(TransactionRecord),
}

#[derive(Debug, Clone)]
pub struct LegSettings {
    pub call_timeout: Duration,
    pub persist_attempts: u32,
}

impl Default for LegSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            persist_attempts: 3,
        }
    }
}

pub struct LegProcessor {
    repository: Arc<dyn TransactionRepository>,
    ledger: Arc<dyn LedgerClient>,
    settings: LegSettings,
}

impl LegProcessor {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        ledger: Arc<dyn LedgerClient>,
        settings: LegSettings,
    ) -> Self {
        Self {
            repository,
            ledger,
            settings,
        }
    }

    pub fn settings(&self) -> &LegSettings {
        &self.settings
    }

    /// Claims the leg, or re-claims it if a previous attempt FAILED.
    pub async fn claim(&self, req: LegRequest<'_>) -> Result<LegClaim, ServiceError> {
        let fresh = TransactionRecord::initiated(
            req.utr,
            req.account_number,
            req.amount,
            req.operation,
            req.kind,
            req.idempotency_key,
        );

        let claim = self.repository.claim_or_get(&fresh).await?;
        if claim.claimed {
            debug!(utr = %req.utr, account = %req.account_number, operation = %req.operation, "Leg claimed");
            return Ok(LegClaim::Claimed(claim.record));
        }

        let existing = claim.record;
        if existing.status != TransactionStatus::Failed {
            debug!(
                utr = %existing.utr,
                account = %existing.account_number,
                operation = %existing.operation_type,
                status = %existing.status,
                "Leg already claimed; returning stored outcome"
            );
            return Ok(LegClaim::Observed(existing));
        }

        match self
            .repository
            .transition(existing.id, TransactionStatus::Failed, TransactionStatus::Initiated, None)
            .await?
        {
            Some(reclaimed) => {
                info!(
                    utr = %reclaimed.utr,
                    account = %reclaimed.account_number,
                    operation = %reclaimed.operation_type,
                    idempotency_key = %reclaimed.idempotency_key,
                    "Retrying failed leg"
                );
                Ok(LegClaim::Claimed(reclaimed))
            }
            None => Ok(LegClaim::Observed(self.repository.get(existing.id).await?)),
        }
    }

    /// Issues the remote mutation for a claimed record and persists the outcome.
    ///
    /// Once the call is issued this always runs to a stored SUCCESS or FAILED.
    pub async fn execute(&self, record: TransactionRecord) -> Result<TransactionRecord, ServiceError> {
        let call = async {
            match record.operation_type {
                OperationType::Debit => self.ledger.debit(&record.account_number, &record.amount).await,
                OperationType::Credit => self.ledger.credit(&record.account_number, &record.amount).await,
            }
        };

        let result = match tokio::time::timeout(self.settings.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout),
        };

        let (status, balances) = match result {
            Ok(snapshot) => (
                TransactionStatus::Success,
                Some(Balances::after(
                    record.operation_type,
                    &record.amount,
                    snapshot.current_balance,
                )),
            ),
            Err(e) => {
                warn!(
                    utr = %record.utr,
                    account = %record.account_number,
                    operation = %record.operation_type,
                    error = %e,
                    "Ledger call failed; leg marked FAILED"
                );
                (TransactionStatus::Failed, None)
            }
        };

        self.persist_outcome(&record, status, balances).await
    }

    /// Gives up a claim without calling the ledger.
    pub async fn release(&self, record: TransactionRecord) -> Result<TransactionRecord, ServiceError> {
        self.persist_outcome(&record, TransactionStatus::Failed, None).await
    }

    /// Claims the leg and, if this caller won the claim, executes it.
    pub async fn process(&self, req: LegRequest<'_>) -> Result<TransactionRecord, ServiceError> {
        match self.claim(req).await? {
            LegClaim::Claimed(record) => self.execute(record).await,
            LegClaim::Observed(record) => Ok(record),
        }
    }

    async fn persist_outcome(
        &self,
        record: &TransactionRecord,
        status: TransactionStatus,
        balances: Option<Balances>,
    ) -> Result<TransactionRecord, ServiceError> {
        let attempts = self.settings.persist_attempts.max(1);
        let mut last_error: Option<RepositoryError> = None;

        for attempt in 1..=attempts {
            match self
                .repository
                .transition(record.id, TransactionStatus::Initiated, status, balances.clone())
                .await
            {
                Ok(Some(updated)) => {
                    info!(
                        utr = %updated.utr,
                        account = %updated.account_number,
                        operation = %updated.operation_type,
                        status = %updated.status,
                        "Leg settled"
                    );
                    return Ok(updated);
                }
                Ok(None) => {
                    // The claim guarantees exclusivity, so this means someone
                    // bypassed it; the stored row wins.
                    error!(
                        utr = %record.utr,
                        account = %record.account_number,
                        operation = %record.operation_type,
                        "Leg left INITIATED under a concurrent writer"
                    );
                    return Ok(self.repository.get(record.id).await?);
                }
                Err(e) => {
                    warn!(utr = %record.utr, attempt, error = %e, "Failed to persist leg outcome");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(PERSIST_BACKOFF * attempt).await;
                    }
                }
            }
        }

        error!(
            target: "transfer_engine::critical",
            alert = "OUTCOME_NOT_PERSISTED",
            utr = %record.utr,
            account = %record.account_number,
            operation = %record.operation_type,
            outcome = %status,
            "Ledger outcome could not be recorded; leg is stuck INITIATED"
        );
        Err(last_error
            .map(ServiceError::from)
            .unwrap_or_else(|| RepositoryError::NotFound(record.id.to_string()).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryTransactionRepository;
    use crate::ledger::mock::MockLedger;

    fn processor(ledger: Arc<MockLedger>, settings: LegSettings) -> (LegProcessor, Arc<InMemoryTransactionRepository>) {
        let repo = Arc::new(InMemoryTransactionRepository::new());
        (LegProcessor::new(repo.clone(), ledger, settings), repo)
    }

    fn debit<'a>(amount: &'a BigDecimal, key: &'a str) -> LegRequest<'a> {
        LegRequest {
            utr: "utr-1",
            account_number: "A",
            amount,
            operation: OperationType::Debit,
            kind: TransactionKind::Withdrawal,
            idempotency_key: key,
        }
    }

    #[tokio::test]
    async fn test_process_records_balances() {
        let ledger = Arc::new(MockLedger::new().with_account("A", 1, "200"));
        let (legs, _) = processor(ledger.clone(), LegSettings::default());
        let amount = BigDecimal::from(50);

        let record = legs.process(debit(&amount, "k1")).await.unwrap();

        assert_eq!(record.status, TransactionStatus::Success);
        assert_eq!(record.opening_balance, Some(BigDecimal::from(200)));
        assert_eq!(record.closing_balance, Some(BigDecimal::from(150)));
    }

    #[tokio::test]
    async fn test_settled_leg_is_not_reissued() {
        let ledger = Arc::new(MockLedger::new().with_account("A", 1, "200"));
        let (legs, _) = processor(ledger.clone(), LegSettings::default());
        let amount = BigDecimal::from(50);

        legs.process(debit(&amount, "k1")).await.unwrap();
        let again = legs.process(debit(&amount, "k1")).await.unwrap();

        assert_eq!(again.status, TransactionStatus::Success);
        assert_eq!(ledger.call_count(OperationType::Debit, "A"), 1);
        assert_eq!(ledger.balance("A"), BigDecimal::from(150));
    }

    #[tokio::test]
    async fn test_failed_leg_is_reclaimed_and_retried() {
        let ledger = Arc::new(MockLedger::new().with_account("A", 1, "200"));
        ledger.fail_next(OperationType::Debit, "A", 1);
        let (legs, _) = processor(ledger.clone(), LegSettings::default());
        let amount = BigDecimal::from(50);

        let first = legs.process(debit(&amount, "k1")).await.unwrap();
        assert_eq!(first.status, TransactionStatus::Failed);
        assert!(first.closing_balance.is_none());

        let second = legs.process(debit(&amount, "k1")).await.unwrap();
        assert_eq!(second.status, TransactionStatus::Success);
        assert_eq!(second.id, first.id);
        assert_eq!(second.timestamp, first.timestamp);
        assert_eq!(ledger.call_count(OperationType::Debit, "A"), 2);
    }

    #[tokio::test]
    async fn test_timeout_marks_leg_failed() {
        let ledger = Arc::new(MockLedger::new().with_account("A", 1, "200"));
        ledger.set_delay(Duration::from_millis(200));
        let settings = LegSettings {
            call_timeout: Duration::from_millis(20),
            persist_attempts: 1,
        };
        let (legs, _) = processor(ledger, settings);
        let amount = BigDecimal::from(50);

        let record = legs.process(debit(&amount, "k1")).await.unwrap();
        assert_eq!(record.status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_in_flight_leg_is_observed_not_claimed() {
        let ledger = Arc::new(MockLedger::new().with_account("A", 1, "200"));
        let (legs, _) = processor(ledger.clone(), LegSettings::default());
        let amount = BigDecimal::from(50);

        let first = legs.claim(debit(&amount, "k1")).await.unwrap();
        assert!(matches!(first, LegClaim::Claimed(_)));

        let second = legs.claim(debit(&amount, "k1")).await.unwrap();
        match second {
            LegClaim::Observed(record) => assert_eq!(record.status, TransactionStatus::Initiated),
            LegClaim::Claimed(_) => panic!("in-flight leg must not be claimed twice"),
        }
        assert_eq!(ledger.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_release_skips_ledger() {
        let ledger = Arc::new(MockLedger::new().with_account("A", 1, "200"));
        let (legs, _) = processor(ledger.clone(), LegSettings::default());
        let amount = BigDecimal::from(50);

        let record = match legs.claim(debit(&amount, "k1")).await.unwrap() {
            LegClaim::Claimed(record) => record,
            LegClaim::Observed(_) => panic!("expected a fresh claim"),
        };
        let released = legs.release(record).await.unwrap();

        assert_eq!(released.status, TransactionStatus::Failed);
        assert_eq!(ledger.mutation_count(), 0);
    }
}
