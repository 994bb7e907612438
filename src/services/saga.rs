//! Funds-transfer saga.
//!
//! A transfer is two independent ledger mutations: DEBIT the sender, then
//! CREDIT the receiver, both tagged with one UTR. If the credit is confirmed
//! FAILED after the debit succeeded, the debit is compensated by crediting the
//! sender back under `<key>-REVERSAL`.
//!
//! ```text
//!   debit ──FAILED/INITIATED──▶ return debit
//!     │SUCCESS
//!   credit ──SUCCESS──▶ return debit (SUCCESS)
//!     │FAILED
//!   debit SUCCESS→COMPENSATING ─▶ reversal credit ──SUCCESS──▶ debit REVERSED
//!                                                   └─FAILED──▶ debit stays COMPENSATING (critical)
//! ```
//!
//! The credit retry path and the compensation path fence each other. A credit
//! retry re-claims the credit and then re-reads the debit, releasing its claim
//! unless the debit is still SUCCESS. Compensation moves the debit to
//! COMPENSATING and then waits for any in-flight credit to settle: a FAILED
//! credit is reversed, a SUCCESS credit puts the debit back to SUCCESS. The
//! debit never leaves COMPENSATING while a credit retry could still run.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::domain::{
    new_utr, reversal_key, LegKey, OperationType, TransactionKind, TransactionRecord,
    TransactionStatus,
};
use crate::ports::TransactionRepository;

use super::leg::{LegClaim, LegProcessor, LegRequest};
use super::{ServiceError, TransferRequest};

const SETTLE_POLL: Duration = Duration::from_millis(25);

pub struct TransferSaga {
    repository: Arc<dyn TransactionRepository>,
    legs: Arc<LegProcessor>,
}

impl TransferSaga {
    pub fn new(repository: Arc<dyn TransactionRepository>, legs: Arc<LegProcessor>) -> Self {
        Self { repository, legs }
    }

    /// Runs (or resumes) the transfer identified by `req.idempotency_key`.
    ///
    /// Returns the DEBIT record as the transfer's canonical record. Leg
    /// failures are encoded in its status; only request-level problems are
    /// returned as errors.
    pub async fn run(&self, req: &TransferRequest) -> Result<TransactionRecord, ServiceError> {
        let key = req.idempotency_key.as_str();
        let debit_key = LegKey::new(
            key,
            &req.sender_account_number,
            OperationType::Debit,
            TransactionKind::Transfer,
        );
        let credit_key = self.credit_key(req);

        // Credit first: a debit is always written before its credit, so a
        // credit seen here implies its debit is visible below.
        let existing_credit = self.repository.find(&credit_key).await?;
        let existing_debit = self.repository.find(&debit_key).await?;

        self.ensure_same_transfer(existing_debit.as_ref(), existing_credit.as_ref(), req)
            .await?;

        // Debit phase.
        let debit = match existing_debit {
            None => {
                let utr = new_utr();
                info!(utr = %utr, idempotency_key = %key, "Starting transfer");
                self.legs.process(self.debit_leg(&utr, req)).await?
            }
            Some(debit) => match debit.status {
                TransactionStatus::Success => debit,
                TransactionStatus::Failed => {
                    self.legs.process(self.debit_leg(&debit.utr, req)).await?
                }
                TransactionStatus::Compensating => {
                    info!(utr = %debit.utr, idempotency_key = %key, "Resuming compensation");
                    return self.compensate(debit, req).await;
                }
                TransactionStatus::Initiated | TransactionStatus::Reversed => return Ok(debit),
            },
        };

        if debit.status != TransactionStatus::Success {
            return Ok(debit);
        }

        if existing_credit.as_ref().map_or(false, TransactionRecord::is_success) {
            return Ok(debit);
        }

        // Credit phase, under the UTR fixed by the debit.
        let credit = match self.legs.claim(self.credit_leg(&debit.utr, req)).await? {
            LegClaim::Claimed(credit) => {
                let current_debit = self.repository.get(debit.id).await?;
                if current_debit.status != TransactionStatus::Success {
                    info!(
                        utr = %debit.utr,
                        status = %current_debit.status,
                        "Debit left SUCCESS while credit was being claimed; backing out"
                    );
                    self.legs.release(credit).await?;
                    return Ok(current_debit);
                }
                self.legs.execute(credit).await?
            }
            LegClaim::Observed(credit) => credit,
        };

        match credit.status {
            TransactionStatus::Success => {
                info!(utr = %debit.utr, idempotency_key = %key, "Transfer completed");
                Ok(debit)
            }
            TransactionStatus::Failed => {
                warn!(utr = %debit.utr, idempotency_key = %key, "Credit failed; compensating debit");
                self.compensate(debit, req).await
            }
            // Credit is in flight under another request, which owns the outcome.
            _ => Ok(debit),
        }
    }

    /// Moves the debit into COMPENSATING and runs the reversal once the credit
    /// is known to have failed.
    async fn compensate(
        &self,
        debit: TransactionRecord,
        req: &TransferRequest,
    ) -> Result<TransactionRecord, ServiceError> {
        let debit = match debit.status {
            TransactionStatus::Compensating => debit,
            TransactionStatus::Success => match self
                .repository
                .transition(debit.id, TransactionStatus::Success, TransactionStatus::Compensating, None)
                .await?
            {
                Some(fenced) => fenced,
                None => {
                    let current = self.repository.get(debit.id).await?;
                    if current.status != TransactionStatus::Compensating {
                        return Ok(current);
                    }
                    current
                }
            },
            _ => return Ok(debit),
        };

        match self.settled_credit_status(req).await? {
            Some(TransactionStatus::Success) => {
                info!(utr = %debit.utr, "Credit retry succeeded; abandoning compensation");
                let restored = self
                    .repository
                    .transition(debit.id, TransactionStatus::Compensating, TransactionStatus::Success, None)
                    .await?;
                match restored {
                    Some(restored) => Ok(restored),
                    None => Ok(self.repository.get(debit.id).await?),
                }
            }
            Some(TransactionStatus::Initiated) => {
                warn!(
                    utr = %debit.utr,
                    idempotency_key = %req.idempotency_key,
                    "Credit still in flight; compensation left pending"
                );
                Ok(debit)
            }
            _ => self.finish_compensation(debit, req).await,
        }
    }

    /// Re-reads the credit, waiting out a retry that re-claimed it.
    ///
    /// A retry that claims the credit after the debit entered COMPENSATING
    /// releases it without calling the ledger, so only a retry that was
    /// already past its debit check can still settle it. The wait covers one
    /// ledger call plus outcome persistence.
    async fn settled_credit_status(
        &self,
        req: &TransferRequest,
    ) -> Result<Option<TransactionStatus>, ServiceError> {
        let deadline = Instant::now() + self.legs.settings().call_timeout * 2;
        loop {
            let status = self.credit_status(req).await?;
            if status != Some(TransactionStatus::Initiated) || Instant::now() >= deadline {
                return Ok(status);
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }

    /// Runs the reversal for a debit that holds the COMPENSATING fence.
    async fn finish_compensation(
        &self,
        debit: TransactionRecord,
        req: &TransferRequest,
    ) -> Result<TransactionRecord, ServiceError> {
        let reversal = self.compensate_debit(&debit, &req.idempotency_key).await?;
        if reversal.status != TransactionStatus::Success {
            return Ok(debit);
        }

        match self
            .repository
            .transition(debit.id, TransactionStatus::Compensating, TransactionStatus::Reversed, None)
            .await?
        {
            Some(reversed) => {
                info!(utr = %reversed.utr, idempotency_key = %req.idempotency_key, "Debit reversed");
                Ok(reversed)
            }
            None => Ok(self.repository.get(debit.id).await?),
        }
    }

    /// Credits the debited amount back to the sender under the reversal key.
    ///
    /// A no-op when a successful reversal already exists.
    pub async fn compensate_debit(
        &self,
        original_debit: &TransactionRecord,
        original_key: &str,
    ) -> Result<TransactionRecord, ServiceError> {
        let reversal_key = reversal_key(original_key);
        let existing = self
            .repository
            .find(&LegKey::new(
                &reversal_key,
                &original_debit.account_number,
                OperationType::Credit,
                TransactionKind::Transfer,
            ))
            .await?;

        if let Some(reversal) = existing {
            if reversal.is_success() {
                info!(utr = %reversal.utr, "Debit already reversed");
                return Ok(reversal);
            }
        }

        let reversal = self
            .legs
            .process(LegRequest {
                utr: &original_debit.utr,
                account_number: &original_debit.account_number,
                amount: &original_debit.amount,
                operation: OperationType::Credit,
                kind: TransactionKind::Transfer,
                idempotency_key: &reversal_key,
            })
            .await?;

        match reversal.status {
            TransactionStatus::Success => {
                info!(utr = %reversal.utr, account = %reversal.account_number, "Reversal credited");
            }
            TransactionStatus::Failed => {
                error!(
                    target: "transfer_engine::critical",
                    alert = "REVERSAL_FAILED",
                    utr = %original_debit.utr,
                    account = %original_debit.account_number,
                    amount = %original_debit.amount,
                    idempotency_key = %original_key,
                    "Reversal failed: funds debited but neither credited nor returned; manual intervention required"
                );
            }
            _ => {
                info!(utr = %reversal.utr, "Reversal in flight under another request");
            }
        }

        Ok(reversal)
    }

    /// Rejects a reused key whose stored legs describe a different transfer.
    async fn ensure_same_transfer(
        &self,
        debit: Option<&TransactionRecord>,
        credit: Option<&TransactionRecord>,
        req: &TransferRequest,
    ) -> Result<(), ServiceError> {
        let conflict = || ServiceError::IdempotencyConflict(req.idempotency_key.clone());

        let debit = match (debit, credit) {
            (None, None) => return Ok(()),
            (None, Some(_)) => return Err(conflict()),
            (Some(debit), Some(credit)) if credit.utr != debit.utr => return Err(conflict()),
            (Some(debit), _) => debit,
        };

        if debit.amount != req.amount {
            return Err(conflict());
        }

        let legs = self.repository.find_by_utr(&debit.utr).await?;
        let foreign_credit = legs.iter().any(|leg| {
            leg.idempotency_key == req.idempotency_key
                && leg.operation_type == OperationType::Credit
                && leg.account_number != req.receiver_account_number
        });
        if foreign_credit {
            return Err(conflict());
        }

        Ok(())
    }

    fn debit_leg<'a>(&self, utr: &'a str, req: &'a TransferRequest) -> LegRequest<'a> {
        LegRequest {
            utr,
            account_number: &req.sender_account_number,
            amount: &req.amount,
            operation: OperationType::Debit,
            kind: TransactionKind::Transfer,
            idempotency_key: &req.idempotency_key,
        }
    }

    fn credit_leg<'a>(&self, utr: &'a str, req: &'a TransferRequest) -> LegRequest<'a> {
        LegRequest {
            utr,
            account_number: &req.receiver_account_number,
            amount: &req.amount,
            operation: OperationType::Credit,
            kind: TransactionKind::Transfer,
            idempotency_key: &req.idempotency_key,
        }
    }

    fn credit_key(&self, req: &TransferRequest) -> LegKey {
        LegKey::new(
            &req.idempotency_key,
            &req.receiver_account_number,
            OperationType::Credit,
            TransactionKind::Transfer,
        )
    }

    async fn credit_status(&self, req: &TransferRequest) -> Result<Option<TransactionStatus>, ServiceError> {
        Ok(self.repository.find(&self.credit_key(req)).await?.map(|credit| credit.status))
    }
}
