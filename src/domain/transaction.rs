//! Transaction leg domain entity.
//! Framework-agnostic representation of one single-account ledger mutation.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Suffix appended to a transfer's idempotency key to key its compensating credit.
pub const REVERSAL_SUFFIX: &str = "-REVERSAL";

pub fn reversal_key(idempotency_key: &str) -> String {
    format!("{}{}", idempotency_key, REVERSAL_SUFFIX)
}

/// Generates a fresh unique transaction reference shared by all legs of one transfer.
pub fn new_utr() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Debit,
    Credit,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Debit => "DEBIT",
            OperationType::Credit => "CREDIT",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBIT" => Ok(OperationType::Debit),
            "CREDIT" => Ok(OperationType::Credit),
            other => Err(format!("unknown operation type: {}", other)),
        }
    }
}

/// The operation a leg belongs to.
///
/// Idempotency keys are scoped per kind: a deposit under key `k1` never
/// resolves to the CREDIT leg of transfer `k1`. Reversal credits are
/// TRANSFER legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Transfer,
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Transfer => "TRANSFER",
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdrawal => "WITHDRAWAL",
        }
    }

    /// Kind of a standalone deposit (CREDIT) or withdrawal (DEBIT).
    pub fn single_leg(operation: OperationType) -> Self {
        match operation {
            OperationType::Credit => TransactionKind::Deposit,
            OperationType::Debit => TransactionKind::Withdrawal,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSFER" => Ok(TransactionKind::Transfer),
            "DEPOSIT" => Ok(TransactionKind::Deposit),
            "WITHDRAWAL" => Ok(TransactionKind::Withdrawal),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

/// Per-leg status.
///
/// ```text
/// INITIATED -> SUCCESS | FAILED
/// FAILED    -> INITIATED                     (re-claim for retry)
/// SUCCESS   -> COMPENSATING -> REVERSED      (DEBIT legs only)
/// COMPENSATING -> SUCCESS                    (a credit retry won)
/// ```
///
/// A DEBIT left in COMPENSATING after its reversal failed needs an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Initiated,
    Success,
    Failed,
    Compensating,
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "INITIATED",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Compensating => "COMPENSATING",
            TransactionStatus::Reversed => "REVERSED",
        }
    }

    /// Terminal states never change again. SUCCESS is terminal for CREDIT legs
    /// only; a DEBIT can still be compensated.
    pub fn is_terminal(&self, operation: OperationType) -> bool {
        match self {
            TransactionStatus::Reversed => true,
            TransactionStatus::Success => operation == OperationType::Credit,
            _ => false,
        }
    }

    /// Entering INITIATED or FAILED wipes any previously observed balances.
    pub fn clears_balances(&self) -> bool {
        matches!(self, TransactionStatus::Initiated | TransactionStatus::Failed)
    }

    pub fn can_transition_to(&self, next: TransactionStatus, operation: OperationType) -> bool {
        use TransactionStatus::*;
        match (self, next) {
            (Initiated, Success) | (Initiated, Failed) | (Failed, Initiated) => true,
            (Success, Compensating) | (Compensating, Reversed) | (Compensating, Success) => {
                operation == OperationType::Debit
            }
            _ => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIATED" => Ok(TransactionStatus::Initiated),
            "SUCCESS" => Ok(TransactionStatus::Success),
            "FAILED" => Ok(TransactionStatus::Failed),
            "COMPENSATING" => Ok(TransactionStatus::Compensating),
            "REVERSED" => Ok(TransactionStatus::Reversed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// The idempotency triple, scoped by kind. Unique across the whole record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LegKey {
    pub idempotency_key: String,
    pub account_number: String,
    pub operation_type: OperationType,
    pub kind: TransactionKind,
}

impl LegKey {
    pub fn new(
        idempotency_key: &str,
        account_number: &str,
        operation_type: OperationType,
        kind: TransactionKind,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.to_string(),
            account_number: account_number.to_string(),
            operation_type,
            kind,
        }
    }
}

/// Opening/closing balances of a successful leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balances {
    pub opening: BigDecimal,
    pub closing: BigDecimal,
}

impl Balances {
    /// Reconstructs both balances from the single post-mutation balance the
    /// ledger returns.
    pub fn after(operation: OperationType, amount: &BigDecimal, new_balance: BigDecimal) -> Self {
        let opening = match operation {
            OperationType::Debit => &new_balance + amount,
            OperationType::Credit => &new_balance - amount,
        };
        Self {
            opening,
            closing: new_balance,
        }
    }
}

/// Domain entity representing one leg of a money movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: Uuid,
    pub utr: String,
    pub account_number: String,
    pub amount: BigDecimal,
    #[serde(rename = "transactionType")]
    pub operation_type: OperationType,
    pub status: TransactionStatus,
    pub kind: TransactionKind,
    pub idempotency_key: String,
    pub opening_balance: Option<BigDecimal>,
    pub closing_balance: Option<BigDecimal>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing)]
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// A fresh INITIATED leg, ready to be claimed.
    pub fn initiated(
        utr: &str,
        account_number: &str,
        amount: &BigDecimal,
        operation_type: OperationType,
        kind: TransactionKind,
        idempotency_key: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            utr: utr.to_string(),
            account_number: account_number.to_string(),
            amount: amount.clone(),
            operation_type,
            status: TransactionStatus::Initiated,
            kind,
            idempotency_key: idempotency_key.to_string(),
            opening_balance: None,
            closing_balance: None,
            timestamp: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> LegKey {
        LegKey::new(
            &self.idempotency_key,
            &self.account_number,
            self.operation_type,
            self.kind,
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    /// Applies a status transition in place. Used by the in-memory store; the
    /// Postgres store performs the same rule in SQL.
    pub fn apply_transition(&mut self, next: TransactionStatus, balances: Option<Balances>) {
        if next.clears_balances() {
            self.opening_balance = None;
            self.closing_balance = None;
        } else if let Some(balances) = balances {
            self.opening_balance = Some(balances.opening);
            self.closing_balance = Some(balances.closing);
        }
        self.status = next;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_debit_balances_reconstruct_opening() {
        let balances = Balances::after(OperationType::Debit, &dec("50"), dec("150"));
        assert_eq!(balances.opening, dec("200"));
        assert_eq!(balances.closing, dec("150"));
    }

    #[test]
    fn test_credit_balances_reconstruct_opening() {
        let balances = Balances::after(OperationType::Credit, &dec("50"), dec("60"));
        assert_eq!(balances.opening, dec("10"));
        assert_eq!(balances.closing, dec("60"));
    }

    #[test]
    fn test_reversal_key_is_deterministic() {
        assert_eq!(reversal_key("k1"), "k1-REVERSAL");
        assert_eq!(reversal_key("k1"), reversal_key("k1"));
    }

    #[test]
    fn test_single_leg_kinds_are_distinct_from_transfers() {
        let deposit = TransactionKind::single_leg(OperationType::Credit);
        let withdrawal = TransactionKind::single_leg(OperationType::Debit);
        assert_eq!(deposit, TransactionKind::Deposit);
        assert_eq!(withdrawal, TransactionKind::Withdrawal);
        assert_ne!(
            LegKey::new("k1", "B", OperationType::Credit, deposit),
            LegKey::new("k1", "B", OperationType::Credit, TransactionKind::Transfer)
        );
        assert_eq!("WITHDRAWAL".parse::<TransactionKind>().unwrap(), withdrawal);
    }

    #[test]
    fn test_leg_transitions() {
        use TransactionStatus::*;
        assert!(Initiated.can_transition_to(Success, OperationType::Debit));
        assert!(Initiated.can_transition_to(Failed, OperationType::Credit));
        assert!(Failed.can_transition_to(Initiated, OperationType::Credit));
        assert!(!Success.can_transition_to(Failed, OperationType::Debit));
        assert!(!Reversed.can_transition_to(Success, OperationType::Debit));
    }

    #[test]
    fn test_only_debits_are_compensated() {
        use TransactionStatus::*;
        assert!(Success.can_transition_to(Compensating, OperationType::Debit));
        assert!(!Success.can_transition_to(Compensating, OperationType::Credit));
        assert!(Compensating.can_transition_to(Reversed, OperationType::Debit));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransactionStatus::Reversed.is_terminal(OperationType::Debit));
        assert!(TransactionStatus::Success.is_terminal(OperationType::Credit));
        assert!(!TransactionStatus::Success.is_terminal(OperationType::Debit));
        assert!(!TransactionStatus::Failed.is_terminal(OperationType::Credit));
        assert!(!TransactionStatus::Compensating.is_terminal(OperationType::Debit));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            TransactionStatus::Initiated,
            TransactionStatus::Success,
            TransactionStatus::Failed,
            TransactionStatus::Compensating,
            TransactionStatus::Reversed,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_failed_transition_clears_balances() {
        let mut record = TransactionRecord::initiated(
            "utr-1",
            "ACC1",
            &dec("10"),
            OperationType::Debit,
            TransactionKind::Transfer,
            "k1",
        );
        record.apply_transition(
            TransactionStatus::Success,
            Some(Balances::after(OperationType::Debit, &dec("10"), dec("90"))),
        );
        assert_eq!(record.closing_balance, Some(dec("90")));

        record.apply_transition(TransactionStatus::Compensating, None);
        assert_eq!(record.opening_balance, Some(dec("100")));

        let created = record.timestamp;
        let mut retried = record.clone();
        retried.status = TransactionStatus::Failed;
        retried.apply_transition(TransactionStatus::Initiated, None);
        assert!(retried.opening_balance.is_none());
        assert!(retried.closing_balance.is_none());
        assert_eq!(retried.timestamp, created);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = TransactionRecord::initiated(
            "utr-1",
            "ACC1",
            &dec("10"),
            OperationType::Credit,
            TransactionKind::Deposit,
            "k1",
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["transactionType"], "CREDIT");
        assert_eq!(json["status"], "INITIATED");
        assert_eq!(json["accountNumber"], "ACC1");
        assert_eq!(json["idempotencyKey"], "k1");
        assert_eq!(json["kind"], "DEPOSIT");
        assert!(json["openingBalance"].is_null());
        assert!(json.get("updatedAt").is_none());
    }
}
