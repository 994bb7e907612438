//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Balances, LegKey, OperationType, TransactionRecord, TransactionStatus};
use crate::ports::{Claim, RepositoryError, RepositoryResult, TransactionRepository};

const COLUMNS: &str = "id, utr, account_number, amount, transaction_type, status, kind, \
     idempotency_key, opening_balance, closing_balance, created_at, updated_at";

/// Postgres-backed transaction repository.
///
/// Claim atomicity comes from the `uq_transactions_leg` unique constraint:
/// concurrent inserts of the same triple collapse onto one row.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, sql: &str, bind: &str) -> RepositoryResult<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRow>(sql)
            .bind(bind)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn claim_or_get(&self, record: &TransactionRecord) -> RepositoryResult<Claim> {
        let inserted = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (idempotency_key, account_number, transaction_type, kind) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(record.id)
        .bind(&record.utr)
        .bind(&record.account_number)
        .bind(&record.amount)
        .bind(record.operation_type.as_str())
        .bind(record.status.as_str())
        .bind(record.kind.as_str())
        .bind(&record.idempotency_key)
        .bind(&record.opening_balance)
        .bind(&record.closing_balance)
        .bind(record.timestamp)
        .bind(record.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(Claim {
                record: row.into_domain()?,
                claimed: true,
            });
        }

        // Lost the race (or a retry): the committed row is authoritative.
        let existing = self
            .find(&record.key())
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("{:?}", record.key())))?;

        Ok(Claim {
            record: existing,
            claimed: false,
        })
    }

    async fn find(&self, key: &LegKey) -> RepositoryResult<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions \
             WHERE idempotency_key = $1 AND account_number = $2 AND transaction_type = $3 AND kind = $4"
        ))
        .bind(&key.idempotency_key)
        .bind(&key.account_number)
        .bind(key.operation_type.as_str())
        .bind(key.kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<TransactionRecord> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain)
            .transpose()?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        balances: Option<Balances>,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        let credit_allowed = from.can_transition_to(to, OperationType::Credit);
        if !credit_allowed && !from.can_transition_to(to, OperationType::Debit) {
            return Err(RepositoryError::InvalidTransition { from, to });
        }

        let (opening, closing) = match balances {
            Some(b) => (Some(b.opening), Some(b.closing)),
            None => (None, None),
        };

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE transactions SET
                status = $3,
                opening_balance = CASE WHEN $4 THEN NULL ELSE COALESCE($5, opening_balance) END,
                closing_balance = CASE WHEN $4 THEN NULL ELSE COALESCE($6, closing_balance) END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2 AND ($7 OR transaction_type = 'DEBIT')
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(to.clears_balances())
        .bind(opening)
        .bind(closing)
        .bind(credit_allowed)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn list_all(&self) -> RepositoryResult<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn find_by_utr(&self, utr: &str) -> RepositoryResult<Vec<TransactionRecord>> {
        self.fetch_many(
            &format!("SELECT {COLUMNS} FROM transactions WHERE utr = $1 ORDER BY created_at ASC"),
            utr,
        )
        .await
    }

    async fn find_by_account(&self, account_number: &str) -> RepositoryResult<Vec<TransactionRecord>> {
        self.fetch_many(
            &format!(
                "SELECT {COLUMNS} FROM transactions WHERE account_number = $1 ORDER BY created_at DESC"
            ),
            account_number,
        )
        .await
    }

    async fn find_by_status(&self, status: TransactionStatus) -> RepositoryResult<Vec<TransactionRecord>> {
        self.fetch_many(
            &format!("SELECT {COLUMNS} FROM transactions WHERE status = $1 ORDER BY created_at ASC"),
            status.as_str(),
        )
        .await
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    utr: String,
    account_number: String,
    amount: BigDecimal,
    transaction_type: String,
    status: String,
    kind: String,
    idempotency_key: String,
    opening_balance: Option<BigDecimal>,
    closing_balance: Option<BigDecimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<TransactionRecord> {
        Ok(TransactionRecord {
            id: self.id,
            utr: self.utr,
            account_number: self.account_number,
            amount: self.amount,
            operation_type: self.transaction_type.parse().map_err(RepositoryError::Corrupt)?,
            status: self.status.parse().map_err(RepositoryError::Corrupt)?,
            kind: self.kind.parse().map_err(RepositoryError::Corrupt)?,
            idempotency_key: self.idempotency_key,
            opening_balance: self.opening_balance,
            closing_balance: self.closing_balance,
            timestamp: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
