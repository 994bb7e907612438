//! Recording ledger for tests.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{AccountSnapshot, LedgerClient, LedgerError};
use crate::domain::OperationType;

struct Account {
    balance: BigDecimal,
    owner: i64,
    closed: bool,
}

/// Balances live behind one mutex, so every credit/debit is an atomic
/// read-modify-write, like a real ledger.
pub struct MockLedger {
    accounts: Mutex<HashMap<String, Account>>,
    calls: Mutex<Vec<(OperationType, String)>>,
    fail_next: Mutex<HashMap<(OperationType, String), usize>>,
    delay: Mutex<Option<Duration>>,
    lookups: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_next: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn with_account(self, account: &str, owner: i64, balance: &str) -> Self {
        self.accounts.lock().unwrap().insert(
            account.to_string(),
            Account {
                balance: balance.parse().unwrap(),
                owner,
                closed: false,
            },
        );
        self
    }

    pub fn close_account(&self, account: &str) {
        if let Some(acc) = self.accounts.lock().unwrap().get_mut(account) {
            acc.closed = true;
        }
    }

    /// The next `times` calls of `op` on `account` fail as if the ledger were down.
    pub fn fail_next(&self, op: OperationType, account: &str, times: usize) {
        self.fail_next
            .lock()
            .unwrap()
            .insert((op, account.to_string()), times);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn balance(&self, account: &str) -> BigDecimal {
        self.accounts.lock().unwrap()[account].balance.clone()
    }

    pub fn call_count(&self, op: OperationType, account: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, a)| *o == op && a == account)
            .count()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn mutate(&self, op: OperationType, account: &str, amount: &BigDecimal) -> Result<AccountSnapshot, LedgerError> {
        self.calls.lock().unwrap().push((op, account.to_string()));

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut fail_next = self.fail_next.lock().unwrap();
            if let Some(remaining) = fail_next.get_mut(&(op, account.to_string())) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(LedgerError::Unavailable("injected failure".to_string()));
                }
            }
        }

        let mut accounts = self.accounts.lock().unwrap();
        let acc = accounts
            .get_mut(account)
            .ok_or_else(|| LedgerError::AccountNotFound(account.to_string()))?;

        if acc.closed {
            return Err(LedgerError::Rejected {
                status: 400,
                message: format!("account {} is closed", account),
            });
        }

        match op {
            OperationType::Credit => acc.balance = &acc.balance + amount,
            OperationType::Debit => {
                if *amount > acc.balance {
                    return Err(LedgerError::InsufficientFunds(account.to_string()));
                }
                acc.balance = &acc.balance - amount;
            }
        }

        Ok(AccountSnapshot {
            account_number: account.to_string(),
            current_balance: acc.balance.clone(),
            user_id: acc.owner,
        })
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_account(&self, account_number: &str) -> Result<AccountSnapshot, LedgerError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let accounts = self.accounts.lock().unwrap();
        accounts
            .get(account_number)
            .map(|acc| AccountSnapshot {
                account_number: account_number.to_string(),
                current_balance: acc.balance.clone(),
                user_id: acc.owner,
            })
            .ok_or_else(|| LedgerError::AccountNotFound(account_number.to_string()))
    }

    async fn credit(&self, account_number: &str, amount: &BigDecimal) -> Result<AccountSnapshot, LedgerError> {
        self.mutate(OperationType::Credit, account_number, amount).await
    }

    async fn debit(&self, account_number: &str, amount: &BigDecimal) -> Result<AccountSnapshot, LedgerError> {
        self.mutate(OperationType::Debit, account_number, amount).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_debit_never_overdraws() {
        let ledger = MockLedger::new().with_account("A", 1, "100");

        let result = ledger.debit("A", &"150".parse().unwrap()).await;
        assert_eq!(result, Err(LedgerError::InsufficientFunds("A".to_string())));
        assert_eq!(ledger.balance("A"), "100".parse::<BigDecimal>().unwrap());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let ledger = MockLedger::new().with_account("A", 1, "100");
        ledger.fail_next(OperationType::Credit, "A", 1);

        assert!(ledger.credit("A", &BigDecimal::from(1)).await.is_err());
        assert!(ledger.credit("A", &BigDecimal::from(1)).await.is_ok());
        assert_eq!(ledger.call_count(OperationType::Credit, "A"), 2);
    }
}
