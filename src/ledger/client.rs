use async_trait::async_trait;
use bigdecimal::BigDecimal;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::time::Duration;

use super::{AccountSnapshot, LedgerClient, LedgerError};

pub const INTERNAL_SECRET_HEADER: &str = "X-Internal-Secret";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BalanceModificationRequest<'a> {
    account_number: &'a str,
    amount: &'a BigDecimal,
}

/// HTTP client for the ledger service's internal account endpoints.
#[derive(Clone)]
pub struct HttpLedgerClient {
    client: Client,
    base_url: String,
    internal_secret: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpLedgerClient {
    /// Creates a client with a 5s call timeout and a breaker that opens after
    /// 5 consecutive failures.
    pub fn new(base_url: String, internal_secret: String) -> Self {
        Self::with_circuit_breaker(base_url, internal_secret, Duration::from_secs(5), 5, 30)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        internal_secret: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs.saturating_mul(2)),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        HttpLedgerClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            internal_secret,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call(&self, request: RequestBuilder, account_number: &str) -> Result<AccountSnapshot, LedgerError> {
        let request = request.header(INTERNAL_SECRET_HEADER, &self.internal_secret);
        let account = account_number.to_string();

        let result = self
            .circuit_breaker
            .call_with(LedgerError::is_transient, async move {
                let response = request.send().await?;
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<AccountSnapshot>()
                        .await
                        .map_err(|e| LedgerError::InvalidResponse(e.to_string()));
                }

                let body = response.text().await.unwrap_or_default();
                Err(classify_failure(status, account, body))
            })
            .await;

        match result {
            Ok(snapshot) => Ok(snapshot),
            Err(FailsafeError::Rejected) => Err(LedgerError::CircuitBreakerOpen(
                "Ledger circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    async fn modify(
        &self,
        path: &str,
        account_number: &str,
        amount: &BigDecimal,
    ) -> Result<AccountSnapshot, LedgerError> {
        let url = format!("{}/accounts/internal/{}", self.base_url, path);
        let request = self.client.post(url).json(&BalanceModificationRequest {
            account_number,
            amount,
        });
        self.call(request, account_number).await
    }
}

fn classify_failure(status: StatusCode, account: String, body: String) -> LedgerError {
    match status {
        StatusCode::NOT_FOUND => LedgerError::AccountNotFound(account),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LedgerError::Unauthorized,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => LedgerError::InsufficientFunds(account),
        _ if body.to_ascii_lowercase().contains("insufficient") => LedgerError::InsufficientFunds(account),
        _ if body.to_ascii_lowercase().contains("account not found") => LedgerError::AccountNotFound(account),
        _ => LedgerError::Rejected {
            status: status.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn get_account(&self, account_number: &str) -> Result<AccountSnapshot, LedgerError> {
        let url = format!("{}/accounts/internal/lookup", self.base_url);
        let request = self.client.get(url).query(&[("accountNo", account_number)]);
        self.call(request, account_number).await
    }

    async fn credit(&self, account_number: &str, amount: &BigDecimal) -> Result<AccountSnapshot, LedgerError> {
        self.modify("credit", account_number, amount).await
    }

    async fn debit(&self, account_number: &str, amount: &BigDecimal) -> Result<AccountSnapshot, LedgerError> {
        self.modify("debit", account_number, amount).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_client_creation() {
        let client = HttpLedgerClient::new("http://ledger:8082/".to_string(), "s3cret".to_string());
        assert_eq!(client.base_url(), "http://ledger:8082");
        assert_eq!(client.circuit_state(), "closed");
    }

    #[test]
    fn test_classify_insufficient_funds_from_generic_error() {
        let err = classify_failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ACC1".to_string(),
            r#"{"message":"Insufficient funds"}"#.to_string(),
        );
        assert_eq!(err, LedgerError::InsufficientFunds("ACC1".to_string()));
    }

    #[test]
    fn test_classify_status_codes() {
        assert_eq!(
            classify_failure(StatusCode::NOT_FOUND, "A".into(), String::new()),
            LedgerError::AccountNotFound("A".into())
        );
        assert_eq!(
            classify_failure(StatusCode::FORBIDDEN, "A".into(), String::new()),
            LedgerError::Unauthorized
        );
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "A".into(), "down".into()),
            LedgerError::Rejected { status: 502, .. }
        ));
    }
}
