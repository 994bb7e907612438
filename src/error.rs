use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::ports::RepositoryError;
use crate::services::ServiceError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Transaction store error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(e) => AppError::Validation(e.to_string()),
            ServiceError::Forbidden(account) => {
                AppError::Forbidden(format!("account {} does not belong to the caller", account))
            }
            ServiceError::AccountNotFound(account) => {
                AppError::NotFound(format!("account {}", account))
            }
            ServiceError::IdempotencyConflict(key) => AppError::Conflict(format!(
                "idempotency key {} was already used for a different request",
                key
            )),
            ServiceError::Ledger(LedgerError::CircuitBreakerOpen(msg)) => {
                AppError::ServiceUnavailable(format!("ledger circuit open: {}", msg))
            }
            ServiceError::Ledger(e) => AppError::BadGateway(e.to_string()),
            ServiceError::Repository(e) => AppError::Repository(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::from(ServiceError::Validation(ValidationError::new(
            "amount",
            "must be greater than zero",
        )));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_forbidden_status_code() {
        let error = AppError::from(ServiceError::Forbidden("ACC1".to_string()));
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_unknown_account_status_code() {
        let error = AppError::from(ServiceError::AccountNotFound("ACC1".to_string()));
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_status_code() {
        let error = AppError::from(ServiceError::IdempotencyConflict("k1".to_string()));
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_ledger_error_status_codes() {
        let unavailable = AppError::from(ServiceError::Ledger(LedgerError::Timeout));
        assert_eq!(unavailable.status_code(), StatusCode::BAD_GATEWAY);

        let open = AppError::from(ServiceError::Ledger(LedgerError::CircuitBreakerOpen(
            "too many failures".to_string(),
        )));
        assert_eq!(open.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_repository_error_status_code() {
        let error = AppError::from(ServiceError::Repository(RepositoryError::Database(
            sqlx::Error::RowNotFound,
        )));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unauthorized_error_status_code() {
        let error = AppError::Unauthorized("missing X-User-Id".to_string());
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_conflict_error_response() {
        let error = AppError::Conflict("k1".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_not_found_error_response() {
        let error = AppError::NotFound("transaction".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
