pub mod transactions;

use crate::health::{check_health, LedgerChecker, RepositoryChecker};
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = check_health(
        RepositoryChecker::new(state.repository.clone()),
        LedgerChecker::new(state.ledger.clone()),
        state.start_time,
    )
    .await;

    // Degraded still serves traffic: only the store is required.
    let status_code = if response.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}
