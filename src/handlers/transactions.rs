use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::future::Future;

use crate::domain::TransactionRecord;
use crate::error::AppError;
use crate::middleware::CallerId;
use crate::services::{ServiceError, SingleLegRequest, TransferRequest};
use crate::AppState;

/// Runs the operation on its own task. A dropped connection cancels the
/// handler future but not the task, so a started saga always settles.
async fn run_detached<F>(operation: &'static str, fut: F) -> Result<TransactionRecord, AppError>
where
    F: Future<Output = Result<TransactionRecord, ServiceError>> + Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| AppError::Internal(format!("{} task failed: {}", operation, e)))?
        .map_err(AppError::from)
}

pub async fn transfer(
    State(state): State<AppState>,
    caller: CallerId,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service.clone();
    let record = run_detached("transfer", async move { service.transfer(&req, caller.0).await }).await?;

    Ok(Json(record))
}

pub async fn deposit(
    State(state): State<AppState>,
    caller: CallerId,
    Json(req): Json<SingleLegRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service.clone();
    let record = run_detached("deposit", async move { service.deposit(&req, caller.0).await }).await?;

    Ok(Json(record))
}

pub async fn withdraw(
    State(state): State<AppState>,
    caller: CallerId,
    Json(req): Json<SingleLegRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service.clone();
    let record = run_detached("withdraw", async move { service.withdraw(&req, caller.0).await }).await?;

    Ok(Json(record))
}

pub async fn list_all(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.service.list_all().await?))
}

pub async fn get_by_utr(
    State(state): State<AppState>,
    Path(utr): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let legs = state.service.find_by_utr(&utr).await?;
    if legs.is_empty() {
        return Err(AppError::NotFound(format!("Transfer {} not found", utr)));
    }

    Ok(Json(legs))
}

pub async fn get_by_account(
    State(state): State<AppState>,
    Path(account_number): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.service.find_by_account(&account_number).await?))
}

pub async fn list_unresolved(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.service.unresolved().await?))
}
