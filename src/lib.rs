pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod ledger;
pub mod middleware;
pub mod ports;
pub mod secrets;
pub mod services;
pub mod startup;
pub mod validation;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;

use crate::ledger::LedgerClient;
use crate::ports::TransactionRepository;
use crate::services::{LegSettings, TransactionService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TransactionService>,
    pub repository: Arc<dyn TransactionRepository>,
    pub ledger: Arc<dyn LedgerClient>,
    pub internal_secret: Arc<str>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        ledger: Arc<dyn LedgerClient>,
        internal_secret: &str,
        settings: LegSettings,
    ) -> Self {
        Self {
            service: Arc::new(TransactionService::new(repository.clone(), ledger.clone(), settings)),
            repository,
            ledger,
            internal_secret: Arc::from(internal_secret),
            start_time: Instant::now(),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let public = Router::new()
        .route("/transfer", post(handlers::transactions::transfer))
        .route("/deposit", post(handlers::transactions::deposit))
        .route("/withdraw", post(handlers::transactions::withdraw));

    let internal = Router::new()
        .route("/all", get(handlers::transactions::list_all))
        .route("/utr/:utr", get(handlers::transactions::get_by_utr))
        .route("/account/:account_number", get(handlers::transactions::get_by_account))
        .route("/unresolved", get(handlers::transactions::list_unresolved))
        .route_layer(from_fn_with_state(state.clone(), middleware::internal_auth));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/transactions/public", public)
        .nest("/transactions/internal", internal)
        .layer(from_fn(middleware::request_logger_middleware))
        .with_state(state)
}
