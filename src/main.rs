use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transfer_engine::adapters::PostgresTransactionRepository;
use transfer_engine::cli::{self, Cli, Commands, DbCommands, TxCommands};
use transfer_engine::config::{Config, LogFormat};
use transfer_engine::ledger::HttpLedgerClient;
use transfer_engine::{create_app, db, secrets, startup, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config),
        Commands::Tx(TxCommands::Utr { utr }) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_tx_utr(&pool, &utr).await
        }
        Commands::Tx(TxCommands::Unresolved) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_tx_unresolved(&pool).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let internal_secret = secrets::resolve_internal_secret(&config).await?;

    let ledger = Arc::new(HttpLedgerClient::with_circuit_breaker(
        config.ledger_service_url.clone(),
        internal_secret.clone(),
        config.ledger_timeout,
        config.ledger_cb_failure_threshold,
        config.ledger_cb_reset_secs,
    ));
    tracing::info!(url = %config.ledger_service_url, "Ledger client initialized");

    let report = startup::validate_environment(&config, &pool, ledger.as_ref()).await?;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Startup validation failed");
    }

    let repository = Arc::new(PostgresTransactionRepository::new(pool));
    let state = AppState::new(repository, ledger, &internal_secret, config.leg_settings());
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
