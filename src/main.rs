//! Daemon entry point.
//!
//! Usage: `fileferry <config.json> [--once]`. Validates the configuration,
//! opens the SQLite transfer ledger, and runs the periodic scan scheduler
//! until interrupted. `--once` performs a single pass and exits, which is
//! handy for cron-style setups and smoke tests.

use fileferry::config::{self, ConfigValidator};
use fileferry::engine::Engine;
use fileferry::error::FerryError;
use fileferry::events::TracingSink;
use fileferry::fsops::AtomicMover;
use fileferry::ledger::{SqliteLedgerStore, TransferLedger};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: fileferry <config.json> [--once]");
        return ExitCode::FAILURE;
    };
    let once = args.any(|a| a == "--once");

    match run(config_path, once).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fileferry exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: PathBuf, once: bool) -> Result<(), FerryError> {
    let document = config::load_document(&config_path)?;
    let report = ConfigValidator::new().validate(&document);

    for warning in &report.warnings {
        tracing::warn!(%warning, "configuration warning");
    }
    if !report.is_valid() {
        for error in &report.errors {
            tracing::error!(%error, "configuration error");
        }
        return Err(FerryError::ConfigInvalid(report.errors.len()));
    }
    tracing::info!(rules = report.rule_set.len(), "configuration accepted");

    let ledger_dir = dirs::data_local_dir()
        .map(|d| d.join("fileferry"))
        .ok_or(FerryError::NoLedgerDir)?;
    let store = Arc::new(SqliteLedgerStore::open(&ledger_dir)?);

    let engine = Engine::new(
        report.rule_set,
        Arc::new(TransferLedger::new(store)),
        Arc::new(AtomicMover),
        Arc::new(TracingSink),
    );

    if once {
        let outcome = engine.scan_once();
        tracing::info!(
            considered = outcome.considered,
            moved = outcome.moved,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "single pass complete"
        );
        return Ok(());
    }

    let runner = tokio::spawn(engine.clone().run());

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
    engine.shutdown();
    let _ = runner.await;

    Ok(())
}
