//! Starlinx application binary - composition root.
//!
//! 1. Parse CLI flags and load configuration (file, environment, flags)
//! 2. Open the registration store (CSV file + database sink)
//! 3. Run a one-shot command (`--init-db`, `--export`) or ensure the schema
//! 4. Start the axum HTTP server

mod cli;

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;

use starlinx_api::auth;
use starlinx_api::routes;
use starlinx_api::state::AppState;
use starlinx_core::config::StarlinxConfig;
use starlinx_core::error::StarlinxError;
use starlinx_storage::{Export, ExportFormat, RegistrationStore};

use crate::cli::CliArgs;

/// Load the config file, overlay environment and flags.
///
/// Returns the load error separately so it can be logged once tracing is up.
fn build_config(args: &CliArgs) -> (StarlinxConfig, Option<String>) {
    let path = args.resolve_config_path();
    let (mut config, load_error) = match StarlinxConfig::load(&path) {
        Ok(config) => (config, None),
        Err(_) if args.config.is_none() && !path.exists() => (StarlinxConfig::default(), None),
        Err(e) => (
            StarlinxConfig::default(),
            Some(format!("{}: {}", path.display(), e)),
        ),
    };
    config.apply_env(|key| std::env::var(key).ok());
    args.apply_overrides(&mut config);
    (config, load_error)
}

/// Resolve, prepare and create the table, then report where it lives.
async fn init_db(store: &RegistrationStore) -> Result<(), StarlinxError> {
    store.target().prepare()?;
    store.ensure_schema().await?;
    println!(
        "{} database ready at {}",
        store.driver(),
        store.target().redacted_location()
    );
    Ok(())
}

/// Print the CSV file (or its JSON rendering) to stdout.
fn export(store: &RegistrationStore, format: ExportFormat) -> Result<(), StarlinxError> {
    let mut out = std::io::stdout().lock();
    match store.export(format)? {
        Export::Csv(bytes) => out.write_all(&bytes)?,
        Export::Json(rows) => {
            serde_json::to_writer_pretty(&mut out, &rows)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

async fn run(args: CliArgs, config: StarlinxConfig) -> Result<(), StarlinxError> {
    config.validate()?;

    std::fs::create_dir_all(config.data_dir())?;
    let store = RegistrationStore::open(&config)?;

    if args.init_db {
        return init_db(&store).await;
    }
    if let Some(format) = args.export {
        return export(&store, format);
    }

    store.initialize().await;

    let admin_key = match config.admin.key.clone() {
        Some(key) => key,
        None => auth::load_or_generate_key(&config.admin_key_path()),
    };

    let state = AppState::new(config.clone(), store, admin_key);
    routes::start_server(&config, state).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    let (config, load_error) = build_config(&args);

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Starlinx v{}", env!("CARGO_PKG_VERSION"));
    if let Some(err) = load_error {
        tracing::warn!("Failed to load config from {}. Using defaults.", err);
    }

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Starlinx exited with an error");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
