//! CLI argument definitions for the Starlinx binary.
//!
//! Uses `clap` with derive macros. Priority resolution:
//! CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use starlinx_core::config::StarlinxConfig;
use starlinx_storage::ExportFormat;

/// Environment variable naming the configuration file.
pub const ENV_CONFIG: &str = "STARLINX_CONFIG";

/// Starlinx - driver registration intake with CSV and database storage.
#[derive(Parser, Debug, Default)]
#[command(name = "starlinx", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// HTTP server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Data directory for the CSV file and generated admin key.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Database connection string (sqlite:/path, postgres://...).
    #[arg(long = "database-url")]
    pub database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Create the database table, print the target and exit.
    #[arg(long = "init-db")]
    pub init_db: bool,

    /// Write every stored registration to stdout (csv or json) and exit.
    #[arg(long = "export", value_name = "FORMAT", conflicts_with = "init_db")]
    pub export: Option<ExportFormat>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > STARLINX_CONFIG env var > ./starlinx.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var(ENV_CONFIG) {
            if !p.trim().is_empty() {
                return PathBuf::from(p);
            }
        }
        PathBuf::from("starlinx.toml")
    }

    /// Apply command-line overrides on top of file and environment values.
    pub fn apply_overrides(&self, config: &mut StarlinxConfig) {
        if let Some(port) = self.port {
            config.general.port = port;
        }
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref url) = self.database_url {
            config.storage.database_url = url.clone();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}
