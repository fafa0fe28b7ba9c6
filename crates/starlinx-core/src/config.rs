use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, StarlinxError};

/// Environment variable holding the database connection string.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
/// Environment variable holding the admin shared secret.
pub const ENV_ADMIN_KEY: &str = "ADMIN_KEY";
/// Environment variable holding the HTTP port (set by most PaaS hosts).
pub const ENV_PORT: &str = "PORT";
/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "STARLINX_DATA_DIR";

/// Top-level configuration for the Starlinx service.
///
/// Built once at startup from defaults, an optional TOML file and the
/// process environment, then shared read-only with every component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StarlinxConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl StarlinxConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StarlinxConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Overlay values from the environment.
    ///
    /// `lookup` is `std::env::var(..).ok()` in the binary; tests pass a map.
    /// Empty values are ignored, except `DATABASE_URL` where an empty string
    /// is meaningful (it selects the embedded fallback).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.storage.database_url = url;
        }
        if let Some(key) = lookup(ENV_ADMIN_KEY).filter(|k| !k.trim().is_empty()) {
            self.admin.key = Some(key);
        }
        if let Some(raw) = lookup(ENV_PORT) {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.general.port = port,
                Err(_) => warn!(value = %raw, "Ignoring unparsable {}", ENV_PORT),
            }
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
            self.general.data_dir = dir;
        }
    }

    /// Check invariants that would otherwise fail later at request time.
    pub fn validate(&self) -> Result<()> {
        if !is_sql_identifier(&self.storage.table) {
            return Err(StarlinxError::Config(format!(
                "storage.table '{}' must be a lowercase, non-reserved SQL identifier",
                self.storage.table
            )));
        }
        if self.storage.csv_file.trim().is_empty() {
            return Err(StarlinxError::Config(
                "storage.csv_file must not be empty".to_string(),
            ));
        }
        if self.storage.connect_timeout_secs == 0 {
            return Err(StarlinxError::Config(
                "storage.connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.storage.pool_max_size == 0 {
            return Err(StarlinxError::Config(
                "storage.pool_max_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Data directory with a leading `~` expanded to the home directory.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    /// Absolute or data-dir-relative path of the CSV file sink.
    pub fn csv_path(&self) -> PathBuf {
        let file = Path::new(&self.storage.csv_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.data_dir().join(file)
        }
    }

    /// Where a generated admin key is persisted.
    pub fn admin_key_path(&self) -> PathBuf {
        self.data_dir().join("admin.key")
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Address to bind the HTTP listener to.
    pub bind: String,
    /// HTTP port.
    pub port: u16,
    /// Directory for the CSV file and the generated admin key.
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            bind: "0.0.0.0".to_string(),
            port: 8000,
            data_dir: "data".to_string(),
        }
    }
}

/// Storage sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Connection string; empty selects the embedded fallback database.
    pub database_url: String,
    /// CSV file name, relative to `general.data_dir` unless absolute.
    pub csv_file: String,
    /// Database table receiving registrations.
    pub table: String,
    /// Upper bound for any single database connection attempt.
    pub connect_timeout_secs: u64,
    /// Maximum pooled connections for the external engine.
    pub pool_max_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            csv_file: "registrations.csv".to_string(),
            table: "registrations".to_string(),
            connect_timeout_secs: 5,
            pool_max_size: 8,
        }
    }
}

/// Admin gate configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Shared secret. When unset a random key is generated at startup.
    pub key: Option<String>,
}

/// Request limits for the public surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Accepted form submissions per second across all clients.
    pub submissions_per_sec: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            submissions_per_sec: 20,
        }
    }
}

/// Words both SQLite and PostgreSQL refuse as a bare table name.
const RESERVED_WORDS: &[&str] = &[
    "all", "alter", "and", "as", "asc", "between", "by", "case", "check", "column",
    "constraint", "create", "cross", "default", "delete", "desc", "distinct", "drop",
    "else", "end", "except", "exists", "foreign", "from", "full", "group", "having",
    "in", "index", "inner", "insert", "intersect", "into", "is", "join", "left",
    "like", "limit", "natural", "not", "null", "offset", "on", "or", "order",
    "outer", "primary", "references", "right", "select", "set", "table", "then",
    "to", "union", "unique", "update", "user", "using", "values", "when", "where",
    "with",
];

/// True for a non-reserved `[a-z_][a-z0-9_]*`, the only table names we splice
/// into SQL unquoted.
///
/// Upper case is refused because PostgreSQL folds unquoted names to lower
/// case, so the catalog would not match the configured name.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !RESERVED_WORDS.contains(&name)
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}
