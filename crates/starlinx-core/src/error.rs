use thiserror::Error;

/// Top-level error type for the Starlinx registration service.
///
/// Storage failures are split by sink: a `PrimarySink` error means the CSV
/// append failed and the submission was lost, while `Storage` and `Timeout`
/// come from the database sink and are usually absorbed by the writer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StarlinxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid field '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Primary sink write failed: {0}")]
    PrimarySink(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database operation timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("CSV error: {0}")]
    Csv(String),
}

impl StarlinxError {
    /// Shorthand for a validation failure on a named form field.
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        StarlinxError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for StarlinxError {
    fn from(err: toml::de::Error) -> Self {
        StarlinxError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for StarlinxError {
    fn from(err: toml::ser::Error) -> Self {
        StarlinxError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for StarlinxError {
    fn from(err: serde_json::Error) -> Self {
        StarlinxError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for StarlinxError {
    fn from(err: csv::Error) -> Self {
        StarlinxError::Csv(err.to_string())
    }
}

/// A specialized `Result` type for Starlinx operations.
pub type Result<T> = std::result::Result<T, StarlinxError>;
