pub mod config;
pub mod error;
pub mod types;

pub use config::StarlinxConfig;
pub use error::{Result, StarlinxError};
pub use types::*;
