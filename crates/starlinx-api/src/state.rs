//! Application state shared across all route handlers.
//!
//! AppState holds the configuration, the registration store and the admin
//! key. It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use starlinx_core::config::StarlinxConfig;
use starlinx_storage::RegistrationStore;

/// Shared application state.
///
/// All fields are cheap to clone across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Resolved configuration, read-only after startup.
    pub config: Arc<StarlinxConfig>,
    /// Dual-sink registration store.
    pub store: Arc<RegistrationStore>,
    /// Shared secret for the admin routes.
    pub admin_key: Arc<str>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: StarlinxConfig, store: RegistrationStore, admin_key: impl Into<Arc<str>>) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            admin_key: admin_key.into(),
            start_time: Instant::now(),
        }
    }
}
