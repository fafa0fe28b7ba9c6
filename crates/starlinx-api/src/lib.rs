//! Starlinx API crate - axum HTTP server and route handlers.
//!
//! Serves the public registration form and submission endpoint, health
//! checks, and the admin-gated count, dump, export and schema-check routes.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
