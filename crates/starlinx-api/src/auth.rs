//! Admin gate: a single shared-secret comparison.
//!
//! The key may arrive as `Authorization: Bearer <key>`, as an
//! `X-Admin-Key` header, or as the `k` query parameter (kept for links
//! pasted from older panels). Anything else is a 401.

use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::Rng;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the admin key as an alternative to a bearer token.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Generate a random 32-character hex key.
pub fn generate_key() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

/// Load the admin key from file, or generate and save a new one.
///
/// Used only when no key is configured anywhere, so the panel is never
/// left behind a well-known default.
pub fn load_or_generate_key(key_path: &std::path::Path) -> String {
    if let Ok(contents) = std::fs::read_to_string(key_path) {
        let key = contents.trim().to_string();
        if !key.is_empty() {
            tracing::info!("Admin key loaded from {}", key_path.display());
            return key;
        }
    }

    let key = generate_key();

    if let Some(parent) = key_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(key_path, &key) {
        tracing::warn!(error = %e, "Failed to save admin key to {}", key_path.display());
    } else {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600));
        }
        tracing::warn!(
            "No admin key configured; generated one and saved it to {}",
            key_path.display()
        );
    }

    key
}

#[derive(Debug, Default, Deserialize)]
struct KeyQuery {
    k: Option<String>,
}

/// Pull the presented key out of the request, if any.
fn presented_key(req: &Request) -> Option<String> {
    let headers = req.headers();
    if let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }
    if let Some(key) = headers.get(ADMIN_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key.trim().to_string());
    }
    Query::<KeyQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.k)
}

/// Middleware that rejects requests without the admin key.
pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    match presented_key(&req) {
        Some(key) if !key.is_empty() && key == *state.admin_key => next.run(req).await,
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "Rejected admin request with wrong key");
            ApiError::Unauthorized("Invalid admin key".to_string()).into_response()
        }
        None => ApiError::Unauthorized("Missing admin key".to_string()).into_response(),
    }
}
