//! Route handler functions for all API endpoints.
//!
//! Handlers extract form fields and state via axum extractors, call into the
//! registration store, and return JSON (or CSV for the export download).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use starlinx_core::types::NewRegistration;
use starlinx_storage::{CsvDump, Driver, Export, ExportFormat, SchemaStatus};

use crate::error::ApiError;
use crate::state::AppState;

/// Filename offered for the CSV download.
pub const EXPORT_FILENAME: &str = "registrations.csv";

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub ok: bool,
    /// Timestamp written to both sinks.
    pub ts: String,
    pub name: String,
    pub database_written: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub driver: Driver,
    pub schema: SchemaStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub pong: bool,
}

/// Database side of the stats report.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DatabaseCount {
    Counted {
        rows: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        advisory: Option<String>,
    },
    Unavailable {
        error: String,
    },
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub driver: Driver,
    pub location: String,
    pub schema: SchemaStatus,
    pub database: DatabaseCount,
    pub file_rows: u64,
    pub secondary_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub ok: bool,
    pub table: String,
    pub schema: SchemaStatus,
}

// =============================================================================
// Extractors
// =============================================================================

/// Best-effort submitter address.
///
/// Proxy headers win over the socket peer; the first `X-Forwarded-For` hop
/// is the original client.
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub Option<String>);

impl ClientIp {
    fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let ip = forwarded
            .or(real_ip)
            .map(str::to_string)
            .or_else(|| peer.map(|addr| addr.ip().to_string()));
        ClientIp(ip)
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp::from_parts(&parts.headers, peer))
    }
}

// =============================================================================
// Public handlers
// =============================================================================

/// GET / - the registration form.
pub async fn index() -> impl IntoResponse {
    Html(REGISTRATION_FORM_HTML)
}

/// POST /register - validate the form and record it.
///
/// The CSV write decides success. A database failure is reported in
/// `database_written` but never fails the request.
pub async fn register(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    Form(mut form): Form<NewRegistration>,
) -> Result<Json<RegisterResponse>, ApiError> {
    if client_ip.is_some() {
        form.client_ip = client_ip;
    }
    let registration = form.validate(chrono::Local::now().naive_local())?;

    let outcome = state.store.record(&registration).await.map_err(|e| {
        tracing::error!(error = %e, "Registration could not be stored");
        ApiError::Internal("Registration could not be stored".to_string())
    })?;

    Ok(Json(RegisterResponse {
        ok: true,
        ts: registration.timestamp(),
        name: registration.name,
        database_written: outcome.database_ok(),
    }))
}

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        driver: state.store.driver(),
        schema: state.store.schema_status(),
    })
}

/// GET /ping - liveness probe.
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse { pong: true })
}

// =============================================================================
// Admin handlers
// =============================================================================

/// GET /admin/stats - counts from both sinks.
pub async fn admin_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let database = match state.store.count().await {
        Ok(count) => DatabaseCount::Counted {
            rows: count.rows,
            advisory: count.advisory,
        },
        Err(e) => DatabaseCount::Unavailable {
            error: e.to_string(),
        },
    };
    let file_rows = state.store.file_row_count()?;

    Ok(Json(StatsResponse {
        driver: state.store.driver(),
        location: state.store.target().redacted_location(),
        schema: state.store.schema_status(),
        database,
        file_rows,
        secondary_failures: state.store.secondary_failures(),
    }))
}

/// POST /admin/schema - create the table if it is missing.
pub async fn admin_schema(
    State(state): State<AppState>,
) -> Result<Json<SchemaResponse>, ApiError> {
    state.store.ensure_schema().await?;
    Ok(Json(SchemaResponse {
        ok: true,
        table: state.config.storage.table.clone(),
        schema: state.store.schema_status(),
    }))
}

/// GET /admin/registrations - the raw file contents as headers and rows.
pub async fn admin_registrations(
    State(state): State<AppState>,
) -> Result<Json<CsvDump>, ApiError> {
    Ok(Json(state.store.dump()?))
}

/// GET /export.csv - download the CSV file.
pub async fn export_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let bytes = match state.store.export(ExportFormat::Csv)? {
        Export::Csv(bytes) => bytes,
        Export::Json(_) => return Err(ApiError::Internal("unexpected export format".to_string())),
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILENAME),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// GET /export.json - every row as a header-keyed object.
pub async fn export_json(
    State(state): State<AppState>,
) -> Result<Json<Vec<Map<String, Value>>>, ApiError> {
    match state.store.export(ExportFormat::Json)? {
        Export::Json(rows) => Ok(Json(rows)),
        Export::Csv(_) => Err(ApiError::Internal("unexpected export format".to_string())),
    }
}

/// Static registration page served at `/`.
pub const REGISTRATION_FORM_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Driver registration</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 28rem; margin: 2rem auto; padding: 0 1rem; }
  label { display: block; margin-top: 0.8rem; font-weight: 600; }
  input, select { width: 100%; padding: 0.5rem; box-sizing: border-box; }
  button { margin-top: 1.2rem; padding: 0.6rem 1.2rem; }
  #result { margin-top: 1rem; }
</style>
</head>
<body>
<h1>Driver registration</h1>
<form id="register" method="post" action="/register">
  <label for="name">Full name</label>
  <input id="name" name="name" required maxlength="256">
  <label for="document">Document</label>
  <input id="document" name="document" required maxlength="256">
  <label for="phone">Phone</label>
  <input id="phone" name="phone" type="tel" required maxlength="256">
  <label for="email">Email</label>
  <input id="email" name="email" type="email" maxlength="256">
  <label for="city">City</label>
  <input id="city" name="city" maxlength="256">
  <label for="vehicle_type">Vehicle</label>
  <select id="vehicle_type" name="vehicle_type">
    <option value="">-</option>
    <option value="car">Car</option>
    <option value="motorcycle">Motorcycle</option>
    <option value="van">Van</option>
  </select>
  <button type="submit">Register</button>
</form>
<div id="result"></div>
<script>
document.getElementById("register").addEventListener("submit", async (ev) => {
  ev.preventDefault();
  const out = document.getElementById("result");
  const body = new URLSearchParams(new FormData(ev.target));
  try {
    const resp = await fetch("/register", { method: "POST", body });
    const data = await resp.json();
    out.textContent = resp.ok ? "Registered, thank you " + data.name + "." : data.message;
    if (resp.ok) ev.target.reset();
  } catch (e) {
    out.textContent = "Network error, please try again.";
  }
});
</script>
</body>
</html>
"#;
