//! Integration tests for the Starlinx API.
//!
//! Each test builds its own store over a temporary directory (CSV file plus
//! SQLite database) and drives the router with `oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use starlinx_api::create_router;
use starlinx_api::handlers::{PingResponse, RegisterResponse};
use starlinx_api::state::AppState;
use starlinx_core::config::StarlinxConfig;
use starlinx_storage::{RegistrationStore, StorageTarget};

// =============================================================================
// Helpers
// =============================================================================

const TEST_KEY: &str = "test-admin-key-12345";

/// Fresh state backed by a SQLite file in a temp dir.
fn make_state() -> (TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let config = StarlinxConfig::default();
    let target = StorageTarget::Sqlite {
        path: dir.path().join("starlinx.db"),
    };
    let store =
        RegistrationStore::with_target(target, dir.path().join("registrations.csv"), &config.storage)
            .unwrap();
    (dir, AppState::new(config, store, TEST_KEY))
}

/// State whose database URL names a driver we do not support.
fn make_unsupported_state() -> (TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let config = StarlinxConfig::default();
    let target = StorageTarget::Unsupported {
        raw: "mysql://user@host/db".to_string(),
    };
    let store =
        RegistrationStore::with_target(target, dir.path().join("registrations.csv"), &config.storage)
            .unwrap();
    (dir, AppState::new(config, store, TEST_KEY))
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {}", TEST_KEY))
        .body(Body::empty())
        .unwrap()
}

fn register_request(form: &str) -> Request<Body> {
    Request::post("/register")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::from(form.to_string()))
        .unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

// =============================================================================
// Public routes
// =============================================================================

#[tokio::test]
async fn test_health_reports_driver_and_schema() {
    let (_dir, state) = make_state();
    let resp = create_router(state)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["driver"], "sqlite");
    assert_eq!(json["schema"]["state"], "pending");
}

#[tokio::test]
async fn test_ping() {
    let (_dir, state) = make_state();
    let resp = create_router(state)
        .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let ping: PingResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(ping.pong);
}

#[tokio::test]
async fn test_index_serves_form() {
    let (_dir, state) = make_state();
    let resp = create_router(state)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(html.contains("action=\"/register\""));
    assert!(html.contains("<html lang=\"en\">"));
}

#[tokio::test]
async fn test_register_writes_both_sinks() {
    let (_dir, state) = make_state();
    let app = create_router(state.clone());

    let resp = app
        .oneshot(register_request(
            "name=Ana+Souza&document=123.456.789-00&phone=%2B5511999990000&email=&city=S%C3%A3o+Paulo",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: RegisterResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(body.ok);
    assert!(body.database_written);
    assert_eq!(body.name, "Ana Souza");
    assert_eq!(body.ts.len(), 19);

    let dump = state.store.dump().unwrap();
    assert_eq!(dump.rows.len(), 1);
    assert_eq!(dump.rows[0][1], "Ana Souza");
    assert_eq!(dump.rows[0][4], "");
    assert_eq!(dump.rows[0][5], "São Paulo");
    assert_eq!(dump.rows[0][7], "203.0.113.9");

    let count = state.store.count().await.unwrap();
    assert_eq!(count.rows, 1);
}

#[tokio::test]
async fn test_register_rejects_missing_required_field() {
    let (_dir, state) = make_state();
    let app = create_router(state.clone());

    let resp = app
        .oneshot(register_request("name=Ana&document=&phone=123"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "unprocessable_entity");
    assert!(json["message"].as_str().unwrap().contains("document"));
    assert!(state.store.dump().unwrap().is_empty());
}

#[tokio::test]
async fn test_register_survives_unsupported_database() {
    let (_dir, state) = make_unsupported_state();
    let app = create_router(state.clone());

    let resp = app
        .oneshot(register_request("name=Ana&document=1&phone=2"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: RegisterResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(!body.database_written);
    assert_eq!(state.store.dump().unwrap().rows.len(), 1);
    assert_eq!(state.store.secondary_failures(), 1);
}

#[tokio::test]
async fn test_register_fails_when_csv_is_unwritable() {
    let (dir, state) = make_state();
    let csv = dir.path().join("registrations.csv");
    std::fs::remove_file(&csv).unwrap();
    std::fs::create_dir(&csv).unwrap();

    let resp = create_router(state.clone())
        .oneshot(register_request("name=Ana&document=1&phone=2"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "internal_error");

    // The database insert is never attempted.
    let count = state.store.count().await.unwrap();
    assert_eq!(count.rows, 0);
    assert!(count.advisory.is_some());
    assert_eq!(state.store.secondary_failures(), 0);
}

#[tokio::test]
async fn test_register_is_rate_limited() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StarlinxConfig::default();
    config.limits.submissions_per_sec = 1;
    let store = RegistrationStore::with_target(
        StorageTarget::Sqlite {
            path: dir.path().join("starlinx.db"),
        },
        dir.path().join("registrations.csv"),
        &config.storage,
    )
    .unwrap();
    let app = create_router(AppState::new(config, store, TEST_KEY));

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let resp = app
            .clone()
            .oneshot(register_request("name=Ana&document=1&phone=2"))
            .await
            .unwrap();
        statuses.push(resp.status());
    }

    // A window boundary can fall between requests, so at least one passes
    // and at least one is rejected.
    assert!(statuses.contains(&StatusCode::OK));
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
}

// =============================================================================
// Admin gate
// =============================================================================

#[tokio::test]
async fn test_admin_routes_require_key() {
    let (_dir, state) = make_state();
    let app = create_router(state);

    for uri in [
        "/admin/stats",
        "/admin/registrations",
        "/export.csv",
        "/export.json",
    ] {
        let resp = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
        let json = body_json(resp).await;
        assert_eq!(json["error"], "unauthorized");
    }
}

#[tokio::test]
async fn test_admin_rejects_wrong_key() {
    let (_dir, state) = make_state();
    let resp = create_router(state)
        .oneshot(
            Request::get("/export.json")
                .header("authorization", "Bearer not-the-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_accepts_header_and_query_key() {
    let (_dir, state) = make_state();
    let app = create_router(state);

    let resp = app
        .clone()
        .oneshot(
            Request::get("/export.json")
                .header("x-admin-key", TEST_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(
            Request::get(format!("/export.json?k={}", TEST_KEY))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// =============================================================================
// Admin routes
// =============================================================================

#[tokio::test]
async fn test_export_json_empty_file() {
    let (_dir, state) = make_state();
    let resp = create_router(state)
        .oneshot(authed_get("/export.json"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, serde_json::json!([]));
}

#[tokio::test]
async fn test_export_csv_download() {
    let (_dir, state) = make_state();
    let app = create_router(state);

    let resp = app
        .clone()
        .oneshot(register_request("name=Bruno%2C+Jr.&document=9&phone=8"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(authed_get("/export.csv")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"registrations.csv\""
    );
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));

    let text = String::from_utf8(body_bytes(resp).await).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("timestamp,name,document,phone,email,city,vehicle_type,client_ip")
    );
    assert!(lines.next().unwrap().contains("\"Bruno, Jr.\""));
    assert!(lines.next().is_none());
}

#[tokio::test]
async fn test_export_json_maps_headers() {
    let (_dir, state) = make_state();
    let app = create_router(state);

    app.clone()
        .oneshot(register_request("name=Carla&document=7&phone=6&vehicle_type=van"))
        .await
        .unwrap();

    let resp = app.oneshot(authed_get("/export.json")).await.unwrap();
    let json = body_json(resp).await;
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Carla");
    assert_eq!(rows[0]["vehicle_type"], "van");
    assert_eq!(rows[0]["client_ip"], "203.0.113.9");
}

#[tokio::test]
async fn test_admin_registrations_dump() {
    let (_dir, state) = make_state();
    let resp = create_router(state)
        .oneshot(authed_get("/admin/registrations"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["headers"].as_array().unwrap().len(), 8);
    assert_eq!(json["rows"], serde_json::json!([]));
}

#[tokio::test]
async fn test_stats_before_schema_reports_advisory() {
    let (_dir, state) = make_state();
    let resp = create_router(state)
        .oneshot(authed_get("/admin/stats"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["driver"], "sqlite");
    assert_eq!(json["database"]["rows"], 0);
    assert!(json["database"]["advisory"].is_string());
    assert_eq!(json["file_rows"], 0);
    assert_eq!(json["secondary_failures"], 0);
}

#[tokio::test]
async fn test_stats_with_unsupported_driver_reports_error() {
    let (_dir, state) = make_unsupported_state();
    let resp = create_router(state)
        .oneshot(authed_get("/admin/stats"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["driver"], "unsupported");
    assert!(json["database"]["error"]
        .as_str()
        .unwrap()
        .contains("unsupported driver"));
}

#[tokio::test]
async fn test_admin_schema_ensure() {
    let (_dir, state) = make_state();
    let app = create_router(state);

    let request = || {
        Request::post("/admin/schema")
            .header("authorization", format!("Bearer {}", TEST_KEY))
            .body(Body::empty())
            .unwrap()
    };

    let resp = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["schema"]["state"], "ready");

    // Idempotent.
    let resp = app.oneshot(request()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_schema_unsupported_is_503() {
    let (_dir, state) = make_unsupported_state();
    let resp = create_router(state)
        .oneshot(
            Request::post("/admin/schema")
                .header("authorization", format!("Bearer {}", TEST_KEY))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}
