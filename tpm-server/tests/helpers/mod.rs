//! Shared harness for router-level tests
//!
//! Builds the full router over an in-memory database and a temporary blob
//! folder, provisions one signed practice and offers request builders for
//! each credential type.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use tpm_common::api::sign_request;
use tpm_common::db::init_memory_database;
use tpm_common::time::now_millis;
use tpm_common::EventBus;
use uuid::Uuid;

use tpm_server::api::auth::{
    ADMIN_TOKEN_HEADER, HASH_HEADER, PRACTICE_HEADER, STAFF_HEADER, TIMESTAMP_HEADER,
};
use tpm_server::db::practices::create_practice;
use tpm_server::services::{EchoDrafter, LocalBlobStore};
use tpm_server::{build_router, AppState};

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// A practice with the credentials to call it
#[derive(Debug, Clone, Copy)]
pub struct PracticeCreds {
    pub id: Uuid,
    pub secret: i64,
}

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub blob_dir: TempDir,
    pub practice: PracticeCreds,
    pub events: EventBus,
}

pub struct TestAppBuilder {
    drafter: bool,
    admin: bool,
}

impl TestAppBuilder {
    pub fn without_drafter(mut self) -> Self {
        self.drafter = false;
        self
    }

    pub fn without_admin(mut self) -> Self {
        self.admin = false;
        self
    }

    pub async fn build(self) -> TestApp {
        let pool = init_memory_database().await.expect("in-memory database");
        let blob_dir = tempfile::tempdir().expect("temp dir");

        let mut state = AppState::new(pool.clone(), Arc::new(LocalBlobStore::new(blob_dir.path())));
        if self.drafter {
            state = state.with_drafter(Arc::new(EchoDrafter));
        }
        if self.admin {
            state = state.with_admin_token(ADMIN_TOKEN);
        }

        let (practice, secret) = create_practice(&pool, "Harbor Counseling").await.unwrap();

        let events = state.event_bus.clone();
        TestApp {
            router: build_router(state),
            pool,
            blob_dir,
            practice: PracticeCreds { id: practice.id, secret },
            events,
        }
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder { drafter: true, admin: true }
    }

    pub async fn new() -> TestApp {
        Self::builder().build().await
    }

    /// Provision a second practice on the same server
    pub async fn add_practice(&self, name: &str) -> PracticeCreds {
        let (practice, secret) = create_practice(&self.pool, name).await.unwrap();
        PracticeCreds { id: practice.id, secret }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(request).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn send_raw(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    /// Open a streaming response and hand back its body unread
    pub async fn open_stream(&self, request: Request<Body>) -> (StatusCode, Body) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        (response.status(), response.into_body())
    }

    /// Signed request as this app's practice
    pub fn signed(&self, method: &str, path: &str, body: Option<Value>) -> Request<Body> {
        signed_request(self.practice, None, method, path, body)
    }

    /// Signed request acting as a staff member
    pub fn signed_as(&self, staff_id: Uuid, method: &str, path: &str, body: Option<Value>) -> Request<Body> {
        signed_request(self.practice, Some(staff_id), method, path, body)
    }

    pub fn portal(&self, token: &str, method: &str, path: &str, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("authorization", format!("Bearer {}", token));
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        builder.body(json_body(body)).unwrap()
    }

    pub fn admin(&self, method: &str, path: &str, body: Option<Value>) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .header(ADMIN_TOKEN_HEADER, ADMIN_TOKEN)
            .header("content-type", "application/json")
            .body(json_body(body))
            .unwrap()
    }

    pub async fn create_staff(&self, email: &str) -> Uuid {
        let (status, body) = self
            .send(self.signed(
                "POST",
                "/api/staff",
                Some(json!({ "display_name": "Dr. Okafor", "email": email, "role": "clinician" })),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        uuid_field(&body, "id")
    }

    pub async fn create_client(&self, first: &str, last: &str) -> Uuid {
        let (status, body) = self
            .send(self.signed(
                "POST",
                "/api/clients",
                Some(json!({ "first_name": first, "last_name": last })),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        uuid_field(&body, "id")
    }

    pub async fn create_session(&self, client_id: Uuid, clinician_id: Option<Uuid>, starts_at: &str) -> Uuid {
        let (status, body) = self
            .send(self.signed(
                "POST",
                "/api/sessions",
                Some(json!({
                    "client_id": client_id,
                    "clinician_id": clinician_id,
                    "starts_at": starts_at,
                    "duration_minutes": 50,
                    "session_type": "individual",
                })),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        uuid_field(&body, "id")
    }

    /// Enable portal access for a client and return the bearer token
    pub async fn enable_portal(&self, client_id: Uuid) -> String {
        let (status, body) = self
            .send(self.signed(
                "POST",
                &format!("/api/clients/{}/portal-access", client_id),
                Some(json!({ "enabled": true })),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["token"].as_str().expect("token in response").to_string()
    }
}

pub fn signed_request(
    creds: PracticeCreds,
    staff_id: Option<Uuid>,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> Request<Body> {
    let bytes = body.map(|b| b.to_string().into_bytes()).unwrap_or_default();
    let timestamp = now_millis();
    let hash = sign_request(method, path, timestamp, &bytes, creds.secret);

    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(PRACTICE_HEADER, creds.id.to_string())
        .header(TIMESTAMP_HEADER, timestamp.to_string())
        .header(HASH_HEADER, hash)
        .header("content-type", "application/json");
    if let Some(staff_id) = staff_id {
        builder = builder.header(STAFF_HEADER, staff_id.to_string());
    }
    builder.body(Body::from(bytes)).unwrap()
}

/// Signed upload of raw bytes
pub fn signed_upload(creds: PracticeCreds, path: &str, content_type: &str, bytes: Vec<u8>) -> Request<Body> {
    let timestamp = now_millis();
    let hash = sign_request("POST", path, timestamp, &bytes, creds.secret);
    Request::builder()
        .method("POST")
        .uri(path)
        .header(PRACTICE_HEADER, creds.id.to_string())
        .header(TIMESTAMP_HEADER, timestamp.to_string())
        .header(HASH_HEADER, hash)
        .header("content-type", content_type)
        .body(Body::from(bytes))
        .unwrap()
}

/// Read SSE frames until `needle` shows up; returns all text seen so far
pub async fn read_stream_until(body: &mut Body, needle: &str) -> String {
    let mut seen = String::new();
    while !seen.contains(needle) {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {:?}; saw {:?}", needle, seen))
            .expect("stream ended")
            .unwrap();
        if let Ok(data) = frame.into_data() {
            seen.push_str(&String::from_utf8_lossy(&data));
        }
    }
    seen
}

fn json_body(body: Option<Value>) -> Body {
    match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    }
}

pub fn uuid_field(value: &Value, field: &str) -> Uuid {
    let raw = value[field]
        .as_str()
        .unwrap_or_else(|| panic!("missing '{}' in {}", field, value));
    Uuid::parse_str(raw).unwrap()
}
