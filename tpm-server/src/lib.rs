//! tpm-server library - therapy practice manager HTTP service
//!
//! Multi-tenant REST/JSON API over SQLite: clients, scheduling, session
//! notes, assessments, documents, notifications, audit log and help center,
//! plus a client portal and live updates over SSE.

use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use tpm_common::EventBus;

pub mod api;
pub mod db;
pub mod error;
pub mod services;

pub use error::{ApiError, ApiResult};

use services::{BlobStore, NoteDrafter};

/// Capacity of the in-process event channel
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Practice events forwarded to SSE subscribers
    pub event_bus: EventBus,
    /// Document contents
    pub blobs: Arc<dyn BlobStore>,
    /// Note drafting; `None` when no LLM is configured
    pub drafter: Option<Arc<dyn NoteDrafter>>,
    /// Token guarding `/api/admin`; admin routes are hidden when unset
    pub admin_token: Option<String>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            db,
            event_bus: EventBus::new(EVENT_BUS_CAPACITY),
            blobs,
            drafter: None,
            admin_token: None,
        }
    }

    pub fn with_drafter(mut self, drafter: Arc<dyn NoteDrafter>) -> Self {
        self.drafter = Some(drafter);
        self
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }
}

/// Build application router
///
/// Tenant routes require a signed practice request, portal routes a client
/// bearer token and admin routes the configured admin token. Health, help
/// guides and client settings are public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let tenant = api::tenant_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        api::auth::tenant_auth,
    ));

    let portal = api::portal::portal_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        api::auth::portal_auth,
    ));

    let admin = api::admin::admin_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        api::auth::admin_auth,
    ));

    let public = Router::new()
        .merge(api::health_routes())
        .merge(api::help_guides::help_guide_routes())
        .merge(api::settings::settings_routes());

    Router::new()
        .merge(tenant)
        .merge(portal)
        .merge(admin)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
