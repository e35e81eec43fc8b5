//! HTTP API handlers for tpm-server

use axum::Router;

use crate::AppState;

pub mod activity;
pub mod admin;
pub mod assessments;
pub mod audit;
pub mod auth;
pub mod clients;
pub mod documents;
pub mod events;
pub mod health;
pub mod help_guides;
pub mod notes;
pub mod notifications;
pub mod portal;
pub mod practice;
pub mod sessions;
pub mod settings;
pub mod tasks;

pub use auth::{PortalClient, Tenant};
pub use health::health_routes;

/// Routes available to an authenticated practice
pub fn tenant_routes() -> Router<AppState> {
    Router::new()
        .merge(practice::practice_routes())
        .merge(clients::client_routes())
        .merge(sessions::session_routes())
        .merge(tasks::task_routes())
        .merge(notes::note_routes())
        .merge(assessments::assessment_routes())
        .merge(documents::document_routes())
        .merge(notifications::notification_routes())
        .merge(audit::audit_routes())
        .merge(events::event_routes())
}
