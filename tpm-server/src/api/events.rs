//! Live practice events over SSE

use axum::{extract::State, response::IntoResponse, routing::get, Extension, Router};
use tpm_common::sse::practice_event_stream;

use crate::api::Tenant;
use crate::AppState;

/// GET /api/events
pub async fn event_stream(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
) -> impl IntoResponse {
    practice_event_stream(&state.event_bus, tenant.practice_id, tenant.staff_id)
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/api/events", get(event_stream))
}
