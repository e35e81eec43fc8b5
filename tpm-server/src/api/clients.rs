//! Client record endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tpm_common::Page;
use tracing::info;
use uuid::Uuid;

use crate::api::activity::audit;
use crate::api::Tenant;
use crate::db::clients::{self, Client, ClientFilter, ClientUpdate, NewClient};
use crate::{ApiResult, AppState};

/// POST /api/clients
pub async fn create_client(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(payload): Json<NewClient>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    let client = clients::create_client(&state.db, tenant.practice_id, payload).await?;
    info!(practice_id = %tenant.practice_id, client_id = %client.id, "Created client");

    audit(&state, tenant.practice_id, &tenant.actor(), "create", "client", client.id, json!({}))
        .await;

    Ok((StatusCode::CREATED, Json(client)))
}

/// GET /api/clients?q=&status=&page=&page_size=
pub async fn list_clients(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(filter): Query<ClientFilter>,
) -> ApiResult<Json<Page<Client>>> {
    Ok(Json(clients::list_clients(&state.db, tenant.practice_id, &filter).await?))
}

/// GET /api/clients/:id
pub async fn get_client(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Client>> {
    Ok(Json(clients::get_client(&state.db, tenant.practice_id, id).await?))
}

/// PATCH /api/clients/:id
///
/// Sending the same payload twice leaves the record and its audit trail
/// untouched the second time.
pub async fn update_client(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(update): Json<ClientUpdate>,
) -> ApiResult<Json<Client>> {
    let before = clients::get_client(&state.db, tenant.practice_id, id).await?;
    let client = clients::update_client(&state.db, tenant.practice_id, id, update).await?;

    if client != before {
        audit(
            &state,
            tenant.practice_id,
            &tenant.actor(),
            "update",
            "client",
            id,
            json!({ "status": client.status }),
        )
        .await;
    }

    Ok(Json(client))
}

/// DELETE /api/clients/:id
pub async fn delete_client(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    clients::delete_client(&state.db, tenant.practice_id, id).await?;
    info!(practice_id = %tenant.practice_id, client_id = %id, "Deleted client");

    audit(&state, tenant.practice_id, &tenant.actor(), "delete", "client", id, json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PortalAccessRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct PortalAccessResponse {
    pub client: Client,
    /// Plaintext portal token; only present when access was just enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// POST /api/clients/:id/portal-access
pub async fn set_portal_access(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PortalAccessRequest>,
) -> ApiResult<Json<PortalAccessResponse>> {
    let (client, token) =
        clients::set_portal_access(&state.db, tenant.practice_id, id, payload.enabled).await?;
    info!(client_id = %id, enabled = payload.enabled, "Changed portal access");

    let action = if payload.enabled { "portal_enable" } else { "portal_disable" };
    audit(&state, tenant.practice_id, &tenant.actor(), action, "client", id, json!({})).await;

    Ok(Json(PortalAccessResponse { client, token }))
}

pub fn client_routes() -> Router<AppState> {
    Router::new()
        .route("/api/clients", get(list_clients).post(create_client))
        .route(
            "/api/clients/:id",
            get(get_client).patch(update_client).delete(delete_client),
        )
        .route("/api/clients/:id/portal-access", post(set_portal_access))
}
