//! Operator endpoints: practice provisioning and help center editing

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::api::activity::audit;
use crate::db::help_guides::{self, GuideInput, HelpGuide};
use crate::db::practices::{self, Practice};
use crate::{ApiResult, AppState};

const ADMIN_ACTOR: &str = "admin";

#[derive(Debug, Deserialize)]
pub struct CreatePracticeRequest {
    pub name: String,
}

/// A new practice with the secret its clients sign requests with
///
/// This is the only time the secret is returned.
#[derive(Debug, Serialize)]
pub struct CreatePracticeResponse {
    #[serde(flatten)]
    pub practice: Practice,
    pub shared_secret: i64,
}

/// POST /api/admin/practices
pub async fn create_practice(
    State(state): State<AppState>,
    Json(payload): Json<CreatePracticeRequest>,
) -> ApiResult<(StatusCode, Json<CreatePracticeResponse>)> {
    let (practice, shared_secret) = practices::create_practice(&state.db, &payload.name).await?;
    info!(practice_id = %practice.id, "Created practice '{}'", practice.name);

    audit(&state, practice.id, ADMIN_ACTOR, "create", "practice", practice.id, json!({})).await;

    Ok((
        StatusCode::CREATED,
        Json(CreatePracticeResponse { practice, shared_secret }),
    ))
}

/// PUT /api/admin/help-guides/:slug
pub async fn put_guide(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(input): Json<GuideInput>,
) -> ApiResult<(StatusCode, Json<HelpGuide>)> {
    let (guide, created) = help_guides::upsert_guide(&state.db, &slug, input).await?;
    info!(slug = %guide.slug, created, "Saved help guide");

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(guide)))
}

/// DELETE /api/admin/help-guides/:slug
pub async fn delete_guide(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<StatusCode> {
    help_guides::unpublish_guide(&state.db, &slug).await?;
    info!(%slug, "Unpublished help guide");
    Ok(StatusCode::NO_CONTENT)
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/practices", post(create_practice))
        .route("/api/admin/help-guides/:slug", put(put_guide).delete(delete_guide))
}
