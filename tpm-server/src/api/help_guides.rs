//! Help center endpoints
//!
//! Reading is public; editing lives under the admin routes.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use crate::db::help_guides::{self, GuideFilter, HelpGuide};
use crate::{ApiResult, AppState};

/// GET /api/help-guides?category=&q=
pub async fn list_guides(
    State(state): State<AppState>,
    Query(filter): Query<GuideFilter>,
) -> ApiResult<Json<Vec<HelpGuide>>> {
    Ok(Json(help_guides::list_published(&state.db, &filter).await?))
}

/// GET /api/help-guides/:slug
pub async fn get_guide(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<HelpGuide>> {
    Ok(Json(help_guides::get_published(&state.db, &slug).await?))
}

pub fn help_guide_routes() -> Router<AppState> {
    Router::new()
        .route("/api/help-guides", get(list_guides))
        .route("/api/help-guides/:slug", get(get_guide))
}
