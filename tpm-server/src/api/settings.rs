//! Timing hints for the browser client

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tpm_common::db::{get_setting_i64, SettingKey};

use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct ClientSettings {
    /// How often the note editor auto-saves
    pub autosave_interval_secs: i64,
    /// How long assessment answers are collected before a batch is sent
    pub response_batch_window_ms: i64,
    pub max_document_bytes: i64,
}

/// GET /api/settings/client
pub async fn get_client_settings(State(state): State<AppState>) -> ApiResult<Json<ClientSettings>> {
    Ok(Json(ClientSettings {
        autosave_interval_secs: get_setting_i64(&state.db, SettingKey::AutosaveIntervalSecs).await?,
        response_batch_window_ms: get_setting_i64(&state.db, SettingKey::ResponseBatchWindowMs)
            .await?,
        max_document_bytes: get_setting_i64(&state.db, SettingKey::MaxDocumentBytes).await?,
    }))
}

pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings/client", get(get_client_settings))
}
