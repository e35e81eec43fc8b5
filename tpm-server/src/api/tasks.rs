//! Task endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde_json::json;
use tpm_common::Page;
use uuid::Uuid;

use crate::api::activity::{audit, notify};
use crate::api::Tenant;
use crate::db::notifications::NewNotification;
use crate::db::tasks::{self, NewTask, Task, TaskFilter, TaskUpdate};
use crate::{ApiResult, AppState};

/// Tell the assignee a task landed on their list
async fn notify_assignee(state: &AppState, task: &Task) -> ApiResult<()> {
    let Some(assignee_id) = task.assignee_id else {
        return Ok(());
    };
    notify(
        state,
        task.practice_id,
        NewNotification {
            recipient_id: Some(assignee_id),
            kind: "task_assigned",
            message: format!("You were assigned the task \"{}\"", task.title),
            entity_type: Some("task"),
            entity_id: Some(task.id),
        },
    )
    .await?;
    Ok(())
}

/// POST /api/tasks
pub async fn create_task(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(payload): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = tasks::create_task(&state.db, tenant.practice_id, payload).await?;

    audit(
        &state,
        tenant.practice_id,
        &tenant.actor(),
        "create",
        "task",
        task.id,
        json!({ "assignee_id": task.assignee_id }),
    )
    .await;
    notify_assignee(&state, &task).await?;

    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(filter): Query<TaskFilter>,
) -> ApiResult<Json<Page<Task>>> {
    Ok(Json(tasks::list_tasks(&state.db, tenant.practice_id, &filter).await?))
}

/// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(tasks::get_task(&state.db, tenant.practice_id, id).await?))
}

/// PATCH /api/tasks/:id
pub async fn update_task(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(update): Json<TaskUpdate>,
) -> ApiResult<Json<Task>> {
    let before = tasks::get_task(&state.db, tenant.practice_id, id).await?;
    let task = tasks::update_task(&state.db, tenant.practice_id, id, update).await?;

    if task != before {
        audit(
            &state,
            tenant.practice_id,
            &tenant.actor(),
            "update",
            "task",
            id,
            json!({ "assignee_id": task.assignee_id, "completed": task.is_completed() }),
        )
        .await;
    }
    if task.assignee_id != before.assignee_id {
        notify_assignee(&state, &task).await?;
    }

    Ok(Json(task))
}

/// DELETE /api/tasks/:id
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tasks::delete_task(&state.db, tenant.practice_id, id).await?;
    audit(&state, tenant.practice_id, &tenant.actor(), "delete", "task", id, json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/:id", get(get_task).patch(update_task).delete(delete_task))
}
