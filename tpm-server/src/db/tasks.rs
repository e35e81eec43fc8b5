//! Practice task tracking

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tpm_common::pagination::{calculate_pagination, Page};
use tpm_common::time::now_timestamp;
use tpm_common::{Error, Result};
use uuid::Uuid;

use super::clients::require_client;
use super::staff::require_active_staff;
use super::{opt_uuid_col, optional_text, required_text, uuid_col};

db_enum! {
    TaskPriority {
        Low => "low",
        Normal => "normal",
        High => "high",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub client_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub priority: TaskPriority,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let priority: String = row.try_get("priority")?;
        let due: Option<String> = row.try_get("due_date")?;
        Ok(Self {
            id: uuid_col(row, "id")?,
            practice_id: uuid_col(row, "practice_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            client_id: opt_uuid_col(row, "client_id")?,
            assignee_id: opt_uuid_col(row, "assignee_id")?,
            due_date: due
                .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
                .transpose()
                .map_err(|e| Error::Internal(format!("Corrupt due_date: {}", e)))?,
            priority: TaskPriority::from_db(&priority)?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub client_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "crate::db::nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::db::nullable")]
    pub client_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "crate::db::nullable")]
    pub assignee_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "crate::db::nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    pub priority: Option<TaskPriority>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub assignee_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub completed: Option<bool>,
    /// Tasks due strictly before this date
    pub due_before: Option<NaiveDate>,
    #[serde(default)]
    pub page: i64,
    pub page_size: Option<i64>,
}

const TASK_COLUMNS: &str = "id, practice_id, title, description, client_id, assignee_id, \
     due_date, priority, completed_at, created_at, updated_at";

async fn check_references(
    pool: &SqlitePool,
    practice_id: Uuid,
    client_id: Option<Uuid>,
    assignee_id: Option<Uuid>,
) -> Result<()> {
    if let Some(client_id) = client_id {
        require_client(pool, practice_id, client_id).await?;
    }
    if let Some(assignee_id) = assignee_id {
        require_active_staff(pool, practice_id, assignee_id).await?;
    }
    Ok(())
}

pub async fn create_task(pool: &SqlitePool, practice_id: Uuid, new: NewTask) -> Result<Task> {
    let title = required_text("Title", &new.title)?;
    check_references(pool, practice_id, new.client_id, new.assignee_id).await?;

    let now = now_timestamp();
    let task = Task {
        id: Uuid::new_v4(),
        practice_id,
        title,
        description: optional_text(new.description.as_deref()),
        client_id: new.client_id,
        assignee_id: new.assignee_id,
        due_date: new.due_date,
        priority: new.priority.unwrap_or(TaskPriority::Normal),
        completed_at: None,
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO tasks (
            id, practice_id, title, description, client_id, assignee_id,
            due_date, priority, completed_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)
        "#,
    )
    .bind(task.id.to_string())
    .bind(practice_id.to_string())
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.client_id.map(|id| id.to_string()))
    .bind(task.assignee_id.map(|id| id.to_string()))
    .bind(task.due_date.map(|d| d.to_string()))
    .bind(task.priority.as_str())
    .bind(&task.created_at)
    .bind(&task.updated_at)
    .execute(pool)
    .await?;

    Ok(task)
}

pub async fn get_task(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<Task> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM tasks WHERE id = ? AND practice_id = ? AND deleted_at IS NULL",
        TASK_COLUMNS
    ))
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Task::from_row(&row),
        None => Err(Error::NotFound(format!("Task {}", id))),
    }
}

fn push_task_filters(qb: &mut QueryBuilder<'_, Sqlite>, practice_id: Uuid, filter: &TaskFilter) {
    qb.push(" WHERE practice_id = ")
        .push_bind(practice_id.to_string())
        .push(" AND deleted_at IS NULL");

    if let Some(assignee_id) = filter.assignee_id {
        qb.push(" AND assignee_id = ").push_bind(assignee_id.to_string());
    }
    if let Some(client_id) = filter.client_id {
        qb.push(" AND client_id = ").push_bind(client_id.to_string());
    }
    match filter.completed {
        Some(true) => {
            qb.push(" AND completed_at IS NOT NULL");
        }
        Some(false) => {
            qb.push(" AND completed_at IS NULL");
        }
        None => {}
    }
    if let Some(due_before) = filter.due_before {
        qb.push(" AND due_date < ").push_bind(due_before.to_string());
    }
}

/// List tasks, soonest due first; undated tasks sort last
pub async fn list_tasks(
    pool: &SqlitePool,
    practice_id: Uuid,
    filter: &TaskFilter,
) -> Result<Page<Task>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tasks");
    push_task_filters(&mut count, practice_id, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let p = calculate_pagination(total, filter.page, filter.page_size);

    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM tasks", TASK_COLUMNS));
    push_task_filters(&mut select, practice_id, filter);
    select
        .push(" ORDER BY due_date IS NULL, due_date, created_at, id LIMIT ")
        .push_bind(p.page_size)
        .push(" OFFSET ")
        .push_bind(p.offset);
    let rows = select.build().fetch_all(pool).await?;

    let items = rows.iter().map(Task::from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, total, p))
}

pub async fn update_task(
    pool: &SqlitePool,
    practice_id: Uuid,
    id: Uuid,
    update: TaskUpdate,
) -> Result<Task> {
    let existing = get_task(pool, practice_id, id).await?;
    let mut task = existing.clone();

    if let Some(title) = update.title {
        task.title = required_text("Title", &title)?;
    }
    if let Some(description) = update.description {
        task.description = optional_text(description.as_deref());
    }
    if let Some(client_id) = update.client_id {
        task.client_id = client_id;
    }
    if let Some(assignee_id) = update.assignee_id {
        task.assignee_id = assignee_id;
    }
    if let Some(due_date) = update.due_date {
        task.due_date = due_date;
    }
    if let Some(priority) = update.priority {
        task.priority = priority;
    }

    let now = now_timestamp();
    match update.completed {
        Some(true) if task.completed_at.is_none() => task.completed_at = Some(now.clone()),
        Some(false) => task.completed_at = None,
        _ => {}
    }

    if task == existing {
        return Ok(existing);
    }

    check_references(
        pool,
        practice_id,
        task.client_id.filter(|_| task.client_id != existing.client_id),
        task.assignee_id.filter(|_| task.assignee_id != existing.assignee_id),
    )
    .await?;

    task.updated_at = now;
    sqlx::query(
        r#"
        UPDATE tasks SET
            title = ?, description = ?, client_id = ?, assignee_id = ?, due_date = ?,
            priority = ?, completed_at = ?, updated_at = ?
        WHERE id = ? AND practice_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.client_id.map(|id| id.to_string()))
    .bind(task.assignee_id.map(|id| id.to_string()))
    .bind(task.due_date.map(|d| d.to_string()))
    .bind(task.priority.as_str())
    .bind(&task.completed_at)
    .bind(&task.updated_at)
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .execute(pool)
    .await?;

    Ok(task)
}

pub async fn delete_task(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<()> {
    let now = now_timestamp();
    let result = sqlx::query(
        r#"
        UPDATE tasks SET deleted_at = ?, updated_at = ?
        WHERE id = ? AND practice_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Task {}", id)));
    }
    Ok(())
}
