//! Staff notifications
//!
//! A notification is either addressed to one staff member or, with no
//! recipient, to the whole practice.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tpm_common::pagination::{calculate_pagination, Page};
use tpm_common::time::now_timestamp;
use tpm_common::{Error, Result};
use uuid::Uuid;

use super::{opt_uuid_col, uuid_col};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub kind: String,
    pub message: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub read_at: Option<String>,
    pub created_at: String,
}

impl Notification {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            practice_id: uuid_col(row, "practice_id")?,
            recipient_id: opt_uuid_col(row, "recipient_id")?,
            kind: row.try_get("kind")?,
            message: row.try_get("message")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            read_at: row.try_get("read_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Option<Uuid>,
    pub kind: &'static str,
    pub message: String,
    pub entity_type: Option<&'static str>,
    pub entity_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationFilter {
    /// Only unread notifications
    #[serde(default)]
    pub unread: bool,
    #[serde(default)]
    pub page: i64,
    pub page_size: Option<i64>,
}

const NOTIFICATION_COLUMNS: &str = "id, practice_id, recipient_id, kind, message, entity_type, \
     entity_id, read_at, created_at";

pub async fn create_notification(
    pool: &SqlitePool,
    practice_id: Uuid,
    new: NewNotification,
) -> Result<Notification> {
    let notification = Notification {
        id: Uuid::new_v4(),
        practice_id,
        recipient_id: new.recipient_id,
        kind: new.kind.to_string(),
        message: new.message,
        entity_type: new.entity_type.map(str::to_string),
        entity_id: new.entity_id.map(|id| id.to_string()),
        read_at: None,
        created_at: now_timestamp(),
    };

    sqlx::query(
        r#"
        INSERT INTO notifications (
            id, practice_id, recipient_id, kind, message, entity_type, entity_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(notification.id.to_string())
    .bind(practice_id.to_string())
    .bind(notification.recipient_id.map(|id| id.to_string()))
    .bind(&notification.kind)
    .bind(&notification.message)
    .bind(&notification.entity_type)
    .bind(&notification.entity_id)
    .bind(&notification.created_at)
    .execute(pool)
    .await?;

    Ok(notification)
}

/// Visible to `staff_id`: practice-wide plus addressed to them
fn push_visibility(qb: &mut QueryBuilder<'_, Sqlite>, practice_id: Uuid, staff_id: Option<Uuid>) {
    qb.push(" WHERE practice_id = ").push_bind(practice_id.to_string());
    match staff_id {
        Some(staff_id) => {
            qb.push(" AND (recipient_id IS NULL OR recipient_id = ")
                .push_bind(staff_id.to_string())
                .push(")");
        }
        None => {
            qb.push(" AND recipient_id IS NULL");
        }
    }
}

/// Notifications for the caller, newest first
pub async fn list_notifications(
    pool: &SqlitePool,
    practice_id: Uuid,
    staff_id: Option<Uuid>,
    filter: &NotificationFilter,
) -> Result<Page<Notification>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM notifications");
    push_visibility(&mut count, practice_id, staff_id);
    if filter.unread {
        count.push(" AND read_at IS NULL");
    }
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let p = calculate_pagination(total, filter.page, filter.page_size);

    let mut select = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM notifications",
        NOTIFICATION_COLUMNS
    ));
    push_visibility(&mut select, practice_id, staff_id);
    if filter.unread {
        select.push(" AND read_at IS NULL");
    }
    select
        .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
        .push_bind(p.page_size)
        .push(" OFFSET ")
        .push_bind(p.offset);
    let rows = select.build().fetch_all(pool).await?;

    let items = rows.iter().map(Notification::from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, total, p))
}

/// Mark one visible notification read; already-read ones keep their time
pub async fn mark_read(
    pool: &SqlitePool,
    practice_id: Uuid,
    staff_id: Option<Uuid>,
    id: Uuid,
) -> Result<Notification> {
    let mut select = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM notifications",
        NOTIFICATION_COLUMNS
    ));
    push_visibility(&mut select, practice_id, staff_id);
    select.push(" AND id = ").push_bind(id.to_string());

    let row = select.build().fetch_optional(pool).await?;
    let mut notification = match row {
        Some(row) => Notification::from_row(&row)?,
        None => return Err(Error::NotFound(format!("Notification {}", id))),
    };
    if notification.read_at.is_some() {
        return Ok(notification);
    }

    notification.read_at = Some(now_timestamp());
    sqlx::query("UPDATE notifications SET read_at = ? WHERE id = ? AND read_at IS NULL")
        .bind(&notification.read_at)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(notification)
}

/// Mark every visible unread notification read; returns how many changed
pub async fn mark_all_read(
    pool: &SqlitePool,
    practice_id: Uuid,
    staff_id: Option<Uuid>,
) -> Result<u64> {
    let mut update = QueryBuilder::<Sqlite>::new("UPDATE notifications SET read_at = ");
    update.push_bind(now_timestamp());
    push_visibility(&mut update, practice_id, staff_id);
    update.push(" AND read_at IS NULL");

    let result = update.build().execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::practices::create_practice;
    use crate::db::staff::{create_staff, NewStaff, StaffRole};
    use tpm_common::db::init_memory_database;

    fn note(recipient_id: Option<Uuid>, message: &str) -> NewNotification {
        NewNotification {
            recipient_id,
            kind: "task_assigned",
            message: message.to_string(),
            entity_type: None,
            entity_id: None,
        }
    }

    #[tokio::test]
    async fn test_visibility_and_read_state() {
        let pool = init_memory_database().await.unwrap();
        let (practice, _) = create_practice(&pool, "P").await.unwrap();
        let mut staff_ids = Vec::new();
        for email in ["a@example.com", "b@example.com"] {
            let staff = create_staff(
                &pool,
                practice.id,
                NewStaff {
                    display_name: email.to_string(),
                    email: email.to_string(),
                    role: StaffRole::Clinician,
                },
            )
            .await
            .unwrap();
            staff_ids.push(staff.id);
        }
        let (a, b) = (staff_ids[0], staff_ids[1]);

        create_notification(&pool, practice.id, note(None, "everyone")).await.unwrap();
        let for_a = create_notification(&pool, practice.id, note(Some(a), "for a")).await.unwrap();
        create_notification(&pool, practice.id, note(Some(b), "for b")).await.unwrap();

        let filter = NotificationFilter::default();
        assert_eq!(list_notifications(&pool, practice.id, Some(a), &filter).await.unwrap().total, 2);
        assert_eq!(list_notifications(&pool, practice.id, None, &filter).await.unwrap().total, 1);

        // B cannot touch A's notification
        assert!(matches!(
            mark_read(&pool, practice.id, Some(b), for_a.id).await,
            Err(Error::NotFound(_))
        ));
        let read = mark_read(&pool, practice.id, Some(a), for_a.id).await.unwrap();
        assert!(read.read_at.is_some());
        assert_eq!(mark_read(&pool, practice.id, Some(a), for_a.id).await.unwrap(), read);

        assert_eq!(mark_all_read(&pool, practice.id, Some(a)).await.unwrap(), 1);
        let unread = NotificationFilter { unread: true, ..NotificationFilter::default() };
        assert_eq!(list_notifications(&pool, practice.id, Some(a), &unread).await.unwrap().total, 0);
        assert_eq!(list_notifications(&pool, practice.id, Some(b), &unread).await.unwrap().total, 1);
    }
}
