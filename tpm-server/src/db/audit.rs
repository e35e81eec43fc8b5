//! Append-only audit trail of mutations

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tpm_common::pagination::{calculate_pagination, Page};
use tpm_common::time::now_timestamp;
use tpm_common::Result;
use uuid::Uuid;

use super::uuid_col;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Value,
    pub created_at: String,
}

impl AuditEntry {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let details: String = row.try_get("details")?;
        Ok(Self {
            id: uuid_col(row, "id")?,
            practice_id: uuid_col(row, "practice_id")?,
            actor: row.try_get("actor")?,
            action: row.try_get("action")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            details: serde_json::from_str(&details)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    #[serde(default)]
    pub page: i64,
    pub page_size: Option<i64>,
}

/// Append an audit entry
pub async fn record(
    pool: &SqlitePool,
    practice_id: Uuid,
    actor: &str,
    action: &str,
    entity_type: &str,
    entity_id: Uuid,
    details: Value,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, practice_id, actor, action, entity_type, entity_id, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(practice_id.to_string())
    .bind(actor)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id.to_string())
    .bind(serde_json::to_string(&details)?)
    .bind(now_timestamp())
    .execute(pool)
    .await?;

    Ok(())
}

fn push_audit_filters(qb: &mut QueryBuilder<'_, Sqlite>, practice_id: Uuid, filter: &AuditFilter) {
    qb.push(" WHERE practice_id = ").push_bind(practice_id.to_string());
    if let Some(entity_type) = &filter.entity_type {
        qb.push(" AND entity_type = ").push_bind(entity_type.clone());
    }
    if let Some(entity_id) = &filter.entity_id {
        qb.push(" AND entity_id = ").push_bind(entity_id.clone());
    }
}

/// Audit entries, newest first
pub async fn list_entries(
    pool: &SqlitePool,
    practice_id: Uuid,
    filter: &AuditFilter,
) -> Result<Page<AuditEntry>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM audit_log");
    push_audit_filters(&mut count, practice_id, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let p = calculate_pagination(total, filter.page, filter.page_size);

    let mut select = QueryBuilder::<Sqlite>::new(
        "SELECT id, practice_id, actor, action, entity_type, entity_id, details, created_at \
         FROM audit_log",
    );
    push_audit_filters(&mut select, practice_id, filter);
    select
        .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
        .push_bind(p.page_size)
        .push(" OFFSET ")
        .push_bind(p.offset);
    let rows = select.build().fetch_all(pool).await?;

    let items = rows.iter().map(AuditEntry::from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, total, p))
}
