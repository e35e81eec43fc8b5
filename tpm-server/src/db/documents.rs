//! Document metadata
//!
//! File contents live in the blob store under `storage_key`; this table
//! records who owns the file and the checksum to verify it against.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tpm_common::pagination::{calculate_pagination, Page};
use tpm_common::time::now_timestamp;
use tpm_common::{Error, Result};
use uuid::Uuid;

use super::clients::require_client;
use super::{opt_uuid_col, uuid_col};

const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub client_id: Option<Uuid>,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    #[serde(skip)]
    pub storage_key: String,
    pub uploaded_by: Option<Uuid>,
    pub created_at: String,
}

impl Document {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            practice_id: uuid_col(row, "practice_id")?,
            client_id: opt_uuid_col(row, "client_id")?,
            filename: row.try_get("filename")?,
            content_type: row.try_get("content_type")?,
            size_bytes: row.try_get("size_bytes")?,
            sha256: row.try_get("sha256")?,
            storage_key: row.try_get("storage_key")?,
            uploaded_by: opt_uuid_col(row, "uploaded_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Blob key for a document: `<practice_id>/<document_id>`
pub fn storage_key(practice_id: Uuid, document_id: Uuid) -> String {
    format!("{}/{}", practice_id, document_id)
}

/// Reduce an uploaded name to its final path component
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>();

    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidInput(format!("Invalid filename '{}'", raw)));
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err(Error::InvalidInput(format!(
            "Filename longer than {} bytes",
            MAX_FILENAME_LEN
        )));
    }
    Ok(name)
}

/// Metadata for a blob that has been written
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub client_id: Option<Uuid>,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub uploaded_by: Option<Uuid>,
}

/// Check that an upload may be attached to `client_id`
pub async fn check_document_owner(
    pool: &SqlitePool,
    practice_id: Uuid,
    client_id: Option<Uuid>,
) -> Result<()> {
    match client_id {
        Some(client_id) => require_client(pool, practice_id, client_id).await,
        None => Ok(()),
    }
}

pub async fn create_document(
    pool: &SqlitePool,
    practice_id: Uuid,
    new: NewDocument,
) -> Result<Document> {
    let document = Document {
        id: new.id,
        practice_id,
        client_id: new.client_id,
        filename: sanitize_filename(&new.filename)?,
        content_type: new.content_type,
        size_bytes: new.size_bytes,
        sha256: new.sha256,
        storage_key: storage_key(practice_id, new.id),
        uploaded_by: new.uploaded_by,
        created_at: now_timestamp(),
    };

    sqlx::query(
        r#"
        INSERT INTO documents (
            id, practice_id, client_id, filename, content_type, size_bytes,
            sha256, storage_key, uploaded_by, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(document.id.to_string())
    .bind(practice_id.to_string())
    .bind(document.client_id.map(|id| id.to_string()))
    .bind(&document.filename)
    .bind(&document.content_type)
    .bind(document.size_bytes)
    .bind(&document.sha256)
    .bind(&document.storage_key)
    .bind(document.uploaded_by.map(|id| id.to_string()))
    .bind(&document.created_at)
    .execute(pool)
    .await?;

    Ok(document)
}

const DOCUMENT_COLUMNS: &str = "id, practice_id, client_id, filename, content_type, size_bytes, \
     sha256, storage_key, uploaded_by, created_at";

pub async fn get_document(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<Document> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM documents WHERE id = ? AND practice_id = ? AND deleted_at IS NULL",
        DOCUMENT_COLUMNS
    ))
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Document::from_row(&row),
        None => Err(Error::NotFound(format!("Document {}", id))),
    }
}

fn push_document_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    practice_id: Uuid,
    client_id: Option<Uuid>,
) {
    qb.push(" WHERE practice_id = ")
        .push_bind(practice_id.to_string())
        .push(" AND deleted_at IS NULL");
    if let Some(client_id) = client_id {
        qb.push(" AND client_id = ").push_bind(client_id.to_string());
    }
}

/// List documents, newest first
pub async fn list_documents(
    pool: &SqlitePool,
    practice_id: Uuid,
    client_id: Option<Uuid>,
    page: i64,
    page_size: Option<i64>,
) -> Result<Page<Document>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM documents");
    push_document_filters(&mut count, practice_id, client_id);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let p = calculate_pagination(total, page, page_size);

    let mut select =
        QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM documents", DOCUMENT_COLUMNS));
    push_document_filters(&mut select, practice_id, client_id);
    select
        .push(" ORDER BY created_at DESC, id LIMIT ")
        .push_bind(p.page_size)
        .push(" OFFSET ")
        .push_bind(p.offset);
    let rows = select.build().fetch_all(pool).await?;

    let items = rows.iter().map(Document::from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, total, p))
}

/// Soft-delete a document; the blob is kept
pub async fn delete_document(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<()> {
    let result = sqlx::query(
        "UPDATE documents SET deleted_at = ? WHERE id = ? AND practice_id = ? AND deleted_at IS NULL",
    )
    .bind(now_timestamp())
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Document {}", id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::practices::create_practice;
    use tpm_common::db::init_memory_database;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\scan 1.png").unwrap(), "scan 1.png");
        assert!(sanitize_filename("dir/").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename(&"a".repeat(300)).is_err());
    }

    #[tokio::test]
    async fn test_create_list_delete() {
        let pool = init_memory_database().await.unwrap();
        let (practice, _) = create_practice(&pool, "P").await.unwrap();
        let id = Uuid::new_v4();

        let document = create_document(
            &pool,
            practice.id,
            NewDocument {
                id,
                client_id: None,
                filename: "consent.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                size_bytes: 3,
                sha256: "abc".to_string(),
                uploaded_by: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(document.storage_key, format!("{}/{}", practice.id, id));
        assert_eq!(get_document(&pool, practice.id, id).await.unwrap(), document);

        let page = list_documents(&pool, practice.id, None, 1, None).await.unwrap();
        assert_eq!(page.total, 1);

        delete_document(&pool, practice.id, id).await.unwrap();
        assert!(matches!(get_document(&pool, practice.id, id).await, Err(Error::NotFound(_))));
        assert_eq!(list_documents(&pool, practice.id, None, 1, None).await.unwrap().total, 0);
    }
}
