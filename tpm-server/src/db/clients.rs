//! Client records and portal access

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tpm_common::api::{generate_portal_token, hash_token};
use tpm_common::pagination::{calculate_pagination, Page};
use tpm_common::time::now_timestamp;
use tpm_common::{Error, Result};
use uuid::Uuid;

use super::{like_pattern, optional_text, required_text, uuid_col, validate_email};

db_enum! {
    /// Clinical status of a client
    ClientStatus {
        Active => "active",
        Inactive => "inactive",
        Discharged => "discharged",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Client {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub preferred_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub status: ClientStatus,
    pub portal_access: bool,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Client {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let dob: Option<String> = row.try_get("date_of_birth")?;
        Ok(Self {
            id: uuid_col(row, "id")?,
            practice_id: uuid_col(row, "practice_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            preferred_name: row.try_get("preferred_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            date_of_birth: dob
                .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
                .transpose()
                .map_err(|e| Error::Internal(format!("Corrupt date_of_birth: {}", e)))?,
            status: ClientStatus::from_db(&status)?,
            portal_access: row.try_get("portal_access")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Name used on documents and exports
    pub fn display_name(&self) -> String {
        match &self.preferred_name {
            Some(preferred) => format!("{} ({}) {}", self.first_name, preferred, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub preferred_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub status: Option<ClientStatus>,
    pub notes: Option<String>,
}

/// Partial update; nullable fields accept `null` to clear
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "crate::db::nullable")]
    pub preferred_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::db::nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::db::nullable")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::db::nullable")]
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub status: Option<ClientStatus>,
    #[serde(default, deserialize_with = "crate::db::nullable")]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientFilter {
    /// Case-insensitive match on names and email
    pub q: Option<String>,
    pub status: Option<ClientStatus>,
    #[serde(default)]
    pub page: i64,
    pub page_size: Option<i64>,
}

const CLIENT_COLUMNS: &str = "id, practice_id, first_name, last_name, preferred_name, email, \
     phone, date_of_birth, status, portal_access, notes, created_at, updated_at";

fn normalized_email(email: Option<&str>) -> Result<Option<String>> {
    optional_text(email)
        .map(|e| validate_email(&e).map(|e| e.to_lowercase()))
        .transpose()
}

pub async fn create_client(pool: &SqlitePool, practice_id: Uuid, new: NewClient) -> Result<Client> {
    let now = now_timestamp();
    let client = Client {
        id: Uuid::new_v4(),
        practice_id,
        first_name: required_text("First name", &new.first_name)?,
        last_name: required_text("Last name", &new.last_name)?,
        preferred_name: optional_text(new.preferred_name.as_deref()),
        email: normalized_email(new.email.as_deref())?,
        phone: optional_text(new.phone.as_deref()),
        date_of_birth: new.date_of_birth,
        status: new.status.unwrap_or(ClientStatus::Active),
        portal_access: false,
        notes: optional_text(new.notes.as_deref()),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO clients (
            id, practice_id, first_name, last_name, preferred_name, email, phone,
            date_of_birth, status, portal_access, notes, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(client.id.to_string())
    .bind(practice_id.to_string())
    .bind(&client.first_name)
    .bind(&client.last_name)
    .bind(&client.preferred_name)
    .bind(&client.email)
    .bind(&client.phone)
    .bind(client.date_of_birth.map(|d| d.to_string()))
    .bind(client.status.as_str())
    .bind(&client.notes)
    .bind(&client.created_at)
    .bind(&client.updated_at)
    .execute(pool)
    .await?;

    Ok(client)
}

pub async fn get_client(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<Client> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM clients WHERE id = ? AND practice_id = ? AND deleted_at IS NULL",
        CLIENT_COLUMNS
    ))
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Client::from_row(&row),
        None => Err(Error::NotFound(format!("Client {}", id))),
    }
}

fn push_client_filters(qb: &mut QueryBuilder<'_, Sqlite>, practice_id: Uuid, filter: &ClientFilter) {
    qb.push(" WHERE practice_id = ")
        .push_bind(practice_id.to_string())
        .push(" AND deleted_at IS NULL");

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }

    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = like_pattern(q);
        qb.push(" AND (lower(first_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR lower(last_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR lower(coalesce(preferred_name, '')) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR lower(coalesce(email, '')) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

pub async fn list_clients(
    pool: &SqlitePool,
    practice_id: Uuid,
    filter: &ClientFilter,
) -> Result<Page<Client>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM clients");
    push_client_filters(&mut count, practice_id, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let p = calculate_pagination(total, filter.page, filter.page_size);

    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM clients", CLIENT_COLUMNS));
    push_client_filters(&mut select, practice_id, filter);
    select
        .push(" ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE, id LIMIT ")
        .push_bind(p.page_size)
        .push(" OFFSET ")
        .push_bind(p.offset);
    let rows = select.build().fetch_all(pool).await?;

    let items = rows.iter().map(Client::from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, total, p))
}

/// Apply a partial update; an unchanged record is returned without a write
pub async fn update_client(
    pool: &SqlitePool,
    practice_id: Uuid,
    id: Uuid,
    update: ClientUpdate,
) -> Result<Client> {
    let existing = get_client(pool, practice_id, id).await?;
    let mut client = existing.clone();

    if let Some(first) = update.first_name {
        client.first_name = required_text("First name", &first)?;
    }
    if let Some(last) = update.last_name {
        client.last_name = required_text("Last name", &last)?;
    }
    if let Some(preferred) = update.preferred_name {
        client.preferred_name = optional_text(preferred.as_deref());
    }
    if let Some(email) = update.email {
        client.email = normalized_email(email.as_deref())?;
    }
    if let Some(phone) = update.phone {
        client.phone = optional_text(phone.as_deref());
    }
    if let Some(dob) = update.date_of_birth {
        client.date_of_birth = dob;
    }
    if let Some(status) = update.status {
        client.status = status;
    }
    if let Some(notes) = update.notes {
        client.notes = optional_text(notes.as_deref());
    }

    if client == existing {
        return Ok(existing);
    }
    client.updated_at = now_timestamp();

    sqlx::query(
        r#"
        UPDATE clients SET
            first_name = ?, last_name = ?, preferred_name = ?, email = ?, phone = ?,
            date_of_birth = ?, status = ?, notes = ?, updated_at = ?
        WHERE id = ? AND practice_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(&client.first_name)
    .bind(&client.last_name)
    .bind(&client.preferred_name)
    .bind(&client.email)
    .bind(&client.phone)
    .bind(client.date_of_birth.map(|d| d.to_string()))
    .bind(client.status.as_str())
    .bind(&client.notes)
    .bind(&client.updated_at)
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .execute(pool)
    .await?;

    Ok(client)
}

/// Soft-delete a client; portal access is revoked with it
pub async fn delete_client(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<()> {
    let now = now_timestamp();
    let result = sqlx::query(
        r#"
        UPDATE clients SET deleted_at = ?, updated_at = ?, portal_access = 0, portal_token_hash = NULL
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
        return Err(Error::NotFound(format!("Client {}", id)));
    }
    Ok(())
}

/// Turn portal access on or off
///
/// Enabling always issues a fresh token (rotating any previous one) and
/// returns it; only its hash is stored. Disabling clears the hash.
pub async fn set_portal_access(
    pool: &SqlitePool,
    practice_id: Uuid,
    id: Uuid,
    enabled: bool,
) -> Result<(Client, Option<String>)> {
    let mut client = get_client(pool, practice_id, id).await?;
    let token = enabled.then(generate_portal_token);
    let token_hash = token.as_deref().map(hash_token);

    client.portal_access = enabled;
    client.updated_at = now_timestamp();

    sqlx::query(
        r#"
        UPDATE clients SET portal_access = ?, portal_token_hash = ?, updated_at = ?
        WHERE id = ? AND practice_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(enabled)
    .bind(token_hash)
    .bind(&client.updated_at)
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .execute(pool)
    .await?;

    Ok((client, token))
}

/// Resolve a portal bearer token to `(practice_id, client_id)`
///
/// Only live clients with portal access enabled resolve.
pub async fn find_portal_client(pool: &SqlitePool, token: &str) -> Result<Option<(Uuid, Uuid)>> {
    let row = sqlx::query(
        r#"
        SELECT practice_id, id FROM clients
        WHERE portal_token_hash = ? AND portal_access = 1 AND deleted_at IS NULL
        "#,
    )
    .bind(hash_token(token))
    .fetch_optional(pool)
    .await?;

    row.map(|row| Ok((uuid_col(&row, "practice_id")?, uuid_col(&row, "id")?)))
        .transpose()
}

/// Fail with NotFound unless the client is live in this practice
pub(crate) async fn require_client(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM clients WHERE id = ? AND practice_id = ? AND deleted_at IS NULL)",
    )
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .fetch_one(pool)
    .await?;

    if exists {
        Ok(())
    } else {
        Err(Error::NotFound(format!("Client {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::practices::create_practice;
    use tpm_common::db::init_memory_database;

    fn new_client(first: &str, last: &str) -> NewClient {
        NewClient {
            first_name: first.to_string(),
            last_name: last.to_string(),
            ..NewClient::default()
        }
    }

    #[tokio::test]
    async fn test_create_returns_persisted_record() {
        let pool = init_memory_database().await.unwrap();
        let (practice, _) = create_practice(&pool, "P").await.unwrap();

        let mut new = new_client(" Jordan ", "Lee");
        new.email = Some("Jordan.Lee@Example.com".to_string());
        new.date_of_birth = NaiveDate::from_ymd_opt(1990, 5, 17);
        let created = create_client(&pool, practice.id, new).await.unwrap();

        let loaded = get_client(&pool, practice.id, created.id).await.unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.first_name, "Jordan");
        assert_eq!(loaded.email.as_deref(), Some("jordan.lee@example.com"));
        assert_eq!(loaded.status, ClientStatus::Active);
        assert!(!loaded.portal_access);
    }

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let pool = init_memory_database().await.unwrap();
        let (practice, _) = create_practice(&pool, "P").await.unwrap();

        let mut new = new_client("A", "B");
        new.email = Some("not-an-email".to_string());
        assert!(matches!(
            create_client(&pool, practice.id, new).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        let (practice, _) = create_practice(&pool, "P").await.unwrap();
        let client = create_client(&pool, practice.id, new_client("A", "B")).await.unwrap();

        let update = || ClientUpdate {
            phone: Some(Some("555-0100".to_string())),
            status: Some(ClientStatus::Inactive),
            ..ClientUpdate::default()
        };
        let first = update_client(&pool, practice.id, client.id, update()).await.unwrap();
        let second = update_client(&pool, practice.id, client.id, update()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.phone.as_deref(), Some("555-0100"));

        let cleared = update_client(
            &pool,
            practice.id,
            client.id,
            ClientUpdate { phone: Some(None), ..ClientUpdate::default() },
        )
        .await
        .unwrap();
        assert_eq!(cleared.phone, None);
    }

    #[tokio::test]
    async fn test_delete_hides_client() {
        let pool = init_memory_database().await.unwrap();
        let (practice, _) = create_practice(&pool, "P").await.unwrap();
        let client = create_client(&pool, practice.id, new_client("A", "B")).await.unwrap();

        delete_client(&pool, practice.id, client.id).await.unwrap();

        assert!(matches!(get_client(&pool, practice.id, client.id).await, Err(Error::NotFound(_))));
        assert!(matches!(delete_client(&pool, practice.id, client.id).await, Err(Error::NotFound(_))));
        let page = list_clients(&pool, practice.id, &ClientFilter::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_list_search_and_tenant_scope() {
        let pool = init_memory_database().await.unwrap();
        let (a, _) = create_practice(&pool, "A").await.unwrap();
        let (b, _) = create_practice(&pool, "B").await.unwrap();

        create_client(&pool, a.id, new_client("Maria", "Lopez")).await.unwrap();
        create_client(&pool, a.id, new_client("Sam", "O'Brien")).await.unwrap();
        create_client(&pool, b.id, new_client("Maria", "Other")).await.unwrap();

        let filter = ClientFilter { q: Some("MARIA".to_string()), ..ClientFilter::default() };
        let page = list_clients(&pool, a.id, &filter).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].last_name, "Lopez");

        let all = list_clients(&pool, a.id, &ClientFilter::default()).await.unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.items[0].last_name, "Lopez");
    }

    #[tokio::test]
    async fn test_portal_access_token_lifecycle() {
        let pool = init_memory_database().await.unwrap();
        let (practice, _) = create_practice(&pool, "P").await.unwrap();
        let client = create_client(&pool, practice.id, new_client("A", "B")).await.unwrap();

        let (enabled, token) = set_portal_access(&pool, practice.id, client.id, true).await.unwrap();
        let token = token.unwrap();
        assert!(enabled.portal_access);
        assert_eq!(
            find_portal_client(&pool, &token).await.unwrap(),
            Some((practice.id, client.id))
        );

        // Rotation invalidates the old token
        let (_, rotated) = set_portal_access(&pool, practice.id, client.id, true).await.unwrap();
        assert!(find_portal_client(&pool, &token).await.unwrap().is_none());
        let rotated = rotated.unwrap();
        assert!(find_portal_client(&pool, &rotated).await.unwrap().is_some());

        let (disabled, none) = set_portal_access(&pool, practice.id, client.id, false).await.unwrap();
        assert!(!disabled.portal_access);
        assert!(none.is_none());
        assert!(find_portal_client(&pool, &rotated).await.unwrap().is_none());
    }
}
