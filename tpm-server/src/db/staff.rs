//! Staff (practice members) persistence

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tpm_common::time::now_timestamp;
use tpm_common::{Error, Result};
use uuid::Uuid;

use super::{map_unique_violation, required_text, uuid_col, validate_email};

db_enum! {
    /// Staff role within a practice
    StaffRole {
        Owner => "owner",
        Clinician => "clinician",
        Assistant => "assistant",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Staff {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub display_name: String,
    pub email: String,
    pub role: StaffRole,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Staff {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: uuid_col(row, "id")?,
            practice_id: uuid_col(row, "practice_id")?,
            display_name: row.try_get("display_name")?,
            email: row.try_get("email")?,
            role: StaffRole::from_db(&role)?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStaff {
    pub display_name: String,
    pub email: String,
    pub role: StaffRole,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaffUpdate {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<StaffRole>,
    pub active: Option<bool>,
}

const STAFF_COLUMNS: &str =
    "id, practice_id, display_name, email, role, active, created_at, updated_at";

pub async fn create_staff(pool: &SqlitePool, practice_id: Uuid, new: NewStaff) -> Result<Staff> {
    let now = now_timestamp();
    let staff = Staff {
        id: Uuid::new_v4(),
        practice_id,
        display_name: required_text("Display name", &new.display_name)?,
        email: validate_email(&new.email)?.to_lowercase(),
        role: new.role,
        active: true,
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO staff (id, practice_id, display_name, email, role, active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(staff.id.to_string())
    .bind(practice_id.to_string())
    .bind(&staff.display_name)
    .bind(&staff.email)
    .bind(staff.role.as_str())
    .bind(&staff.created_at)
    .bind(&staff.updated_at)
    .execute(pool)
    .await
    .map_err(|e| map_unique_violation(e, "A staff member with this email already exists"))?;

    Ok(staff)
}

pub async fn get_staff(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<Staff> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM staff WHERE id = ? AND practice_id = ?",
        STAFF_COLUMNS
    ))
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Staff::from_row(&row),
        None => Err(Error::NotFound(format!("Staff member {}", id))),
    }
}

pub async fn list_staff(pool: &SqlitePool, practice_id: Uuid) -> Result<Vec<Staff>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM staff WHERE practice_id = ? ORDER BY display_name COLLATE NOCASE",
        STAFF_COLUMNS
    ))
    .bind(practice_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(Staff::from_row).collect()
}

/// Apply a partial update; an unchanged record is returned without a write
pub async fn update_staff(
    pool: &SqlitePool,
    practice_id: Uuid,
    id: Uuid,
    update: StaffUpdate,
) -> Result<Staff> {
    let existing = get_staff(pool, practice_id, id).await?;
    let mut staff = existing.clone();

    if let Some(name) = update.display_name {
        staff.display_name = required_text("Display name", &name)?;
    }
    if let Some(email) = update.email {
        staff.email = validate_email(&email)?.to_lowercase();
    }
    if let Some(role) = update.role {
        staff.role = role;
    }
    if let Some(active) = update.active {
        staff.active = active;
    }

    if staff == existing {
        return Ok(existing);
    }
    staff.updated_at = now_timestamp();

    sqlx::query(
        r#"
        UPDATE staff SET display_name = ?, email = ?, role = ?, active = ?, updated_at = ?
        WHERE id = ? AND practice_id = ?
        "#,
    )
    .bind(&staff.display_name)
    .bind(&staff.email)
    .bind(staff.role.as_str())
    .bind(staff.active)
    .bind(&staff.updated_at)
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .execute(pool)
    .await
    .map_err(|e| map_unique_violation(e, "A staff member with this email already exists"))?;

    Ok(staff)
}

/// Whether `id` is an active staff member of the practice
pub async fn is_active_staff<'e, E>(executor: E, practice_id: Uuid, id: Uuid) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let active: Option<bool> =
        sqlx::query_scalar("SELECT active FROM staff WHERE id = ? AND practice_id = ?")
            .bind(id.to_string())
            .bind(practice_id.to_string())
            .fetch_optional(executor)
            .await?;
    Ok(active.unwrap_or(false))
}

/// Reject references to staff outside the practice or inactive staff
pub(crate) async fn require_active_staff<'e, E>(executor: E, practice_id: Uuid, id: Uuid) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    if is_active_staff(executor, practice_id, id).await? {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Unknown or inactive staff member {}", id)))
    }
}
