//! Practice (tenant) persistence

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tpm_common::api::generate_shared_secret;
use tpm_common::time::now_timestamp;
use tpm_common::Result;
use uuid::Uuid;

use super::{required_text, uuid_col};

/// Practice record; the shared secret is never part of it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Practice {
    pub id: Uuid,
    pub name: String,
    pub created_at: String,
}

/// Create a practice with a freshly generated shared secret
pub async fn create_practice(pool: &SqlitePool, name: &str) -> Result<(Practice, i64)> {
    let name = required_text("Practice name", name)?;
    let practice = Practice {
        id: Uuid::new_v4(),
        name,
        created_at: now_timestamp(),
    };
    let secret = generate_shared_secret();

    sqlx::query("INSERT INTO practices (id, name, shared_secret, created_at) VALUES (?, ?, ?, ?)")
        .bind(practice.id.to_string())
        .bind(&practice.name)
        .bind(secret)
        .bind(&practice.created_at)
        .execute(pool)
        .await?;

    Ok((practice, secret))
}

/// Load a practice
pub async fn get_practice(pool: &SqlitePool, id: Uuid) -> Result<Option<Practice>> {
    let row = sqlx::query("SELECT id, name, created_at FROM practices WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|row| {
        Ok(Practice {
            id: uuid_col(&row, "id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    })
    .transpose()
}

/// Load the request-signing secret of a practice
pub async fn load_shared_secret(pool: &SqlitePool, id: Uuid) -> Result<Option<i64>> {
    let secret: Option<i64> =
        sqlx::query_scalar("SELECT shared_secret FROM practices WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(pool)
            .await?;
    Ok(secret)
}

/// Replace the shared secret; `0` disables request signing for the practice
pub async fn set_shared_secret(pool: &SqlitePool, id: Uuid, secret: i64) -> Result<()> {
    let result = sqlx::query("UPDATE practices SET shared_secret = ? WHERE id = ?")
        .bind(secret)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(tpm_common::Error::NotFound(format!("Practice {}", id)));
    }
    Ok(())
}
