//! Help center articles (global, not tenant-owned)

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tpm_common::time::now_timestamp;
use tpm_common::{Error, Result};
use uuid::Uuid;

use super::{like_pattern, required_text, uuid_col};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HelpGuide {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub category: String,
    /// Markdown
    pub body: String,
    pub position: i64,
    pub published: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl HelpGuide {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            slug: row.try_get("slug")?,
            title: row.try_get("title")?,
            category: row.try_get("category")?,
            body: row.try_get("body")?,
            position: row.try_get("position")?,
            published: row.try_get("published")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuideInput {
    pub title: String,
    pub category: String,
    pub body: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_published() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuideFilter {
    pub category: Option<String>,
    /// Case-insensitive match on title and body
    pub q: Option<String>,
}

const GUIDE_COLUMNS: &str =
    "id, slug, title, category, body, position, published, created_at, updated_at";

/// Slugs are lowercase ASCII alphanumerics separated by single hyphens
pub fn validate_slug(slug: &str) -> Result<()> {
    let valid = !slug.is_empty()
        && slug.len() <= 100
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--");
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid slug '{}'", slug)))
    }
}

/// Published guides ordered for display
pub async fn list_published(pool: &SqlitePool, filter: &GuideFilter) -> Result<Vec<HelpGuide>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM help_guides WHERE published = 1",
        GUIDE_COLUMNS
    ));
    if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
        qb.push(" AND category = ").push_bind(category.to_string());
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = like_pattern(q);
        qb.push(" AND (lower(title) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR lower(body) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    qb.push(" ORDER BY position, title COLLATE NOCASE");

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(HelpGuide::from_row).collect()
}

/// A published guide by slug
pub async fn get_published(pool: &SqlitePool, slug: &str) -> Result<HelpGuide> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM help_guides WHERE slug = ? AND published = 1",
        GUIDE_COLUMNS
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => HelpGuide::from_row(&row),
        None => Err(Error::NotFound(format!("Help guide '{}'", slug))),
    }
}

/// Create or replace the guide at `slug`; returns it and whether it was new
pub async fn upsert_guide(
    pool: &SqlitePool,
    slug: &str,
    input: GuideInput,
) -> Result<(HelpGuide, bool)> {
    validate_slug(slug)?;
    let title = required_text("Title", &input.title)?;
    let category = required_text("Category", &input.category)?;
    let body = required_text("Body", &input.body)?;
    let now = now_timestamp();

    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM help_guides WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    let created = existing.is_none();

    sqlx::query(
        r#"
        INSERT INTO help_guides
            (id, slug, title, category, body, position, published, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (slug) DO UPDATE SET
            title = excluded.title,
            category = excluded.category,
            body = excluded.body,
            position = excluded.position,
            published = excluded.published,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(slug)
    .bind(&title)
    .bind(&category)
    .bind(&body)
    .bind(input.position)
    .bind(input.published)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    let row = sqlx::query(&format!("SELECT {} FROM help_guides WHERE slug = ?", GUIDE_COLUMNS))
        .bind(slug)
        .fetch_one(pool)
        .await?;
    Ok((HelpGuide::from_row(&row)?, created))
}

/// Withdraw a guide from the help center
///
/// The row is kept unpublished so start-up seeding does not bring a
/// built-in guide back.
pub async fn unpublish_guide(pool: &SqlitePool, slug: &str) -> Result<()> {
    let result = sqlx::query(
        "UPDATE help_guides SET published = 0, updated_at = ? WHERE slug = ? AND published = 1",
    )
    .bind(now_timestamp())
    .bind(slug)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Help guide '{}'", slug)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpm_common::db::create_schema;
    use tpm_common::db::init_memory_database;

    fn input(title: &str) -> GuideInput {
        GuideInput {
            title: title.to_string(),
            category: "billing".to_string(),
            body: "Use tasks to track superbills.".to_string(),
            position: 5,
            published: true,
        }
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("session-notes").is_ok());
        assert!(validate_slug("faq2").is_ok());
        for bad in ["", "Session", "a--b", "-a", "a-", "a_b", "a b"] {
            assert!(validate_slug(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[tokio::test]
    async fn test_seeded_guides_are_listed() {
        let pool = init_memory_database().await.unwrap();
        let guides = list_published(&pool, &GuideFilter::default()).await.unwrap();
        assert_eq!(guides.len(), 5);
        assert_eq!(guides[0].slug, "getting-started");

        let filter = GuideFilter { q: Some("ADDENDUM".to_string()), ..GuideFilter::default() };
        let found = list_published(&pool, &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slug, "session-notes");
    }

    #[tokio::test]
    async fn test_upsert_creates_then_replaces() {
        let pool = init_memory_database().await.unwrap();

        let (created, is_new) = upsert_guide(&pool, "billing-tasks", input("Billing")).await.unwrap();
        assert!(is_new);
        let (replaced, is_new) =
            upsert_guide(&pool, "billing-tasks", input("Billing tasks")).await.unwrap();
        assert!(!is_new);
        assert_eq!(replaced.id, created.id);
        assert_eq!(get_published(&pool, "billing-tasks").await.unwrap().title, "Billing tasks");
    }

    #[tokio::test]
    async fn test_unpublished_builtin_stays_hidden_after_reseed() {
        let pool = init_memory_database().await.unwrap();
        unpublish_guide(&pool, "assessments").await.unwrap();
        assert!(matches!(get_published(&pool, "assessments").await, Err(Error::NotFound(_))));
        assert!(matches!(unpublish_guide(&pool, "assessments").await, Err(Error::NotFound(_))));

        create_schema(&pool).await.unwrap();
        assert!(get_published(&pool, "assessments").await.is_err());
    }
}
