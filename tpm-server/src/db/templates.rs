//! Assessment templates: questionnaires built from sections and questions
//!
//! Templates are immutable once created. Archiving hides a template from
//! new assignments while existing assignments keep using it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tpm_common::time::now_timestamp;
use tpm_common::{Error, Result};
use uuid::Uuid;

use super::{optional_text, required_text, uuid_col};

db_enum! {
    QuestionKind {
        Text => "text",
        SingleChoice => "single_choice",
        MultiChoice => "multi_choice",
        Scale => "scale",
        YesNo => "yes_no",
    }
}

impl QuestionKind {
    pub fn is_choice(self) -> bool {
        matches!(self, QuestionKind::SingleChoice | QuestionKind::MultiChoice)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub archived_at: Option<String>,
    pub created_at: String,
}

impl Template {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            practice_id: uuid_col(row, "practice_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            archived_at: row.try_get("archived_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    pub id: Uuid,
    pub section_id: Uuid,
    pub template_id: Uuid,
    pub prompt: String,
    pub kind: QuestionKind,
    pub options: Vec<String>,
    pub scale_min: Option<i64>,
    pub scale_max: Option<i64>,
    pub required: bool,
    pub position: i64,
}

impl Question {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let kind: String = row.try_get("kind")?;
        let options: String = row.try_get("options")?;
        Ok(Self {
            id: uuid_col(row, "id")?,
            section_id: uuid_col(row, "section_id")?,
            template_id: uuid_col(row, "template_id")?,
            prompt: row.try_get("prompt")?,
            kind: QuestionKind::from_db(&kind)?,
            options: serde_json::from_str(&options)?,
            scale_min: row.try_get("scale_min")?,
            scale_max: row.try_get("scale_max")?,
            required: row.try_get("required")?,
            position: row.try_get("position")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionDetail {
    pub id: Uuid,
    pub title: String,
    pub position: i64,
    pub questions: Vec<Question>,
}

/// Template with its sections and questions in display order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateDetail {
    #[serde(flatten)]
    pub template: Template,
    pub sections: Vec<SectionDetail>,
}

impl TemplateDetail {
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.sections.iter().flat_map(|s| s.questions.iter())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub sections: Vec<NewSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSection {
    pub title: String,
    #[serde(default)]
    pub questions: Vec<NewQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewQuestion {
    pub prompt: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<String>,
    pub scale_min: Option<i64>,
    pub scale_max: Option<i64>,
    #[serde(default)]
    pub required: bool,
}

fn validate_question(q: &NewQuestion) -> Result<()> {
    required_text("Question prompt", &q.prompt)?;

    if q.kind.is_choice() {
        if q.options.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Question '{}' needs at least one option",
                q.prompt
            )));
        }
        let mut seen = HashSet::new();
        for option in &q.options {
            if option.trim().is_empty() {
                return Err(Error::InvalidInput(format!(
                    "Question '{}' has a blank option",
                    q.prompt
                )));
            }
            if !seen.insert(option.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Question '{}' repeats option '{}'",
                    q.prompt, option
                )));
            }
        }
    } else if !q.options.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Options are only allowed on choice questions ('{}')",
            q.prompt
        )));
    }

    match (q.kind, q.scale_min, q.scale_max) {
        (QuestionKind::Scale, Some(min), Some(max)) if min < max => Ok(()),
        (QuestionKind::Scale, _, _) => Err(Error::InvalidInput(format!(
            "Scale question '{}' needs scale_min < scale_max",
            q.prompt
        ))),
        (_, None, None) => Ok(()),
        _ => Err(Error::InvalidInput(format!(
            "Scale bounds are only allowed on scale questions ('{}')",
            q.prompt
        ))),
    }
}

/// Validate a template definition before anything is written
pub fn validate_template(new: &NewTemplate) -> Result<()> {
    required_text("Template name", &new.name)?;
    if new.sections.iter().all(|s| s.questions.is_empty()) {
        return Err(Error::InvalidInput(
            "A template needs at least one question".to_string(),
        ));
    }
    for section in &new.sections {
        required_text("Section title", &section.title)?;
        for question in &section.questions {
            validate_question(question)?;
        }
    }
    Ok(())
}

/// Create a template with all sections and questions in one transaction
pub async fn create_template(
    pool: &SqlitePool,
    practice_id: Uuid,
    new: NewTemplate,
) -> Result<TemplateDetail> {
    validate_template(&new)?;

    let template = Template {
        id: Uuid::new_v4(),
        practice_id,
        name: required_text("Template name", &new.name)?,
        description: optional_text(new.description.as_deref()),
        archived_at: None,
        created_at: now_timestamp(),
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO assessment_templates (id, practice_id, name, description, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(template.id.to_string())
    .bind(practice_id.to_string())
    .bind(&template.name)
    .bind(&template.description)
    .bind(&template.created_at)
    .execute(&mut *tx)
    .await?;

    let mut sections = Vec::with_capacity(new.sections.len());
    for (section_pos, new_section) in new.sections.into_iter().enumerate() {
        let section_id = Uuid::new_v4();
        let title = required_text("Section title", &new_section.title)?;

        sqlx::query(
            "INSERT INTO assessment_sections (id, template_id, title, position) VALUES (?, ?, ?, ?)",
        )
        .bind(section_id.to_string())
        .bind(template.id.to_string())
        .bind(&title)
        .bind(section_pos as i64)
        .execute(&mut *tx)
        .await?;

        let mut questions = Vec::with_capacity(new_section.questions.len());
        for (question_pos, q) in new_section.questions.into_iter().enumerate() {
            let question = Question {
                id: Uuid::new_v4(),
                section_id,
                template_id: template.id,
                prompt: required_text("Question prompt", &q.prompt)?,
                kind: q.kind,
                options: q.options,
                scale_min: q.scale_min,
                scale_max: q.scale_max,
                required: q.required,
                position: question_pos as i64,
            };

            sqlx::query(
                r#"
                INSERT INTO assessment_questions (
                    id, section_id, template_id, prompt, kind, options,
                    scale_min, scale_max, required, position
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(question.id.to_string())
            .bind(section_id.to_string())
            .bind(template.id.to_string())
            .bind(&question.prompt)
            .bind(question.kind.as_str())
            .bind(serde_json::to_string(&question.options)?)
            .bind(question.scale_min)
            .bind(question.scale_max)
            .bind(question.required)
            .bind(question.position)
            .execute(&mut *tx)
            .await?;

            questions.push(question);
        }

        sections.push(SectionDetail {
            id: section_id,
            title,
            position: section_pos as i64,
            questions,
        });
    }

    tx.commit().await?;

    Ok(TemplateDetail { template, sections })
}

/// Templates available for new assignments
pub async fn list_templates(pool: &SqlitePool, practice_id: Uuid) -> Result<Vec<Template>> {
    let rows = sqlx::query(
        "SELECT id, practice_id, name, description, archived_at, created_at \
         FROM assessment_templates WHERE practice_id = ? AND archived_at IS NULL \
         ORDER BY name COLLATE NOCASE, id",
    )
    .bind(practice_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(Template::from_row).collect()
}

/// Load a template, archived or not
pub async fn get_template(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<Template> {
    let row = sqlx::query(
        "SELECT id, practice_id, name, description, archived_at, created_at \
         FROM assessment_templates WHERE id = ? AND practice_id = ?",
    )
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Template::from_row(&row),
        None => Err(Error::NotFound(format!("Assessment template {}", id))),
    }
}

pub async fn get_template_detail(
    pool: &SqlitePool,
    practice_id: Uuid,
    id: Uuid,
) -> Result<TemplateDetail> {
    let template = get_template(pool, practice_id, id).await?;

    let section_rows = sqlx::query(
        "SELECT id, title, position FROM assessment_sections WHERE template_id = ? ORDER BY position",
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    let questions = list_questions(pool, id).await?;

    let mut sections = Vec::with_capacity(section_rows.len());
    for row in &section_rows {
        let section_id = uuid_col(row, "id")?;
        sections.push(SectionDetail {
            id: section_id,
            title: row.try_get("title")?,
            position: row.try_get("position")?,
            questions: questions
                .iter()
                .filter(|q| q.section_id == section_id)
                .cloned()
                .collect(),
        });
    }

    Ok(TemplateDetail { template, sections })
}

/// All questions of a template, in section then question order
pub async fn list_questions(pool: &SqlitePool, template_id: Uuid) -> Result<Vec<Question>> {
    let rows = sqlx::query(
        r#"
        SELECT q.id, q.section_id, q.template_id, q.prompt, q.kind, q.options,
               q.scale_min, q.scale_max, q.required, q.position
        FROM assessment_questions q
        JOIN assessment_sections s ON s.id = q.section_id
        WHERE q.template_id = ?
        ORDER BY s.position, q.position
        "#,
    )
    .bind(template_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(Question::from_row).collect()
}

/// Archive a template; archiving twice is a no-op
pub async fn archive_template(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<Template> {
    let mut template = get_template(pool, practice_id, id).await?;
    if template.archived_at.is_some() {
        return Ok(template);
    }

    template.archived_at = Some(now_timestamp());
    sqlx::query("UPDATE assessment_templates SET archived_at = ? WHERE id = ? AND practice_id = ?")
        .bind(&template.archived_at)
        .bind(id.to_string())
        .bind(practice_id.to_string())
        .execute(pool)
        .await?;

    Ok(template)
}
