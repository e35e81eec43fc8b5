//! Assessment assignments and their responses
//!
//! Responses arrive in batches (the UI collects answers for a short window
//! and sends them together). A batch is validated completely before any of
//! it is written, and is then applied in a single transaction.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tpm_common::pagination::{calculate_pagination, Page};
use tpm_common::time::now_timestamp;
use tpm_common::{Error, Result};
use uuid::Uuid;

use super::clients::require_client;
use super::templates::{
    get_template, get_template_detail, list_questions, Question, QuestionKind, TemplateDetail,
};
use super::uuid_col;

db_enum! {
    AssignmentStatus {
        Assigned => "assigned",
        InProgress => "in_progress",
        Completed => "completed",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub client_id: Uuid,
    pub template_id: Uuid,
    pub status: AssignmentStatus,
    pub due_date: Option<NaiveDate>,
    pub score: Option<i64>,
    pub assigned_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl Assignment {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let due: Option<String> = row.try_get("due_date")?;
        Ok(Self {
            id: uuid_col(row, "id")?,
            practice_id: uuid_col(row, "practice_id")?,
            client_id: uuid_col(row, "client_id")?,
            template_id: uuid_col(row, "template_id")?,
            status: AssignmentStatus::from_db(&status)?,
            due_date: due
                .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
                .transpose()
                .map_err(|e| Error::Internal(format!("Corrupt due_date: {}", e)))?,
            score: row.try_get("score")?,
            assigned_at: row.try_get("assigned_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.status == AssignmentStatus::Completed {
            return Err(Error::Conflict(format!(
                "Assessment assignment {} is already completed",
                self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub question_id: Uuid,
    pub value: Value,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub answered: i64,
    pub total: i64,
    pub required_answered: i64,
    pub required_total: i64,
    /// Whole-number share of questions answered
    pub percent: i64,
}

impl Progress {
    pub fn compute(questions: &[Question], answered: &HashSet<Uuid>) -> Self {
        let total = questions.len() as i64;
        let answered_count = questions.iter().filter(|q| answered.contains(&q.id)).count() as i64;
        let required: Vec<_> = questions.iter().filter(|q| q.required).collect();
        let required_answered = required.iter().filter(|q| answered.contains(&q.id)).count() as i64;
        let percent = if total == 0 { 100 } else { answered_count * 100 / total };

        Self {
            answered: answered_count,
            total,
            required_answered,
            required_total: required.len() as i64,
            percent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentDetail {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub template: TemplateDetail,
    pub responses: Vec<Response>,
    pub progress: Progress,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAssignment {
    pub client_id: Uuid,
    pub template_id: Uuid,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseInput {
    pub question_id: Uuid,
    /// `null` clears the answer
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseBatch {
    #[serde(default)]
    pub responses: Vec<ResponseInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentFilter {
    pub client_id: Option<Uuid>,
    pub status: Option<AssignmentStatus>,
    #[serde(default)]
    pub page: i64,
    pub page_size: Option<i64>,
}

const ASSIGNMENT_COLUMNS: &str = "id, practice_id, client_id, template_id, status, due_date, \
     score, assigned_at, started_at, completed_at";

/// Check that an answer fits its question
pub fn validate_answer(question: &Question, value: &Value) -> Result<()> {
    let invalid = |reason: &str| -> Result<()> {
        Err(Error::InvalidInput(format!(
            "Invalid answer for question {}: {}",
            question.id, reason
        )))
    };

    match question.kind {
        QuestionKind::Text => match value.as_str() {
            Some(text) if !text.trim().is_empty() => Ok(()),
            Some(_) => invalid("text must not be blank (send null to clear)"),
            None => invalid("expected text"),
        },
        QuestionKind::SingleChoice => match value.as_str() {
            Some(choice) if question.options.iter().any(|o| o == choice) => Ok(()),
            Some(choice) => invalid(&format!("'{}' is not one of the options", choice)),
            None => invalid("expected one option"),
        },
        QuestionKind::MultiChoice => {
            let Some(items) = value.as_array() else {
                return invalid("expected a list of options");
            };
            if items.is_empty() {
                return invalid("select at least one option (send null to clear)");
            }
            let mut seen = HashSet::new();
            for item in items {
                let Some(choice) = item.as_str() else {
                    return invalid("options must be text");
                };
                if !question.options.iter().any(|o| o == choice) {
                    return invalid(&format!("'{}' is not one of the options", choice));
                }
                if !seen.insert(choice) {
                    return invalid(&format!("'{}' selected twice", choice));
                }
            }
            Ok(())
        }
        QuestionKind::Scale => {
            let (Some(min), Some(max)) = (question.scale_min, question.scale_max) else {
                return Err(Error::Internal(format!(
                    "Scale question {} has no bounds",
                    question.id
                )));
            };
            match value.as_i64() {
                Some(n) if (min..=max).contains(&n) => Ok(()),
                Some(n) => invalid(&format!("{} is outside {}..={}", n, min, max)),
                None => invalid("expected a whole number"),
            }
        }
        QuestionKind::YesNo => match value {
            Value::Bool(_) => Ok(()),
            _ => invalid("expected true or false"),
        },
    }
}

pub async fn create_assignment(
    pool: &SqlitePool,
    practice_id: Uuid,
    new: NewAssignment,
) -> Result<Assignment> {
    require_client(pool, practice_id, new.client_id).await?;
    let template = get_template(pool, practice_id, new.template_id).await?;
    if template.archived_at.is_some() {
        return Err(Error::Conflict(format!(
            "Assessment template {} is archived",
            template.id
        )));
    }

    let assignment = Assignment {
        id: Uuid::new_v4(),
        practice_id,
        client_id: new.client_id,
        template_id: template.id,
        status: AssignmentStatus::Assigned,
        due_date: new.due_date,
        score: None,
        assigned_at: now_timestamp(),
        started_at: None,
        completed_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO assessment_assignments (
            id, practice_id, client_id, template_id, status, due_date, assigned_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(assignment.id.to_string())
    .bind(practice_id.to_string())
    .bind(assignment.client_id.to_string())
    .bind(assignment.template_id.to_string())
    .bind(assignment.status.as_str())
    .bind(assignment.due_date.map(|d| d.to_string()))
    .bind(&assignment.assigned_at)
    .execute(pool)
    .await?;

    Ok(assignment)
}

pub async fn get_assignment(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<Assignment> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM assessment_assignments \
         WHERE id = ? AND practice_id = ? AND deleted_at IS NULL",
        ASSIGNMENT_COLUMNS
    ))
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Assignment::from_row(&row),
        None => Err(Error::NotFound(format!("Assessment assignment {}", id))),
    }
}

/// Load an assignment only if it belongs to `client_id` (portal access)
pub async fn get_client_assignment(
    pool: &SqlitePool,
    practice_id: Uuid,
    client_id: Uuid,
    id: Uuid,
) -> Result<Assignment> {
    let assignment = get_assignment(pool, practice_id, id).await?;
    if assignment.client_id != client_id {
        return Err(Error::NotFound(format!("Assessment assignment {}", id)));
    }
    Ok(assignment)
}

pub async fn list_responses(pool: &SqlitePool, assignment_id: Uuid) -> Result<Vec<Response>> {
    let rows = sqlx::query(
        "SELECT question_id, value, updated_at FROM assessment_responses WHERE assignment_id = ?",
    )
    .bind(assignment_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let value: String = row.try_get("value")?;
            Ok(Response {
                question_id: uuid_col(row, "question_id")?,
                value: serde_json::from_str(&value)?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .collect()
}

async fn progress_for(pool: &SqlitePool, assignment: &Assignment) -> Result<Progress> {
    let questions = list_questions(pool, assignment.template_id).await?;
    let answered: HashSet<Uuid> = list_responses(pool, assignment.id)
        .await?
        .into_iter()
        .map(|r| r.question_id)
        .collect();
    Ok(Progress::compute(&questions, &answered))
}

pub async fn get_assignment_detail(
    pool: &SqlitePool,
    practice_id: Uuid,
    assignment: Assignment,
) -> Result<AssignmentDetail> {
    let template = get_template_detail(pool, practice_id, assignment.template_id).await?;
    let responses = list_responses(pool, assignment.id).await?;
    let questions: Vec<Question> = template.questions().cloned().collect();
    let answered: HashSet<Uuid> = responses.iter().map(|r| r.question_id).collect();
    let progress = Progress::compute(&questions, &answered);

    Ok(AssignmentDetail { assignment, template, responses, progress })
}

fn push_assignment_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    practice_id: Uuid,
    filter: &AssignmentFilter,
) {
    qb.push(" WHERE practice_id = ")
        .push_bind(practice_id.to_string())
        .push(" AND deleted_at IS NULL");

    if let Some(client_id) = filter.client_id {
        qb.push(" AND client_id = ").push_bind(client_id.to_string());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
}

/// List assignments, newest first
pub async fn list_assignments(
    pool: &SqlitePool,
    practice_id: Uuid,
    filter: &AssignmentFilter,
) -> Result<Page<Assignment>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM assessment_assignments");
    push_assignment_filters(&mut count, practice_id, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let p = calculate_pagination(total, filter.page, filter.page_size);

    let mut select = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM assessment_assignments",
        ASSIGNMENT_COLUMNS
    ));
    push_assignment_filters(&mut select, practice_id, filter);
    select
        .push(" ORDER BY assigned_at DESC, id LIMIT ")
        .push_bind(p.page_size)
        .push(" OFFSET ")
        .push_bind(p.offset);
    let rows = select.build().fetch_all(pool).await?;

    let items = rows.iter().map(Assignment::from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, total, p))
}

/// Apply a batch of answers atomically
///
/// Every entry is validated first; one bad entry rejects the whole batch.
/// The first non-empty batch moves the assignment to `in_progress`.
pub async fn save_responses(
    pool: &SqlitePool,
    assignment: &Assignment,
    batch: ResponseBatch,
) -> Result<(Assignment, Progress)> {
    assignment.ensure_open()?;

    let questions = list_questions(pool, assignment.template_id).await?;
    let by_id: HashMap<Uuid, &Question> = questions.iter().map(|q| (q.id, q)).collect();

    let mut seen = HashSet::new();
    for input in &batch.responses {
        let question = by_id.get(&input.question_id).ok_or_else(|| {
            Error::InvalidInput(format!(
                "Question {} is not part of this assessment",
                input.question_id
            ))
        })?;
        if !seen.insert(input.question_id) {
            return Err(Error::InvalidInput(format!(
                "Question {} appears more than once in the batch",
                input.question_id
            )));
        }
        if !input.value.is_null() {
            validate_answer(question, &input.value)?;
        }
    }

    let mut updated = assignment.clone();
    if batch.responses.is_empty() {
        let progress = progress_for(pool, &updated).await?;
        return Ok((updated, progress));
    }

    let now = now_timestamp();
    let mut tx = pool.begin().await?;

    let status: Option<String> = sqlx::query_scalar(
        "SELECT status FROM assessment_assignments WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(assignment.id.to_string())
    .fetch_optional(&mut *tx)
    .await?;
    match status.as_deref() {
        None => {
            return Err(Error::NotFound(format!(
                "Assessment assignment {}",
                assignment.id
            )))
        }
        Some("completed") => {
            return Err(Error::Conflict(format!(
                "Assessment assignment {} is already completed",
                assignment.id
            )))
        }
        Some(_) => {}
    }

    for input in batch.responses {
        if input.value.is_null() {
            sqlx::query(
                "DELETE FROM assessment_responses WHERE assignment_id = ? AND question_id = ?",
            )
            .bind(assignment.id.to_string())
            .bind(input.question_id.to_string())
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO assessment_responses (assignment_id, question_id, value, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (assignment_id, question_id)
                DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
            )
            .bind(assignment.id.to_string())
            .bind(input.question_id.to_string())
            .bind(serde_json::to_string(&input.value)?)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
    }

    if updated.status == AssignmentStatus::Assigned {
        sqlx::query(
            "UPDATE assessment_assignments SET status = 'in_progress', started_at = ? \
             WHERE id = ? AND status = 'assigned'",
        )
        .bind(&now)
        .bind(assignment.id.to_string())
        .execute(&mut *tx)
        .await?;
        updated.status = AssignmentStatus::InProgress;
        updated.started_at = Some(now);
    }

    tx.commit().await?;

    let progress = progress_for(pool, &updated).await?;
    Ok((updated, progress))
}

/// Complete an assignment once every required question is answered
///
/// The score is the sum of scale answers, or `None` when the template has
/// no scale questions.
pub async fn complete_assignment(pool: &SqlitePool, assignment: &Assignment) -> Result<Assignment> {
    assignment.ensure_open()?;

    let questions = list_questions(pool, assignment.template_id).await?;
    let responses: HashMap<Uuid, Value> = list_responses(pool, assignment.id)
        .await?
        .into_iter()
        .map(|r| (r.question_id, r.value))
        .collect();

    let missing: Vec<String> = questions
        .iter()
        .filter(|q| q.required && !responses.contains_key(&q.id))
        .map(|q| q.id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Required questions are unanswered: {}",
            missing.join(", ")
        )));
    }

    let scale_questions: Vec<&Question> =
        questions.iter().filter(|q| q.kind == QuestionKind::Scale).collect();
    let score = (!scale_questions.is_empty()).then(|| {
        scale_questions
            .iter()
            .filter_map(|q| responses.get(&q.id).and_then(Value::as_i64))
            .sum::<i64>()
    });

    let now = now_timestamp();
    let mut completed = assignment.clone();
    completed.status = AssignmentStatus::Completed;
    completed.score = score;
    completed.completed_at = Some(now.clone());
    completed.started_at = assignment.started_at.clone().or_else(|| Some(now.clone()));

    let result = sqlx::query(
        r#"
        UPDATE assessment_assignments
        SET status = 'completed', score = ?, completed_at = ?, started_at = ?
        WHERE id = ? AND status != 'completed' AND deleted_at IS NULL
        "#,
    )
    .bind(score)
    .bind(&now)
    .bind(&completed.started_at)
    .bind(assignment.id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(format!(
            "Assessment assignment {} is already completed",
            assignment.id
        )));
    }
    Ok(completed)
}

/// Soft-delete an assignment that is not completed
pub async fn delete_assignment(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<()> {
    let assignment = get_assignment(pool, practice_id, id).await?;
    assignment.ensure_open()?;

    sqlx::query(
        "UPDATE assessment_assignments SET deleted_at = ? \
         WHERE id = ? AND practice_id = ? AND status != 'completed'",
    )
    .bind(now_timestamp())
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::clients::{create_client, NewClient};
    use crate::db::practices::create_practice;
    use crate::db::templates::tests::{intake_template, question};
    use crate::db::templates::{archive_template, create_template, NewSection, NewTemplate};
    use serde_json::json;
    use tpm_common::db::init_memory_database;

    struct Fixture {
        pool: SqlitePool,
        practice_id: Uuid,
        client_id: Uuid,
        template: TemplateDetail,
    }

    async fn fixture() -> Fixture {
        let pool = init_memory_database().await.unwrap();
        let (practice, _) = create_practice(&pool, "P").await.unwrap();
        let client = create_client(
            &pool,
            practice.id,
            NewClient {
                first_name: "Ana".to_string(),
                last_name: "Diaz".to_string(),
                ..NewClient::default()
            },
        )
        .await
        .unwrap();
        let template = create_template(&pool, practice.id, intake_template()).await.unwrap();
        Fixture { pool, practice_id: practice.id, client_id: client.id, template }
    }

    async fn assign(f: &Fixture) -> Assignment {
        create_assignment(
            &f.pool,
            f.practice_id,
            NewAssignment { client_id: f.client_id, template_id: f.template.template.id, due_date: None },
        )
        .await
        .unwrap()
    }

    fn q(f: &Fixture, section: usize, index: usize) -> &Question {
        &f.template.sections[section].questions[index]
    }

    fn batch(entries: Vec<(Uuid, Value)>) -> ResponseBatch {
        ResponseBatch {
            responses: entries
                .into_iter()
                .map(|(question_id, value)| ResponseInput { question_id, value })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_validate_answer_by_kind() {
        let f = fixture().await;
        let scale = q(&f, 0, 0);
        let text = q(&f, 1, 0);
        let single = q(&f, 1, 1);
        let multi = q(&f, 1, 2);
        let yes_no = q(&f, 1, 3);

        assert!(validate_answer(scale, &json!(3)).is_ok());
        assert!(validate_answer(scale, &json!(4)).is_err());
        assert!(validate_answer(scale, &json!(1.5)).is_err());
        assert!(validate_answer(text, &json!("Some context")).is_ok());
        assert!(validate_answer(text, &json!("  ")).is_err());
        assert!(validate_answer(single, &json!("Often")).is_ok());
        assert!(validate_answer(single, &json!("Always")).is_err());
        assert!(validate_answer(multi, &json!(["Never", "Often"])).is_ok());
        assert!(validate_answer(multi, &json!(["Never", "Never"])).is_err());
        assert!(validate_answer(multi, &json!([])).is_err());
        assert!(validate_answer(yes_no, &json!(false)).is_ok());
        assert!(validate_answer(yes_no, &json!("no")).is_err());
    }

    #[tokio::test]
    async fn test_first_save_starts_assignment() {
        let f = fixture().await;
        let assignment = assign(&f).await;
        assert_eq!(assignment.status, AssignmentStatus::Assigned);

        let (updated, progress) =
            save_responses(&f.pool, &assignment, batch(vec![(q(&f, 0, 0).id, json!(2))]))
                .await
                .unwrap();
        assert_eq!(updated.status, AssignmentStatus::InProgress);
        assert!(updated.started_at.is_some());
        assert_eq!(progress.answered, 1);
        assert_eq!(progress.total, 6);
        assert_eq!(progress.required_answered, 1);
        assert_eq!(progress.required_total, 2);
        assert_eq!(progress.percent, 16);

        let stored = get_assignment(&f.pool, f.practice_id, assignment.id).await.unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_invalid_entry_rejects_whole_batch() {
        let f = fixture().await;
        let assignment = assign(&f).await;

        let result = save_responses(
            &f.pool,
            &assignment,
            batch(vec![(q(&f, 0, 0).id, json!(1)), (q(&f, 0, 1).id, json!(99))]),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let foreign = save_responses(&f.pool, &assignment, batch(vec![(Uuid::new_v4(), json!(1))])).await;
        assert!(matches!(foreign, Err(Error::InvalidInput(_))));

        assert!(list_responses(&f.pool, assignment.id).await.unwrap().is_empty());
        let stored = get_assignment(&f.pool, f.practice_id, assignment.id).await.unwrap();
        assert_eq!(stored.status, AssignmentStatus::Assigned);
    }

    #[tokio::test]
    async fn test_null_clears_and_resave_overwrites() {
        let f = fixture().await;
        let assignment = assign(&f).await;
        let scale = q(&f, 0, 0).id;

        let (assignment, _) =
            save_responses(&f.pool, &assignment, batch(vec![(scale, json!(1))])).await.unwrap();
        save_responses(&f.pool, &assignment, batch(vec![(scale, json!(3))])).await.unwrap();
        let responses = list_responses(&f.pool, assignment.id).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].value, json!(3));

        let (_, progress) =
            save_responses(&f.pool, &assignment, batch(vec![(scale, Value::Null)])).await.unwrap();
        assert_eq!(progress.answered, 0);
    }

    #[tokio::test]
    async fn test_completion_requires_required_answers_and_scores() {
        let f = fixture().await;
        let assignment = assign(&f).await;
        let first = q(&f, 0, 0).id;
        let second = q(&f, 0, 1).id;

        let (assignment, _) =
            save_responses(&f.pool, &assignment, batch(vec![(first, json!(2))])).await.unwrap();
        match complete_assignment(&f.pool, &assignment).await {
            Err(Error::InvalidInput(message)) => assert!(message.contains(&second.to_string())),
            other => panic!("expected missing required answer, got {:?}", other),
        }

        save_responses(&f.pool, &assignment, batch(vec![(second, json!(3))])).await.unwrap();
        let completed = complete_assignment(&f.pool, &assignment).await.unwrap();
        assert_eq!(completed.status, AssignmentStatus::Completed);
        assert_eq!(completed.score, Some(5));

        let locked = save_responses(&f.pool, &completed, batch(vec![(first, json!(0))])).await;
        assert!(matches!(locked, Err(Error::Conflict(_))));
        // A stale copy of the assignment is rejected as well
        let stale = save_responses(&f.pool, &assignment, batch(vec![(first, json!(0))])).await;
        assert!(matches!(stale, Err(Error::Conflict(_))));
        assert!(matches!(
            delete_assignment(&f.pool, f.practice_id, assignment.id).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_score_is_none_without_scale_questions() {
        let f = fixture().await;
        let template = create_template(
            &f.pool,
            f.practice_id,
            NewTemplate {
                name: "Intake".to_string(),
                description: None,
                sections: vec![NewSection {
                    title: "About you".to_string(),
                    questions: vec![question("Reason for visit", QuestionKind::Text, false)],
                }],
            },
        )
        .await
        .unwrap();
        let assignment = create_assignment(
            &f.pool,
            f.practice_id,
            NewAssignment { client_id: f.client_id, template_id: template.template.id, due_date: None },
        )
        .await
        .unwrap();

        let completed = complete_assignment(&f.pool, &assignment).await.unwrap();
        assert_eq!(completed.score, None);
    }

    #[tokio::test]
    async fn test_archived_template_cannot_be_assigned() {
        let f = fixture().await;
        let existing = assign(&f).await;
        archive_template(&f.pool, f.practice_id, f.template.template.id).await.unwrap();

        let result = create_assignment(
            &f.pool,
            f.practice_id,
            NewAssignment { client_id: f.client_id, template_id: f.template.template.id, due_date: None },
        )
        .await;
        assert!(matches!(result, Err(Error::Conflict(_))));

        // Existing assignments keep working
        save_responses(&f.pool, &existing, batch(vec![(q(&f, 0, 0).id, json!(0))])).await.unwrap();
    }

    #[tokio::test]
    async fn test_client_scoped_lookup() {
        let f = fixture().await;
        let assignment = assign(&f).await;

        assert!(get_client_assignment(&f.pool, f.practice_id, f.client_id, assignment.id).await.is_ok());
        assert!(matches!(
            get_client_assignment(&f.pool, f.practice_id, Uuid::new_v4(), assignment.id).await,
            Err(Error::NotFound(_))
        ));
    }
}
