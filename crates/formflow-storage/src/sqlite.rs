use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use tokio::task;
use tracing::{debug, info};
use uuid::Uuid;

use formflow_core::{
    AnalyticsState, AnalyticsStatus, AnalyticsStore, Answer, FlowRow, FormFlowError, FormId,
    FormRecord, FormStatus, FormStore, FormSummary, FormUpdate, InsertedForm, NewForm, NodeId,
    NodeMetrics, Result, Submission, SubmissionStore,
};

use crate::schema;

/// Maps driver errors into the crate error type.
pub(crate) trait SqlResultExt<T> {
    fn db(self) -> Result<T>;
}

impl<T> SqlResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn db(self) -> Result<T> {
        self.map_err(|e| FormFlowError::Database(e.to_string()))
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| FormFlowError::Database(format!("bad uuid '{}': {}", raw, e)))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FormFlowError::Database(format!("bad timestamp '{}': {}", raw, e)))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

const FORM_COLUMNS: &str = "id, title, description, status, accepting_responses, auto_slug, \
                            custom_slug, is_template, created_at";

const FETCH_SUBMISSIONS: &str = r#"
SELECT r.id, r.form_id, r.total_time_spent, r.flow_path, r.submitted_at,
       a.node_id, a.answer_text, a.answer_value, a.time_spent
FROM form_responses r
LEFT JOIN response_answers a ON a.response_id = r.id
WHERE r.form_id = ?1
ORDER BY r.seq, a.seq
"#;

struct FormRow {
    id: String,
    title: String,
    description: Option<String>,
    status: String,
    accepting_responses: bool,
    auto_slug: Option<String>,
    custom_slug: Option<String>,
    is_template: bool,
    created_at: String,
}

impl FormRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            accepting_responses: row.get(4)?,
            auto_slug: row.get(5)?,
            custom_slug: row.get(6)?,
            is_template: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<FormRecord> {
        let status = match self.status.as_str() {
            "published" => FormStatus::Published,
            _ => FormStatus::Draft,
        };
        Ok(FormRecord {
            id: parse_uuid(&self.id)?,
            title: self.title,
            description: self.description,
            status,
            accepting_responses: self.accepting_responses,
            auto_slug: self.auto_slug,
            custom_slug: self.custom_slug,
            is_template: self.is_template,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

struct JoinedRow {
    response_id: String,
    form_id: String,
    total_time_spent: u32,
    flow_path: String,
    submitted_at: String,
    node_id: Option<String>,
    answer_text: Option<String>,
    answer_value: Option<String>,
    time_spent: Option<u32>,
}

/// SQLite-backed store. The connection is owned by the store and borrowed by one
/// blocking task at a time.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).db()?;
        schema::init(&conn)?;
        info!("Opened SQLite store at {:?}", path);
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().db()?;
        schema::init(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn run<F, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut guard = conn.lock();
            op(&mut guard)
        })
        .await
        .map_err(|e| FormFlowError::Database(format!("storage task failed: {}", e)))?
    }

    /// Runs `op` inside `BEGIN IMMEDIATE` and commits; any error rolls back.
    async fn run_in_tx<F, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .db()?;
            let value = op(&tx)?;
            tx.commit().db()?;
            Ok(value)
        })
        .await
    }
}

fn write_submissions(tx: &Transaction<'_>, batch: &[Submission]) -> Result<()> {
    let mut insert_response = tx
        .prepare_cached(
            "INSERT INTO form_responses (id, form_id, total_time_spent, flow_path, submitted_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .db()?;
    let mut insert_answer = tx
        .prepare_cached(
            "INSERT INTO response_answers (response_id, node_id, answer_text, answer_value, time_spent) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .db()?;

    for submission in batch {
        let flow_path = serde_json::to_string(&submission.flow_path)?;
        insert_response
            .execute(params![
                submission.response_id.to_string(),
                submission.form_id.to_string(),
                submission.total_time_spent,
                flow_path,
                submission.submitted_at.to_rfc3339(),
            ])
            .db()?;

        for answer in &submission.answers {
            let value = answer
                .answer_value
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            insert_answer
                .execute(params![
                    answer.response_id.to_string(),
                    answer.node_id,
                    answer.answer_text,
                    value,
                    answer.time_spent,
                ])
                .db()?;
        }
    }
    Ok(())
}

fn read_submissions(conn: &Connection, form_id: FormId) -> Result<Vec<Submission>> {
    let mut stmt = conn.prepare_cached(FETCH_SUBMISSIONS).db()?;
    let rows = stmt
        .query_map(params![form_id.to_string()], |row| {
            Ok(JoinedRow {
                response_id: row.get(0)?,
                form_id: row.get(1)?,
                total_time_spent: row.get(2)?,
                flow_path: row.get(3)?,
                submitted_at: row.get(4)?,
                node_id: row.get(5)?,
                answer_text: row.get(6)?,
                answer_value: row.get(7)?,
                time_spent: row.get(8)?,
            })
        })
        .db()?;

    let mut submissions: Vec<Submission> = Vec::new();
    for row in rows {
        let row = row.db()?;
        let response_id = parse_uuid(&row.response_id)?;
        if submissions.last().map(|s| s.response_id) != Some(response_id) {
            submissions.push(Submission {
                response_id,
                form_id: parse_uuid(&row.form_id)?,
                total_time_spent: row.total_time_spent,
                flow_path: serde_json::from_str(&row.flow_path)?,
                answers: Vec::new(),
                submitted_at: parse_time(&row.submitted_at)?,
            });
        }

        if let (Some(node_id), Some(answer_text)) = (row.node_id, row.answer_text) {
            let answer_value = row
                .answer_value
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?;
            if let Some(current) = submissions.last_mut() {
                current.answers.push(Answer {
                    response_id,
                    node_id,
                    answer_text,
                    answer_value,
                    time_spent: row.time_spent,
                });
            }
        }
    }
    Ok(submissions)
}

fn read_form(conn: &Connection, form_id: FormId) -> Result<Option<FormRecord>> {
    let sql = format!("SELECT {} FROM forms WHERE id = ?1", FORM_COLUMNS);
    conn.query_row(&sql, params![form_id.to_string()], FormRow::from_row)
        .optional()
        .db()?
        .map(FormRow::into_record)
        .transpose()
}

fn require_form(conn: &Connection, form_id: FormId) -> Result<FormRecord> {
    read_form(conn, form_id)?.ok_or_else(|| FormFlowError::FormNotFound(form_id.to_string()))
}

#[async_trait]
impl SubmissionStore for SqliteStore {
    async fn insert_submission_batch(&self, batch: &[Submission]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let batch = batch.to_vec();
        let count = batch.len();
        self.run_in_tx(move |tx| write_submissions(tx, &batch))
            .await?;
        debug!("Committed batch of {} submissions", count);
        Ok(())
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<()> {
        let submission = submission.clone();
        self.run_in_tx(move |tx| write_submissions(tx, std::slice::from_ref(&submission)))
            .await
    }

    async fn fetch_submissions_for_form(&self, form_id: FormId) -> Result<Vec<Submission>> {
        self.run(move |conn| read_submissions(conn, form_id)).await
    }
}

#[async_trait]
impl AnalyticsStore for SqliteStore {
    async fn save_node_metrics(&self, form_id: FormId, metrics: &[NodeMetrics]) -> Result<()> {
        let metrics = metrics.to_vec();
        self.run_in_tx(move |tx| {
            tx.execute(
                "DELETE FROM analytics_nodes WHERE form_id = ?1",
                params![form_id.to_string()],
            )
            .db()?;
            let mut insert = tx
                .prepare_cached(
                    "INSERT INTO analytics_nodes (form_id, node_id, visit_count, answer_count, \
                     skip_count, drop_off_count, total_time_spent, avg_time_spent, calculated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .db()?;
            for m in &metrics {
                insert
                    .execute(params![
                        form_id.to_string(),
                        m.node_id,
                        m.visit_count as i64,
                        m.answer_count as i64,
                        m.skip_count as i64,
                        m.drop_off_count as i64,
                        m.total_time_spent as i64,
                        m.avg_time_spent,
                        m.calculated_at.to_rfc3339(),
                    ])
                    .db()?;
            }
            Ok(())
        })
        .await
    }

    async fn node_metrics(&self, form_id: FormId) -> Result<Vec<NodeMetrics>> {
        self.run(move |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT node_id, visit_count, answer_count, skip_count, drop_off_count, \
                     total_time_spent, avg_time_spent, calculated_at \
                     FROM analytics_nodes WHERE form_id = ?1 ORDER BY node_id",
                )
                .db()?;
            let rows = stmt
                .query_map(params![form_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                })
                .db()?;

            let mut metrics = Vec::new();
            for row in rows {
                let (node_id, visits, answers, skips, drop_offs, total, avg, at) = row.db()?;
                metrics.push(NodeMetrics {
                    form_id,
                    node_id,
                    visit_count: visits as u64,
                    answer_count: answers as u64,
                    skip_count: skips as u64,
                    drop_off_count: drop_offs as u64,
                    total_time_spent: total as u64,
                    avg_time_spent: avg,
                    calculated_at: parse_time(&at)?,
                });
            }
            Ok(metrics)
        })
        .await
    }

    async fn set_status(&self, form_id: FormId, state: AnalyticsState) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO analytics_status (form_id, state, calculated_at, updated_at) \
                 VALUES (?1, ?2, CASE WHEN ?2 = 'completed' THEN ?3 END, ?3) \
                 ON CONFLICT(form_id) DO UPDATE SET \
                   state = excluded.state, \
                   updated_at = excluded.updated_at, \
                   calculated_at = COALESCE(excluded.calculated_at, analytics_status.calculated_at)",
                params![form_id.to_string(), state.to_string(), now],
            )
            .db()?;
            Ok(())
        })
        .await
    }

    async fn status(&self, form_id: FormId) -> Result<Option<AnalyticsStatus>> {
        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT state, calculated_at, updated_at FROM analytics_status WHERE form_id = ?1",
                    params![form_id.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()
                .db()?;

            let Some((state, calculated_at, updated_at)) = row else {
                return Ok(None);
            };
            Ok(Some(AnalyticsStatus {
                form_id,
                state: state.parse().map_err(FormFlowError::Database)?,
                calculated_at: calculated_at.as_deref().map(parse_time).transpose()?,
                updated_at: parse_time(&updated_at)?,
            }))
        })
        .await
    }

    async fn node_labels(&self, form_id: FormId) -> Result<HashMap<NodeId, String>> {
        self.run(move |conn| {
            let mut stmt = conn
                .prepare_cached("SELECT id, question_text FROM flow_nodes WHERE form_id = ?1")
                .db()?;
            let rows = stmt
                .query_map(params![form_id.to_string()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .db()?;
            rows.collect::<rusqlite::Result<HashMap<_, _>>>().db()
        })
        .await
    }
}

#[async_trait]
impl FormStore for SqliteStore {
    async fn create_form(&self, form: NewForm) -> Result<InsertedForm> {
        let inserted = InsertedForm {
            id: FormId::new_v4(),
            created_at: Utc::now(),
        };
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO forms (id, title, description, is_template, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    inserted.id.to_string(),
                    form.title,
                    form.description,
                    form.is_template,
                    inserted.created_at.to_rfc3339(),
                ],
            )
            .db()?;
            Ok(inserted)
        })
        .await
    }

    async fn form(&self, form_id: FormId) -> Result<Option<FormRecord>> {
        self.run(move |conn| read_form(conn, form_id)).await
    }

    async fn form_by_slug(&self, slug: &str) -> Result<Option<FormRecord>> {
        let slug = slug.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM forms WHERE (auto_slug = ?1 OR custom_slug = ?1) \
                 AND status = 'published'",
                FORM_COLUMNS
            );
            conn.query_row(&sql, params![slug], FormRow::from_row)
                .optional()
                .db()?
                .map(FormRow::into_record)
                .transpose()
        })
        .await
    }

    async fn update_form(&self, form_id: FormId, update: FormUpdate) -> Result<FormRecord> {
        self.run(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE forms SET title = COALESCE(?2, title), \
                     description = COALESCE(?3, description), \
                     is_template = COALESCE(?4, is_template) WHERE id = ?1",
                    params![
                        form_id.to_string(),
                        update.title,
                        update.description,
                        update.is_template,
                    ],
                )
                .db()?;
            if changed == 0 {
                return Err(FormFlowError::FormNotFound(form_id.to_string()));
            }
            require_form(conn, form_id)
        })
        .await
    }

    async fn delete_form(&self, form_id: FormId) -> Result<()> {
        self.run_in_tx(move |tx| {
            let id = form_id.to_string();
            let removed = tx
                .execute("DELETE FROM forms WHERE id = ?1", params![id])
                .db()?;
            if removed == 0 {
                return Err(FormFlowError::FormNotFound(id));
            }
            tx.execute("DELETE FROM analytics_nodes WHERE form_id = ?1", params![id])
                .db()?;
            tx.execute("DELETE FROM analytics_status WHERE form_id = ?1", params![id])
                .db()?;
            Ok(())
        })
        .await
    }

    async fn publish_form(
        &self,
        form_id: FormId,
        auto_slug: &str,
        custom_slug: Option<&str>,
    ) -> Result<FormRecord> {
        let auto_slug = auto_slug.to_string();
        let custom_slug = custom_slug.map(str::to_string);
        self.run(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE forms SET status = 'published', auto_slug = ?2, custom_slug = ?3, \
                     accepting_responses = 1 WHERE id = ?1",
                    params![form_id.to_string(), auto_slug, custom_slug],
                )
                .map_err(|e| {
                    if is_constraint_violation(&e) {
                        FormFlowError::SlugTaken(
                            custom_slug.clone().unwrap_or_else(|| auto_slug.clone()),
                        )
                    } else {
                        FormFlowError::Database(e.to_string())
                    }
                })?;
            if changed == 0 {
                return Err(FormFlowError::FormNotFound(form_id.to_string()));
            }
            require_form(conn, form_id)
        })
        .await
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let slug = slug.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM forms WHERE auto_slug = ?1 OR custom_slug = ?1)",
                params![slug],
                |row| row.get(0),
            )
            .db()
        })
        .await
    }

    async fn set_accepting_responses(
        &self,
        form_id: FormId,
        accepting: bool,
    ) -> Result<FormRecord> {
        self.run(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE forms SET accepting_responses = ?2 WHERE id = ?1",
                    params![form_id.to_string(), accepting],
                )
                .db()?;
            if changed == 0 {
                return Err(FormFlowError::FormNotFound(form_id.to_string()));
            }
            require_form(conn, form_id)
        })
        .await
    }

    async fn replace_flow(&self, form_id: FormId, rows: &[FlowRow]) -> Result<()> {
        let rows = rows.to_vec();
        self.run_in_tx(move |tx| {
            require_form(tx, form_id)?;
            let id = form_id.to_string();
            tx.execute("DELETE FROM flow_nodes WHERE form_id = ?1", params![id])
                .db()?;
            let mut insert = tx
                .prepare_cached(
                    "INSERT INTO flow_nodes (form_id, id, parent_id, order_index, question_type, \
                     question_text) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .db()?;
            for row in &rows {
                insert
                    .execute(params![
                        id,
                        row.id,
                        row.parent_id,
                        row.order_index,
                        row.question_type,
                        row.question_text,
                    ])
                    .db()?;
            }
            Ok(())
        })
        .await
    }

    async fn flow_rows(&self, form_id: FormId) -> Result<Vec<FlowRow>> {
        self.run(move |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT id, parent_id, order_index, question_type, question_text \
                     FROM flow_nodes WHERE form_id = ?1 ORDER BY order_index, id",
                )
                .db()?;
            let rows = stmt
                .query_map(params![form_id.to_string()], |row| {
                    Ok(FlowRow {
                        id: row.get(0)?,
                        parent_id: row.get(1)?,
                        order_index: row.get(2)?,
                        question_type: row.get(3)?,
                        question_text: row.get(4)?,
                    })
                })
                .db()?;
            rows.collect::<rusqlite::Result<Vec<_>>>().db()
        })
        .await
    }

    async fn list_templates(&self) -> Result<Vec<FormSummary>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT id, title, description FROM forms \
                     WHERE is_template = 1 AND status = 'published' \
                     ORDER BY created_at DESC, id",
                )
                .db()?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })
                .db()?;

            let mut templates = Vec::new();
            for row in rows {
                let (id, title, description) = row.db()?;
                templates.push(FormSummary {
                    id: parse_uuid(&id)?,
                    title,
                    description,
                });
            }
            Ok(templates)
        })
        .await
    }
}
