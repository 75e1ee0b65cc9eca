//! SQLite schema for forms, responses and derived analytics.
//!
//! ```text
//! forms ─┬─< flow_nodes            (form_id, id)
//!        └─< analytics_nodes       (form_id, node_id)
//!            analytics_status      (form_id)
//! form_responses ──< response_answers (response_id)
//! ```
//!
//! `form_responses.seq` and `response_answers.seq` preserve insertion order so
//! submissions and their answers come back in the order they were written.

use rusqlite::Connection;

use crate::sqlite::SqlResultExt;
use formflow_core::Result;

const CREATE_FORMS: &str = r#"
CREATE TABLE IF NOT EXISTS forms (
    id                  TEXT PRIMARY KEY,
    title               TEXT NOT NULL,
    description         TEXT,
    status              TEXT NOT NULL DEFAULT 'draft',
    accepting_responses INTEGER NOT NULL DEFAULT 0,
    auto_slug           TEXT UNIQUE,
    custom_slug         TEXT UNIQUE,
    is_template         INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL
)
"#;

const CREATE_FLOW_NODES: &str = r#"
CREATE TABLE IF NOT EXISTS flow_nodes (
    form_id       TEXT NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
    id            TEXT NOT NULL,
    parent_id     TEXT,
    order_index   INTEGER NOT NULL,
    question_type TEXT NOT NULL,
    question_text TEXT NOT NULL,
    PRIMARY KEY (form_id, id)
)
"#;

/// `flow_path` holds the traversal as a JSON array of node ids.
const CREATE_FORM_RESPONSES: &str = r#"
CREATE TABLE IF NOT EXISTS form_responses (
    seq              INTEGER PRIMARY KEY AUTOINCREMENT,
    id               TEXT NOT NULL UNIQUE,
    form_id          TEXT NOT NULL,
    total_time_spent INTEGER NOT NULL,
    flow_path        TEXT NOT NULL,
    submitted_at     TEXT NOT NULL
)
"#;

const CREATE_RESPONSE_ANSWERS: &str = r#"
CREATE TABLE IF NOT EXISTS response_answers (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    response_id  TEXT NOT NULL REFERENCES form_responses(id) ON DELETE CASCADE,
    node_id      TEXT NOT NULL,
    answer_text  TEXT NOT NULL,
    answer_value TEXT,
    time_spent   INTEGER
)
"#;

const CREATE_ANALYTICS_NODES: &str = r#"
CREATE TABLE IF NOT EXISTS analytics_nodes (
    form_id          TEXT NOT NULL,
    node_id          TEXT NOT NULL,
    visit_count      INTEGER NOT NULL,
    answer_count     INTEGER NOT NULL,
    skip_count       INTEGER NOT NULL,
    drop_off_count   INTEGER NOT NULL,
    total_time_spent INTEGER NOT NULL,
    avg_time_spent   REAL NOT NULL,
    calculated_at    TEXT NOT NULL,
    PRIMARY KEY (form_id, node_id)
)
"#;

const CREATE_ANALYTICS_STATUS: &str = r#"
CREATE TABLE IF NOT EXISTS analytics_status (
    form_id       TEXT PRIMARY KEY,
    state         TEXT NOT NULL,
    calculated_at TEXT,
    updated_at    TEXT NOT NULL
)
"#;

const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_form_responses_form ON form_responses(form_id, seq);
CREATE INDEX IF NOT EXISTS idx_response_answers_response ON response_answers(response_id, seq);
CREATE INDEX IF NOT EXISTS idx_forms_template ON forms(is_template, status);
"#;

/// Applies pragmas and creates every table that does not exist yet.
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL").db()?;
    conn.execute_batch("PRAGMA synchronous = NORMAL").db()?;
    conn.execute_batch("PRAGMA foreign_keys = ON").db()?;

    for ddl in [
        CREATE_FORMS,
        CREATE_FLOW_NODES,
        CREATE_FORM_RESPONSES,
        CREATE_RESPONSE_ANSWERS,
        CREATE_ANALYTICS_NODES,
        CREATE_ANALYTICS_STATUS,
        CREATE_INDEXES,
    ] {
        conn.execute_batch(ddl).db()?;
    }
    Ok(())
}
