use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::flow_tree::FlowView;
use crate::{FormId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    Draft,
    Published,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormRecord {
    pub id: FormId,
    pub title: String,
    pub description: Option<String>,
    pub status: FormStatus,
    pub accepting_responses: bool,
    pub auto_slug: Option<String>,
    pub custom_slug: Option<String>,
    pub is_template: bool,
    pub created_at: DateTime<Utc>,
}

impl FormRecord {
    pub fn identity(&self) -> FormIdentity {
        FormIdentity {
            form_id: self.id,
            auto_slug: self.auto_slug.clone(),
            custom_slug: self.custom_slug.clone(),
            is_template: self.is_template,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == FormStatus::Published
    }
}

/// Every identity a form can be cached under.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormIdentity {
    pub form_id: FormId,
    pub auto_slug: Option<String>,
    pub custom_slug: Option<String>,
    pub is_template: bool,
}

impl FormIdentity {
    pub fn new(form_id: FormId) -> Self {
        Self {
            form_id,
            ..Default::default()
        }
    }

    /// Non-blank slugs, auto slug first.
    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.auto_slug
            .iter()
            .chain(self.custom_slug.iter())
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewForm {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_template: bool,
}

/// Result of inserting a form; the id comes back as a typed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertedForm {
    pub id: FormId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_template: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSummary {
    pub id: FormId,
    pub title: String,
    pub description: Option<String>,
}

/// A flat row of a form's flow tree as it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRow {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub order_index: u32,
    pub question_type: String,
    pub question_text: String,
}

impl FlowRow {
    pub fn new(
        id: impl Into<NodeId>,
        parent_id: Option<&str>,
        order_index: u32,
        question_type: impl Into<String>,
        question_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            order_index,
            question_type: question_type.into(),
            question_text: question_text.into(),
        }
    }
}

/// The read-only view served to respondents under a slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicForm {
    pub id: FormId,
    pub title: String,
    pub description: Option<String>,
    pub accepting_responses: bool,
    pub flow: FlowView,
}

const AUTO_SLUG_BYTES: usize = 8;
const AUTO_SLUG_LEN: usize = 11;

/// Random 11-character URL-safe slug.
pub fn generate_auto_slug() -> String {
    let mut bytes = [0u8; AUTO_SLUG_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    let mut slug = general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    slug.truncate(AUTO_SLUG_LEN);
    slug
}
