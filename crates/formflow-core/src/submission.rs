use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::Validate;
use crate::{FormId, NodeId, ResponseId, Result};

/// One respondent's answers plus the path they took through the flow tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub response_id: ResponseId,
    pub form_id: FormId,
    pub total_time_spent: u32,
    pub flow_path: Vec<NodeId>,
    pub answers: Vec<Answer>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub response_id: ResponseId,
    pub node_id: NodeId,
    pub answer_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u32>,
}

/// A submission as received from a respondent, before a response id exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionDraft {
    pub form_id: FormId,
    #[serde(default)]
    pub total_time_spent: u32,
    pub flow_path: Vec<NodeId>,
    #[serde(default)]
    pub answers: Vec<AnswerDraft>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerDraft {
    pub node_id: NodeId,
    pub answer_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u32>,
}

impl SubmissionDraft {
    pub fn new(form_id: FormId, flow_path: Vec<NodeId>) -> Self {
        Self {
            form_id,
            total_time_spent: 0,
            flow_path,
            answers: Vec::new(),
        }
    }

    pub fn with_total_time(mut self, total_time_spent: u32) -> Self {
        self.total_time_spent = total_time_spent;
        self
    }

    pub fn with_answer(mut self, answer: AnswerDraft) -> Self {
        self.answers.push(answer);
        self
    }

    /// Validates the draft and stamps it with a fresh response id.
    pub fn into_submission(self) -> Result<Submission> {
        self.validate()?;
        let response_id = ResponseId::new_v4();
        let answers = self
            .answers
            .into_iter()
            .map(|a| Answer {
                response_id,
                node_id: a.node_id,
                answer_text: a.answer_text,
                answer_value: a.answer_value,
                time_spent: a.time_spent,
            })
            .collect();

        Ok(Submission {
            response_id,
            form_id: self.form_id,
            total_time_spent: self.total_time_spent,
            flow_path: self.flow_path,
            answers,
            submitted_at: Utc::now(),
        })
    }
}

impl AnswerDraft {
    pub fn new(node_id: impl Into<NodeId>, answer_text: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            answer_text: answer_text.into(),
            answer_value: None,
            time_spent: None,
        }
    }

    pub fn with_time_spent(mut self, time_spent: u32) -> Self {
        self.time_spent = Some(time_spent);
        self
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.answer_value = Some(value);
        self
    }
}

impl Submission {
    pub fn last_node(&self) -> Option<&NodeId> {
        self.flow_path.last()
    }
}
