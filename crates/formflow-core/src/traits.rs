use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    AnalyticsState, AnalyticsStatus, FlowRow, FormId, FormRecord, FormSummary, FormUpdate,
    InsertedForm, NewForm, NodeId, NodeMetrics, Result, Submission,
};

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Writes every submission and answer in one transaction, or none of them.
    async fn insert_submission_batch(&self, batch: &[Submission]) -> Result<()>;
    async fn insert_submission(&self, submission: &Submission) -> Result<()>;
    async fn fetch_submissions_for_form(&self, form_id: FormId) -> Result<Vec<Submission>>;
}

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Replaces the stored metrics of the form with `metrics`.
    async fn save_node_metrics(&self, form_id: FormId, metrics: &[NodeMetrics]) -> Result<()>;
    async fn node_metrics(&self, form_id: FormId) -> Result<Vec<NodeMetrics>>;
    async fn set_status(&self, form_id: FormId, state: AnalyticsState) -> Result<()>;
    async fn status(&self, form_id: FormId) -> Result<Option<AnalyticsStatus>>;
    async fn node_labels(&self, form_id: FormId) -> Result<HashMap<NodeId, String>>;
}

#[async_trait]
pub trait FormStore: Send + Sync {
    async fn create_form(&self, form: NewForm) -> Result<InsertedForm>;
    async fn form(&self, form_id: FormId) -> Result<Option<FormRecord>>;
    async fn form_by_slug(&self, slug: &str) -> Result<Option<FormRecord>>;
    async fn update_form(&self, form_id: FormId, update: FormUpdate) -> Result<FormRecord>;
    async fn delete_form(&self, form_id: FormId) -> Result<()>;
    async fn publish_form(
        &self,
        form_id: FormId,
        auto_slug: &str,
        custom_slug: Option<&str>,
    ) -> Result<FormRecord>;
    async fn slug_exists(&self, slug: &str) -> Result<bool>;
    async fn set_accepting_responses(&self, form_id: FormId, accepting: bool)
        -> Result<FormRecord>;
    async fn replace_flow(&self, form_id: FormId, rows: &[FlowRow]) -> Result<()>;
    async fn flow_rows(&self, form_id: FormId) -> Result<Vec<FlowRow>>;
    async fn list_templates(&self) -> Result<Vec<FormSummary>>;
}
