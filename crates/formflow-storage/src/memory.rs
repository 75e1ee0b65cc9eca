//! In-memory store used by tests and dry runs.
//!
//! Every write is recorded so callers can assert on exactly which batches and
//! single-item writes reached storage.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use formflow_core::{
    AnalyticsState, AnalyticsStatus, AnalyticsStore, FlowRow, FormFlowError, FormId, FormRecord,
    FormStatus, FormStore, FormSummary, FormUpdate, InsertedForm, NewForm, NodeId, NodeMetrics,
    ResponseId, Result, Submission, SubmissionStore,
};

/// A write that reached the store.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRecord {
    Batch(Vec<ResponseId>),
    Single(ResponseId),
}

#[derive(Default)]
struct State {
    submissions: Vec<Submission>,
    response_ids: HashSet<ResponseId>,
    writes: Vec<WriteRecord>,
    metrics: HashMap<FormId, Vec<NodeMetrics>>,
    statuses: HashMap<FormId, AnalyticsStatus>,
    forms: HashMap<FormId, FormRecord>,
    flows: HashMap<FormId, Vec<FlowRow>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    failing_batches: AtomicUsize,
    failing_singles: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryStore")
            .field("submissions", &state.submissions.len())
            .field("writes", &state.writes.len())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` batch writes fail without storing anything.
    pub fn fail_next_batches(&self, n: usize) {
        self.failing_batches.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_singles(&self, n: usize) {
        self.failing_singles.store(n, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.read().writes.clone()
    }

    /// Sizes of the batch writes that succeeded, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state
            .read()
            .writes
            .iter()
            .filter_map(|w| match w {
                WriteRecord::Batch(ids) => Some(ids.len()),
                WriteRecord::Single(_) => None,
            })
            .collect()
    }

    pub fn single_writes(&self) -> usize {
        self.state
            .read()
            .writes
            .iter()
            .filter(|w| matches!(w, WriteRecord::Single(_)))
            .count()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.read().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.read().submissions.len()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn store_all(state: &mut State, batch: &[Submission]) -> Result<()> {
        let mut seen = HashSet::new();
        for s in batch {
            if state.response_ids.contains(&s.response_id) || !seen.insert(s.response_id) {
                return Err(FormFlowError::Database(format!(
                    "duplicate response id {}",
                    s.response_id
                )));
            }
        }
        state.response_ids.extend(seen);
        state.submissions.extend(batch.iter().cloned());
        Ok(())
    }

    fn form_mut(state: &mut State, form_id: FormId) -> Result<&mut FormRecord> {
        state
            .forms
            .get_mut(&form_id)
            .ok_or_else(|| FormFlowError::FormNotFound(form_id.to_string()))
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert_submission_batch(&self, batch: &[Submission]) -> Result<()> {
        if Self::take_failure(&self.failing_batches) {
            return Err(FormFlowError::Database("injected batch failure".into()));
        }
        let mut state = self.state.write();
        Self::store_all(&mut state, batch)?;
        state.writes.push(WriteRecord::Batch(
            batch.iter().map(|s| s.response_id).collect(),
        ));
        Ok(())
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<()> {
        if Self::take_failure(&self.failing_singles) {
            return Err(FormFlowError::Database("injected write failure".into()));
        }
        let mut state = self.state.write();
        Self::store_all(&mut state, std::slice::from_ref(submission))?;
        state
            .writes
            .push(WriteRecord::Single(submission.response_id));
        Ok(())
    }

    async fn fetch_submissions_for_form(&self, form_id: FormId) -> Result<Vec<Submission>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .read()
            .submissions
            .iter()
            .filter(|s| s.form_id == form_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn save_node_metrics(&self, form_id: FormId, metrics: &[NodeMetrics]) -> Result<()> {
        self.state.write().metrics.insert(form_id, metrics.to_vec());
        Ok(())
    }

    async fn node_metrics(&self, form_id: FormId) -> Result<Vec<NodeMetrics>> {
        let mut metrics = self
            .state
            .read()
            .metrics
            .get(&form_id)
            .cloned()
            .unwrap_or_default();
        metrics.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(metrics)
    }

    async fn set_status(&self, form_id: FormId, state: AnalyticsState) -> Result<()> {
        let now = Utc::now();
        let mut guard = self.state.write();
        let previous = guard.statuses.get(&form_id).and_then(|s| s.calculated_at);
        let calculated_at = if state == AnalyticsState::Completed {
            Some(now)
        } else {
            previous
        };
        guard.statuses.insert(
            form_id,
            AnalyticsStatus {
                form_id,
                state,
                calculated_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn status(&self, form_id: FormId) -> Result<Option<AnalyticsStatus>> {
        Ok(self.state.read().statuses.get(&form_id).cloned())
    }

    async fn node_labels(&self, form_id: FormId) -> Result<HashMap<NodeId, String>> {
        Ok(self
            .state
            .read()
            .flows
            .get(&form_id)
            .map(|rows| {
                rows.iter()
                    .map(|r| (r.id.clone(), r.question_text.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl FormStore for MemoryStore {
    async fn create_form(&self, form: NewForm) -> Result<InsertedForm> {
        let inserted = InsertedForm {
            id: FormId::new_v4(),
            created_at: Utc::now(),
        };
        self.state.write().forms.insert(
            inserted.id,
            FormRecord {
                id: inserted.id,
                title: form.title,
                description: form.description,
                status: FormStatus::Draft,
                accepting_responses: false,
                auto_slug: None,
                custom_slug: None,
                is_template: form.is_template,
                created_at: inserted.created_at,
            },
        );
        Ok(inserted)
    }

    async fn form(&self, form_id: FormId) -> Result<Option<FormRecord>> {
        Ok(self.state.read().forms.get(&form_id).cloned())
    }

    async fn form_by_slug(&self, slug: &str) -> Result<Option<FormRecord>> {
        Ok(self
            .state
            .read()
            .forms
            .values()
            .find(|f| f.is_published() && f.identity().slugs().any(|s| s == slug))
            .cloned())
    }

    async fn update_form(&self, form_id: FormId, update: FormUpdate) -> Result<FormRecord> {
        let mut state = self.state.write();
        let form = Self::form_mut(&mut state, form_id)?;
        if let Some(title) = update.title {
            form.title = title;
        }
        if let Some(description) = update.description {
            form.description = Some(description);
        }
        if let Some(is_template) = update.is_template {
            form.is_template = is_template;
        }
        Ok(form.clone())
    }

    async fn delete_form(&self, form_id: FormId) -> Result<()> {
        let mut state = self.state.write();
        if state.forms.remove(&form_id).is_none() {
            return Err(FormFlowError::FormNotFound(form_id.to_string()));
        }
        state.flows.remove(&form_id);
        state.metrics.remove(&form_id);
        state.statuses.remove(&form_id);
        Ok(())
    }

    async fn publish_form(
        &self,
        form_id: FormId,
        auto_slug: &str,
        custom_slug: Option<&str>,
    ) -> Result<FormRecord> {
        let mut state = self.state.write();
        let taken = state.forms.values().any(|f| {
            f.id != form_id
                && f.identity()
                    .slugs()
                    .any(|s| s == auto_slug || Some(s) == custom_slug)
        });
        if taken {
            return Err(FormFlowError::SlugTaken(
                custom_slug.unwrap_or(auto_slug).to_string(),
            ));
        }
        let form = Self::form_mut(&mut state, form_id)?;
        form.status = FormStatus::Published;
        form.accepting_responses = true;
        form.auto_slug = Some(auto_slug.to_string());
        form.custom_slug = custom_slug.map(str::to_string);
        Ok(form.clone())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .forms
            .values()
            .any(|f| f.identity().slugs().any(|s| s == slug)))
    }

    async fn set_accepting_responses(
        &self,
        form_id: FormId,
        accepting: bool,
    ) -> Result<FormRecord> {
        let mut state = self.state.write();
        let form = Self::form_mut(&mut state, form_id)?;
        form.accepting_responses = accepting;
        Ok(form.clone())
    }

    async fn replace_flow(&self, form_id: FormId, rows: &[FlowRow]) -> Result<()> {
        let mut state = self.state.write();
        Self::form_mut(&mut state, form_id)?;
        state.flows.insert(form_id, rows.to_vec());
        Ok(())
    }

    async fn flow_rows(&self, form_id: FormId) -> Result<Vec<FlowRow>> {
        let mut rows = self
            .state
            .read()
            .flows
            .get(&form_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn list_templates(&self) -> Result<Vec<FormSummary>> {
        let state = self.state.read();
        let mut templates: Vec<&FormRecord> = state
            .forms
            .values()
            .filter(|f| f.is_template && f.is_published())
            .collect();
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(templates
            .into_iter()
            .map(|f| FormSummary {
                id: f.id,
                title: f.title.clone(),
                description: f.description.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formflow_core::SubmissionDraft;

    fn submission(form_id: FormId) -> Submission {
        SubmissionDraft::new(form_id, vec!["a".into()])
            .into_submission()
            .unwrap()
    }

    #[tokio::test]
    async fn injected_failures_store_nothing() {
        let store = MemoryStore::new();
        let form_id = FormId::new_v4();
        store.fail_next_batches(1);

        let batch = vec![submission(form_id), submission(form_id)];
        assert!(store.insert_submission_batch(&batch).await.is_err());
        assert_eq!(store.submission_count(), 0);

        store.insert_submission_batch(&batch).await.unwrap();
        assert_eq!(store.batch_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn duplicate_ids_reject_the_whole_batch() {
        let store = MemoryStore::new();
        let s = submission(FormId::new_v4());
        let err = store
            .insert_submission_batch(&[s.clone(), s])
            .await
            .unwrap_err();
        assert!(matches!(err, FormFlowError::Database(_)));
        assert_eq!(store.submission_count(), 0);
    }

    #[tokio::test]
    async fn records_single_writes_separately() {
        let store = MemoryStore::new();
        let s = submission(FormId::new_v4());
        store.insert_submission(&s).await.unwrap();
        assert_eq!(store.writes(), vec![WriteRecord::Single(s.response_id)]);
        assert!(store.batch_sizes().is_empty());
    }
}
