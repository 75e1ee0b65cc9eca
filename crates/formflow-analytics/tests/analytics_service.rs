use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use formflow_analytics::{compute_flow_transitions, AnalyticsService};
use formflow_core::{
    AnalyticsState, AnalyticsStatus, AnalyticsStore, AnswerDraft, FlowRow, FormFlowError, FormId,
    FormStore, NewForm, NodeId, NodeMetrics, Result, SubmissionDraft, SubmissionStore,
};
use formflow_storage::MemoryStore;

async fn seeded() -> (Arc<MemoryStore>, AnalyticsService, FormId) {
    let store = Arc::new(MemoryStore::new());
    let form_id = store
        .create_form(NewForm {
            title: "Signup".into(),
            description: None,
            is_template: false,
        })
        .await
        .unwrap()
        .id;
    store
        .replace_flow(
            form_id,
            &[
                FlowRow::new("A", None, 0, "text", "Name?"),
                FlowRow::new("B", Some("A"), 0, "text", "Email?"),
                FlowRow::new("C", Some("B"), 0, "choice", "Plan?"),
            ],
        )
        .await
        .unwrap();

    let drafts = [
        (vec!["A", "B", "C"], 30),
        (vec!["A", "C"], 10),
        (vec!["A", "B"], 20),
    ];
    let submissions: Vec<_> = drafts
        .into_iter()
        .map(|(path, time)| {
            SubmissionDraft::new(form_id, path.iter().map(|s| s.to_string()).collect())
                .with_total_time(time)
                .with_answer(AnswerDraft::new("A", "Ada").with_time_spent(4))
                .into_submission()
                .unwrap()
        })
        .collect();
    store.insert_submission_batch(&submissions).await.unwrap();

    let service = AnalyticsService::new(store.clone(), store.clone());
    (store, service, form_id)
}

#[tokio::test]
async fn node_metrics_are_computed_once_then_served_from_storage() {
    let (store, service, form_id) = seeded().await;

    let first = service.node_metrics(form_id).await.unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(store.fetch_calls(), 1);
    assert_eq!(store.node_metrics(form_id).await.unwrap(), first);

    let status = service.status(form_id).await.unwrap().unwrap();
    assert_eq!(status.state, AnalyticsState::Completed);
    assert!(status.calculated_at.is_some());

    let second = service.node_metrics(form_id).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(store.fetch_calls(), 1);
}

#[tokio::test]
async fn refresh_picks_up_new_submissions() {
    let (store, service, form_id) = seeded().await;
    service.node_metrics(form_id).await.unwrap();

    let late = SubmissionDraft::new(form_id, vec!["A".into()])
        .into_submission()
        .unwrap();
    store.insert_submission(&late).await.unwrap();

    let stale = service.node_metrics(form_id).await.unwrap();
    let a = stale.iter().find(|m| m.node_id == "A").unwrap();
    assert_eq!(a.visit_count, 3);

    let fresh = service.refresh(form_id).await.unwrap();
    let a = fresh.iter().find(|m| m.node_id == "A").unwrap();
    assert_eq!(a.visit_count, 4);
    assert_eq!(a.drop_off_count, 1);
}

#[tokio::test]
async fn forms_without_submissions_report_no_submissions() {
    let store = Arc::new(MemoryStore::new());
    let service = AnalyticsService::new(store.clone(), store.clone());
    let form_id = FormId::new_v4();

    let err = service.node_metrics(form_id).await.unwrap_err();
    assert!(matches!(err, FormFlowError::NoSubmissions(id) if id == form_id));
    assert_eq!(
        service.status(form_id).await.unwrap().unwrap().state,
        AnalyticsState::Pending
    );

    let err = service.overview(form_id, 5).await.unwrap_err();
    assert!(matches!(err, FormFlowError::NoSubmissions(_)));

    // The flow view of an empty form is simply empty.
    let flow = service.flow(form_id).await.unwrap();
    assert!(flow.transitions.is_empty());
    assert_eq!(flow.mermaid, "sankey-beta\n\n");
}

#[tokio::test]
async fn flow_is_labeled_with_question_text() {
    let (_store, service, form_id) = seeded().await;
    let flow = service.flow(form_id).await.unwrap();

    let labels: Vec<(&str, &str, u64)> = flow
        .transitions
        .iter()
        .map(|t| (t.source_label.as_str(), t.target_label.as_str(), t.value))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("Name?", "Email?", 2),
            ("Name?", "Plan?", 1),
            ("Email?", "Plan?", 1),
            ("Email?", "Drop-off", 1),
            ("Plan?", "Drop-off", 2),
        ]
    );
    assert!(flow.mermaid.starts_with("sankey-beta\n\n"));
    assert!(flow.mermaid.contains("Plan?,Drop-off,2\n"));
}

#[tokio::test]
async fn overview_summarizes_submissions_and_paths() {
    let (_store, service, form_id) = seeded().await;
    let overview = service.overview(form_id, 2).await.unwrap();

    assert_eq!(overview.total_submissions, 3);
    assert_eq!(overview.avg_completion_time, 20.0);
    assert_eq!(overview.node_metrics.len(), 3);
    assert_eq!(overview.top_paths.len(), 2);
    assert!(overview.top_paths.iter().all(|p| p.occurrence_count == 1));
    assert_eq!(overview.top_paths[0].path, vec!["A", "B"]);
}

#[tokio::test]
async fn overview_figures_come_from_one_snapshot() {
    let (store, service, form_id) = seeded().await;
    service.node_metrics(form_id).await.unwrap();

    let late = SubmissionDraft::new(form_id, vec!["A".into(), "C".into()])
        .with_total_time(40)
        .into_submission()
        .unwrap();
    store.insert_submission(&late).await.unwrap();

    let overview = service.overview(form_id, 10).await.unwrap();
    assert_eq!(overview.total_submissions, 4);

    let a = overview
        .node_metrics
        .iter()
        .find(|m| m.node_id == "A")
        .unwrap();
    assert_eq!(a.visit_count, 4);
    let drop_offs: u64 = overview.node_metrics.iter().map(|m| m.drop_off_count).sum();
    assert_eq!(drop_offs, overview.total_submissions);
    let path_total: u64 = overview.top_paths.iter().map(|p| p.occurrence_count).sum();
    assert_eq!(path_total, overview.total_submissions);
    assert!(overview
        .node_metrics
        .iter()
        .all(|m| m.calculated_at == overview.calculated_at));

    // Outgoing edges of every node match its visits in the same snapshot.
    let submissions = store.submissions();
    let transitions = compute_flow_transitions(form_id, &submissions);
    for metrics in &overview.node_metrics {
        let outgoing: u64 = transitions
            .iter()
            .filter(|t| t.source == metrics.node_id)
            .map(|t| t.value)
            .sum();
        assert_eq!(outgoing, metrics.visit_count);
    }

    // The stored snapshot is left for `refresh` to replace.
    let stored = store.node_metrics(form_id).await.unwrap();
    let a = stored.iter().find(|m| m.node_id == "A").unwrap();
    assert_eq!(a.visit_count, 3);
}

/// Fails metric writes, and every status write after `calculating`.
struct FailingAnalytics {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl AnalyticsStore for FailingAnalytics {
    async fn save_node_metrics(&self, _form_id: FormId, _metrics: &[NodeMetrics]) -> Result<()> {
        Err(FormFlowError::Database("disk I/O error".into()))
    }

    async fn node_metrics(&self, form_id: FormId) -> Result<Vec<NodeMetrics>> {
        self.inner.node_metrics(form_id).await
    }

    async fn set_status(&self, form_id: FormId, state: AnalyticsState) -> Result<()> {
        if state == AnalyticsState::Calculating {
            return self.inner.set_status(form_id, state).await;
        }
        Err(FormFlowError::Database("database is locked".into()))
    }

    async fn status(&self, form_id: FormId) -> Result<Option<AnalyticsStatus>> {
        self.inner.status(form_id).await
    }

    async fn node_labels(&self, form_id: FormId) -> Result<HashMap<NodeId, String>> {
        self.inner.node_labels(form_id).await
    }
}

#[tokio::test]
async fn refresh_reports_the_recomputation_error_over_a_status_error() {
    let (store, _service, form_id) = seeded().await;
    let service = AnalyticsService::new(
        store.clone(),
        Arc::new(FailingAnalytics {
            inner: store.clone(),
        }),
    );

    let err = service.refresh(form_id).await.unwrap_err();
    assert!(matches!(err, FormFlowError::Database(ref msg) if msg == "disk I/O error"));
    assert_eq!(
        service.status(form_id).await.unwrap().unwrap().state,
        AnalyticsState::Calculating
    );
}
