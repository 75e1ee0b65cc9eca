use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use formflow_core::{
    AnalyticsState, AnalyticsStatus, AnalyticsStore, FormFlowError, FormId, NodeMetrics, Result,
    Submission, SubmissionStore,
};

use crate::node_metrics::{compute_node_metrics, compute_node_metrics_at};
use crate::paths::{compute_path_metrics, PathMetrics};
use crate::transitions::{
    compute_flow_transitions, label_transitions, render_mermaid_sankey, LabeledTransition,
};

/// Labeled transitions of a form and the Mermaid diagram drawn from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowAnalytics {
    pub form_id: FormId,
    pub transitions: Vec<LabeledTransition>,
    pub mermaid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsOverview {
    pub form_id: FormId,
    pub total_submissions: u64,
    pub avg_completion_time: f64,
    pub node_metrics: Vec<NodeMetrics>,
    pub top_paths: Vec<PathMetrics>,
    pub calculated_at: DateTime<Utc>,
}

/// Read side of the analytics pipeline: loads submissions, runs the calculators,
/// and keeps the stored node metrics and their status current.
#[derive(Clone)]
pub struct AnalyticsService {
    submissions: Arc<dyn SubmissionStore>,
    analytics: Arc<dyn AnalyticsStore>,
}

impl AnalyticsService {
    pub fn new(submissions: Arc<dyn SubmissionStore>, analytics: Arc<dyn AnalyticsStore>) -> Self {
        Self {
            submissions,
            analytics,
        }
    }

    /// Stored node metrics, computed and persisted first if none exist yet.
    pub async fn node_metrics(&self, form_id: FormId) -> Result<Vec<NodeMetrics>> {
        let stored = self.analytics.node_metrics(form_id).await?;
        if !stored.is_empty() {
            debug!("Serving {} stored node metrics for form {}", stored.len(), form_id);
            return Ok(stored);
        }
        self.refresh(form_id).await
    }

    /// Recomputes node metrics from every submission of the form and stores them.
    pub async fn refresh(&self, form_id: FormId) -> Result<Vec<NodeMetrics>> {
        self.analytics
            .set_status(form_id, AnalyticsState::Calculating)
            .await?;

        match self.recompute(form_id).await {
            Ok(metrics) => {
                self.analytics
                    .set_status(form_id, AnalyticsState::Completed)
                    .await?;
                info!(
                    "Recomputed analytics for form {}: {} nodes",
                    form_id,
                    metrics.len()
                );
                Ok(metrics)
            }
            Err(e) => {
                // NoSubmissions is not a calculation failure.
                let state = match e {
                    FormFlowError::NoSubmissions(_) => AnalyticsState::Pending,
                    _ => {
                        error!("Analytics recomputation failed for form {}: {}", form_id, e);
                        AnalyticsState::Failed
                    }
                };
                if let Err(status_err) = self.analytics.set_status(form_id, state).await {
                    warn!(
                        "Could not mark analytics for form {} as {}: {}",
                        form_id, state, status_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn recompute(&self, form_id: FormId) -> Result<Vec<NodeMetrics>> {
        let submissions = self.load(form_id).await?;
        let metrics = compute_node_metrics(form_id, &submissions);
        self.analytics.save_node_metrics(form_id, &metrics).await?;
        Ok(metrics)
    }

    pub async fn status(&self, form_id: FormId) -> Result<Option<AnalyticsStatus>> {
        self.analytics.status(form_id).await
    }

    pub async fn flow(&self, form_id: FormId) -> Result<FlowAnalytics> {
        let submissions = self.submissions.fetch_submissions_for_form(form_id).await?;
        let transitions = compute_flow_transitions(form_id, &submissions);
        let labels = self.analytics.node_labels(form_id).await?;
        let transitions = label_transitions(&transitions, &labels);
        let mermaid = render_mermaid_sankey(&transitions);

        Ok(FlowAnalytics {
            form_id,
            transitions,
            mermaid,
        })
    }

    /// Every figure is drawn from one load of the submissions, so the node
    /// metrics here can be newer than the stored ones served by `node_metrics`.
    pub async fn overview(&self, form_id: FormId, top_paths: usize) -> Result<AnalyticsOverview> {
        let submissions = self.load(form_id).await?;
        let calculated_at = Utc::now();
        let total = submissions.len() as u64;
        let total_time: u64 = submissions
            .iter()
            .map(|s| u64::from(s.total_time_spent))
            .sum();

        Ok(AnalyticsOverview {
            form_id,
            total_submissions: total,
            avg_completion_time: total_time as f64 / total as f64,
            node_metrics: compute_node_metrics_at(form_id, &submissions, calculated_at),
            top_paths: compute_path_metrics(form_id, &submissions, top_paths),
            calculated_at,
        })
    }

    async fn load(&self, form_id: FormId) -> Result<Vec<Submission>> {
        let submissions: Vec<Submission> = self
            .submissions
            .fetch_submissions_for_form(form_id)
            .await?
            .into_iter()
            .filter(|s| s.form_id == form_id)
            .collect();
        if submissions.is_empty() {
            return Err(FormFlowError::NoSubmissions(form_id));
        }
        Ok(submissions)
    }
}
