//! Path analytics over stored form submissions.
//!
//! The calculators are pure functions over a slice of submissions;
//! [`AnalyticsService`] wires them to the storage collaborators.

pub mod node_metrics;
pub mod paths;
pub mod service;
pub mod transitions;

pub use node_metrics::{compute_node_metrics, compute_node_metrics_at};
pub use paths::{compute_path_metrics, PathMetrics};
pub use service::{AnalyticsOverview, AnalyticsService, FlowAnalytics};
pub use transitions::{
    compute_flow_transitions, label_transitions, render_mermaid_sankey, LabeledTransition,
    DROP_OFF_LABEL,
};
