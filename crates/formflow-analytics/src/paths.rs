use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use formflow_core::{FormId, NodeId, Submission};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMetrics {
    pub form_id: FormId,
    pub path: Vec<NodeId>,
    pub occurrence_count: u64,
    pub avg_completion_time: f64,
    /// Fraction of the form's submissions that took exactly this path.
    pub share: f64,
}

/// Groups submissions by identical flow path and keeps the `limit` most common paths.
pub fn compute_path_metrics(
    form_id: FormId,
    submissions: &[Submission],
    limit: usize,
) -> Vec<PathMetrics> {
    let mut groups: HashMap<&[NodeId], (u64, u64)> = HashMap::new();
    let mut total = 0u64;

    for submission in submissions.iter().filter(|s| s.form_id == form_id) {
        total += 1;
        let entry = groups.entry(submission.flow_path.as_slice()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += u64::from(submission.total_time_spent);
    }

    let mut paths: Vec<PathMetrics> = groups
        .into_iter()
        .map(|(path, (count, time))| PathMetrics {
            form_id,
            path: path.to_vec(),
            occurrence_count: count,
            avg_completion_time: time as f64 / count as f64,
            share: count as f64 / total as f64,
        })
        .collect();

    paths.sort_by(|a, b| {
        b.occurrence_count
            .cmp(&a.occurrence_count)
            .then_with(|| a.path.cmp(&b.path))
    });
    paths.truncate(limit);
    paths
}
