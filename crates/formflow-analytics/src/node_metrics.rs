use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use formflow_core::{FormId, NodeMetrics, Submission};

/// Per-node visit, answer, skip and drop-off counts over every submission of the form.
///
/// Submissions of other forms are ignored. Output is ordered by node id.
pub fn compute_node_metrics(form_id: FormId, submissions: &[Submission]) -> Vec<NodeMetrics> {
    compute_node_metrics_at(form_id, submissions, Utc::now())
}

pub fn compute_node_metrics_at(
    form_id: FormId,
    submissions: &[Submission],
    calculated_at: DateTime<Utc>,
) -> Vec<NodeMetrics> {
    let mut nodes: BTreeMap<&str, NodeMetrics> = BTreeMap::new();

    for submission in submissions.iter().filter(|s| s.form_id == form_id) {
        let mut answered: HashSet<&str> = HashSet::new();
        let mut time_spent: HashMap<&str, u32> = HashMap::new();
        for answer in &submission.answers {
            answered.insert(answer.node_id.as_str());
            // Last recorded time wins when a node is answered more than once.
            if let Some(t) = answer.time_spent {
                time_spent.insert(answer.node_id.as_str(), t);
            }
        }

        let last = submission.flow_path.len().saturating_sub(1);
        for (i, node_id) in submission.flow_path.iter().enumerate() {
            let node = nodes
                .entry(node_id.as_str())
                .or_insert_with(|| NodeMetrics::new(form_id, node_id.clone(), calculated_at));

            node.visit_count += 1;
            if answered.contains(node_id.as_str()) {
                node.answer_count += 1;
                if let Some(t) = time_spent.get(node_id.as_str()) {
                    node.total_time_spent += u64::from(*t);
                }
            } else {
                node.skip_count += 1;
            }
            if i == last {
                node.drop_off_count += 1;
            }
        }
    }

    nodes
        .into_values()
        .map(|mut node| {
            if node.answer_count > 0 {
                node.avg_time_spent = node.total_time_spent as f64 / node.answer_count as f64;
            }
            node
        })
        .collect()
}
