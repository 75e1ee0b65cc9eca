use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use formflow_core::{FlowTransition, FormId, NodeId, Submission, TransitionTarget};

pub const DROP_OFF_LABEL: &str = "Drop-off";

/// Edge counts between consecutive path nodes, plus one edge per submission from its
/// last node into the drop-off sink.
///
/// Submissions of other forms are ignored. Output is ordered by source, then target.
pub fn compute_flow_transitions(form_id: FormId, submissions: &[Submission]) -> Vec<FlowTransition> {
    let mut edges: BTreeMap<(&str, TransitionTarget), u64> = BTreeMap::new();

    for submission in submissions.iter().filter(|s| s.form_id == form_id) {
        let path = &submission.flow_path;
        for (i, source) in path.iter().enumerate() {
            let target = match path.get(i + 1) {
                Some(next) => TransitionTarget::Node(next.clone()),
                None => TransitionTarget::DropOff,
            };
            *edges.entry((source.as_str(), target)).or_insert(0) += 1;
        }
    }

    edges
        .into_iter()
        .map(|((source, target), value)| FlowTransition {
            source: source.to_string(),
            target,
            value,
        })
        .collect()
}

/// A transition with display labels for both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledTransition {
    pub source: NodeId,
    pub target: TransitionTarget,
    pub source_label: String,
    pub target_label: String,
    pub value: u64,
}

/// Attaches question text to each edge, falling back to the node id.
pub fn label_transitions(
    transitions: &[FlowTransition],
    labels: &HashMap<NodeId, String>,
) -> Vec<LabeledTransition> {
    let label_for = |id: &str| labels.get(id).cloned().unwrap_or_else(|| id.to_string());

    transitions
        .iter()
        .map(|t| LabeledTransition {
            source: t.source.clone(),
            target: t.target.clone(),
            source_label: label_for(&t.source),
            target_label: match &t.target {
                TransitionTarget::Node(id) => label_for(id),
                TransitionTarget::DropOff => DROP_OFF_LABEL.to_string(),
            },
            value: t.value,
        })
        .collect()
}

/// Renders the edges as a Mermaid `sankey-beta` diagram.
pub fn render_mermaid_sankey(transitions: &[LabeledTransition]) -> String {
    let mut out = String::from("sankey-beta\n\n");
    for t in transitions {
        out.push_str(&csv_field(&t.source_label));
        out.push(',');
        out.push_str(&csv_field(&t.target_label));
        out.push(',');
        out.push_str(&t.value.to_string());
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formflow_core::SubmissionDraft;

    fn path(form_id: FormId, nodes: &[&str]) -> Submission {
        SubmissionDraft::new(form_id, nodes.iter().map(|s| s.to_string()).collect())
            .into_submission()
            .unwrap()
    }

    fn edge(source: &str, target: Option<&str>, value: u64) -> FlowTransition {
        FlowTransition {
            source: source.into(),
            target: target
                .map(|t| TransitionTarget::Node(t.into()))
                .unwrap_or(TransitionTarget::DropOff),
            value,
        }
    }

    #[test]
    fn single_node_path_only_drops_off() {
        let form_id = FormId::new_v4();
        let transitions = compute_flow_transitions(form_id, &[path(form_id, &["a"])]);
        assert_eq!(transitions, vec![edge("a", None, 1)]);
    }

    #[test]
    fn revisited_nodes_emit_one_edge_per_visit() {
        let form_id = FormId::new_v4();
        let transitions = compute_flow_transitions(form_id, &[path(form_id, &["a", "b", "a"])]);
        assert_eq!(
            transitions,
            vec![edge("a", Some("b"), 1), edge("a", None, 1), edge("b", Some("a"), 1)]
        );
    }

    #[test]
    fn labels_fall_back_to_ids_and_name_the_sink() {
        let labels = HashMap::from([("a".to_string(), "Your name?".to_string())]);
        let labeled = label_transitions(&[edge("a", Some("b"), 2), edge("b", None, 2)], &labels);

        assert_eq!(labeled[0].source_label, "Your name?");
        assert_eq!(labeled[0].target_label, "b");
        assert_eq!(labeled[1].target_label, "Drop-off");
    }

    #[test]
    fn mermaid_output_quotes_awkward_labels() {
        let labels = HashMap::from([("a".to_string(), "Age, in years".to_string())]);
        let labeled = label_transitions(&[edge("a", None, 3)], &labels);
        let diagram = render_mermaid_sankey(&labeled);
        assert_eq!(diagram, "sankey-beta\n\n\"Age, in years\",Drop-off,3\n");
    }
}
