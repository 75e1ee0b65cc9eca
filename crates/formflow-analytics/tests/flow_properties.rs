use std::collections::HashMap;

use formflow_analytics::{compute_flow_transitions, compute_node_metrics};
use formflow_core::{AnswerDraft, FormId, Submission, SubmissionDraft, TransitionTarget};
use proptest::prelude::*;

fn submission(form_id: FormId, path: Vec<String>, answered: &[bool]) -> Submission {
    let mut draft = SubmissionDraft::new(form_id, path.clone());
    for (node, answered) in path.iter().zip(answered) {
        if *answered {
            draft = draft.with_answer(AnswerDraft::new(node.clone(), "x").with_time_spent(3));
        }
    }
    draft.into_submission().unwrap()
}

fn paths(form_id: FormId, raw: &[&[&str]]) -> Vec<Submission> {
    raw.iter()
        .map(|p| submission(form_id, p.iter().map(|s| s.to_string()).collect(), &[]))
        .collect()
}

#[test]
fn three_respondents_scenario() {
    let form_id = FormId::new_v4();
    let submissions = paths(form_id, &[&["A", "B", "C"], &["A", "C"], &["A", "B"]]);

    let transitions: HashMap<(String, TransitionTarget), u64> =
        compute_flow_transitions(form_id, &submissions)
            .into_iter()
            .map(|t| ((t.source, t.target), t.value))
            .collect();

    let node = |id: &str| TransitionTarget::Node(id.to_string());
    let expected: HashMap<(String, TransitionTarget), u64> = HashMap::from([
        (("A".to_string(), node("B")), 2),
        (("A".to_string(), node("C")), 1),
        (("B".to_string(), node("C")), 1),
        (("B".to_string(), TransitionTarget::DropOff), 1),
        (("C".to_string(), TransitionTarget::DropOff), 2),
    ]);
    assert_eq!(transitions, expected);

    let metrics = compute_node_metrics(form_id, &submissions);
    let a = metrics.iter().find(|m| m.node_id == "A").unwrap();
    let c = metrics.iter().find(|m| m.node_id == "C").unwrap();
    assert_eq!(a.visit_count, 3);
    assert_eq!(a.drop_off_count, 0);
    assert_eq!(c.drop_off_count, 2);
}

#[test]
fn zero_submissions_is_not_an_error() {
    let form_id = FormId::new_v4();
    assert!(compute_flow_transitions(form_id, &[]).is_empty());
    assert!(compute_node_metrics(form_id, &[]).is_empty());
}

fn arb_submissions() -> impl Strategy<Value = Vec<(Vec<String>, Vec<bool>)>> {
    let node = prop::sample::select(vec!["a", "b", "c", "d", "e"]).prop_map(String::from);
    let path = prop::collection::vec(node, 1..8);
    let entry = path.prop_flat_map(|p| {
        let len = p.len();
        (Just(p), prop::collection::vec(any::<bool>(), len))
    });
    prop::collection::vec(entry, 0..30)
}

proptest! {
    #[test]
    fn outgoing_edges_match_visits(raw in arb_submissions()) {
        let form_id = FormId::new_v4();
        let submissions: Vec<_> = raw
            .into_iter()
            .map(|(path, answered)| submission(form_id, path, &answered))
            .collect();

        let transitions = compute_flow_transitions(form_id, &submissions);
        let metrics = compute_node_metrics(form_id, &submissions);

        for node in &metrics {
            let outgoing: u64 = transitions
                .iter()
                .filter(|t| t.source == node.node_id)
                .map(|t| t.value)
                .sum();
            prop_assert_eq!(outgoing, node.visit_count);
            prop_assert_eq!(node.skip_count, node.visit_count - node.answer_count);
            prop_assert!(node.answer_count <= node.visit_count);
        }

        let sources: std::collections::HashSet<_> =
            transitions.iter().map(|t| t.source.as_str()).collect();
        prop_assert_eq!(sources.len(), metrics.len());
    }

    #[test]
    fn every_submission_drops_off_once(raw in arb_submissions()) {
        let form_id = FormId::new_v4();
        let submissions: Vec<_> = raw
            .into_iter()
            .map(|(path, answered)| submission(form_id, path, &answered))
            .collect();

        let transitions = compute_flow_transitions(form_id, &submissions);
        let drop_offs: u64 = transitions
            .iter()
            .filter(|t| t.target.is_drop_off())
            .map(|t| t.value)
            .sum();
        prop_assert_eq!(drop_offs, submissions.len() as u64);

        let metrics = compute_node_metrics(form_id, &submissions);
        let node_drop_offs: u64 = metrics.iter().map(|m| m.drop_off_count).sum();
        prop_assert_eq!(node_drop_offs, submissions.len() as u64);
    }
}
