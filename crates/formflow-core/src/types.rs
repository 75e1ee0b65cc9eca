use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type FormId = Uuid;
pub type ResponseId = Uuid;
/// Identifier of a node in a form's flow tree, as it appears in flow paths.
pub type NodeId = String;

/// Label of the synthetic sink every flow path ends in.
pub const DROP_OFF: &str = "DROP_OFF";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub form_id: FormId,
    pub node_id: NodeId,
    pub visit_count: u64,
    pub answer_count: u64,
    pub skip_count: u64,
    pub drop_off_count: u64,
    pub total_time_spent: u64,
    pub avg_time_spent: f64,
    pub calculated_at: DateTime<Utc>,
}

impl NodeMetrics {
    pub fn new(form_id: FormId, node_id: NodeId, calculated_at: DateTime<Utc>) -> Self {
        Self {
            form_id,
            node_id,
            visit_count: 0,
            answer_count: 0,
            skip_count: 0,
            drop_off_count: 0,
            total_time_spent: 0,
            avg_time_spent: 0.0,
            calculated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTarget {
    Node(NodeId),
    DropOff,
}

impl TransitionTarget {
    pub fn is_drop_off(&self) -> bool {
        matches!(self, TransitionTarget::DropOff)
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            TransitionTarget::Node(id) => Some(id),
            TransitionTarget::DropOff => None,
        }
    }
}

impl fmt::Display for TransitionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionTarget::Node(id) => write!(f, "{}", id),
            TransitionTarget::DropOff => write!(f, "{}", DROP_OFF),
        }
    }
}

/// Directed edge between two consecutive nodes of flow paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowTransition {
    pub source: NodeId,
    pub target: TransitionTarget,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsState {
    Pending,
    Calculating,
    Completed,
    Failed,
}

impl fmt::Display for AnalyticsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalyticsState::Pending => "pending",
            AnalyticsState::Calculating => "calculating",
            AnalyticsState::Completed => "completed",
            AnalyticsState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AnalyticsState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnalyticsState::Pending),
            "calculating" => Ok(AnalyticsState::Calculating),
            "completed" => Ok(AnalyticsState::Completed),
            "failed" => Ok(AnalyticsState::Failed),
            other => Err(format!("unknown analytics state '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsStatus {
    pub form_id: FormId,
    pub state: AnalyticsState,
    pub calculated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_off_target_renders_sentinel() {
        assert_eq!(TransitionTarget::DropOff.to_string(), "DROP_OFF");
        assert_eq!(TransitionTarget::Node("q1".into()).to_string(), "q1");
        assert!(TransitionTarget::DropOff.node_id().is_none());
    }

    #[test]
    fn analytics_state_parses_its_own_display() {
        for state in [
            AnalyticsState::Pending,
            AnalyticsState::Calculating,
            AnalyticsState::Completed,
            AnalyticsState::Failed,
        ] {
            assert_eq!(state.to_string().parse::<AnalyticsState>(), Ok(state));
        }
        assert!("stale".parse::<AnalyticsState>().is_err());
    }
}
