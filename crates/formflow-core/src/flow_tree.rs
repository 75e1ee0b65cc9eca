//! Flow tree built from flat stored rows.
//!
//! Nodes live in one `Vec` and refer to each other by index, so the tree can be
//! walked and rendered without shared ownership or dynamic lookups.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{FlowRow, FormFlowError, NodeId, Result};

pub type NodeIndex = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct FlowTreeNode {
    pub id: NodeId,
    pub question_type: String,
    pub question_text: String,
    pub order_index: u32,
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowTree {
    nodes: Vec<FlowTreeNode>,
    roots: Vec<NodeIndex>,
    index: HashMap<NodeId, NodeIndex>,
}

/// Nested block shape served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowBlock {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub question_type: String,
    pub question: String,
    pub children: Vec<FlowBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowView {
    pub blocks: Vec<FlowBlock>,
}

impl FlowTree {
    pub fn from_rows(rows: Vec<FlowRow>) -> Result<Self> {
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if index.insert(row.id.clone(), i).is_some() {
                return Err(FormFlowError::InvalidFlow(format!(
                    "duplicate node id '{}'",
                    row.id
                )));
            }
        }

        let mut parents = Vec::with_capacity(rows.len());
        for row in &rows {
            let parent = match &row.parent_id {
                Some(pid) => Some(*index.get(pid).ok_or_else(|| {
                    FormFlowError::InvalidFlow(format!(
                        "node '{}' refers to missing parent '{}'",
                        row.id, pid
                    ))
                })?),
                None => None,
            };
            parents.push(parent);
        }

        let mut nodes: Vec<FlowTreeNode> = rows
            .into_iter()
            .zip(parents.iter())
            .map(|(row, parent)| FlowTreeNode {
                id: row.id,
                question_type: row.question_type,
                question_text: row.question_text,
                order_index: row.order_index,
                parent: *parent,
                children: Vec::new(),
            })
            .collect();

        let mut roots = Vec::new();
        for (i, parent) in parents.iter().enumerate() {
            match parent {
                Some(p) => nodes[*p].children.push(i),
                None => roots.push(i),
            }
        }

        let order: Vec<u32> = nodes.iter().map(|n| n.order_index).collect();
        let by_order = |a: &NodeIndex, b: &NodeIndex| order[*a].cmp(&order[*b]).then(a.cmp(b));
        roots.sort_by(by_order);
        for node in &mut nodes {
            node.children.sort_by(by_order);
        }

        let tree = Self {
            nodes,
            roots,
            index,
        };
        tree.ensure_acyclic()?;
        Ok(tree)
    }

    // Every node must be reachable from a root exactly once; a parent cycle leaves
    // its members unreachable.
    fn ensure_acyclic(&self) -> Result<()> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeIndex> = self.roots.clone();
        let mut reached = 0;
        while let Some(i) = stack.pop() {
            if seen[i] {
                continue;
            }
            seen[i] = true;
            reached += 1;
            stack.extend(self.nodes[i].children.iter().copied());
        }
        if reached != self.nodes.len() {
            let stuck = seen
                .iter()
                .position(|s| !s)
                .map(|i| self.nodes[i].id.clone())
                .unwrap_or_default();
            return Err(FormFlowError::InvalidFlow(format!(
                "node '{}' is part of a parent cycle",
                stuck
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> Option<&FlowTreeNode> {
        self.nodes.get(index)
    }

    pub fn find(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn roots(&self) -> impl Iterator<Item = &FlowTreeNode> {
        self.roots.iter().map(move |i| &self.nodes[*i])
    }

    pub fn children(&self, index: NodeIndex) -> impl Iterator<Item = &FlowTreeNode> {
        self.nodes
            .get(index)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |i| &self.nodes[*i])
    }

    /// A node with no children ends the form.
    pub fn is_terminal(&self, id: &str) -> bool {
        self.find(id)
            .map(|i| self.nodes[i].children.is_empty())
            .unwrap_or(false)
    }

    pub fn depth(&self, index: NodeIndex) -> usize {
        let mut depth = 0;
        let mut current = self.nodes.get(index).and_then(|n| n.parent);
        while let Some(p) = current {
            depth += 1;
            current = self.nodes[p].parent;
        }
        depth
    }

    /// Question text per node id.
    pub fn labels(&self) -> HashMap<NodeId, String> {
        self.nodes
            .iter()
            .map(|n| (n.id.clone(), n.question_text.clone()))
            .collect()
    }

    pub fn to_view(&self) -> FlowView {
        FlowView {
            blocks: self.roots.iter().map(|i| self.block(*i)).collect(),
        }
    }

    fn block(&self, index: NodeIndex) -> FlowBlock {
        let node = &self.nodes[index];
        FlowBlock {
            id: node.id.clone(),
            question_type: node.question_type.clone(),
            question: node.question_text.clone(),
            children: node.children.iter().map(|c| self.block(*c)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<FlowRow> {
        vec![
            FlowRow::new("c2", Some("root"), 1, "text", "Why?"),
            FlowRow::new("root", None, 0, "choice", "Do you like it?"),
            FlowRow::new("c1", Some("root"), 0, "text", "What do you like?"),
            FlowRow::new("leaf", Some("c1"), 0, "rating", "Rate it"),
        ]
    }

    #[test]
    fn builds_ordered_children_from_unordered_rows() {
        let tree = FlowTree::from_rows(rows()).unwrap();
        assert_eq!(tree.len(), 4);

        let root_ids: Vec<_> = tree.roots().map(|n| n.id.as_str()).collect();
        assert_eq!(root_ids, vec!["root"]);

        let root = tree.find("root").unwrap();
        let child_ids: Vec<_> = tree.children(root).map(|n| n.id.as_str()).collect();
        assert_eq!(child_ids, vec!["c1", "c2"]);

        let leaf = tree.find("leaf").unwrap();
        assert_eq!(tree.depth(leaf), 2);
        assert!(tree.is_terminal("leaf"));
        assert!(!tree.is_terminal("root"));
    }

    #[test]
    fn view_serializes_as_nested_blocks() {
        let tree = FlowTree::from_rows(rows()).unwrap();
        let json = serde_json::to_value(tree.to_view()).unwrap();
        assert_eq!(json["blocks"][0]["id"], "root");
        assert_eq!(json["blocks"][0]["type"], "choice");
        assert_eq!(json["blocks"][0]["children"][0]["children"][0]["id"], "leaf");
    }

    #[test]
    fn missing_parent_is_rejected() {
        let err = FlowTree::from_rows(vec![FlowRow::new("a", Some("ghost"), 0, "text", "A")])
            .unwrap_err();
        assert!(err.to_string().contains("missing parent"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = FlowTree::from_rows(vec![
            FlowRow::new("a", None, 0, "text", "A"),
            FlowRow::new("a", None, 1, "text", "A again"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn parent_cycles_are_rejected() {
        let err = FlowTree::from_rows(vec![
            FlowRow::new("root", None, 0, "text", "Root"),
            FlowRow::new("a", Some("b"), 0, "text", "A"),
            FlowRow::new("b", Some("a"), 0, "text", "B"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn empty_rows_build_an_empty_tree() {
        let tree = FlowTree::from_rows(Vec::new()).unwrap();
        assert!(tree.is_empty());
        assert!(tree.to_view().blocks.is_empty());
    }
}
