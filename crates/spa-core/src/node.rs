//! Arena of timed nodes
//!
//! Nodes never point at each other directly. Each node stores its parent's
//! id and its children's ids, and the owning interaction is stored by id too,
//! so the tree has no reference cycles and serializes as plain data.

use crate::interaction::InteractionId;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Stable index of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Type of work a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Interaction,
    Ajax,
    CustomTracer,
    Timer,
    CustomEnd,
}

impl NodeKind {
    /// Kinds whose end time is meaningful once closed
    pub fn is_timed(&self) -> bool {
        !matches!(self, NodeKind::CustomEnd)
    }
}

/// Request details carried by ajax nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AjaxAttrs {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default)]
    pub jsonp: bool,
    #[serde(default)]
    pub error: bool,
}

/// Free-form node attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ajax: Option<AjaxAttrs>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub interaction: InteractionId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub start: Timestamp,
    pub end: Option<Timestamp>,

    /// End of the last callback that ran on behalf of this node
    pub js_end: Option<Timestamp>,

    /// Accumulated exclusive time
    pub js_time: f64,

    pub attrs: NodeAttrs,
}

impl Node {
    fn new(
        id: NodeId,
        kind: NodeKind,
        interaction: InteractionId,
        parent: Option<NodeId>,
        start: Timestamp,
    ) -> Self {
        Self {
            id,
            kind,
            interaction,
            parent,
            children: Vec::new(),
            start,
            end: None,
            js_end: None,
            js_time: 0.0,
            attrs: NodeAttrs::default(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_ended(&self) -> bool {
        self.end.is_some()
    }
}

/// Owner of every live node
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: HashMap<NodeId, Node>,
    next_id: u32,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    /// Create the root node of an interaction
    pub fn insert_root(
        &mut self,
        interaction: InteractionId,
        kind: NodeKind,
        start: Timestamp,
    ) -> NodeId {
        let id = self.allocate();
        self.nodes
            .insert(id, Node::new(id, kind, interaction, None, start));
        id
    }

    /// Create a child of `parent`, inheriting its interaction.
    /// Returns `None` if the parent is no longer in the arena.
    pub fn attach_child(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        start: Timestamp,
    ) -> Option<NodeId> {
        let interaction = self.nodes.get(&parent)?.interaction;
        let id = self.allocate();
        self.nodes
            .insert(id, Node::new(id, kind, interaction, Some(parent), start));
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }
        Some(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn interaction_of(&self, id: NodeId) -> Option<InteractionId> {
        self.nodes.get(&id).map(|n| n.interaction)
    }

    /// Close a node. The end is clamped so it never precedes the start.
    /// Returns false if the node was already closed or is gone.
    pub fn end_node(&mut self, id: NodeId, ts: Timestamp) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if node.end.is_none() => {
                node.end = Some(ts.max(node.start));
                true
            }
            _ => false,
        }
    }

    /// All nodes below `root` in pre-order, excluding `root` itself
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(&root) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                out.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Remove a whole subtree, returning how many nodes were freed
    pub fn remove_tree(&mut self, root: NodeId) -> usize {
        let mut ids = self.descendants(root);
        ids.push(root);

        if let Some(parent) = self.nodes.get(&root).and_then(|n| n.parent) {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|c| *c != root);
            }
        }

        ids.into_iter()
            .filter(|id| self.nodes.remove(id).is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
