//! Records handed to the harvest collaborator

use crate::node::{AjaxAttrs, NodeAttrs, NodeKind};
use crate::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Initial page load")]
    InitialPageLoad,
    #[serde(rename = "Route change")]
    RouteChange,
    #[serde(rename = "Custom")]
    Custom,
}

/// Snapshot of one node and its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u32,
    pub kind: NodeKind,
    pub start: Timestamp,
    pub end: Option<Timestamp>,
    pub js_end: Option<Timestamp>,
    pub js_time: f64,
    #[serde(flatten)]
    pub attrs: NodeAttrs,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeRecord>,
}

impl NodeRecord {
    /// Sum of exclusive time over every node below this one
    pub fn descendant_js_time(&self) -> f64 {
        self.children
            .iter()
            .map(|c| c.js_time + c.descendant_js_time())
            .sum()
    }

    /// Number of nodes in this subtree, this one included
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(NodeRecord::size).sum::<usize>()
    }

    pub fn ajax(&self) -> Option<&AjaxAttrs> {
        self.attrs.ajax.as_ref()
    }
}

/// A finalized interaction as emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: String,
    pub category: Category,
    pub trigger: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub ignored: bool,
    pub save: bool,
    pub route_change: bool,
    pub in_progress: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_paint: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_contentful_paint: Option<Timestamp>,
    pub root: NodeRecord,
}

impl InteractionRecord {
    pub fn children(&self) -> &[NodeRecord] {
        &self.root.children
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn custom_name(&self) -> Option<&str> {
        self.root.attrs.custom_name.as_deref()
    }
}

/// A request that was not attributed to any interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AjaxRecord {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// An error thrown inside a tracer-wrapped callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Unique id of the owning interaction, if it was emitted
    pub interaction_id: Option<String>,
    pub node_id: Option<u32>,
    pub message: String,
    pub ts: Timestamp,
}
