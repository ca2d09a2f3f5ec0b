//! Worker message protocol
//!
//! Inbound messages are a `type`-tagged union; anything with an unknown
//! `type` decodes to [`Message::Unknown`] and is ignored by the host.
//! Outbound, each tick of each running graph produces one `graphData` event.

use serde::{Deserialize, Serialize};

use crate::config::ForceOverrides;
use crate::error::LayoutResult;
use crate::graph_types::{NodePosition, RawLink, RawNode, id_from_string_or_number};

/// Caller -> host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Create or reconfigure the simulation for `graph_id`
    #[serde(rename = "updateGraph")]
    UpdateGraph {
        #[serde(rename = "graphId", deserialize_with = "id_from_string_or_number")]
        graph_id: String,
        nodes: Vec<RawNode>,
        #[serde(default)]
        links: Vec<RawLink>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        forces: Option<ForceOverrides>,
    },

    /// Stop and discard the simulation for `graph_id`
    #[serde(rename = "removeGraph")]
    RemoveGraph {
        #[serde(rename = "graphId", deserialize_with = "id_from_string_or_number")]
        graph_id: String,
    },

    /// Any other message type
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn update(graph_id: impl Into<String>, nodes: Vec<RawNode>, links: Vec<RawLink>) -> Self {
        Message::UpdateGraph {
            graph_id: graph_id.into(),
            nodes,
            links,
            forces: None,
        }
    }

    pub fn remove(graph_id: impl Into<String>) -> Self {
        Message::RemoveGraph {
            graph_id: graph_id.into(),
        }
    }

    /// Decode one JSON message.
    ///
    /// Missing `graphId`, a non-array `nodes` or `links`, or a missing `type`
    /// are errors; an unrecognised `type` is not.
    pub fn from_json(text: &str) -> LayoutResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> LayoutResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A link in a snapshot, endpoints carried as resolved node positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLink {
    pub source: NodePosition,
    pub target: NodePosition,
}

/// One tick's positions for one graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub graph_id: String,
    pub tick: u64,
    pub alpha: f64,
    pub nodes: Vec<NodePosition>,
    pub links: Vec<SnapshotLink>,
}

impl GraphSnapshot {
    pub fn node(&self, id: &str) -> Option<&NodePosition> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Encode as an outbound `graphData` event
    pub fn to_json(&self) -> LayoutResult<String> {
        Ok(serde_json::to_string(&HostEvent::GraphData(self.clone()))?)
    }
}

/// Host -> caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    #[serde(rename = "graphData")]
    GraphData(GraphSnapshot),
}

impl HostEvent {
    pub fn from_json(text: &str) -> LayoutResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
