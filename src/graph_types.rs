//! Graph data types shared by the builder, the engine and the wire protocol
//!
//! Raw types are what callers send. [`Graph`] is what the builder produces:
//! edges point at node indices, never at bare ids.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Node ids arrive as JSON strings or numbers; both become strings.
pub(crate) fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// A node as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,

    /// Pinned x coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<f64>,

    /// Pinned y coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fy: Option<f64>,

    /// Child ids or child records. Anything other than an array means no children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Value>,
}

impl RawNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
            fx: None,
            fy: None,
            children: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn pinned(mut self, fx: f64, fy: f64) -> Self {
        self.fx = Some(fx);
        self.fy = Some(fy);
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let children = children
            .into_iter()
            .map(|child| Value::String(child.into()))
            .collect();
        self.children = Some(Value::Array(children));
        self
    }

    /// Declared child ids, in order. Entries that carry no usable id are skipped.
    pub fn child_ids(&self) -> Vec<String> {
        let Some(Value::Array(children)) = &self.children else {
            return Vec::new();
        };

        children
            .iter()
            .filter_map(|child| match child {
                Value::String(id) => Some(id.clone()),
                Value::Number(id) => Some(id.to_string()),
                Value::Object(record) => match record.get("id") {
                    Some(Value::String(id)) => Some(id.clone()),
                    Some(Value::Number(id)) => Some(id.to_string()),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }
}

/// A link as supplied by the caller, endpoints by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLink {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub source: String,

    #[serde(deserialize_with = "id_from_string_or_number")]
    pub target: String,
}

impl RawLink {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A positioned node, as handed to the engine and back out in snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fy: Option<f64>,
}

impl NodePosition {
    pub fn distance_to(&self, other: &NodePosition) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// An edge resolved to indices into [`Graph::nodes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
}

/// Builder output: positioned nodes plus resolved edges
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    pub nodes: Vec<NodePosition>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn source_of(&self, edge: &Edge) -> Option<&NodePosition> {
        self.nodes.get(edge.source)
    }

    pub fn target_of(&self, edge: &Edge) -> Option<&NodePosition> {
        self.nodes.get(edge.target)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numeric_ids_become_strings() {
        let node: RawNode = serde_json::from_value(json!({"id": 42})).unwrap();
        assert_eq!(node.id, "42");

        let link: RawLink = serde_json::from_value(json!({"source": 1, "target": "b"})).unwrap();
        assert_eq!(link, RawLink::new("1", "b"));
    }

    #[test]
    fn child_ids_accept_ids_and_records() {
        let node: RawNode = serde_json::from_value(json!({
            "id": "root",
            "children": ["a", 7, {"id": "c", "name": "C"}, {"name": "no id"}, null]
        }))
        .unwrap();
        assert_eq!(node.child_ids(), vec!["a", "7", "c"]);
    }

    #[test]
    fn malformed_children_mean_no_children() {
        let node: RawNode =
            serde_json::from_value(json!({"id": "root", "children": "oops"})).unwrap();
        assert!(node.child_ids().is_empty());

        let node: RawNode =
            serde_json::from_value(json!({"id": "root", "children": {"id": "x"}})).unwrap();
        assert!(node.child_ids().is_empty());
    }

    #[test]
    fn missing_id_is_rejected() {
        let result = serde_json::from_value::<RawNode>(json!({"x": 1.0}));
        assert!(result.is_err());
    }

    #[test]
    fn position_omits_absent_pins() {
        let position = NodePosition {
            id: "a".to_string(),
            x: 1.0,
            y: 2.0,
            fx: None,
            fy: None,
        };
        assert_eq!(
            serde_json::to_value(&position).unwrap(),
            json!({"id": "a", "x": 1.0, "y": 2.0})
        );
    }
}
