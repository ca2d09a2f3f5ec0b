//! Graph model builder
//!
//! Turns caller-supplied nodes (with optional children) and links into a
//! [`Graph`] the engine can tick: every node positioned, every edge resolved.

use std::collections::HashMap;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::graph_types::{Edge, Graph, NodePosition, RawLink, RawNode};

/// Builds simulation graphs seeded into a `width x height` square around the origin
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder {
    width: f64,
    height: f64,
}

impl GraphBuilder {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn from_config(config: &LayoutConfig) -> Self {
        Self::new(config.width, config.height)
    }

    /// Build a graph from raw nodes and links.
    ///
    /// Child relations produce edges first, in node order, followed by the
    /// explicit links. Edges with an endpoint outside the node set are dropped.
    pub fn build<R: Rng + ?Sized>(
        &self,
        raw_nodes: &[RawNode],
        raw_links: &[RawLink],
        rng: &mut R,
    ) -> Graph {
        let mut nodes = Vec::with_capacity(raw_nodes.len());
        let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(raw_nodes.len());

        for raw in raw_nodes {
            if index_of.contains_key(raw.id.as_str()) {
                warn!(id = %raw.id, "duplicate node id, keeping first occurrence");
                continue;
            }
            index_of.insert(raw.id.as_str(), nodes.len());
            nodes.push(self.position(raw, rng));
        }

        let declared = raw_nodes.iter().flat_map(|raw| {
            raw.child_ids()
                .into_iter()
                .map(move |child| (raw.id.clone(), child))
        });
        let explicit = raw_links
            .iter()
            .map(|link| (link.source.clone(), link.target.clone()));

        let edges = declared
            .chain(explicit)
            .filter_map(|(source, target)| {
                let resolved = index_of
                    .get(source.as_str())
                    .zip(index_of.get(target.as_str()));
                if resolved.is_none() {
                    debug!(%source, %target, "dropping edge with unresolved endpoint");
                }
                resolved.map(|(&source, &target)| Edge { source, target })
            })
            .collect();

        Graph { nodes, edges }
    }

    fn position<R: Rng + ?Sized>(&self, raw: &RawNode, rng: &mut R) -> NodePosition {
        // Pinned coordinates win, then supplied ones, then a random seed point
        let x = raw
            .fx
            .or(raw.x)
            .filter(|x| x.is_finite())
            .unwrap_or_else(|| rng.r#gen::<f64>() * self.width - self.width / 2.0);
        let y = raw
            .fy
            .or(raw.y)
            .filter(|y| y.is_finite())
            .unwrap_or_else(|| rng.r#gen::<f64>() * self.height - self.height / 2.0);

        NodePosition {
            id: raw.id.clone(),
            x,
            y,
            fx: raw.fx.filter(|fx| fx.is_finite()),
            fy: raw.fy.filter(|fy| fy.is_finite()),
        }
    }
}
