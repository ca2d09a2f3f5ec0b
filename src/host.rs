//! Simulation host
//!
//! Owns one [`Simulation`] per graph id and maps protocol messages onto
//! them. The host itself is synchronous and single-threaded: [`handle`]
//! applies a message, [`step`] ticks every running instance once. The
//! worker decides when each is called.
//!
//! [`handle`]: SimulationHost::handle
//! [`step`]: SimulationHost::step

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::builder::GraphBuilder;
use crate::config::LayoutConfig;
use crate::graph_types::Edge;
use crate::protocol::{GraphSnapshot, Message, SnapshotLink};
use crate::simulation::{Simulation, TickOutcome};

/// What handling a message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// A new instance was created and started
    Started { graph_id: String },
    /// An existing instance was reseeded and restarted
    Restarted { graph_id: String },
    /// An instance was stopped and discarded
    Removed { graph_id: String },
    /// Nothing to do
    Noop,
}

/// Receives per-tick snapshots
pub trait SnapshotSink {
    fn publish(&mut self, snapshot: GraphSnapshot);
}

impl SnapshotSink for Vec<GraphSnapshot> {
    fn publish(&mut self, snapshot: GraphSnapshot) {
        self.push(snapshot);
    }
}

impl SnapshotSink for mpsc::UnboundedSender<GraphSnapshot> {
    fn publish(&mut self, snapshot: GraphSnapshot) {
        // Fire and forget: a departed consumer does not stop the simulation
        if self.send(snapshot).is_err() {
            trace!("snapshot consumer gone, dropping snapshot");
        }
    }
}

/// Owns the per-graph simulation instances
pub struct SimulationHost {
    config: LayoutConfig,
    builder: GraphBuilder,
    instances: HashMap<String, Simulation>,
    rng: StdRng,
}

impl SimulationHost {
    pub fn new(config: LayoutConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            builder: GraphBuilder::from_config(&config),
            config,
            instances: HashMap::new(),
            rng,
        }
    }

    /// Apply one message
    pub fn handle(&mut self, message: Message) -> Effect {
        match message {
            Message::UpdateGraph {
                graph_id,
                nodes,
                links,
                forces,
            } => {
                let graph = self.builder.build(&nodes, &links, &mut self.rng);
                let (forces, termination) = self.config.resolve(forces.as_ref());
                debug!(
                    %graph_id,
                    nodes = graph.nodes.len(),
                    edges = graph.edges.len(),
                    "graph built"
                );

                match self.instances.entry(graph_id.clone()) {
                    Entry::Occupied(mut entry) => {
                        entry.get_mut().reconfigure(&graph, forces, termination);
                        info!(%graph_id, "simulation restarted");
                        Effect::Restarted { graph_id }
                    }
                    Entry::Vacant(entry) => {
                        let rng = StdRng::seed_from_u64(self.rng.r#gen());
                        let mut simulation = Simulation::new(&graph, forces, termination, rng);
                        simulation.start();
                        entry.insert(simulation);
                        info!(%graph_id, "simulation started");
                        Effect::Started { graph_id }
                    }
                }
            }
            Message::RemoveGraph { graph_id } => match self.instances.remove(&graph_id) {
                Some(mut simulation) => {
                    simulation.stop();
                    info!(%graph_id, ticks = simulation.ticks(), "simulation removed");
                    Effect::Removed { graph_id }
                }
                None => {
                    debug!(%graph_id, "remove for unknown graph ignored");
                    Effect::Noop
                }
            },
            Message::Unknown => {
                debug!("unknown message type ignored");
                Effect::Noop
            }
        }
    }

    /// Tick every running instance once, publishing one snapshot per tick.
    ///
    /// Returns the number of instances that advanced.
    pub fn step(&mut self, sink: &mut impl SnapshotSink) -> usize {
        let mut advanced = 0;
        for (graph_id, simulation) in &mut self.instances {
            match simulation.tick() {
                TickOutcome::Advanced(tick) => {
                    advanced += 1;
                    sink.publish(snapshot(graph_id, tick, simulation));
                }
                TickOutcome::Halted(reason) => {
                    trace!(%graph_id, ?reason, "simulation halted");
                }
                TickOutcome::NotRunning => {}
            }
        }
        advanced
    }

    /// Run one instance to completion on the calling thread and return its
    /// final snapshot. Other instances do not advance.
    pub fn settle(&mut self, graph_id: &str) -> Option<GraphSnapshot> {
        let simulation = self.instances.get_mut(graph_id)?;
        let reason = simulation.run_to_completion();
        debug!(%graph_id, ?reason, ticks = simulation.ticks(), "simulation settled");
        Some(snapshot(graph_id, simulation.ticks(), simulation))
    }

    /// Number of instances still ticking
    pub fn running(&self) -> usize {
        self.instances.values().filter(|s| s.is_running()).count()
    }

    pub fn contains(&self, graph_id: &str) -> bool {
        self.instances.contains_key(graph_id)
    }

    pub fn get(&self, graph_id: &str) -> Option<&Simulation> {
        self.instances.get(graph_id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Stop and discard every instance
    pub fn shutdown(&mut self) {
        for (graph_id, simulation) in self.instances.iter_mut() {
            simulation.stop();
            debug!(%graph_id, "simulation released");
        }
        self.instances.clear();
    }
}

fn snapshot(graph_id: &str, tick: u64, simulation: &Simulation) -> GraphSnapshot {
    let nodes = simulation.positions();
    let links = simulation
        .edges()
        .iter()
        .filter_map(|&Edge { source, target }| {
            Some(SnapshotLink {
                source: nodes.get(source)?.clone(),
                target: nodes.get(target)?.clone(),
            })
        })
        .collect();

    GraphSnapshot {
        graph_id: graph_id.to_string(),
        tick,
        alpha: simulation.alpha(),
        nodes,
        links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Termination;
    use crate::graph_types::{RawLink, RawNode};
    use crate::simulation::SimulationState;

    fn host() -> SimulationHost {
        SimulationHost::new(LayoutConfig::default().with_seed(11))
    }

    fn tree_nodes() -> Vec<RawNode> {
        vec![
            RawNode::new("1").with_children(["2", "3"]),
            RawNode::new("2").with_children(["4"]),
            RawNode::new("3"),
            RawNode::new("4"),
        ]
    }

    fn drain(host: &mut SimulationHost) -> Vec<GraphSnapshot> {
        let mut snapshots = Vec::new();
        while host.step(&mut snapshots) > 0 {}
        snapshots
    }

    #[test]
    fn update_creates_and_starts_instance() {
        let mut host = host();
        let effect = host.handle(Message::update("g1", tree_nodes(), vec![]));

        assert_eq!(
            effect,
            Effect::Started {
                graph_id: "g1".to_string()
            }
        );
        assert_eq!(host.len(), 1);
        assert_eq!(host.running(), 1);
    }

    #[test]
    fn step_emits_one_snapshot_per_running_instance() {
        let mut host = host();
        host.handle(Message::update("g1", tree_nodes(), vec![]));
        host.handle(Message::update("g2", tree_nodes(), vec![]));

        let mut snapshots = Vec::new();
        assert_eq!(host.step(&mut snapshots), 2);
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.tick == 1));
    }

    #[test]
    fn ticks_increase_and_stop_at_budget() {
        let mut host = host();
        host.handle(Message::update("g1", tree_nodes(), vec![]));

        let snapshots = drain(&mut host);
        let ticks: Vec<u64> = snapshots.iter().map(|s| s.tick).collect();
        assert_eq!(ticks, (1..=100).collect::<Vec<_>>());
        assert_eq!(host.running(), 0);
        // Stopped instances stay registered until removed
        assert!(host.contains("g1"));
    }

    #[test]
    fn snapshot_links_carry_resolved_nodes() {
        let mut host = host();
        host.handle(Message::update("g1", tree_nodes(), vec![]));

        let mut snapshots = Vec::new();
        host.step(&mut snapshots);
        let snapshot = &snapshots[0];

        assert_eq!(snapshot.nodes.len(), 4);
        assert_eq!(snapshot.links.len(), 3);
        let link = &snapshot.links[2];
        assert_eq!(link.source.id, "2");
        assert_eq!(link.target.id, "4");
        assert_eq!(Some(&link.target), snapshot.node("4"));
    }

    #[test]
    fn second_update_restarts_single_instance() {
        let mut host = host();
        host.handle(Message::update("g1", tree_nodes(), vec![]));
        let mut snapshots = Vec::new();
        for _ in 0..10 {
            host.step(&mut snapshots);
        }

        let effect = host.handle(Message::update("g1", tree_nodes(), vec![]));
        assert_eq!(
            effect,
            Effect::Restarted {
                graph_id: "g1".to_string()
            }
        );
        assert_eq!(host.len(), 1);
        let simulation = host.get("g1").unwrap();
        assert_eq!(simulation.ticks(), 0);
        assert_eq!(simulation.alpha(), 1.0);

        let mut after = Vec::new();
        assert_eq!(host.step(&mut after), 1);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].tick, 1);
    }

    #[test]
    fn update_after_budget_restarts_stopped_instance() {
        let mut host = host();
        host.handle(Message::update("g1", tree_nodes(), vec![]));
        drain(&mut host);

        host.handle(Message::update("g1", tree_nodes(), vec![]));
        assert_eq!(
            host.get("g1").map(Simulation::state),
            Some(SimulationState::Running)
        );
    }

    #[test]
    fn remove_stops_emission() {
        let mut host = host();
        host.handle(Message::update("g1", tree_nodes(), vec![]));
        host.step(&mut Vec::new());

        let effect = host.handle(Message::remove("g1"));
        assert_eq!(
            effect,
            Effect::Removed {
                graph_id: "g1".to_string()
            }
        );
        host.handle(Message::update("g2", tree_nodes(), vec![]));

        let snapshots = drain(&mut host);
        assert!(!snapshots.is_empty());
        assert!(snapshots.iter().all(|s| s.graph_id == "g2"));
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut host = host();
        assert_eq!(host.handle(Message::remove("missing")), Effect::Noop);
    }

    #[test]
    fn unknown_message_is_noop() {
        let mut host = host();
        host.handle(Message::update("g1", tree_nodes(), vec![]));
        assert_eq!(host.handle(Message::Unknown), Effect::Noop);
        assert_eq!(host.running(), 1);
    }

    #[test]
    fn dangling_links_do_not_stop_the_graph() {
        let mut host = host();
        host.handle(Message::update(
            "g1",
            vec![RawNode::new("a"), RawNode::new("b")],
            vec![RawLink::new("a", "z")],
        ));

        let mut snapshots = Vec::new();
        assert_eq!(host.step(&mut snapshots), 1);
        assert!(snapshots[0].links.is_empty());
    }

    #[test]
    fn per_graph_overrides_apply() {
        let mut host = host();
        host.handle(Message::UpdateGraph {
            graph_id: "g1".to_string(),
            nodes: tree_nodes(),
            links: vec![],
            forces: Some(crate::config::ForceOverrides {
                max_ticks: Some(5),
                ..Default::default()
            }),
        });

        assert_eq!(drain(&mut host).len(), 5);
    }

    #[test]
    fn wall_clock_policy_terminates() {
        let config = LayoutConfig::default()
            .with_seed(1)
            .with_termination(Termination::WallClockMs(10));
        let mut host = SimulationHost::new(config);
        host.handle(Message::update("g1", tree_nodes(), vec![]));

        let snapshots = drain(&mut host);
        assert!(!snapshots.is_empty());
        assert_eq!(host.running(), 0);
    }

    #[test]
    fn settle_runs_one_graph_to_completion() {
        let mut host = host();
        host.handle(Message::update("g1", tree_nodes(), vec![]));
        host.handle(Message::update("g2", tree_nodes(), vec![]));

        let snapshot = host.settle("g1").unwrap();
        assert_eq!(snapshot.tick, 100);
        for node in &snapshot.nodes {
            assert!(node.x.is_finite() && node.y.is_finite());
        }
        assert_eq!(host.get("g2").map(Simulation::ticks), Some(0));
        assert!(host.settle("missing").is_none());
    }

    #[test]
    fn shutdown_releases_everything() {
        let mut host = host();
        host.handle(Message::update("g1", tree_nodes(), vec![]));
        host.handle(Message::update("g2", tree_nodes(), vec![]));
        host.shutdown();

        assert!(host.is_empty());
        assert_eq!(host.step(&mut Vec::new()), 0);
    }

    #[test]
    fn pinned_node_holds_across_snapshots() {
        let mut host = host();
        host.handle(Message::update(
            "g1",
            vec![
                RawNode::new("pin").pinned(100.0, 100.0),
                RawNode::new("a").with_children(["pin"]),
                RawNode::new("b").with_children(["pin"]),
            ],
            vec![],
        ));

        for snapshot in drain(&mut host) {
            let pin = snapshot.node("pin").unwrap();
            assert_eq!((pin.x, pin.y), (100.0, 100.0));
        }
    }

    #[test]
    fn mpsc_sink_survives_dropped_receiver() {
        let (mut tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut host = host();
        host.handle(Message::update("g1", tree_nodes(), vec![]));
        assert_eq!(host.step(&mut tx), 1);
    }
}
