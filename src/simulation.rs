//! Force simulation engine
//!
//! A d3-force style solver: each tick applies link, many-body, centering and
//! collision forces in that order, then integrates velocities into positions
//! and cools alpha. Velocities live only in [`SimNode`]; callers see
//! [`NodePosition`] snapshots.

use std::time::Instant;

use rand::Rng;
use rand::rngs::StdRng;
use tracing::trace;

use crate::config::{ForceConfig, Termination};
use crate::graph_types::{Edge, Graph, NodePosition};
use crate::quadtree::{ManyBody, QuadTree};

/// Engine-internal node state
#[derive(Debug, Clone)]
struct SimNode {
    id: String,
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    fx: Option<f64>,
    fy: Option<f64>,
}

impl SimNode {
    fn from_position(node: &NodePosition) -> Self {
        Self {
            id: node.id.clone(),
            x: node.fx.unwrap_or(node.x),
            y: node.fy.unwrap_or(node.y),
            vx: 0.0,
            vy: 0.0,
            fx: node.fx,
            fy: node.fy,
        }
    }

    fn position(&self) -> NodePosition {
        NodePosition {
            id: self.id.clone(),
            x: self.x,
            y: self.y,
            fx: self.fx,
            fy: self.fy,
        }
    }
}

/// An edge with its precomputed degree bias and strength
#[derive(Debug, Clone, Copy)]
struct SimEdge {
    source: usize,
    target: usize,
    /// Share of the correction applied to the target
    bias: f64,
    strength: f64,
}

/// Why a simulation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The tick counter reached the configured budget
    TickBudget,
    /// The wall-clock budget elapsed
    Deadline,
    /// Alpha fell below `alpha_min`
    Cooled,
    /// Stopped by the owner
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    Idle,
    Running,
    Stopped(StopReason),
}

/// Result of one call to [`Simulation::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A tick ran; carries the new tick count
    Advanced(u64),
    /// The simulation is (now) stopped
    Halted(StopReason),
    /// The simulation was never started
    NotRunning,
}

/// One simulation instance
pub struct Simulation {
    nodes: Vec<SimNode>,
    edges: Vec<SimEdge>,
    forces: ForceConfig,
    termination: Termination,
    alpha: f64,
    ticks: u64,
    state: SimulationState,
    started_at: Option<Instant>,
    rng: StdRng,
}

impl Simulation {
    /// Create an idle simulation over `graph`
    pub fn new(graph: &Graph, forces: ForceConfig, termination: Termination, rng: StdRng) -> Self {
        let mut simulation = Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            forces,
            termination,
            alpha: 1.0,
            ticks: 0,
            state: SimulationState::Idle,
            started_at: None,
            rng,
        };
        simulation.load(graph);
        simulation
    }

    fn load(&mut self, graph: &Graph) {
        self.nodes = graph.nodes.iter().map(SimNode::from_position).collect();
        self.edges = resolve_edges(&graph.edges, self.nodes.len(), &self.forces);
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SimulationState::Running
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Idle -> Running
    pub fn start(&mut self) {
        if self.state == SimulationState::Idle {
            self.state = SimulationState::Running;
            self.started_at = Some(Instant::now());
        }
    }

    /// Forced stop. Takes effect before the next tick.
    pub fn stop(&mut self) {
        if !matches!(self.state, SimulationState::Stopped(_)) {
            self.state = SimulationState::Stopped(StopReason::Cancelled);
        }
    }

    /// Replace nodes, edges and forces, reheat, and resume ticking from zero
    pub fn reconfigure(&mut self, graph: &Graph, forces: ForceConfig, termination: Termination) {
        self.forces = forces;
        self.termination = termination;
        self.load(graph);
        self.alpha = 1.0;
        self.ticks = 0;
        self.state = SimulationState::Running;
        self.started_at = Some(Instant::now());
    }

    /// The budget check run at the top of every tick
    fn exhausted(&self) -> Option<StopReason> {
        match self.termination {
            Termination::Ticks(max) if self.ticks >= max => return Some(StopReason::TickBudget),
            Termination::WallClockMs(_) => {
                let elapsed = self.started_at.map(|start| start.elapsed());
                if elapsed
                    .zip(self.termination.wall_clock())
                    .is_some_and(|(elapsed, budget)| elapsed >= budget)
                {
                    return Some(StopReason::Deadline);
                }
            }
            Termination::Ticks(_) => {}
        }
        (self.alpha < self.forces.alpha_min).then_some(StopReason::Cooled)
    }

    /// Run one simulation tick
    pub fn tick(&mut self) -> TickOutcome {
        match self.state {
            SimulationState::Idle => return TickOutcome::NotRunning,
            SimulationState::Stopped(reason) => return TickOutcome::Halted(reason),
            SimulationState::Running => {}
        }
        if let Some(reason) = self.exhausted() {
            trace!(ticks = self.ticks, ?reason, "simulation stopped");
            self.state = SimulationState::Stopped(reason);
            return TickOutcome::Halted(reason);
        }

        let alpha = self.alpha;
        self.apply_link_force(alpha);
        self.apply_many_body_force(alpha);
        self.apply_center_force();
        self.apply_collision_force();
        self.integrate();

        self.ticks += 1;
        self.alpha += (self.forces.alpha_target - self.alpha) * self.forces.alpha_decay();
        TickOutcome::Advanced(self.ticks)
    }

    /// Tick until stopped
    pub fn run_to_completion(&mut self) -> Option<StopReason> {
        self.start();
        loop {
            match self.tick() {
                TickOutcome::Advanced(_) => {}
                TickOutcome::Halted(reason) => return Some(reason),
                TickOutcome::NotRunning => return None,
            }
        }
    }

    /// Current positions, without velocities
    pub fn positions(&self) -> Vec<NodePosition> {
        self.nodes.iter().map(SimNode::position).collect()
    }

    /// Resolved edges as index pairs into [`Simulation::positions`]
    pub fn edges(&self) -> Vec<Edge> {
        self.edges
            .iter()
            .map(|edge| Edge {
                source: edge.source,
                target: edge.target,
            })
            .collect()
    }

    /// Tiny non-zero offset separating coincident points
    fn jiggle(rng: &mut StdRng) -> f64 {
        let offset = (rng.r#gen::<f64>() - 0.5) * 1e-6;
        if offset == 0.0 { 1e-7 } else { offset }
    }

    /// Springs between connected nodes
    fn apply_link_force(&mut self, alpha: f64) {
        let distance = self.forces.link_distance;
        for edge in &self.edges {
            let (Some(source), Some(target)) =
                (self.nodes.get(edge.source), self.nodes.get(edge.target))
            else {
                continue;
            };

            let mut dx = target.x + target.vx - source.x - source.vx;
            let mut dy = target.y + target.vy - source.y - source.vy;
            if dx == 0.0 {
                dx = Self::jiggle(&mut self.rng);
            }
            if dy == 0.0 {
                dy = Self::jiggle(&mut self.rng);
            }
            let l = (dx * dx + dy * dy).sqrt();
            let scale = (l - distance) / l * alpha * edge.strength;
            dx *= scale;
            dy *= scale;

            if let Some(target) = self.nodes.get_mut(edge.target) {
                target.vx -= dx * edge.bias;
                target.vy -= dy * edge.bias;
            }
            if let Some(source) = self.nodes.get_mut(edge.source) {
                source.vx += dx * (1.0 - edge.bias);
                source.vy += dy * (1.0 - edge.bias);
            }
        }
    }

    /// Repulsion between all node pairs
    fn apply_many_body_force(&mut self, alpha: f64) {
        if self.nodes.len() < 2 || self.forces.charge == 0.0 {
            return;
        }

        let points: Vec<(f64, f64)> = self.nodes.iter().map(|n| (n.x, n.y)).collect();
        let tree = QuadTree::build(&points, self.forces.charge);
        let params = ManyBody {
            charge: self.forces.charge,
            alpha,
            theta2: self.forces.theta * self.forces.theta,
            distance_min2: self.forces.distance_min * self.forces.distance_min,
            distance_max2: self
                .forces
                .distance_max
                .map_or(f64::INFINITY, |max| max * max),
        };

        let rng = &mut self.rng;
        let mut jiggle = || Self::jiggle(rng);
        for (index, node) in self.nodes.iter_mut().enumerate() {
            let (fx, fy) = tree.force_on(index, &params, &mut jiggle);
            node.vx += fx;
            node.vy += fy;
        }
    }

    /// Translate the layout so its centroid moves toward the origin
    fn apply_center_force(&mut self) {
        let n = self.nodes.len();
        if n == 0 {
            return;
        }
        let (sx, sy) = self
            .nodes
            .iter()
            .fold((0.0, 0.0), |(sx, sy), node| (sx + node.x, sy + node.y));
        let strength = self.forces.center_strength;
        let shift_x = sx / n as f64 * strength;
        let shift_y = sy / n as f64 * strength;
        for node in &mut self.nodes {
            node.x -= shift_x;
            node.y -= shift_y;
        }
    }

    /// Push apart discs that will overlap after this tick's motion
    fn apply_collision_force(&mut self) {
        let radius = self.forces.collision_radius;
        if radius <= 0.0 {
            return;
        }
        let reach = radius * 2.0;
        let reach2 = reach * reach;
        let strength = self.forces.collision_strength;

        for _ in 0..self.forces.collision_iterations {
            for i in 0..self.nodes.len() {
                for j in (i + 1)..self.nodes.len() {
                    let (Some(a), Some(b)) = (self.nodes.get(i), self.nodes.get(j)) else {
                        continue;
                    };
                    let mut x = a.x + a.vx - b.x - b.vx;
                    let mut y = a.y + a.vy - b.y - b.vy;
                    let mut l = x * x + y * y;
                    if l >= reach2 {
                        continue;
                    }
                    if x == 0.0 {
                        x = Self::jiggle(&mut self.rng);
                        l += x * x;
                    }
                    if y == 0.0 {
                        y = Self::jiggle(&mut self.rng);
                        l += y * y;
                    }
                    let l = l.sqrt();
                    let push = (reach - l) / l * strength;
                    // Equal radii split the correction evenly
                    let (px, py) = (x * push * 0.5, y * push * 0.5);

                    if let Some(a) = self.nodes.get_mut(i) {
                        a.vx += px;
                        a.vy += py;
                    }
                    if let Some(b) = self.nodes.get_mut(j) {
                        b.vx -= px;
                        b.vy -= py;
                    }
                }
            }
        }
    }

    /// Apply velocity decay, move free nodes, hold pinned ones
    fn integrate(&mut self) {
        let decay = self.forces.velocity_decay;
        for node in &mut self.nodes {
            match node.fx {
                Some(fx) => {
                    node.x = fx;
                    node.vx = 0.0;
                }
                None => {
                    node.vx *= decay;
                    node.x += node.vx;
                }
            }
            match node.fy {
                Some(fy) => {
                    node.y = fy;
                    node.vy = 0.0;
                }
                None => {
                    node.vy *= decay;
                    node.y += node.vy;
                }
            }
        }
    }
}

/// Precompute degree bias and default strength per edge
fn resolve_edges(edges: &[Edge], node_count: usize, forces: &ForceConfig) -> Vec<SimEdge> {
    let edges: Vec<&Edge> = edges
        .iter()
        .filter(|edge| edge.source < node_count && edge.target < node_count)
        .collect();

    let mut degree = vec![0usize; node_count];
    for edge in &edges {
        if let Some(d) = degree.get_mut(edge.source) {
            *d += 1;
        }
        if let Some(d) = degree.get_mut(edge.target) {
            *d += 1;
        }
    }

    edges
        .into_iter()
        .map(|edge| {
            let source_degree = degree.get(edge.source).copied().unwrap_or(1) as f64;
            let target_degree = degree.get(edge.target).copied().unwrap_or(1) as f64;
            SimEdge {
                source: edge.source,
                target: edge.target,
                bias: source_degree / (source_degree + target_degree),
                strength: forces
                    .link_strength
                    .unwrap_or_else(|| 1.0 / source_degree.min(target_degree)),
            }
        })
        .collect()
}
