//! Barnes-Hut quadtree for the many-body force
//!
//! Cells far enough from a body (cell width / distance < theta) are treated
//! as a single point charge at their charge-weighted centroid. A theta of 0
//! degenerates to the exact O(n²) sum.

/// Depth at which cells stop splitting and keep bodies in a bucket.
/// Guards against unbounded recursion for (nearly) coincident points.
const MAX_DEPTH: u32 = 32;

#[derive(Debug)]
enum Cell {
    Empty,
    Leaf(Vec<usize>),
    Internal(Box<[Quad; 4]>),
}

#[derive(Debug)]
struct Quad {
    x0: f64,
    y0: f64,
    size: f64,
    cell: Cell,
    /// Summed strength of all bodies in this quad
    strength: f64,
    /// Charge-weighted centroid
    cx: f64,
    cy: f64,
}

impl Quad {
    fn new(x0: f64, y0: f64, size: f64) -> Self {
        Self {
            x0,
            y0,
            size,
            cell: Cell::Empty,
            strength: 0.0,
            cx: 0.0,
            cy: 0.0,
        }
    }

    fn insert(&mut self, body: usize, points: &[(f64, f64)], depth: u32) {
        match &mut self.cell {
            Cell::Empty => self.cell = Cell::Leaf(vec![body]),
            Cell::Leaf(bodies) => {
                let coincident = bodies
                    .first()
                    .and_then(|&first| points.get(first))
                    .zip(points.get(body))
                    .is_some_and(|(a, b)| a == b);
                if coincident || depth >= MAX_DEPTH {
                    bodies.push(body);
                    return;
                }
                let existing = std::mem::take(bodies);
                self.split();
                for other in existing {
                    self.insert(other, points, depth);
                }
                self.insert(body, points, depth);
            }
            Cell::Internal(children) => {
                let Some(&(x, y)) = points.get(body) else {
                    return;
                };
                let half = self.size / 2.0;
                let right = usize::from(x >= self.x0 + half);
                let below = usize::from(y >= self.y0 + half);
                children[below * 2 + right].insert(body, points, depth + 1);
            }
        }
    }

    fn split(&mut self) {
        let half = self.size / 2.0;
        let (x0, y0) = (self.x0, self.y0);
        self.cell = Cell::Internal(Box::new([
            Quad::new(x0, y0, half),
            Quad::new(x0 + half, y0, half),
            Quad::new(x0, y0 + half, half),
            Quad::new(x0 + half, y0 + half, half),
        ]));
    }

    fn accumulate(&mut self, points: &[(f64, f64)], charge: f64) {
        let (mut strength, mut weight, mut sx, mut sy) = (0.0, 0.0, 0.0, 0.0);
        match &mut self.cell {
            Cell::Empty => {}
            Cell::Leaf(bodies) => {
                for &(x, y) in bodies.iter().filter_map(|&b| points.get(b)) {
                    strength += charge;
                    weight += 1.0;
                    sx += x;
                    sy += y;
                }
            }
            Cell::Internal(children) => {
                for child in children.iter_mut() {
                    child.accumulate(points, charge);
                    let w = child.strength.abs();
                    strength += child.strength;
                    weight += w;
                    sx += child.cx * w;
                    sy += child.cy * w;
                }
            }
        }
        self.strength = strength;
        if weight > 0.0 {
            self.cx = sx / weight;
            self.cy = sy / weight;
        }
    }
}

/// Parameters for one many-body evaluation
#[derive(Debug, Clone, Copy)]
pub(crate) struct ManyBody {
    pub charge: f64,
    pub alpha: f64,
    pub theta2: f64,
    pub distance_min2: f64,
    pub distance_max2: f64,
}

pub(crate) struct QuadTree<'a> {
    root: Quad,
    points: &'a [(f64, f64)],
}

impl<'a> QuadTree<'a> {
    /// Build a tree over `points`, every body carrying the same `charge`
    pub fn build(points: &'a [(f64, f64)], charge: f64) -> Self {
        let (mut x0, mut y0) = (f64::INFINITY, f64::INFINITY);
        let (mut x1, mut y1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in points {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            (x0, y0, x1, y1) = (0.0, 0.0, 1.0, 1.0);
        }
        // Square root cell, padded so points on the max edge fall inside
        let size = (x1 - x0).max(y1 - y0).max(1.0) * (1.0 + 1e-9) + 1e-9;

        let mut root = Quad::new(x0, y0, size);
        for body in 0..points.len() {
            root.insert(body, points, 0);
        }
        root.accumulate(points, charge);

        Self { root, points }
    }

    /// Velocity change on `body` from every other body.
    ///
    /// `jiggle` supplies a tiny random offset for coincident points.
    pub fn force_on(
        &self,
        body: usize,
        params: &ManyBody,
        jiggle: &mut impl FnMut() -> f64,
    ) -> (f64, f64) {
        let Some(&(x, y)) = self.points.get(body) else {
            return (0.0, 0.0);
        };
        let mut force = (0.0, 0.0);
        self.visit(&self.root, body, x, y, params, jiggle, &mut force);
        force
    }

    #[allow(clippy::too_many_arguments)]
    fn visit(
        &self,
        quad: &Quad,
        body: usize,
        x: f64,
        y: f64,
        params: &ManyBody,
        jiggle: &mut impl FnMut() -> f64,
        force: &mut (f64, f64),
    ) {
        if quad.strength == 0.0 {
            return;
        }

        match &quad.cell {
            Cell::Empty => {}
            Cell::Internal(children) => {
                let dx = quad.cx - x;
                let dy = quad.cy - y;
                let l = dx * dx + dy * dy;
                if quad.size * quad.size / params.theta2 < l {
                    if l < params.distance_max2 {
                        apply(dx, dy, l, quad.strength, params, force);
                    }
                    return;
                }
                for child in children.iter() {
                    self.visit(child, body, x, y, params, jiggle, force);
                }
            }
            Cell::Leaf(bodies) => {
                for &other in bodies.iter().filter(|&&other| other != body) {
                    let Some(&(ox, oy)) = self.points.get(other) else {
                        continue;
                    };
                    let mut dx = ox - x;
                    let mut dy = oy - y;
                    if dx == 0.0 {
                        dx = jiggle();
                    }
                    if dy == 0.0 {
                        dy = jiggle();
                    }
                    let l = dx * dx + dy * dy;
                    if l < params.distance_max2 {
                        apply(dx, dy, l, params.charge, params, force);
                    }
                }
            }
        }
    }
}

fn apply(dx: f64, dy: f64, l: f64, strength: f64, params: &ManyBody, force: &mut (f64, f64)) {
    let l = if l < params.distance_min2 {
        (params.distance_min2 * l).sqrt()
    } else {
        l
    };
    if l <= 0.0 {
        return;
    }
    let scale = strength * params.alpha / l;
    force.0 += dx * scale;
    force.1 += dy * scale;
}
