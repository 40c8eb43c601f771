//! CPU ForceAtlas2 simulation
//!
//! One call to [`Simulation::update`] advances the layout by a single step:
//! repulsion (exact or Barnes-Hut), gravity, edge attraction, then the
//! adaptive global speed and per-node integration. There is no randomness in
//! a step, so the same input always produces the same trajectory.

use tracing::{debug, trace};

use crate::config::{LayoutConfig, LayoutConfigPatch};
use crate::error::{LayoutError, LayoutResult};
use crate::graph::PreparedGraph;
use crate::region::{Body, Bounds, QuadTree};
use crate::vec2::Vec2;

/// Largest distance a node may travel in one step
pub const MAX_DISPLACEMENT: f32 = 10.0;

/// Cap on how fast the global speed may grow from one step to the next
pub const MAX_SPEED_GROWTH: f32 = 1.5;

/// Repulsion multiplier applied between overlapping disks
pub const OVERLAP_REPULSION: f32 = 100.0;

/// A node in the simulation arena
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub position: Vec2,
    pub force: Vec2,
    pub force_prev: Vec2,
    /// Effective mass used by the force laws
    pub mass: f32,
    /// Mass as supplied by the caller
    pub base_mass: f32,
    /// Disk radius, only used when overlap prevention is on
    pub size: f32,
    pub in_degree: u32,
    pub out_degree: u32,
}

impl Body for Node {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn mass(&self) -> f32 {
        self.mass
    }
}

/// An edge between two arena indices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub weight: f32,
}

/// CPU force simulation
#[derive(Debug, Default)]
pub struct Simulation {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    config: LayoutConfig,
    /// Midpoint of the initial bounding box, used when no center is configured
    initial_center: Vec2,
    bbox: Bounds,
    tree: QuadTree,
    global_speed: f32,
    steps: u64,
}

impl Simulation {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Build a simulation from a prepared graph
    pub fn from_graph(graph: &PreparedGraph, config: LayoutConfig) -> LayoutResult<Self> {
        let mut sim = Self::new(config);
        sim.init_nodes(&graph.positions, &graph.masses, &graph.sizes)?;
        sim.init_edges(&graph.edges, &graph.weights)?;
        sim.update_settings();
        Ok(sim)
    }

    /// Replace the node arena. Resets degrees, forces and the global speed.
    pub fn init_nodes(
        &mut self,
        positions: &[Vec2],
        masses: &[f32],
        sizes: &[f32],
    ) -> LayoutResult<()> {
        check_len("node masses", positions.len(), masses.len())?;
        check_len("node sizes", positions.len(), sizes.len())?;

        self.nodes = positions
            .iter()
            .zip(masses)
            .zip(sizes)
            .map(|((&position, &mass), &size)| Node {
                position,
                mass,
                base_mass: mass,
                size,
                ..Default::default()
            })
            .collect();
        self.edges.clear();
        self.global_speed = 0.0;
        self.steps = 0;

        self.update_bbox();
        self.initial_center = self.bbox.center();
        debug!(nodes = self.nodes.len(), "initialized nodes");
        Ok(())
    }

    /// Replace the edge list. Every endpoint must name an existing node.
    pub fn init_edges(&mut self, pairs: &[(usize, usize)], weights: &[f32]) -> LayoutResult<()> {
        check_len("edge weights", pairs.len(), weights.len())?;

        let node_count = self.nodes.len();
        let mut edges = Vec::with_capacity(pairs.len());
        for (i, (&(source, target), &weight)) in pairs.iter().zip(weights).enumerate() {
            for node in [source, target] {
                if node >= node_count {
                    return Err(LayoutError::EdgeOutOfRange {
                        edge: i,
                        node,
                        node_count,
                    });
                }
            }
            edges.push(Edge {
                source,
                target,
                weight,
            });
        }

        for node in &mut self.nodes {
            node.in_degree = 0;
            node.out_degree = 0;
        }
        for e in &edges {
            self.nodes[e.source].out_degree += 1;
            self.nodes[e.target].in_degree += 1;
        }
        self.edges = edges;
        debug!(edges = self.edges.len(), "initialized edges");
        Ok(())
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: LayoutConfig) {
        self.config = config;
    }

    /// Merge a partial config into the live settings
    pub fn apply_patch(&mut self, patch: &LayoutConfigPatch) {
        self.config.apply(patch);
        debug!(?patch, "applied config patch");
    }

    /// Recompute masses from the current settings
    pub fn update_settings(&mut self) {
        let by_degree = self.config.repulsion_by_degree;
        for node in &mut self.nodes {
            node.mass = if by_degree {
                (node.in_degree + node.out_degree + 1) as f32
            } else {
                node.base_mass
            };
        }
    }

    /// Advance the layout by one step
    pub fn update(&mut self) {
        self.update_settings();
        self.update_bbox();

        let barnes_hut = self.config.use_barnes_hut(self.nodes.len());
        if barnes_hut {
            self.tree.rebuild(self.bbox, &self.nodes);
        }

        for node in &mut self.nodes {
            node.force_prev = node.force;
            node.force = Vec2::ZERO;
        }

        if barnes_hut {
            self.apply_region_repulsion();
        } else {
            self.apply_node_repulsion();
        }
        self.apply_gravity();
        self.apply_edge_attraction();
        self.update_global_speed();
        self.update_positions();

        self.steps += 1;
        trace!(step = self.steps, global_speed = self.global_speed, barnes_hut, "step");
    }

    /// Run `n` steps
    pub fn update_n(&mut self, n: usize) {
        for _ in 0..n {
            self.update();
        }
    }

    fn update_bbox(&mut self) {
        self.bbox = Bounds::from_points(self.nodes.iter().map(|n| n.position));
    }

    /// Exact O(N²) repulsion, each pair visited once
    fn apply_node_repulsion(&mut self) {
        let n = self.nodes.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let f = self.pair_repulsion(i, j);
                self.nodes[i].force += f;
                self.nodes[j].force -= f;
            }
        }
    }

    /// Barnes-Hut repulsion; each node walks the tree on its own behalf
    fn apply_region_repulsion(&mut self) {
        for i in 0..self.nodes.len() {
            let f = self.region_repulsion(i);
            self.nodes[i].force += f;
        }
    }

    fn region_repulsion(&self, i: usize) -> Vec2 {
        let node = &self.nodes[i];
        let scaling = self.config.scaling;
        let mut near = Vec2::ZERO;
        let mut far = Vec2::ZERO;

        self.tree.walk(
            node.position,
            self.config.barnes_hut_theta,
            |j| {
                if j != i {
                    near += self.pair_repulsion(i, j);
                }
            },
            |region| {
                let v = node.position - region.center_of_mass;
                let d2 = v.length_squared();
                if d2 > 0.0 {
                    far += v * (scaling * node.mass * region.mass / d2);
                }
            },
        );
        near + far
    }

    /// Repulsive force exerted on node `a` by node `b`
    fn pair_repulsion(&self, a: usize, b: usize) -> Vec2 {
        let na = &self.nodes[a];
        let nb = &self.nodes[b];
        let scaling = self.config.scaling;

        let mut v = na.position - nb.position;
        let d2 = v.length_squared();
        if d2 == 0.0 {
            if !self.config.prevent_overlap {
                return Vec2::ZERO;
            }
            // Stacked disks still need a direction to separate along
            v = separation_direction(a, b);
        }

        let factor = if self.config.prevent_overlap {
            let d = d2.sqrt() - na.size - nb.size;
            if d > 0.0 {
                scaling * na.mass * nb.mass / (d * d)
            } else if d < 0.0 {
                scaling * OVERLAP_REPULSION * na.mass * nb.mass
            } else {
                return Vec2::ZERO;
            }
        } else {
            // The extra 1/d normalizes `v`
            scaling * na.mass * nb.mass / d2
        };
        v * factor
    }

    fn gravity_center(&self) -> Vec2 {
        self.config
            .gravity_center
            .map(Vec2::from)
            .unwrap_or(self.initial_center)
    }

    fn apply_gravity(&mut self) {
        let center = self.gravity_center();
        let gravity = self.config.gravity;
        let strong = self.config.strong_gravity_mode;

        for node in &mut self.nodes {
            let v = center - node.position;
            let factor = if strong {
                gravity * node.mass
            } else {
                gravity * node.mass / (1.0 + v.length())
            };
            node.force += v * factor;
        }
    }

    fn apply_edge_attraction(&mut self) {
        let influence = self.config.edge_weight_influence;
        let prevent_overlap = self.config.prevent_overlap;
        let lin_log = self.config.lin_log_mode;

        for e in &self.edges {
            let na = &self.nodes[e.source];
            let nb = &self.nodes[e.target];

            let w = if influence == 0.0 {
                1.0
            } else if influence == 1.0 {
                e.weight
            } else {
                e.weight.powf(influence)
            };

            let v = na.position - nb.position;
            let mut d = v.length();
            if prevent_overlap {
                d -= na.size + nb.size;
                if d <= 0.0 {
                    continue;
                }
            }

            let factor = if lin_log {
                -w * (d + 1.0).ln() / (d + 1.0)
            } else {
                -w
            };
            let f = v * factor;
            self.nodes[e.source].force += f;
            self.nodes[e.target].force -= f;
        }
    }

    fn update_global_speed(&mut self) {
        let mut swing_sum = 0.0;
        let mut traction_sum = 0.0;
        for node in &self.nodes {
            swing_sum += (node.force - node.force_prev).length() * node.mass;
            traction_sum += (node.force + node.force_prev).length() * 0.5 * node.mass;
        }

        let jt = self.config.jitter_tolerence;
        self.global_speed = next_global_speed(self.global_speed, swing_sum, traction_sum, jt);
    }

    fn update_positions(&mut self) {
        let g = self.global_speed;
        for node in &mut self.nodes {
            let swing = (node.force - node.force_prev).length();
            let mut speed = 0.1 * g / (0.1 + g * swing.sqrt());
            let df = node.force.length();
            if df > 0.0 {
                speed = (df * speed).min(MAX_DISPLACEMENT) / df;
                node.position = node.position.scale_and_add(node.force, speed);
            }
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn global_speed(&self) -> f32 {
        self.global_speed
    }

    /// Steps taken since the nodes were initialized
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn bbox(&self) -> Bounds {
        self.bbox
    }

    /// The quadtree built by the last Barnes-Hut step
    pub fn region_tree(&self) -> &QuadTree {
        &self.tree
    }

    /// Write interleaved `[x0, y0, x1, y1, ...]` into `out`
    pub fn positions_into(&self, out: &mut Vec<f32>) {
        out.clear();
        out.reserve(self.nodes.len() * 2);
        for node in &self.nodes {
            out.push(node.position.x);
            out.push(node.position.y);
        }
    }

    pub fn positions(&self) -> Vec<f32> {
        let mut out = Vec::new();
        self.positions_into(&mut out);
        out
    }
}

/// The adaptive global speed for the next step.
///
/// `jt² · traction / swing`, never more than `MAX_SPEED_GROWTH` times the
/// previous speed. Zero swing with nonzero traction means "speed up as much
/// as allowed"; zero of both keeps the previous speed.
pub fn next_global_speed(prev: f32, swing_sum: f32, traction_sum: f32, jitter: f32) -> f32 {
    let target = if swing_sum > 0.0 {
        jitter * jitter * traction_sum / swing_sum
    } else if traction_sum > 0.0 {
        f32::INFINITY
    } else {
        return prev;
    };

    if prev > 0.0 {
        target.min(MAX_SPEED_GROWTH * prev)
    } else if target.is_finite() {
        target
    } else {
        jitter * jitter
    }
}

/// A unit vector for pushing apart two nodes that sit on the same point.
///
/// Depends only on the index pair and flips sign when the pair is swapped, so
/// the two nodes are pushed in opposite directions.
fn separation_direction(a: usize, b: usize) -> Vec2 {
    let (lo, hi, sign) = if a < b { (a, b, 1.0) } else { (b, a, -1.0) };
    let t = (lo as f32 * 0.618_034 + hi as f32 * 0.414_213_6).fract();
    let angle = t * std::f32::consts::TAU;
    Vec2::new(angle.cos(), angle.sin()) * sign
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> LayoutResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(LayoutError::LengthMismatch {
            what,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_with(
        positions: &[(f32, f32)],
        edges: &[(usize, usize)],
        config: LayoutConfig,
    ) -> Simulation {
        let positions: Vec<Vec2> = positions.iter().map(|&(x, y)| Vec2::new(x, y)).collect();
        let ones = vec![1.0; positions.len()];
        let mut sim = Simulation::new(config);
        sim.init_nodes(&positions, &ones, &ones).unwrap();
        sim.init_edges(edges, &vec![1.0; edges.len()]).unwrap();
        sim.update_settings();
        sim
    }

    fn triangle() -> Simulation {
        sim_with(
            &[(0.0, 0.0), (10.0, 0.0), (5.0, 10.0)],
            &[(0, 1), (1, 2)],
            LayoutConfig {
                gravity: 1.0,
                ..Default::default()
            },
        )
    }

    /// Deterministic scatter of `n` nodes with a ring of edges and some chords
    fn scattered(n: usize, barnes_hut: bool) -> Simulation {
        let positions: Vec<(f32, f32)> = (0..n)
            .map(|i| {
                let t = i as f32;
                (
                    500.0 + (t * 12.9898).sin() * 400.0,
                    500.0 + (t * 78.233).cos() * 400.0,
                )
            })
            .collect();
        let mut edges: Vec<(usize, usize)> = (0..n).map(|i| (i, (i + 1) % n)).collect();
        edges.extend((0..n).step_by(7).map(|i| (i, (i * 3 + 5) % n)));
        sim_with(
            &positions,
            &edges,
            LayoutConfig {
                barnes_hut_optimize: Some(barnes_hut),
                ..Default::default()
            },
        )
    }

    #[test]
    fn rejects_out_of_range_edge() {
        let mut sim = Simulation::new(LayoutConfig::default());
        sim.init_nodes(&[Vec2::ZERO, Vec2::new(1.0, 0.0)], &[1.0, 1.0], &[1.0, 1.0])
            .unwrap();
        let err = sim.init_edges(&[(0, 1), (1, 2)], &[1.0, 1.0]).unwrap_err();
        assert_eq!(
            err,
            LayoutError::EdgeOutOfRange {
                edge: 1,
                node: 2,
                node_count: 2
            }
        );
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let mut sim = Simulation::new(LayoutConfig::default());
        let err = sim
            .init_nodes(&[Vec2::ZERO, Vec2::ZERO], &[1.0], &[1.0, 1.0])
            .unwrap_err();
        assert!(matches!(err, LayoutError::LengthMismatch { .. }));
    }

    #[test]
    fn mass_follows_degree_setting() {
        let mut sim = triangle();
        // Degrees: A = 1, B = 2, C = 1
        let masses: Vec<f32> = sim.nodes().iter().map(|n| n.mass).collect();
        assert_eq!(masses, vec![2.0, 3.0, 2.0]);

        sim.apply_patch(&LayoutConfigPatch {
            repulsion_by_degree: Some(false),
            ..Default::default()
        });
        sim.update_settings();
        let masses: Vec<f32> = sim.nodes().iter().map(|n| n.mass).collect();
        assert_eq!(masses, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn gravity_center_defaults_to_initial_bbox_midpoint() {
        let sim = triangle();
        assert_eq!(sim.gravity_center(), Vec2::new(5.0, 5.0));

        let mut sim = triangle();
        sim.apply_patch(&LayoutConfigPatch {
            gravity_center: Some([1.0, 2.0]),
            ..Default::default()
        });
        assert_eq!(sim.gravity_center(), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn first_step_forces_point_along_edges_and_toward_center() {
        let mut sim = triangle();
        sim.update();

        let a = sim.node(0).unwrap().force;
        let b = sim.node(1).unwrap().force;
        assert_ne!(a, Vec2::ZERO);
        assert_ne!(b, Vec2::ZERO);
        // The A-B edge pulls A right and B left
        assert!(a.x > 0.0, "A force {a:?}");
        assert!(b.x < 0.0, "B force {b:?}");
        // Gravity (center at y = 5) and the B-C edge lift both
        assert!(a.y > 0.0, "A force {a:?}");
        assert!(b.y > 0.0, "B force {b:?}");
    }

    #[test]
    fn triangle_centroid_settles_on_gravity_center() {
        let mut sim = triangle();
        sim.update_n(1000);

        let centroid = sim
            .nodes()
            .iter()
            .fold(Vec2::ZERO, |acc, n| acc + n.position)
            .scale(1.0 / 3.0);
        let center = sim.gravity_center();
        assert!(
            centroid.distance(center) < 1.0,
            "centroid {centroid:?} drifted from {center:?}"
        );
    }

    #[test]
    fn two_node_forces_are_equal_and_opposite() {
        let mut sim = sim_with(
            &[(0.0, 0.0), (3.0, 4.0)],
            &[(0, 1)],
            LayoutConfig {
                gravity: 0.0,
                ..Default::default()
            },
        );
        for _ in 0..50 {
            sim.update();
            let a = sim.node(0).unwrap().force;
            let b = sim.node(1).unwrap().force;
            assert_eq!(a, -b);
        }
    }

    #[test]
    fn identical_runs_are_bit_identical() {
        let mut a = scattered(60, false);
        let mut b = scattered(60, false);
        a.update_n(100);
        b.update_n(100);
        assert_eq!(a.positions(), b.positions());
        assert_eq!(a.global_speed().to_bits(), b.global_speed().to_bits());

        let mut a = scattered(60, true);
        let mut b = scattered(60, true);
        a.update_n(100);
        b.update_n(100);
        assert_eq!(a.positions(), b.positions());
    }

    #[test]
    fn global_speed_grows_at_most_one_and_a_half_times() {
        let mut sim = scattered(40, false);
        let mut prev = 0.0;
        for _ in 0..200 {
            sim.update();
            let speed = sim.global_speed();
            if prev > 0.0 {
                assert!(
                    speed <= prev * MAX_SPEED_GROWTH * (1.0 + 1e-6),
                    "speed jumped from {prev} to {speed}"
                );
            }
            prev = speed;
        }
    }

    #[test]
    fn zero_force_node_stays_put() {
        // A lone node sitting on its own gravity center feels nothing
        let mut sim = sim_with(&[(7.0, -3.0)], &[], LayoutConfig::default());
        sim.update_n(10);
        let node = sim.node(0).unwrap();
        assert_eq!(node.position, Vec2::new(7.0, -3.0));
        assert!(sim.global_speed().is_finite());
    }

    #[test]
    fn coincident_endpoints_add_no_attraction() {
        let mut sim = sim_with(
            &[(2.0, 2.0), (2.0, 2.0)],
            &[(0, 1)],
            LayoutConfig {
                gravity: 0.0,
                ..Default::default()
            },
        );
        sim.update();
        for node in sim.nodes() {
            assert_eq!(node.force, Vec2::ZERO);
            assert!(node.position.x.is_finite() && node.position.y.is_finite());
        }
    }

    #[test]
    fn overlap_prevention_separates_stacked_nodes() {
        let mut sim = Simulation::new(LayoutConfig {
            prevent_overlap: true,
            ..Default::default()
        });
        sim.init_nodes(&[Vec2::new(5.0, 5.0), Vec2::new(5.0, 5.0)], &[1.0, 1.0], &[1.0, 1.5])
            .unwrap();
        sim.init_edges(&[], &[]).unwrap();
        sim.update_n(500);

        let a = sim.node(0).unwrap();
        let b = sim.node(1).unwrap();
        let d = a.position.distance(b.position);
        assert!(d >= a.size + b.size - 1e-3, "disks still overlap: d = {d}");
    }

    fn stack(n: usize, config: LayoutConfig) -> Simulation {
        sim_with(&vec![(3.0, 3.0); n], &[], config)
    }

    #[test]
    fn barnes_hut_stack_feels_no_force() {
        let mut sim = stack(
            50,
            LayoutConfig {
                barnes_hut_optimize: Some(true),
                gravity: 0.0,
                ..Default::default()
            },
        );
        sim.update();

        for node in sim.nodes() {
            assert_eq!(node.force, Vec2::ZERO);
            assert_eq!(node.position, Vec2::new(3.0, 3.0));
        }
    }

    #[test]
    fn barnes_hut_overlap_prevention_separates_a_stack() {
        let mut sim = stack(
            50,
            LayoutConfig {
                barnes_hut_optimize: Some(true),
                prevent_overlap: true,
                ..Default::default()
            },
        );
        sim.update_n(300);

        let nodes = sim.nodes();
        let mut min_d = f32::INFINITY;
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                min_d = min_d.min(nodes[i].position.distance(nodes[j].position));
            }
        }
        assert!(min_d > 0.1, "stack did not separate: min distance {min_d}");
        assert!(nodes.iter().all(|n| n.position.x.is_finite() && n.position.y.is_finite()));
    }

    #[test]
    fn strong_gravity_pulls_harder_from_afar() {
        let far = |strong| {
            let mut sim = sim_with(
                &[(0.0, 0.0), (1000.0, 0.0)],
                &[],
                LayoutConfig {
                    strong_gravity_mode: strong,
                    gravity_center: Some([0.0, 0.0]),
                    scaling: 0.0,
                    ..Default::default()
                },
            );
            sim.update();
            sim.node(1).unwrap().force.length()
        };
        assert!(far(true) > far(false) * 10.0);
    }

    #[test]
    fn lin_log_weakens_long_edges() {
        let pull = |lin_log| {
            let mut sim = sim_with(
                &[(0.0, 0.0), (100.0, 0.0)],
                &[(0, 1)],
                LayoutConfig {
                    lin_log_mode: lin_log,
                    gravity: 0.0,
                    scaling: 0.0,
                    ..Default::default()
                },
            );
            sim.update();
            sim.node(0).unwrap().force.x
        };
        assert!(pull(false) > pull(true));
        assert!(pull(true) > 0.0);
    }

    #[test]
    fn barnes_hut_preserves_left_right_ordering() {
        let n = 120;
        let mut exact = scattered(n, false);
        let mut approx = scattered(n, true);
        exact.update_n(20);
        approx.update_n(20);

        let ex = exact.positions();
        let ap = approx.positions();
        let mut differing = 0;
        let mut pairs = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                pairs += 1;
                let left_exact = ex[i * 2] < ex[j * 2];
                let left_approx = ap[i * 2] < ap[j * 2];
                if left_exact != left_approx {
                    differing += 1;
                }
            }
        }
        let fraction = differing as f32 / pairs as f32;
        assert!(fraction < 0.05, "{differing}/{pairs} pairs swapped order");
    }

    #[test]
    fn barnes_hut_tree_conserves_mass() {
        let mut sim = scattered(80, true);
        sim.update();
        let total: f32 = sim.nodes().iter().map(|n| n.mass).sum();
        let root = sim.region_tree().root();
        assert!((root.mass - total).abs() < 1e-2);
    }

    #[test]
    fn next_global_speed_rules() {
        // Plain ratio on the first step
        assert_eq!(next_global_speed(0.0, 2.0, 1.0, 1.0), 0.5);
        // Growth is capped
        assert_eq!(next_global_speed(1.0, 1.0, 100.0, 1.0), 1.5);
        // Shrinking is not capped
        assert_eq!(next_global_speed(1.0, 100.0, 1.0, 1.0), 0.01);
        // Nothing moving keeps the previous speed
        assert_eq!(next_global_speed(0.3, 0.0, 0.0, 1.0), 0.3);
        // Perfect traction speeds up as far as allowed
        assert_eq!(next_global_speed(2.0, 0.0, 5.0, 1.0), 3.0);
    }

    #[test]
    fn separation_direction_is_antisymmetric() {
        let d = separation_direction(3, 9);
        assert_eq!(separation_direction(9, 3), -d);
        assert!((d.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_graph_steps_without_panicking() {
        let mut sim = Simulation::new(LayoutConfig::default());
        sim.init_nodes(&[], &[], &[]).unwrap();
        sim.init_edges(&[], &[]).unwrap();
        sim.update_n(5);
        assert!(sim.positions().is_empty());
        assert_eq!(sim.steps(), 5);
    }
}
