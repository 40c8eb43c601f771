//! Layout configuration
//!
//! `LayoutConfig` is the recognized option set of the layout engine. Field
//! names serialize in camelCase so a config object written for the original
//! engine (`barnesHutOptimize`, `jitterTolerence`, `GPU`, ...) loads as is.

use serde::{Deserialize, Serialize};

use crate::vec2::Vec2;

// =============================================================================
// Default Constants
// =============================================================================

/// Default Barnes-Hut opening threshold
pub const DEFAULT_BARNES_HUT_THETA: f32 = 1.5;

/// Node count above which Barnes-Hut is switched on when left unset
pub const BARNES_HUT_AUTO_THRESHOLD: usize = 2000;

/// Default gravity strength
pub const DEFAULT_GRAVITY: f32 = 1.0;

/// Default repulsion scaling
pub const DEFAULT_SCALING: f32 = 1.0;

/// Default exponent applied to edge weights
pub const DEFAULT_EDGE_WEIGHT_INFLUENCE: f32 = 1.0;

/// Default jitter tolerance for the adaptive speed heuristic
pub const DEFAULT_JITTER_TOLERENCE: f32 = 0.1;

/// Default step budget before a layout counts as finished
pub const DEFAULT_MAX_STEPS: u32 = 1000;

/// Default number of steps run per update call
pub const DEFAULT_STEPS: u32 = 1;

/// Axis-aligned rectangle in layout space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1000.0, 1000.0)
    }
}

/// Options recognized by the layout engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    /// Approximate repulsion with a quadtree (CPU only). `None` picks
    /// automatically from the node count.
    pub barnes_hut_optimize: Option<bool>,
    /// Distance, in region sizes, beyond which a region is approximated.
    /// Larger values are more exact.
    pub barnes_hut_theta: f32,
    /// Derive node mass from degree instead of the supplied mass
    pub repulsion_by_degree: bool,
    pub lin_log_mode: bool,
    pub strong_gravity_mode: bool,
    pub gravity: f32,
    pub scaling: f32,
    pub edge_weight_influence: f32,
    pub jitter_tolerence: f32,
    /// Treat nodes as disks of radius `size`
    pub prevent_overlap: bool,
    /// Accepted for compatibility; has no effect on the force model
    pub dissuade_hubs: bool,
    /// Explicit gravity center; defaults to the initial bounding-box midpoint
    pub gravity_center: Option<[f32; 2]>,
    /// Select the GPU backend
    #[serde(rename = "GPU")]
    pub gpu: bool,
    pub max_steps: u32,
    /// Steps per update call
    pub steps: u32,
    /// Region used to place nodes without coordinates
    pub viewport: Viewport,
    /// Seed for initial placement; entropy when unset
    pub seed: Option<u64>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            barnes_hut_optimize: None,
            barnes_hut_theta: DEFAULT_BARNES_HUT_THETA,
            repulsion_by_degree: true,
            lin_log_mode: false,
            strong_gravity_mode: false,
            gravity: DEFAULT_GRAVITY,
            scaling: DEFAULT_SCALING,
            edge_weight_influence: DEFAULT_EDGE_WEIGHT_INFLUENCE,
            jitter_tolerence: DEFAULT_JITTER_TOLERENCE,
            prevent_overlap: false,
            dissuade_hubs: false,
            gravity_center: None,
            gpu: false,
            max_steps: DEFAULT_MAX_STEPS,
            steps: DEFAULT_STEPS,
            viewport: Viewport::default(),
            seed: None,
        }
    }
}

impl LayoutConfig {
    /// Whether Barnes-Hut should be used for a graph of `node_count` nodes
    pub fn use_barnes_hut(&self, node_count: usize) -> bool {
        self.barnes_hut_optimize
            .unwrap_or(node_count > BARNES_HUT_AUTO_THRESHOLD)
    }

    /// Merge a partial update into this config
    pub fn apply(&mut self, patch: &LayoutConfigPatch) {
        if let Some(v) = patch.barnes_hut_optimize {
            self.barnes_hut_optimize = Some(v);
        }
        if let Some(v) = patch.barnes_hut_theta {
            self.barnes_hut_theta = v;
        }
        if let Some(v) = patch.repulsion_by_degree {
            self.repulsion_by_degree = v;
        }
        if let Some(v) = patch.lin_log_mode {
            self.lin_log_mode = v;
        }
        if let Some(v) = patch.strong_gravity_mode {
            self.strong_gravity_mode = v;
        }
        if let Some(v) = patch.gravity {
            self.gravity = v;
        }
        if let Some(v) = patch.scaling {
            self.scaling = v;
        }
        if let Some(v) = patch.edge_weight_influence {
            self.edge_weight_influence = v;
        }
        if let Some(v) = patch.jitter_tolerence {
            self.jitter_tolerence = v;
        }
        if let Some(v) = patch.prevent_overlap {
            self.prevent_overlap = v;
        }
        if let Some(v) = patch.dissuade_hubs {
            self.dissuade_hubs = v;
        }
        if let Some(v) = patch.gravity_center {
            self.gravity_center = Some(v);
        }
        if let Some(v) = patch.max_steps {
            self.max_steps = v;
        }
        if let Some(v) = patch.steps {
            self.steps = v;
        }
    }
}

/// A partial config used by `update_option`; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfigPatch {
    pub barnes_hut_optimize: Option<bool>,
    pub barnes_hut_theta: Option<f32>,
    pub repulsion_by_degree: Option<bool>,
    pub lin_log_mode: Option<bool>,
    pub strong_gravity_mode: Option<bool>,
    pub gravity: Option<f32>,
    pub scaling: Option<f32>,
    pub edge_weight_influence: Option<f32>,
    pub jitter_tolerence: Option<f32>,
    pub prevent_overlap: Option<bool>,
    pub dissuade_hubs: Option<bool>,
    pub gravity_center: Option<[f32; 2]>,
    pub max_steps: Option<u32>,
    pub steps: Option<u32>,
}
