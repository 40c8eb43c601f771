//! GPU buffer types for the texture simulation
//!
//! These types are uploaded directly to GPU buffers, so they are repr(C)
//! and use 32-bit fields only.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::config::LayoutConfig;
use crate::texel::TexelLayout;

/// Format of every node-state texture. One texel holds `(x, y, mass, size)`
/// for positions, `(fx, fy, 0, 0)` for forces.
pub const STATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Bytes per texel of [`STATE_FORMAT`]
pub const TEXEL_BYTES: u32 = 16;

/// One vertex of the edge-attraction pass. Every edge is drawn twice, once
/// from each endpoint, so each endpoint receives its share by blending.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EdgeVertex {
    /// `[receiving node, other node]`
    pub ends: [u32; 2],
    pub weight: f32,
    pub _padding: f32,
}

impl EdgeVertex {
    /// The two vertices drawn for the edge `source -> target`
    pub fn pair(source: u32, target: u32, weight: f32) -> [Self; 2] {
        [
            Self {
                ends: [source, target],
                weight,
                _padding: 0.0,
            },
            Self {
                ends: [target, source],
                weight,
                _padding: 0.0,
            },
        ]
    }
}

/// Simulation parameters passed to every pass as a uniform
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimulationUniforms {
    pub gravity_center: [f32; 2],
    pub gravity: f32,
    pub scaling: f32,
    pub edge_weight_influence: f32,
    pub jitter_tolerence: f32,
    pub node_count: u32,
    pub tex_width: u32,
    pub tex_height: u32,
    pub _padding: [u32; 3],
}

impl SimulationUniforms {
    pub fn new(config: &LayoutConfig, gravity_center: [f32; 2], node_count: usize) -> Self {
        let layout = TexelLayout::for_nodes(node_count);
        Self {
            gravity_center,
            gravity: config.gravity,
            scaling: config.scaling,
            edge_weight_influence: config.edge_weight_influence,
            jitter_tolerence: config.jitter_tolerence,
            node_count: node_count as u32,
            tex_width: layout.width,
            tex_height: layout.height,
            _padding: [0; 3],
        }
    }
}

/// Force-law switches compiled into the pipelines as override constants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderFlags {
    pub prevent_overlap: bool,
    pub lin_log: bool,
    pub strong_gravity: bool,
}

impl ShaderFlags {
    pub fn from_config(config: &LayoutConfig) -> Self {
        Self {
            prevent_overlap: config.prevent_overlap,
            lin_log: config.lin_log_mode,
            strong_gravity: config.strong_gravity_mode,
        }
    }

    /// Values for the WGSL `override` declarations
    pub fn constants(&self) -> HashMap<String, f64> {
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        HashMap::from([
            ("PREVENT_OVERLAP".to_string(), flag(self.prevent_overlap)),
            ("LIN_LOG".to_string(), flag(self.lin_log)),
            ("STRONG_GRAVITY".to_string(), flag(self.strong_gravity)),
        ])
    }
}
