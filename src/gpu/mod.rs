//! GPU-accelerated ForceAtlas2 (render-to-texture)
//!
//! The GPU backend keeps node state in `Rgba32Float` textures, one texel per
//! node packed as `(x, y, mass, size)`, and runs each simulation step as a
//! chain of render passes. Repulsion is exact (every node against every
//! other) rather than Barnes-Hut, so its trajectories differ from the CPU
//! backend's once the CPU switches to the quadtree.
//!
//! # Example
//!
//! ```rust,ignore
//! use forcelayout::config::{LayoutConfig, Viewport};
//! use forcelayout::gpu::GpuSimulation;
//! use forcelayout::graph::{EdgeInput, GraphInput, NodeInput};
//!
//! let graph = GraphInput::new(
//!     vec![NodeInput::new("a").at(0.0, 0.0), NodeInput::new("b").at(10.0, 0.0)],
//!     vec![EdgeInput::new("a", "b")],
//! )
//! .prepare(&Viewport::default(), None)?;
//!
//! let mut sim = GpuSimulation::new_blocking(&graph, &LayoutConfig::default())?;
//! sim.step(100)?;
//! let positions = sim.read_positions()?;
//! ```
//!
//! # Requirements
//!
//! Additive blending into float32 targets (`Features::FLOAT32_BLENDABLE`).
//! Without it, or without any adapter, construction fails with
//! `LayoutError::GpuUnavailable`.

mod shaders;
mod simulation;
mod types;

pub use shaders::{ATTRACTION, GLOBAL_SPEED, INTEGRATE, REPULSION, WEIGHTED_SUM};
pub use simulation::GpuSimulation;
pub use types::{EdgeVertex, STATE_FORMAT, ShaderFlags, SimulationUniforms, TEXEL_BYTES};
