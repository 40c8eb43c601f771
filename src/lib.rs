//! forcelayout - ForceAtlas2 graph layout
//!
//! Computes 2D node positions for a graph with a ForceAtlas2 simulation. The
//! CPU backend runs on a worker thread with optional Barnes-Hut repulsion;
//! the GPU backend (feature `gpu`) runs the same force model as a chain of
//! wgpu render passes over node-state textures. [`layout::Layout`] drives
//! either one behind a single interface.

pub mod config;
pub mod error;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod graph;
pub mod layout;
pub mod region;
pub mod simulation;
pub mod texel;
pub mod vec2;
pub mod view;
pub mod worker;

pub use config::{LayoutConfig, LayoutConfigPatch, Viewport};
pub use error::{LayoutError, LayoutResult};
pub use graph::{EdgeInput, GraphInput, NodeInput};
pub use layout::{Backend, Layout, LayoutEvent, LayoutState, StepReport};
pub use worker::StepBudget;
