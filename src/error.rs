//! Error types shared by the simulation backends and the layout facade

use thiserror::Error;

/// Errors that can occur while building or driving a layout
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    /// An edge endpoint points past the end of the node arena
    #[error("edge {edge} references node {node}, but only {node_count} nodes exist")]
    EdgeOutOfRange {
        edge: usize,
        node: usize,
        node_count: usize,
    },

    /// An edge endpoint names a node id that was never supplied
    #[error("edge {edge} references unknown node id '{id}'")]
    UnknownNode { edge: usize, id: String },

    /// Parallel input arrays disagree in length
    #[error("{what}: expected {expected} values, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An operation needs graph data that has not been supplied yet
    #[error("layout has not been initialized with graph data")]
    NotInitialized,

    /// The layout was disposed; it must be re-created before use
    #[error("layout has been disposed")]
    Disposed,

    /// The worker thread stopped answering
    #[error("layout worker is no longer running")]
    WorkerGone,

    /// No usable GPU adapter or a required feature is missing
    #[error("GPU backend unavailable: {0}")]
    GpuUnavailable(String),

    /// The GPU device was lost mid-simulation
    #[error("GPU context lost: {0}")]
    ContextLost(String),
}

/// Result type for layout operations
pub type LayoutResult<T> = Result<T, LayoutError>;
