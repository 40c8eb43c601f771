//! CPU worker host
//!
//! The CPU backend runs the simulation on a dedicated thread that owns it
//! outright. The host talks to it with [`WorkerRequest`] messages and gets
//! results back on one-shot channels. Position buffers are moved to the
//! worker with each step request and moved back, filled, with the reply.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{LayoutConfig, LayoutConfigPatch};
use crate::error::{LayoutError, LayoutResult};
use crate::graph::PreparedGraph;
use crate::simulation::Simulation;

/// How much work a single update call may do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepBudget {
    /// Run exactly this many steps
    Steps(u32),
    /// Keep stepping until this much wall time has passed (at least one step)
    Duration(Duration),
}

impl Default for StepBudget {
    fn default() -> Self {
        StepBudget::Steps(1)
    }
}

/// What the worker sends back after a step request
#[derive(Debug)]
pub struct StepReply {
    /// Epoch of the graph the steps ran on
    pub epoch: u64,
    /// Interleaved positions, in the buffer the host handed over
    pub positions: Vec<f32>,
    pub global_speed: f32,
    /// Total steps since the graph was loaded
    pub steps: u64,
    /// Steps run for this request
    pub steps_run: u32,
}

/// Host-side record of a completed step request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSummary {
    pub global_speed: f32,
    pub steps: u64,
    pub steps_run: u32,
}

/// Messages understood by the worker thread
#[derive(Debug)]
pub enum WorkerRequest {
    Init {
        graph: PreparedGraph,
        config: LayoutConfig,
        epoch: u64,
        reply: oneshot::Sender<LayoutResult<()>>,
    },
    Step {
        budget: StepBudget,
        buffer: Vec<f32>,
        reply: oneshot::Sender<LayoutResult<StepReply>>,
    },
    UpdateOption(LayoutConfigPatch),
    Shutdown,
}

/// State owned by the worker thread
#[derive(Default)]
struct WorkerState {
    sim: Option<Simulation>,
    epoch: u64,
}

impl WorkerState {
    /// Handle one request; returns false when the worker should stop
    fn handle(&mut self, request: WorkerRequest) -> bool {
        match request {
            WorkerRequest::Init {
                graph,
                config,
                epoch,
                reply,
            } => {
                let result = Simulation::from_graph(&graph, config).map(|sim| {
                    self.sim = Some(sim);
                    self.epoch = epoch;
                });
                if let Err(e) = &result {
                    warn!(error = %e, "worker rejected graph");
                }
                let _ = reply.send(result);
            }
            WorkerRequest::Step {
                budget,
                buffer,
                reply,
            } => {
                let result = self.step(budget, buffer);
                // The host may have stopped waiting; nothing to do then
                let _ = reply.send(result);
            }
            WorkerRequest::UpdateOption(patch) => match &mut self.sim {
                Some(sim) => sim.apply_patch(&patch),
                None => debug!("ignoring option update before init"),
            },
            WorkerRequest::Shutdown => return false,
        }
        true
    }

    fn step(&mut self, budget: StepBudget, mut buffer: Vec<f32>) -> LayoutResult<StepReply> {
        let sim = self.sim.as_mut().ok_or(LayoutError::NotInitialized)?;

        let steps_run = match budget {
            StepBudget::Steps(n) => {
                sim.update_n(n as usize);
                n
            }
            StepBudget::Duration(limit) => {
                let start = Instant::now();
                let mut n = 0;
                loop {
                    sim.update();
                    n += 1;
                    if start.elapsed() >= limit {
                        break;
                    }
                }
                n
            }
        };

        sim.positions_into(&mut buffer);
        Ok(StepReply {
            epoch: self.epoch,
            positions: buffer,
            global_speed: sim.global_speed(),
            steps: sim.steps(),
            steps_run,
        })
    }
}

fn run(mut rx: mpsc::UnboundedReceiver<WorkerRequest>) {
    info!("layout worker started");
    let mut state = WorkerState::default();
    while let Some(request) = rx.blocking_recv() {
        if !state.handle(request) {
            break;
        }
    }
    info!("layout worker stopped");
}

/// Host side of the worker
///
/// Keeps a local mirror of the last positions and step count so that
/// `positions()` and `is_finished()` never need a round trip.
pub struct WorkerHost {
    tx: mpsc::UnboundedSender<WorkerRequest>,
    thread: Option<JoinHandle<()>>,
    epoch: u64,
    initialized: bool,
    disposed: bool,
    positions: Vec<f32>,
    /// Buffer handed to the worker on the next step
    spare: Vec<f32>,
    global_speed: f32,
    steps: u64,
}

impl WorkerHost {
    /// Start the worker thread
    pub fn spawn() -> LayoutResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("layout-worker".to_string())
            .spawn(move || run(rx))
            .map_err(|e| {
                warn!(error = %e, "failed to spawn layout worker");
                LayoutError::WorkerGone
            })?;

        Ok(Self {
            tx,
            thread: Some(thread),
            epoch: 0,
            initialized: false,
            disposed: false,
            positions: Vec::new(),
            spare: Vec::new(),
            global_speed: 0.0,
            steps: 0,
        })
    }

    fn send(&self, request: WorkerRequest) -> LayoutResult<()> {
        self.tx.send(request).map_err(|_| LayoutError::WorkerGone)
    }

    fn check_live(&self) -> LayoutResult<()> {
        if self.disposed {
            Err(LayoutError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Load a new graph into the worker. Replies still in flight for the
    /// previous graph become stale.
    pub async fn init_data(
        &mut self,
        graph: PreparedGraph,
        config: LayoutConfig,
    ) -> LayoutResult<()> {
        self.check_live()?;
        self.epoch += 1;
        self.initialized = false;

        self.positions.clear();
        for p in &graph.positions {
            self.positions.push(p.x);
            self.positions.push(p.y);
        }
        self.global_speed = 0.0;
        self.steps = 0;

        let (reply, rx) = oneshot::channel();
        self.send(WorkerRequest::Init {
            graph,
            config,
            epoch: self.epoch,
            reply,
        })?;
        rx.await.map_err(|_| LayoutError::WorkerGone)??;

        self.initialized = true;
        debug!(epoch = self.epoch, "worker initialized");
        Ok(())
    }

    /// Merge a config patch into the worker's live settings
    pub fn update_option(&self, patch: LayoutConfigPatch) -> LayoutResult<()> {
        self.check_live()?;
        self.send(WorkerRequest::UpdateOption(patch))
    }

    /// Run one step request. Returns `None` when the reply belonged to an
    /// older graph and was dropped.
    pub async fn update(&mut self, budget: StepBudget) -> LayoutResult<Option<StepSummary>> {
        self.check_live()?;
        if !self.initialized {
            return Err(LayoutError::NotInitialized);
        }

        let buffer = std::mem::take(&mut self.spare);
        let (reply, rx) = oneshot::channel();
        self.send(WorkerRequest::Step {
            budget,
            buffer,
            reply,
        })?;
        let reply = rx.await.map_err(|_| LayoutError::WorkerGone)??;

        if reply.epoch != self.epoch {
            warn!(
                reply_epoch = reply.epoch,
                epoch = self.epoch,
                "discarding stale step reply"
            );
            return Ok(None);
        }

        self.spare = std::mem::replace(&mut self.positions, reply.positions);
        self.global_speed = reply.global_speed;
        self.steps = reply.steps;
        Ok(Some(StepSummary {
            global_speed: reply.global_speed,
            steps: reply.steps,
            steps_run: reply.steps_run,
        }))
    }

    /// Host-local: true once `max_steps` steps have run
    pub fn is_finished(&self, max_steps: u32) -> bool {
        self.steps > 0 && self.steps >= u64::from(max_steps)
    }

    /// Last known interleaved positions
    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn global_speed(&self) -> f32 {
        self.global_speed
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Stop the worker and wait for it to exit. Safe to call twice.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.epoch += 1;
        let _ = self.tx.send(WorkerRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("layout worker panicked");
            }
        }
        info!("worker disposed");
    }
}

impl Drop for WorkerHost {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Viewport;
    use crate::graph::{EdgeInput, GraphInput, NodeInput};

    fn path_graph() -> PreparedGraph {
        GraphInput::new(
            vec![
                NodeInput::new("a").at(0.0, 0.0),
                NodeInput::new("b").at(10.0, 0.0),
                NodeInput::new("c").at(5.0, 10.0),
            ],
            vec![EdgeInput::new("a", "b"), EdgeInput::new("b", "c")],
        )
        .prepare(&Viewport::default(), Some(1))
        .unwrap()
    }

    #[test]
    fn state_rejects_step_before_init() {
        let mut state = WorkerState::default();
        let err = state.step(StepBudget::Steps(1), Vec::new()).unwrap_err();
        assert_eq!(err, LayoutError::NotInitialized);
    }

    #[test]
    fn state_fills_the_handed_buffer() {
        let mut state = WorkerState::default();
        let (reply, _rx) = oneshot::channel();
        assert!(state.handle(WorkerRequest::Init {
            graph: path_graph(),
            config: LayoutConfig::default(),
            epoch: 3,
            reply,
        }));

        let buffer = Vec::with_capacity(64);
        let reply = state.step(StepBudget::Steps(4), buffer).unwrap();
        assert_eq!(reply.epoch, 3);
        assert_eq!(reply.positions.len(), 6);
        assert!(reply.positions.capacity() >= 64);
        assert_eq!(reply.steps, 4);
        assert_eq!(reply.steps_run, 4);
    }

    #[test]
    fn duration_budget_runs_at_least_one_step() {
        let mut state = WorkerState::default();
        let (reply, _rx) = oneshot::channel();
        state.handle(WorkerRequest::Init {
            graph: path_graph(),
            config: LayoutConfig::default(),
            epoch: 1,
            reply,
        });
        let reply = state
            .step(StepBudget::Duration(Duration::ZERO), Vec::new())
            .unwrap();
        assert_eq!(reply.steps_run, 1);
    }

    #[test]
    fn shutdown_stops_the_loop() {
        let mut state = WorkerState::default();
        assert!(!state.handle(WorkerRequest::Shutdown));
    }

    #[tokio::test]
    async fn host_round_trip() {
        let mut host = WorkerHost::spawn().unwrap();
        assert_eq!(
            host.update(StepBudget::Steps(1)).await.unwrap_err(),
            LayoutError::NotInitialized
        );

        host.init_data(path_graph(), LayoutConfig::default())
            .await
            .unwrap();
        assert_eq!(host.positions(), &[0.0, 0.0, 10.0, 0.0, 5.0, 10.0]);
        assert!(!host.is_finished(10));

        let summary = host.update(StepBudget::Steps(10)).await.unwrap().unwrap();
        assert_eq!(summary.steps, 10);
        assert!(host.is_finished(10));
        assert!(!host.is_finished(11));
        assert_ne!(host.positions(), &[0.0, 0.0, 10.0, 0.0, 5.0, 10.0]);

        host.update_option(LayoutConfigPatch {
            gravity: Some(5.0),
            ..Default::default()
        })
        .unwrap();
        host.update(StepBudget::Steps(1)).await.unwrap();
        assert_eq!(host.steps(), 11);
    }

    #[tokio::test]
    async fn stale_replies_are_discarded() {
        let mut host = WorkerHost::spawn().unwrap();
        host.init_data(path_graph(), LayoutConfig::default())
            .await
            .unwrap();

        // Reload the worker under an epoch the host no longer uses
        let (reply, rx) = oneshot::channel();
        host.send(WorkerRequest::Init {
            graph: path_graph(),
            config: LayoutConfig::default(),
            epoch: host.epoch() - 1,
            reply,
        })
        .unwrap();
        rx.await.unwrap().unwrap();

        assert!(host.update(StepBudget::Steps(1)).await.unwrap().is_none());
        assert_eq!(host.steps(), 0);
    }

    #[tokio::test]
    async fn calls_after_dispose_fail() {
        let mut host = WorkerHost::spawn().unwrap();
        host.init_data(path_graph(), LayoutConfig::default())
            .await
            .unwrap();
        host.dispose();
        host.dispose();

        assert!(host.is_disposed());
        assert_eq!(
            host.update(StepBudget::Steps(1)).await.unwrap_err(),
            LayoutError::Disposed
        );
        assert_eq!(
            host.update_option(LayoutConfigPatch::default()).unwrap_err(),
            LayoutError::Disposed
        );
    }
}
