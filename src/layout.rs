//! Layout facade
//!
//! [`Layout`] is the one type a renderer or UI talks to. It hides which
//! backend runs the simulation, tracks the lifecycle of the current graph and
//! publishes progress events.
//!
//! ```text
//! Uninitialized --init_data--> Ready --update...--> Converged
//!        \____________________ dispose ____________________\--> Disposed
//! ```

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{LayoutConfig, LayoutConfigPatch};
use crate::error::{LayoutError, LayoutResult};
use crate::graph::GraphInput;
use crate::texel::TexelLayout;
use crate::worker::{StepBudget, WorkerHost};

#[cfg(feature = "gpu")]
use crate::gpu::GpuSimulation;

/// Which simulation backend a [`Layout`] drives; fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Worker thread, optional Barnes-Hut
    Cpu,
    /// Texture pipeline, exact repulsion
    #[cfg(feature = "gpu")]
    Gpu,
}

impl Backend {
    /// The backend selected by the `GPU` option
    pub fn from_config(config: &LayoutConfig) -> LayoutResult<Self> {
        if !config.gpu {
            return Ok(Backend::Cpu);
        }
        #[cfg(feature = "gpu")]
        {
            Ok(Backend::Gpu)
        }
        #[cfg(not(feature = "gpu"))]
        {
            Err(LayoutError::GpuUnavailable(
                "built without the `gpu` feature".to_string(),
            ))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutState {
    Uninitialized,
    Ready,
    Converged,
    Disposed,
}

/// Progress notifications for subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutEvent {
    /// The first step of the current graph is about to run
    Started,
    StepComplete {
        positions: Vec<f32>,
        global_speed: f32,
        steps: u64,
    },
    /// `max_steps` was reached
    Finished,
}

/// Outcome of one `update` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Steps run by this call; zero for a no-op
    pub steps_run: u32,
    /// Steps since the graph was loaded
    pub steps: u64,
    pub global_speed: f32,
    pub finished: bool,
}

enum Engine {
    Cpu(WorkerHost),
    #[cfg(feature = "gpu")]
    Gpu(Option<Box<GpuSimulation>>),
}

/// The force layout of one graph at a time
pub struct Layout {
    backend: Backend,
    engine: Engine,
    state: LayoutState,
    config: LayoutConfig,
    texels: TexelLayout,
    node_count: usize,
    started: bool,
    steps: u64,
    global_speed: f32,
    subscribers: Vec<mpsc::UnboundedSender<LayoutEvent>>,
}

impl Layout {
    /// Create a layout on `backend`. The CPU worker thread starts here; the
    /// GPU device is acquired by `init_data`.
    pub fn new(backend: Backend) -> LayoutResult<Self> {
        let engine = match backend {
            Backend::Cpu => Engine::Cpu(WorkerHost::spawn()?),
            #[cfg(feature = "gpu")]
            Backend::Gpu => Engine::Gpu(None),
        };
        Ok(Self {
            backend,
            engine,
            state: LayoutState::Uninitialized,
            config: LayoutConfig::default(),
            texels: TexelLayout::for_nodes(0),
            node_count: 0,
            started: false,
            steps: 0,
            global_speed: 0.0,
            subscribers: Vec::new(),
        })
    }

    /// Create a layout on the backend named by `config`
    pub fn from_config(config: &LayoutConfig) -> LayoutResult<Self> {
        Self::new(Backend::from_config(config)?)
    }

    fn check_live(&self) -> LayoutResult<()> {
        if self.state == LayoutState::Disposed {
            Err(LayoutError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Load a graph, replacing any previous one. Fails on the first edge
    /// that names a missing node.
    pub async fn init_data(
        &mut self,
        graph: &GraphInput,
        config: &LayoutConfig,
    ) -> LayoutResult<()> {
        self.check_live()?;
        let prepared = graph.prepare(&config.viewport, config.seed)?;

        self.config = config.clone();
        self.node_count = prepared.node_count();
        self.texels = TexelLayout::for_nodes(self.node_count);
        self.started = false;
        self.steps = 0;
        self.global_speed = 0.0;
        self.state = LayoutState::Uninitialized;

        match &mut self.engine {
            Engine::Cpu(worker) => worker.init_data(prepared, config.clone()).await?,
            #[cfg(feature = "gpu")]
            Engine::Gpu(slot) => {
                // Release the old textures before allocating new ones
                *slot = None;
                *slot = Some(Box::new(GpuSimulation::new(&prepared, config).await?));
            }
        }

        self.state = LayoutState::Ready;
        info!(
            backend = ?self.backend,
            nodes = self.node_count,
            edges = graph.edges.len(),
            "layout initialized"
        );
        Ok(())
    }

    /// Merge option changes into the running layout
    pub fn update_option(&mut self, patch: LayoutConfigPatch) -> LayoutResult<()> {
        self.check_live()?;
        self.config.apply(&patch);

        match &mut self.engine {
            Engine::Cpu(worker) => worker.update_option(patch)?,
            #[cfg(feature = "gpu")]
            Engine::Gpu(slot) => {
                if let Some(sim) = slot.as_mut() {
                    let result = sim.apply_config(&self.config);
                    self.fail_on_lost(result)?;
                }
            }
        }

        debug!(state = ?self.state, "options updated");
        Ok(())
    }

    /// Advance the layout. `&mut self` keeps steps for one graph strictly
    /// sequential. A converged layout returns a no-op report.
    pub async fn update(&mut self, budget: StepBudget) -> LayoutResult<StepReport> {
        match self.state {
            LayoutState::Disposed => return Err(LayoutError::Disposed),
            LayoutState::Uninitialized => return Err(LayoutError::NotInitialized),
            LayoutState::Converged => return Ok(self.report(0)),
            LayoutState::Ready => {}
        }

        if !self.started {
            self.started = true;
            self.emit(LayoutEvent::Started);
        }

        let steps_run = match &mut self.engine {
            Engine::Cpu(worker) => match worker.update(budget).await? {
                Some(summary) => {
                    self.steps = summary.steps;
                    self.global_speed = summary.global_speed;
                    summary.steps_run
                }
                None => return Ok(self.report(0)),
            },
            #[cfg(feature = "gpu")]
            Engine::Gpu(slot) => {
                let result = match slot.as_mut() {
                    Some(sim) => step_gpu(sim, budget),
                    None => Err(LayoutError::NotInitialized),
                };
                let steps_run = self.fail_on_lost(result)?;
                self.steps += u64::from(steps_run);
                let speed = self.gpu_read(|sim| sim.read_global_speed())?;
                self.global_speed = speed;
                steps_run
            }
        };

        if !self.subscribers.is_empty() {
            let positions = self.node_positions()?;
            self.emit(LayoutEvent::StepComplete {
                positions,
                global_speed: self.global_speed,
                steps: self.steps,
            });
        }

        if self.is_finished(self.config.max_steps) {
            self.state = LayoutState::Converged;
            info!(steps = self.steps, global_speed = self.global_speed, "layout finished");
            self.emit(LayoutEvent::Finished);
        }
        Ok(self.report(steps_run))
    }

    /// Step with the configured `steps` per call until `max_steps` is reached
    pub async fn run_until_finished(&mut self) -> LayoutResult<StepReport> {
        let per_call = self.config.steps.max(1);
        loop {
            let report = self.update(StepBudget::Steps(per_call)).await?;
            if report.finished {
                return Ok(report);
            }
        }
    }

    fn report(&self, steps_run: u32) -> StepReport {
        StepReport {
            steps_run,
            steps: self.steps,
            global_speed: self.global_speed,
            finished: self.state == LayoutState::Converged,
        }
    }

    /// True once `max_steps` steps have run; never before the first step.
    /// A local counter check, so it still answers after `dispose`.
    pub fn is_finished(&self, max_steps: u32) -> bool {
        self.steps > 0 && self.steps >= u64::from(max_steps)
    }

    /// Interleaved `[x0, y0, x1, y1, ...]` in input order. On the GPU
    /// backend this is a blocking readback.
    pub fn node_positions(&self) -> LayoutResult<Vec<f32>> {
        let mut out = Vec::new();
        self.node_positions_into(&mut out)?;
        Ok(out)
    }

    /// Like [`Layout::node_positions`], reusing `out`
    pub fn node_positions_into(&self, out: &mut Vec<f32>) -> LayoutResult<()> {
        self.check_live()?;
        if self.state == LayoutState::Uninitialized {
            return Err(LayoutError::NotInitialized);
        }
        out.clear();
        match &self.engine {
            Engine::Cpu(worker) => out.extend_from_slice(worker.positions()),
            #[cfg(feature = "gpu")]
            Engine::Gpu(slot) => match slot.as_ref() {
                Some(sim) => out.extend(sim.read_positions()?),
                None => return Err(LayoutError::NotInitialized),
            },
        }
        Ok(())
    }

    /// Position of node `index`, `None` past the end
    pub fn node_position(&self, index: usize) -> LayoutResult<Option<[f32; 2]>> {
        if index >= self.node_count {
            self.check_live()?;
            return Ok(None);
        }
        let positions = self.node_positions()?;
        Ok(Some([positions[index * 2], positions[index * 2 + 1]]))
    }

    /// Texel-center UV of node `index` in the position texture. `None` past
    /// the end and once the layout is disposed.
    pub fn node_uv(&self, index: usize) -> Option<[f32; 2]> {
        let live = self.state != LayoutState::Disposed;
        (live && index < self.node_count).then(|| self.texels.uv(index))
    }

    pub fn texel_layout(&self) -> TexelLayout {
        self.texels
    }

    /// The GPU position texture for direct sampling. Always `None` on the
    /// CPU backend.
    #[cfg(feature = "gpu")]
    pub fn node_position_texture(&self) -> Option<&wgpu::Texture> {
        match &self.engine {
            Engine::Gpu(Some(sim)) => Some(sim.position_texture()),
            _ => None,
        }
    }

    /// Receive progress events. Dropped receivers are pruned on the next
    /// event.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<LayoutEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: LayoutEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Stop the worker or release GPU resources. Valid in any state and safe
    /// to call twice; every later call returns `LayoutError::Disposed`.
    pub fn dispose(&mut self) {
        if self.state == LayoutState::Disposed {
            return;
        }
        match &mut self.engine {
            Engine::Cpu(worker) => worker.dispose(),
            #[cfg(feature = "gpu")]
            Engine::Gpu(slot) => *slot = None,
        }
        self.state = LayoutState::Disposed;
        self.subscribers.clear();
        info!("layout disposed");
    }

    pub fn state(&self) -> LayoutState {
        self.state
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn global_speed(&self) -> f32 {
        self.global_speed
    }

    /// A lost GPU context leaves the layout unusable
    #[cfg(feature = "gpu")]
    fn fail_on_lost<T>(&mut self, result: LayoutResult<T>) -> LayoutResult<T> {
        if let Err(LayoutError::ContextLost(reason)) = &result {
            tracing::warn!(%reason, "GPU context lost; disposing layout");
            self.dispose();
        }
        result
    }

    #[cfg(feature = "gpu")]
    fn gpu_read<T>(
        &mut self,
        read: impl FnOnce(&GpuSimulation) -> LayoutResult<T>,
    ) -> LayoutResult<T> {
        let result = match &self.engine {
            Engine::Gpu(Some(sim)) => read(sim),
            _ => Err(LayoutError::NotInitialized),
        };
        self.fail_on_lost(result)
    }
}

#[cfg(feature = "gpu")]
fn step_gpu(sim: &mut GpuSimulation, budget: StepBudget) -> LayoutResult<u32> {
    use std::time::Instant;

    match budget {
        StepBudget::Steps(n) => {
            sim.step(n)?;
            Ok(n)
        }
        StepBudget::Duration(limit) => {
            let start = Instant::now();
            let mut n = 0;
            loop {
                sim.step(1)?;
                sim.wait();
                n += 1;
                if start.elapsed() >= limit {
                    return Ok(n);
                }
            }
        }
    }
}

impl Drop for Layout {
    fn drop(&mut self) {
        self.dispose();
    }
}
