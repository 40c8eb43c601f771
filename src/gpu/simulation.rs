//! GPU texture simulation
//!
//! Node state lives in float textures, one texel per node. A step is five
//! render passes recorded into one command encoder:
//!
//! 1. repulsion + gravity, full-screen into `forces[p]`
//! 2. edge attraction, points blended into `forces[p]`
//! 3. swing/traction sums, points blended into the 1×1 `weighted_sum`
//! 4. global speed, 1×1 pass into `speeds[p]`
//! 5. integration, full-screen from `positions[p]` into `positions[1 - p]`
//!
//! `p` is the parity of the step. Previous forces and speed are always the
//! `1 - p` entries, so flipping the parity once per step moves every buffer
//! forward together and bind groups can be built once for both parities.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

use super::shaders;
use super::types::{EdgeVertex, STATE_FORMAT, ShaderFlags, SimulationUniforms, TEXEL_BYTES};
use crate::config::LayoutConfig;
use crate::error::{LayoutError, LayoutResult};
use crate::graph::PreparedGraph;
use crate::region::Bounds;
use crate::texel::TexelLayout;

/// A texture together with the view every pass uses
struct StateTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl StateTexture {
    fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STATE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Bind group layouts, one per pass shape. Binding 0 is always the settings
/// uniform, the rest are state textures.
struct Layouts {
    force: wgpu::BindGroupLayout,
    weighted_sum: wgpu::BindGroupLayout,
    global_speed: wgpu::BindGroupLayout,
    integrate: wgpu::BindGroupLayout,
}

impl Layouts {
    fn new(device: &wgpu::Device) -> Self {
        Self {
            force: texture_layout(device, "Force Bind Group Layout", 1),
            weighted_sum: texture_layout(device, "Weighted Sum Bind Group Layout", 3),
            global_speed: texture_layout(device, "Global Speed Bind Group Layout", 2),
            integrate: texture_layout(device, "Integrate Bind Group Layout", 4),
        }
    }
}

fn texture_layout(device: &wgpu::Device, label: &str, textures: u32) -> wgpu::BindGroupLayout {
    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }];
    for binding in 1..=textures {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

fn bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    settings: &wgpu::Buffer,
    textures: &[&StateTexture],
) -> wgpu::BindGroup {
    let mut entries = vec![wgpu::BindGroupEntry {
        binding: 0,
        resource: settings.as_entire_binding(),
    }];
    for (i, t) in textures.iter().enumerate() {
        entries.push(wgpu::BindGroupEntry {
            binding: i as u32 + 1,
            resource: wgpu::BindingResource::TextureView(&t.view),
        });
    }
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &entries,
    })
}

/// Compiled shader modules; compiled once, specialized per pipeline
struct Modules {
    repulsion: wgpu::ShaderModule,
    attraction: wgpu::ShaderModule,
    weighted_sum: wgpu::ShaderModule,
    global_speed: wgpu::ShaderModule,
    integrate: wgpu::ShaderModule,
}

impl Modules {
    fn new(device: &wgpu::Device) -> Self {
        let module = |label: &str, source: &'static str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        };
        Self {
            repulsion: module("Repulsion Shader", shaders::REPULSION),
            attraction: module("Attraction Shader", shaders::ATTRACTION),
            weighted_sum: module("Weighted Sum Shader", shaders::WEIGHTED_SUM),
            global_speed: module("Global Speed Shader", shaders::GLOBAL_SPEED),
            integrate: module("Integrate Shader", shaders::INTEGRATE),
        }
    }
}

const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

struct PipelineSpec<'a> {
    label: &'a str,
    layout: &'a wgpu::BindGroupLayout,
    module: &'a wgpu::ShaderModule,
    vertex: &'a str,
    fragment: &'a str,
    topology: wgpu::PrimitiveTopology,
    blend: Option<wgpu::BlendState>,
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
}

fn render_pipeline(
    device: &wgpu::Device,
    spec: PipelineSpec<'_>,
    flags: ShaderFlags,
) -> wgpu::RenderPipeline {
    let constants = flags.constants();
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(spec.label),
        bind_group_layouts: &[spec.layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(spec.label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: spec.module,
            entry_point: Some(spec.vertex),
            buffers: spec.buffers,
            compilation_options: wgpu::PipelineCompilationOptions {
                constants: &constants,
                ..Default::default()
            },
        },
        fragment: Some(wgpu::FragmentState {
            module: spec.module,
            entry_point: Some(spec.fragment),
            targets: &[Some(wgpu::ColorTargetState {
                format: STATE_FORMAT,
                blend: spec.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions {
                constants: &constants,
                ..Default::default()
            },
        }),
        primitive: wgpu::PrimitiveState {
            topology: spec.topology,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Render pipelines for one set of [`ShaderFlags`]
struct Pipelines {
    flags: ShaderFlags,
    repulsion: wgpu::RenderPipeline,
    attraction: wgpu::RenderPipeline,
    weighted_sum: wgpu::RenderPipeline,
    global_speed: wgpu::RenderPipeline,
    integrate: wgpu::RenderPipeline,
}

impl Pipelines {
    fn new(
        device: &wgpu::Device,
        modules: &Modules,
        layouts: &Layouts,
        flags: ShaderFlags,
    ) -> Self {
        let edge_buffers = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<EdgeVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Uint32x2, 1 => Float32],
        }];

        let repulsion = render_pipeline(
            device,
            PipelineSpec {
                label: "Repulsion Pipeline",
                layout: &layouts.force,
                module: &modules.repulsion,
                vertex: "vs_fullscreen",
                fragment: "fs_repulsion",
                topology: wgpu::PrimitiveTopology::TriangleList,
                blend: None,
                buffers: &[],
            },
            flags,
        );
        let attraction = render_pipeline(
            device,
            PipelineSpec {
                label: "Attraction Pipeline",
                layout: &layouts.force,
                module: &modules.attraction,
                vertex: "vs_attraction",
                fragment: "fs_attraction",
                topology: wgpu::PrimitiveTopology::PointList,
                blend: Some(ADDITIVE),
                buffers: &edge_buffers,
            },
            flags,
        );
        let weighted_sum = render_pipeline(
            device,
            PipelineSpec {
                label: "Weighted Sum Pipeline",
                layout: &layouts.weighted_sum,
                module: &modules.weighted_sum,
                vertex: "vs_weighted_sum",
                fragment: "fs_weighted_sum",
                topology: wgpu::PrimitiveTopology::PointList,
                blend: Some(ADDITIVE),
                buffers: &[],
            },
            flags,
        );
        let global_speed = render_pipeline(
            device,
            PipelineSpec {
                label: "Global Speed Pipeline",
                layout: &layouts.global_speed,
                module: &modules.global_speed,
                vertex: "vs_fullscreen",
                fragment: "fs_global_speed",
                topology: wgpu::PrimitiveTopology::TriangleList,
                blend: None,
                buffers: &[],
            },
            flags,
        );
        let integrate = render_pipeline(
            device,
            PipelineSpec {
                label: "Integrate Pipeline",
                layout: &layouts.integrate,
                module: &modules.integrate,
                vertex: "vs_fullscreen",
                fragment: "fs_integrate",
                topology: wgpu::PrimitiveTopology::TriangleList,
                blend: None,
                buffers: &[],
            },
            flags,
        );

        Self {
            flags,
            repulsion,
            attraction,
            weighted_sum,
            global_speed,
            integrate,
        }
    }
}

/// Bind groups for both parities of every pass
struct BindGroups {
    force: [wgpu::BindGroup; 2],
    weighted_sum: [wgpu::BindGroup; 2],
    global_speed: [wgpu::BindGroup; 2],
    integrate: [wgpu::BindGroup; 2],
}

/// ForceAtlas2 on the GPU, exact O(N²) repulsion
pub struct GpuSimulation {
    device: wgpu::Device,
    queue: wgpu::Queue,
    texels: TexelLayout,
    node_count: usize,
    edge_count: u32,

    uniforms: SimulationUniforms,
    settings_buffer: wgpu::Buffer,
    edge_buffer: Option<wgpu::Buffer>,

    positions: [StateTexture; 2],
    forces: [StateTexture; 2],
    speeds: [StateTexture; 2],
    weighted_sum: StateTexture,

    modules: Modules,
    layouts: Layouts,
    pipelines: Pipelines,
    bind_groups: BindGroups,
    parity: usize,
    steps: u64,

    /// Caller-supplied masses and degree-derived masses, by node
    base_masses: Vec<f32>,
    degree_masses: Vec<f32>,
    repulsion_by_degree: bool,
    initial_center: [f32; 2],

    lost: Arc<AtomicBool>,
    lost_reason: Arc<Mutex<String>>,
}

impl GpuSimulation {
    /// Acquire a device and upload `graph`
    pub async fn new(graph: &PreparedGraph, config: &LayoutConfig) -> LayoutResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| LayoutError::GpuUnavailable("no adapter found".to_string()))?;

        let info = adapter.get_info();
        if !adapter
            .features()
            .contains(wgpu::Features::FLOAT32_BLENDABLE)
        {
            return Err(LayoutError::GpuUnavailable(format!(
                "{} cannot blend float32 targets",
                info.name
            )));
        }

        let texels = TexelLayout::for_nodes(graph.node_count());
        let limits = adapter.limits();
        if texels.width > limits.max_texture_dimension_2d {
            return Err(LayoutError::GpuUnavailable(format!(
                "{} nodes need a {}-wide texture, adapter allows {}",
                graph.node_count(),
                texels.width,
                limits.max_texture_dimension_2d
            )));
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("forcelayout"),
                    required_features: wgpu::Features::FLOAT32_BLENDABLE,
                    required_limits: wgpu::Limits::downlevel_defaults().using_resolution(limits),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| LayoutError::GpuUnavailable(format!("failed to create device: {e}")))?;

        info!(adapter = %info.name, backend = ?info.backend, "GPU simulation device ready");
        Self::with_device(device, queue, graph, config)
    }

    /// Blocking variant of [`GpuSimulation::new`]
    pub fn new_blocking(graph: &PreparedGraph, config: &LayoutConfig) -> LayoutResult<Self> {
        pollster::block_on(Self::new(graph, config))
    }

    fn with_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        graph: &PreparedGraph,
        config: &LayoutConfig,
    ) -> LayoutResult<Self> {
        let lost = Arc::new(AtomicBool::new(false));
        let lost_reason = Arc::new(Mutex::new(String::new()));
        {
            let lost = lost.clone();
            let lost_reason = lost_reason.clone();
            device.set_device_lost_callback(move |reason, message| {
                warn!(?reason, %message, "GPU device lost");
                if let Ok(mut slot) = lost_reason.lock() {
                    *slot = format!("{reason:?}: {message}");
                }
                lost.store(true, Ordering::SeqCst);
            });
        }
        {
            let lost = lost.clone();
            let lost_reason = lost_reason.clone();
            device.on_uncaptured_error(Box::new(move |error| {
                warn!(%error, "GPU error");
                if let Ok(mut slot) = lost_reason.lock() {
                    *slot = error.to_string();
                }
                lost.store(true, Ordering::SeqCst);
            }));
        }

        let node_count = graph.node_count();
        let texels = TexelLayout::for_nodes(node_count);
        let (w, h) = (texels.width, texels.height);

        let mut degrees = vec![0u32; node_count];
        for &(s, t) in &graph.edges {
            degrees[s] += 1;
            degrees[t] += 1;
        }
        let degree_masses: Vec<f32> = degrees.iter().map(|&d| (d + 1) as f32).collect();

        let bbox = Bounds::from_points(graph.positions.iter().copied());
        let center = bbox.center();
        let initial_center = [center.x, center.y];
        let gravity_center = config.gravity_center.unwrap_or(initial_center);

        let uniforms = SimulationUniforms::new(config, gravity_center, node_count);
        let settings_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Settings Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let edge_vertices: Vec<EdgeVertex> = graph
            .edges
            .iter()
            .zip(&graph.weights)
            .flat_map(|(&(s, t), &w)| EdgeVertex::pair(s as u32, t as u32, w))
            .collect();
        // Zero-length vertex buffers cannot be bound
        let edge_buffer = (!edge_vertices.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Edge Vertex Buffer"),
                contents: bytemuck::cast_slice(&edge_vertices),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });

        let positions = [
            StateTexture::new(&device, "Position Texture 0", w, h),
            StateTexture::new(&device, "Position Texture 1", w, h),
        ];
        let forces = [
            StateTexture::new(&device, "Force Texture 0", w, h),
            StateTexture::new(&device, "Force Texture 1", w, h),
        ];
        let speeds = [
            StateTexture::new(&device, "Global Speed Texture 0", 1, 1),
            StateTexture::new(&device, "Global Speed Texture 1", 1, 1),
        ];
        let weighted_sum = StateTexture::new(&device, "Weighted Sum Texture", 1, 1);

        let modules = Modules::new(&device);
        let layouts = Layouts::new(&device);
        let pipelines =
            Pipelines::new(&device, &modules, &layouts, ShaderFlags::from_config(config));

        let bind_groups = BindGroups {
            force: [0, 1].map(|p| {
                bind_group(
                    &device,
                    "Force Bind Group",
                    &layouts.force,
                    &settings_buffer,
                    &[&positions[p]],
                )
            }),
            weighted_sum: [0, 1].map(|p| {
                bind_group(
                    &device,
                    "Weighted Sum Bind Group",
                    &layouts.weighted_sum,
                    &settings_buffer,
                    &[&positions[p], &forces[p], &forces[1 - p]],
                )
            }),
            global_speed: [0, 1].map(|p| {
                bind_group(
                    &device,
                    "Global Speed Bind Group",
                    &layouts.global_speed,
                    &settings_buffer,
                    &[&weighted_sum, &speeds[1 - p]],
                )
            }),
            integrate: [0, 1].map(|p| {
                bind_group(
                    &device,
                    "Integrate Bind Group",
                    &layouts.integrate,
                    &settings_buffer,
                    &[&positions[p], &forces[p], &forces[1 - p], &speeds[p]],
                )
            }),
        };

        let sim = Self {
            device,
            queue,
            texels,
            node_count,
            edge_count: edge_vertices.len() as u32,
            uniforms,
            settings_buffer,
            edge_buffer,
            positions,
            forces,
            speeds,
            weighted_sum,
            modules,
            layouts,
            pipelines,
            bind_groups,
            parity: 0,
            steps: 0,
            base_masses: graph.masses.clone(),
            degree_masses,
            repulsion_by_degree: config.repulsion_by_degree,
            initial_center,
            lost,
            lost_reason,
        };

        let xy: Vec<[f32; 2]> = graph.positions.iter().map(|&p| p.into()).collect();
        sim.upload_positions(&xy, &graph.sizes);
        debug!(
            nodes = node_count,
            edges = graph.edge_count(),
            width = w,
            "uploaded graph to GPU"
        );
        Ok(sim)
    }

    fn masses(&self) -> &[f32] {
        if self.repulsion_by_degree {
            &self.degree_masses
        } else {
            &self.base_masses
        }
    }

    /// Write `(x, y, mass, size)` texels into the current position texture
    fn upload_positions(&self, xy: &[[f32; 2]], sizes: &[f32]) {
        let mut texels = vec![[0.0f32; 4]; self.texels.texel_count()];
        for (i, ((p, &m), &s)) in xy.iter().zip(self.masses()).zip(sizes).enumerate() {
            texels[i] = [p[0], p[1], m, s];
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.positions[self.parity].texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.texels.width * TEXEL_BYTES),
                rows_per_image: Some(self.texels.height),
            },
            wgpu::Extent3d {
                width: self.texels.width,
                height: self.texels.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn check_lost(&self) -> LayoutResult<()> {
        if self.lost.load(Ordering::SeqCst) {
            let reason = self
                .lost_reason
                .lock()
                .map(|r| r.clone())
                .unwrap_or_default();
            Err(LayoutError::ContextLost(reason))
        } else {
            Ok(())
        }
    }

    /// Push changed settings to the GPU. Rebuilds pipelines when a force-law
    /// switch flips and rewrites masses when the mass source changes.
    pub fn apply_config(&mut self, config: &LayoutConfig) -> LayoutResult<()> {
        self.check_lost()?;

        let gravity_center = config.gravity_center.unwrap_or(self.initial_center);
        self.uniforms = SimulationUniforms::new(config, gravity_center, self.node_count);
        self.queue
            .write_buffer(&self.settings_buffer, 0, bytemuck::cast_slice(&[self.uniforms]));

        let flags = ShaderFlags::from_config(config);
        if flags != self.pipelines.flags {
            debug!(?flags, "rebuilding GPU pipelines");
            self.pipelines = Pipelines::new(&self.device, &self.modules, &self.layouts, flags);
        }

        if config.repulsion_by_degree != self.repulsion_by_degree {
            let texels = self.read_texels()?;
            self.repulsion_by_degree = config.repulsion_by_degree;
            let xy: Vec<[f32; 2]> = texels.iter().map(|t| [t[0], t[1]]).collect();
            let sizes: Vec<f32> = texels.iter().map(|t| t[3]).collect();
            self.upload_positions(&xy, &sizes);
        }
        Ok(())
    }

    /// Record and submit `n` steps
    pub fn step(&mut self, n: u32) -> LayoutResult<()> {
        self.check_lost()?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Layout Step Encoder"),
            });
        for _ in 0..n {
            self.encode_step(&mut encoder, self.parity);
            self.parity = 1 - self.parity;
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.steps += u64::from(n);
        Ok(())
    }

    /// Block until all submitted work has finished
    pub fn wait(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    fn encode_step(&self, encoder: &mut wgpu::CommandEncoder, p: usize) {
        let clear = wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT);

        {
            let mut pass = begin_pass(encoder, "Repulsion Pass", &self.forces[p], clear);
            pass.set_pipeline(&self.pipelines.repulsion);
            pass.set_bind_group(0, &self.bind_groups.force[p], &[]);
            pass.draw(0..3, 0..1);
        }

        if let Some(edges) = &self.edge_buffer {
            let mut pass = begin_pass(
                encoder,
                "Attraction Pass",
                &self.forces[p],
                wgpu::LoadOp::Load,
            );
            pass.set_pipeline(&self.pipelines.attraction);
            pass.set_bind_group(0, &self.bind_groups.force[p], &[]);
            pass.set_vertex_buffer(0, edges.slice(..));
            pass.draw(0..self.edge_count, 0..1);
        }

        {
            let mut pass = begin_pass(encoder, "Weighted Sum Pass", &self.weighted_sum, clear);
            pass.set_pipeline(&self.pipelines.weighted_sum);
            pass.set_bind_group(0, &self.bind_groups.weighted_sum[p], &[]);
            pass.draw(0..self.node_count as u32, 0..1);
        }

        {
            let mut pass = begin_pass(encoder, "Global Speed Pass", &self.speeds[p], clear);
            pass.set_pipeline(&self.pipelines.global_speed);
            pass.set_bind_group(0, &self.bind_groups.global_speed[p], &[]);
            pass.draw(0..3, 0..1);
        }

        {
            let mut pass = begin_pass(encoder, "Integrate Pass", &self.positions[1 - p], clear);
            pass.set_pipeline(&self.pipelines.integrate);
            pass.set_bind_group(0, &self.bind_groups.integrate[p], &[]);
            pass.draw(0..3, 0..1);
        }
    }

    /// Copy a texture back to the host and return its texels row by row.
    /// Blocks until the GPU has finished all submitted work.
    fn read_texture(
        &self,
        texture: &StateTexture,
        width: u32,
        height: u32,
    ) -> LayoutResult<Vec<[f32; 4]>> {
        self.check_lost()?;

        let unpadded = width * TEXEL_BYTES;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: u64::from(padded * height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| LayoutError::ContextLost("readback never completed".to_string()))?
            .map_err(|e| LayoutError::ContextLost(format!("readback failed: {e}")))?;

        let mut texels = Vec::with_capacity((width * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in 0..height {
                let start = (row * padded) as usize;
                let bytes = &data[start..start + unpadded as usize];
                let floats: &[f32] = bytemuck::cast_slice(bytes);
                texels.extend(floats.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]));
            }
        }
        staging.unmap();
        self.check_lost()?;
        Ok(texels)
    }

    /// All live node texels of the current position texture
    fn read_texels(&self) -> LayoutResult<Vec<[f32; 4]>> {
        let mut texels = self.read_texture(
            &self.positions[self.parity],
            self.texels.width,
            self.texels.height,
        )?;
        texels.truncate(self.node_count);
        Ok(texels)
    }

    /// Interleaved `[x0, y0, x1, y1, ...]`. A blocking GPU sync point.
    pub fn read_positions(&self) -> LayoutResult<Vec<f32>> {
        let texels = self.read_texels()?;
        Ok(texels.iter().flat_map(|t| [t[0], t[1]]).collect())
    }

    /// The global speed computed by the last step. A blocking GPU sync point.
    pub fn read_global_speed(&self) -> LayoutResult<f32> {
        let last = &self.speeds[1 - self.parity];
        let texels = self.read_texture(last, 1, 1)?;
        Ok(texels.first().map_or(0.0, |t| t[0]))
    }

    /// The texture holding current positions, for direct sampling by a
    /// renderer on the same device
    pub fn position_texture(&self) -> &wgpu::Texture {
        &self.positions[self.parity].texture
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn texel_layout(&self) -> TexelLayout {
        self.texels
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    target: &StateTexture,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &target.view,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Viewport;
    use crate::graph::{EdgeInput, GraphInput, NodeInput};
    use crate::simulation::Simulation;

    fn triangle() -> PreparedGraph {
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

    /// Skip instead of failing on machines without a suitable adapter
    fn gpu_or_skip(graph: &PreparedGraph, config: &LayoutConfig) -> Option<GpuSimulation> {
        match GpuSimulation::new_blocking(graph, config) {
            Ok(sim) => Some(sim),
            Err(LayoutError::GpuUnavailable(reason)) => {
                eprintln!("skipping GPU test: {reason}");
                None
            }
            Err(e) => panic!("unexpected GPU error: {e}"),
        }
    }

    #[test]
    fn uploads_and_reads_back_positions() {
        let graph = triangle();
        let Some(sim) = gpu_or_skip(&graph, &LayoutConfig::default()) else {
            return;
        };
        assert_eq!(
            sim.read_positions().unwrap(),
            vec![0.0, 0.0, 10.0, 0.0, 5.0, 10.0]
        );
        assert_eq!(sim.read_global_speed().unwrap(), 0.0);
    }

    #[test]
    fn tracks_the_cpu_backend() {
        let graph = triangle();
        let config = LayoutConfig {
            barnes_hut_optimize: Some(false),
            ..Default::default()
        };
        let Some(mut gpu) = gpu_or_skip(&graph, &config) else {
            return;
        };
        let mut cpu = Simulation::from_graph(&graph, config).unwrap();

        gpu.step(20).unwrap();
        cpu.update_n(20);

        let gpu_positions = gpu.read_positions().unwrap();
        for (g, c) in gpu_positions.iter().zip(cpu.positions()) {
            assert!((g - c).abs() < 1e-2, "gpu {g} vs cpu {c}");
        }
        let speed = gpu.read_global_speed().unwrap();
        assert!((speed - cpu.global_speed()).abs() <= 1e-2 * cpu.global_speed().max(1.0));
    }

    #[test]
    fn switching_modes_rebuilds_pipelines() {
        let graph = triangle();
        let mut config = LayoutConfig::default();
        let Some(mut sim) = gpu_or_skip(&graph, &config) else {
            return;
        };
        config.lin_log_mode = true;
        config.repulsion_by_degree = false;
        sim.apply_config(&config).unwrap();
        assert!(sim.pipelines.flags.lin_log);

        sim.step(5).unwrap();
        let positions = sim.read_positions().unwrap();
        assert_eq!(positions.len(), 6);
        assert!(positions.iter().all(|v| v.is_finite()));
    }
}
