use crate::format::{VertexBufferSpec, clear_color, group_bindings, packed_inputs};
use boxlight_render::{
    BindState, BindingDesc, BufferId, BufferUsage, HandleAllocator, LayoutId, ProgramDesc,
    ProgramId, RenderDevice, RenderError, ShaderStage,
};
use std::cell::RefCell;
use std::collections::HashMap;
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

struct BufferEntry {
    buffer: wgpu::Buffer,
    usage: BufferUsage,
    len: u64,
}

struct UniformBlock {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    size: u64,
}

struct ProgramEntry {
    label: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    uniforms: Option<UniformBlock>,
}

#[derive(Debug, Clone, Copy)]
struct PendingDraw {
    program: ProgramId,
    layout: LayoutId,
    index_buffer: BufferId,
    index_count: u32,
}

struct FrameRecording {
    clear_color: [f32; 4],
    draws: Vec<PendingDraw>,
}

#[derive(Default)]
struct Resources {
    buffers: HashMap<BufferId, BufferEntry>,
    layouts: HashMap<LayoutId, Vec<BindingDesc>>,
    programs: HashMap<ProgramId, ProgramEntry>,
    pipelines: HashMap<(ProgramId, LayoutId), wgpu::RenderPipeline>,
    frame: Option<FrameRecording>,
}

/// [`RenderDevice`] backed by a wgpu surface.
///
/// Draws issued between `begin_frame` and `present` are recorded and encoded
/// into a single render pass when the frame is presented. Uniform uploads go
/// through `Queue::write_buffer`, so every draw of a program within a frame
/// sees the last block written for it.
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    config: RefCell<wgpu::SurfaceConfiguration>,
    depth: RefCell<wgpu::TextureView>,
    ids: HandleAllocator,
    bound: BindState,
    resources: RefCell<Resources>,
}

impl WgpuDevice {
    /// Create a device presenting to `target` (typically an `Arc<Window>`).
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(target)
            .map_err(|e| RenderError::Init(format!("create surface: {e}")))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::Init("no compatible graphics adapter".into()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("boxlight_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| RenderError::Init(format!("request device: {e}")))?;

        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            tracing::error!("uncaptured wgpu error: {err}");
        }));

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::Init("surface is not supported by the adapter".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let depth = create_depth_view(&device, config.width, config.height);

        let adapter_info = adapter.get_info();
        tracing::info!(
            backend = adapter_info.backend.to_str(),
            adapter = %adapter_info.name,
            ?format,
            "wgpu device ready"
        );

        Ok(Self {
            surface,
            device,
            queue,
            adapter_info,
            config: RefCell::new(config),
            depth: RefCell::new(depth),
            ids: HandleAllocator::new(),
            bound: BindState::new(),
            resources: RefCell::new(Resources::default()),
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.borrow().format
    }

    /// Run `f` inside an error scope and return whatever error it raised.
    fn scoped<T>(
        &self,
        filter: wgpu::ErrorFilter,
        f: impl FnOnce() -> T,
    ) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(filter);
        let value = f();
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error)
    }

    fn compile(
        &self,
        label: &str,
        stage: ShaderStage,
        source: &str,
    ) -> Result<wgpu::ShaderModule, RenderError> {
        let module_label = format!("{label}_{stage}");
        let (module, error) = self.scoped(wgpu::ErrorFilter::Validation, || {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&module_label),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                })
        });
        match error {
            Some(err) => Err(RenderError::Compile {
                label: label.to_string(),
                stage,
                log: err.to_string(),
            }),
            None => Ok(module),
        }
    }

    fn build_pipeline(
        &self,
        label: &str,
        program: &ProgramEntry,
        buffers: &[wgpu::VertexBufferLayout<'_>],
    ) -> wgpu::RenderPipeline {
        let format = self.config.borrow().format;
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: None,
                    compilation_options: Default::default(),
                    buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: None,
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
    }

    /// Build the uniform buffer, its bind group and the pipeline layout.
    fn program_layout(
        &self,
        label: &str,
        block_size: u64,
    ) -> (wgpu::PipelineLayout, Option<UniformBlock>) {
        if block_size == 0 {
            let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[],
                push_constant_ranges: &[],
            });
            return (layout, None);
        }

        let group_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: block_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&group_layout],
            push_constant_ranges: &[],
        });
        (
            layout,
            Some(UniformBlock {
                buffer,
                bind_group,
                size: block_size,
            }),
        )
    }

    /// Create the pipeline for a program/layout pair unless it is cached.
    fn ensure_pipeline(
        &self,
        res: &mut Resources,
        program: ProgramId,
        layout: LayoutId,
    ) -> Result<(), RenderError> {
        if res.pipelines.contains_key(&(program, layout)) {
            return Ok(());
        }
        let entry = res
            .programs
            .get(&program)
            .ok_or_else(|| RenderError::Device(format!("unknown program {program:?}")))?;
        let bindings = res
            .layouts
            .get(&layout)
            .ok_or_else(|| RenderError::Device(format!("unknown vertex layout {layout:?}")))?;
        let groups = group_bindings(bindings).map_err(RenderError::Device)?;
        let buffers: Vec<_> = groups.iter().map(|(_, spec)| spec.layout()).collect();

        let label = format!("{}_{}", entry.label, layout.0);
        let (pipeline, error) = self.scoped(wgpu::ErrorFilter::Validation, || {
            self.build_pipeline(&label, entry, &buffers)
        });
        if let Some(err) = error {
            return Err(RenderError::Device(format!(
                "program `{}` cannot draw layout {layout:?}: {err}",
                entry.label
            )));
        }
        tracing::debug!(?program, ?layout, "pipeline created");
        res.pipelines.insert((program, layout), pipeline);
        Ok(())
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

/// Set pipeline, bind group and buffers for one recorded draw. Everything is
/// looked up before the pass is touched, so a failed draw leaves no state.
fn encode_draw(
    pass: &mut wgpu::RenderPass<'_>,
    res: &Resources,
    draw: &PendingDraw,
) -> Result<(), RenderError> {
    let pipeline = res
        .pipelines
        .get(&(draw.program, draw.layout))
        .ok_or_else(|| RenderError::Device("pipeline was invalidated mid-frame".into()))?;
    let program = res
        .programs
        .get(&draw.program)
        .ok_or_else(|| RenderError::Device(format!("program {:?} was destroyed", draw.program)))?;
    let bindings = res
        .layouts
        .get(&draw.layout)
        .ok_or_else(|| RenderError::Device(format!("layout {:?} was destroyed", draw.layout)))?;
    let index = res.buffers.get(&draw.index_buffer).ok_or_else(|| {
        RenderError::Device(format!("index buffer {:?} was destroyed", draw.index_buffer))
    })?;
    let vertex_buffers = group_bindings(bindings)
        .map_err(RenderError::Device)?
        .into_iter()
        .map(|(id, _)| {
            res.buffers
                .get(&id)
                .map(|b| &b.buffer)
                .ok_or_else(|| RenderError::Device(format!("vertex buffer {id:?} was destroyed")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    pass.set_pipeline(pipeline);
    if let Some(uniforms) = &program.uniforms {
        pass.set_bind_group(0, &uniforms.bind_group, &[]);
    }
    for (slot, buffer) in vertex_buffers.into_iter().enumerate() {
        pass.set_vertex_buffer(slot as u32, buffer.slice(..));
    }
    pass.set_index_buffer(index.buffer.slice(..), wgpu::IndexFormat::Uint32);
    pass.draw_indexed(0..draw.index_count, 0, 0..1);
    Ok(())
}

impl RenderDevice for WgpuDevice {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn create_buffer(&self, usage: BufferUsage, contents: &[u8]) -> Result<BufferId, RenderError> {
        let len = contents.len() as u64;
        let max = self.device.limits().max_buffer_size;
        if len > max {
            return Err(RenderError::Device(format!(
                "{len} bytes exceeds the maximum buffer size of {max}"
            )));
        }

        let id = self.ids.next_buffer();
        let label = format!("buffer_{}", id.0);
        let wgpu_usage = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
        };
        let (buffer, error) = self.scoped(wgpu::ErrorFilter::OutOfMemory, || {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&label),
                    contents,
                    usage: wgpu_usage,
                })
        });
        if let Some(err) = error {
            return Err(RenderError::Device(format!("allocate {len} bytes: {err}")));
        }
        self.resources
            .borrow_mut()
            .buffers
            .insert(id, BufferEntry { buffer, usage, len });
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) {
        self.resources.borrow_mut().buffers.remove(&id);
    }

    fn create_vertex_layout(&self) -> Result<LayoutId, RenderError> {
        let id = self.ids.next_layout();
        self.resources.borrow_mut().layouts.insert(id, Vec::new());
        Ok(id)
    }

    fn set_vertex_bindings(
        &self,
        id: LayoutId,
        bindings: &[BindingDesc],
    ) -> Result<(), RenderError> {
        let mut res = self.resources.borrow_mut();
        for b in bindings {
            match res.buffers.get(&b.buffer) {
                Some(entry) if entry.usage == BufferUsage::Vertex => {}
                Some(_) => {
                    return Err(RenderError::Device(format!(
                        "slot {} references non-vertex buffer {:?}",
                        b.slot, b.buffer
                    )));
                }
                None => {
                    return Err(RenderError::Device(format!(
                        "slot {} references unknown buffer {:?}",
                        b.slot, b.buffer
                    )));
                }
            }
        }
        group_bindings(bindings).map_err(RenderError::Device)?;
        let Some(entry) = res.layouts.get_mut(&id) else {
            return Err(RenderError::Device(format!("unknown vertex layout {id:?}")));
        };
        *entry = bindings.to_vec();
        res.pipelines.retain(|(_, layout), _| *layout != id);
        Ok(())
    }

    fn destroy_vertex_layout(&self, id: LayoutId) {
        self.bound.forget_layout(id);
        let mut res = self.resources.borrow_mut();
        res.layouts.remove(&id);
        res.pipelines.retain(|(_, layout), _| *layout != id);
    }

    fn bind_vertex_layout(&self, id: Option<LayoutId>) {
        self.bound.set_layout(id);
    }

    fn bound_vertex_layout(&self) -> Option<LayoutId> {
        self.bound.layout()
    }

    fn create_program(&self, desc: &ProgramDesc<'_>) -> Result<ProgramId, RenderError> {
        let vertex = self.compile(desc.label, ShaderStage::Vertex, desc.vertex_source)?;
        let fragment = self.compile(desc.label, ShaderStage::Fragment, desc.fragment_source)?;
        let (pipeline_layout, uniforms) =
            self.program_layout(desc.label, desc.interface.uniform_block_size() as u64);
        let entry = ProgramEntry {
            label: desc.label.to_string(),
            vertex,
            fragment,
            pipeline_layout,
            uniforms,
        };

        // Linking: the stages must agree with each other and with the
        // declared inputs and uniform block.
        let link_error = |log: String| RenderError::Link {
            label: desc.label.to_string(),
            log,
        };
        let probe: Vec<VertexBufferSpec> = packed_inputs(desc.interface).map_err(link_error)?;
        let buffers: Vec<_> = probe.iter().map(VertexBufferSpec::layout).collect();
        let (_, error) = self.scoped(wgpu::ErrorFilter::Validation, || {
            self.build_pipeline(desc.label, &entry, &buffers)
        });
        if let Some(err) = error {
            return Err(link_error(err.to_string()));
        }

        let id = self.ids.next_program();
        self.resources.borrow_mut().programs.insert(id, entry);
        Ok(id)
    }

    fn destroy_program(&self, id: ProgramId) {
        self.bound.forget_program(id);
        let mut res = self.resources.borrow_mut();
        res.programs.remove(&id);
        res.pipelines.retain(|(program, _), _| *program != id);
    }

    fn use_program(&self, id: Option<ProgramId>) {
        self.bound.set_program(id);
    }

    fn active_program(&self) -> Option<ProgramId> {
        self.bound.program()
    }

    fn write_uniforms(&self, id: ProgramId, data: &[u8]) -> Result<(), RenderError> {
        let res = self.resources.borrow();
        let entry = res
            .programs
            .get(&id)
            .ok_or_else(|| RenderError::Device(format!("unknown program {id:?}")))?;
        let Some(block) = &entry.uniforms else {
            return Err(RenderError::Device(format!(
                "program `{}` has no uniform block",
                entry.label
            )));
        };
        if data.len() as u64 != block.size {
            return Err(RenderError::Device(format!(
                "uniform block is {} bytes, got {}",
                block.size,
                data.len()
            )));
        }
        self.queue.write_buffer(&block.buffer, 0, data);
        Ok(())
    }

    fn begin_frame(&self, clear_color: [f32; 4]) -> Result<(), RenderError> {
        let mut res = self.resources.borrow_mut();
        if res.frame.is_some() {
            return Err(RenderError::Device("frame already in progress".into()));
        }
        res.frame = Some(FrameRecording {
            clear_color,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn draw_indexed(&self, index_buffer: BufferId, index_count: u32) -> Result<(), RenderError> {
        let layout = self
            .bound
            .layout()
            .ok_or_else(|| RenderError::Device("draw with no vertex layout bound".into()))?;
        let program = self
            .bound
            .program()
            .ok_or_else(|| RenderError::Device("draw with no active program".into()))?;

        let mut res = self.resources.borrow_mut();
        if res.frame.is_none() {
            return Err(RenderError::Device("draw outside of a frame".into()));
        }
        match res.buffers.get(&index_buffer) {
            Some(entry) if entry.usage != BufferUsage::Index => {
                return Err(RenderError::Device(format!(
                    "buffer {index_buffer:?} is not an index buffer"
                )));
            }
            Some(entry) if u64::from(index_count) * 4 > entry.len => {
                return Err(RenderError::Device(format!(
                    "{index_count} indices overrun a {}-byte index buffer",
                    entry.len
                )));
            }
            Some(_) => {}
            None => {
                return Err(RenderError::Device(format!(
                    "unknown index buffer {index_buffer:?}"
                )));
            }
        }
        self.ensure_pipeline(&mut res, program, layout)?;

        if let Some(frame) = res.frame.as_mut() {
            frame.draws.push(PendingDraw {
                program,
                layout,
                index_buffer,
                index_count,
            });
        }
        Ok(())
    }

    fn present(&self) -> Result<(), RenderError> {
        let frame = self
            .resources
            .borrow_mut()
            .frame
            .take()
            .ok_or_else(|| RenderError::Device("present without begin_frame".into()))?;

        let output = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config.borrow());
                return Err(RenderError::Device(
                    "surface lost; reconfigured and dropped the frame".into(),
                ));
            }
            Err(e) => return Err(RenderError::Device(format!("acquire surface texture: {e}"))),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        {
            let res = self.resources.borrow();
            let depth = self.depth.borrow();
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color(frame.clear_color)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &*depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for (index, draw) in frame.draws.iter().enumerate() {
                if let Err(err) = encode_draw(&mut pass, &res, draw) {
                    tracing::error!(draw = index, "draw dropped: {err}");
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        tracing::trace!(draws = frame.draws.len(), "frame presented");
        Ok(())
    }

    fn resize(&self, width: u32, height: u32) {
        let mut config = self.config.borrow_mut();
        config.width = width.max(1);
        config.height = height.max(1);
        self.surface.configure(&self.device, &config);
        *self.depth.borrow_mut() = create_depth_view(&self.device, config.width, config.height);
    }
}
