//! wgpu implementation of [`GraphicsBackend`].
//!
//! Draws are recorded, not executed: each `draw` snapshots the program's
//! uniform blocks and the textures its sampler groups read, appends its
//! vertices to the frame's staging data, and resolves a pipeline for its
//! vertex format and topology. [`WgpuBackend::render`] uploads the staging
//! data once and replays every draw into a single render pass.

mod format;

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{
    BackendError, BackendLimits, ContextEvent, ContextEvents, DrawCall, DrawMode, GraphicsBackend,
    ProgramDesc, ProgramId, TextureDesc, TextureId, Topology, UniformBlockDesc, VertexInput,
};
use format::{align_to, draw_indices, premultiplied_blend, primitive_topology, sampler_descriptor, vertex_format};

/// Uniform layout of one program (bind group 0, dynamic offsets).
#[derive(Debug)]
struct UniformLayout {
    layout: wgpu::BindGroupLayout,
    /// `(binding, size)` in binding order; also the dynamic offset order.
    blocks: Vec<(u32, NonZeroU64)>,
}

#[derive(Debug)]
struct GpuProgram {
    label: String,
    vertex: wgpu::ShaderModule,
    vertex_entry: String,
    fragment: wgpu::ShaderModule,
    fragment_entry: String,
    pipeline_layout: wgpu::PipelineLayout,
    uniforms: Arc<UniformLayout>,
    /// CPU copy of each uniform block, keyed by binding.
    blocks: BTreeMap<u32, Vec<u8>>,
    /// Texture unit read by each sampler group.
    sampler_units: BTreeMap<u32, u32>,
}

#[derive(Debug)]
struct GpuTexture {
    bind_group: Arc<wgpu::BindGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    input: VertexInput,
    topology: wgpu::PrimitiveTopology,
}

#[derive(Debug)]
enum Elements {
    Vertices(Range<u32>),
    Indices(Range<u32>),
}

#[derive(Debug)]
struct RecordedPass {
    program: ProgramId,
    pipeline: Arc<wgpu::RenderPipeline>,
    uniforms: Arc<UniformLayout>,
    uniform_offsets: Vec<u32>,
    textures: Vec<Arc<wgpu::BindGroup>>,
    vertex_bytes: Range<u64>,
    elements: Elements,
}

/// Staging data of the frame being recorded.
#[derive(Debug, Default)]
struct Frame {
    vertices: Vec<u8>,
    indices: Vec<u32>,
    uniforms: Vec<u8>,
    draws: Vec<RecordedPass>,
}

impl Frame {
    fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.uniforms.clear();
        self.draws.clear();
    }
}

/// A GPU buffer that grows to fit whatever is uploaded into it.
#[derive(Debug)]
struct GrowBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
}

impl GrowBuffer {
    fn new(label: &'static str, usage: wgpu::BufferUsages) -> Self {
        Self {
            label,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            buffer: None,
            capacity: 0,
        }
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let len = align_to(data.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT);
        if self.buffer.is_none() || len > self.capacity {
            let capacity = len.next_power_of_two().max(4096);
            self.buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(self.label),
                size: capacity,
                usage: self.usage,
                mapped_at_creation: false,
            }));
            self.capacity = capacity;
        }
        if let Some(buffer) = self.buffer.as_ref() {
            if len == data.len() as u64 {
                queue.write_buffer(buffer, 0, data);
            } else {
                let mut padded = data.to_vec();
                padded.resize(len as usize, 0);
                queue.write_buffer(buffer, 0, &padded);
            }
        }
    }
}

/// [`GraphicsBackend`] over a wgpu device, rendering into targets of one format.
#[derive(Debug)]
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,
    limits: BackendLimits,
    uniform_alignment: u64,
    events: ContextEvents,
    lost: Arc<AtomicBool>,
    next_id: u32,
    texture_layout: wgpu::BindGroupLayout,
    programs: HashMap<ProgramId, GpuProgram>,
    textures: HashMap<TextureId, GpuTexture>,
    units: Vec<Option<TextureId>>,
    current: Option<ProgramId>,
    pipelines: HashMap<PipelineKey, Arc<wgpu::RenderPipeline>>,
    frame: Frame,
    vertex_buffer: GrowBuffer,
    index_buffer: GrowBuffer,
    uniform_buffer: GrowBuffer,
    warned_missing_texture: bool,
}

impl WgpuBackend {
    /// Wraps a device. Device loss is reported on [`GraphicsBackend::context_events`].
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, target_format: wgpu::TextureFormat) -> Self {
        let device_limits = device.limits();
        let limits = BackendLimits {
            max_texture_units: device_limits.max_sampled_textures_per_shader_stage,
            max_texture_dimension: device_limits.max_texture_dimension_2d,
            supports_f16: device.features().contains(wgpu::Features::SHADER_F16),
        };

        let events = ContextEvents::new();
        let lost = Arc::new(AtomicBool::new(false));
        {
            let events = events.clone();
            let lost = Arc::clone(&lost);
            device.set_device_lost_callback(move |reason, message| {
                log::error!("wgpu device lost ({reason:?}): {message}");
                lost.store(true, Ordering::SeqCst);
                events.broadcast(ContextEvent::Lost { reason: message });
            });
        }

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        log::debug!(
            "wgpu backend ready: {} texture units, max texture {}, f16 {}",
            limits.max_texture_units,
            limits.max_texture_dimension,
            limits.supports_f16
        );

        Self {
            uniform_alignment: device_limits.min_uniform_buffer_offset_alignment as u64,
            device,
            queue,
            target_format,
            limits,
            events,
            lost,
            next_id: 1,
            texture_layout,
            programs: HashMap::new(),
            textures: HashMap::new(),
            units: vec![None; limits.max_texture_units as usize],
            current: None,
            pipelines: HashMap::new(),
            frame: Frame::default(),
            vertex_buffer: GrowBuffer::new("kiln vertex buffer", wgpu::BufferUsages::VERTEX),
            index_buffer: GrowBuffer::new("kiln index buffer", wgpu::BufferUsages::INDEX),
            uniform_buffer: GrowBuffer::new("kiln uniform buffer", wgpu::BufferUsages::UNIFORM),
            warned_missing_texture: false,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    /// Draws recorded since the last [`Self::render`].
    pub fn pending_draws(&self) -> usize {
        self.frame.draws.len()
    }

    /// Drops everything recorded this frame.
    pub fn discard_frame(&mut self) {
        self.frame.clear();
    }

    fn ensure_live(&self) -> Result<(), BackendError> {
        if self.lost.load(Ordering::SeqCst) { Err(BackendError::ContextLost) } else { Ok(()) }
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn uniform_layout(&self, label: &str, blocks: &[UniformBlockDesc]) -> Result<UniformLayout, BackendError> {
        let mut sorted: Vec<&UniformBlockDesc> = blocks.iter().collect();
        sorted.sort_by_key(|b| b.binding);

        let mut entries = Vec::with_capacity(sorted.len());
        let mut sizes = Vec::with_capacity(sorted.len());
        for block in sorted {
            let size = NonZeroU64::new(block.size as u64).ok_or_else(|| {
                BackendError::ProgramCreation(format!("`{label}`: uniform block {} is empty", block.binding))
            })?;
            let mut visibility = wgpu::ShaderStages::NONE;
            if block.vertex {
                visibility |= wgpu::ShaderStages::VERTEX;
            }
            if block.fragment {
                visibility |= wgpu::ShaderStages::FRAGMENT;
            }
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: Some(size),
                },
                count: None,
            });
            sizes.push((block.binding, size));
        }

        let layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln uniform bgl"),
            entries: &entries,
        });
        Ok(UniformLayout { layout, blocks: sizes })
    }

    fn pipeline(&mut self, key: PipelineKey) -> Result<Arc<wgpu::RenderPipeline>, BackendError> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(Arc::clone(pipeline));
        }
        let program = self
            .programs
            .get(&key.program)
            .ok_or(BackendError::UnknownProgram(key.program))?;

        let attributes = key
            .input
            .attributes
            .iter()
            .map(|a| {
                let format = vertex_format(a.size, a.component_type, a.normalized).ok_or(
                    BackendError::UnsupportedVertexFormat {
                        size: a.size,
                        component_type: a.component_type,
                        normalized: a.normalized,
                    },
                )?;
                Ok(wgpu::VertexAttribute {
                    format,
                    offset: a.byte_offset as u64,
                    shader_location: a.location,
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&program.label),
            layout: Some(&program.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.vertex,
                entry_point: Some(&program.vertex_entry),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: key.input.stride as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.fragment,
                entry_point: Some(&program.fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.target_format,
                    blend: Some(premultiplied_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: key.topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        log::debug!("pipeline built for `{}` ({:?})", program.label, key.topology);

        let pipeline = Arc::new(pipeline);
        self.pipelines.insert(key, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    fn texture_bind_group(&self, texture: &wgpu::Texture, desc: &TextureDesc<'_>) -> wgpu::BindGroup {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self.device.create_sampler(&sampler_descriptor(desc.filter, desc.repeat));
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: desc.label,
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        })
    }

    fn upload(&self, desc: &TextureDesc<'_>) -> Result<GpuTexture, BackendError> {
        desc.validate(&self.limits)?;
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            desc.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * 4),
                rows_per_image: Some(desc.height),
            },
            size,
        );
        let bind_group = Arc::new(self.texture_bind_group(&texture, desc));
        Ok(GpuTexture { bind_group })
    }

    /// Replays the recorded draws into one render pass on `view`, then
    /// starts a new frame. With `clear`, the target is cleared first (even
    /// when nothing was drawn).
    pub fn render(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, clear: Option<wgpu::Color>) {
        if self.frame.draws.is_empty() && clear.is_none() {
            return;
        }

        self.vertex_buffer.upload(&self.device, &self.queue, &self.frame.vertices);
        self.index_buffer
            .upload(&self.device, &self.queue, bytemuck::cast_slice(&self.frame.indices));
        self.uniform_buffer.upload(&self.device, &self.queue, &self.frame.uniforms);

        // One uniform bind group per program per frame; draws differ only by offsets.
        let mut uniform_groups: HashMap<ProgramId, wgpu::BindGroup> = HashMap::new();
        for draw in &self.frame.draws {
            if uniform_groups.contains_key(&draw.program) {
                continue;
            }
            let entries: Vec<wgpu::BindGroupEntry<'_>> = match self.uniform_buffer.buffer.as_ref() {
                Some(buffer) => draw
                    .uniforms
                    .blocks
                    .iter()
                    .map(|&(binding, size)| wgpu::BindGroupEntry {
                        binding,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer,
                            offset: 0,
                            size: Some(size),
                        }),
                    })
                    .collect(),
                None => Vec::new(),
            };
            if entries.len() != draw.uniforms.blocks.len() {
                continue;
            }
            let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("kiln uniform bind group"),
                layout: &draw.uniforms.layout,
                entries: &entries,
            });
            uniform_groups.insert(draw.program, group);
        }

        let load = match clear {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiln compositor pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if let Some(vertices) = self.vertex_buffer.buffer.as_ref() {
                if let Some(indices) = self.index_buffer.buffer.as_ref() {
                    rpass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                }
                for draw in &self.frame.draws {
                    let Some(uniforms) = uniform_groups.get(&draw.program) else { continue };
                    rpass.set_pipeline(&draw.pipeline);
                    rpass.set_bind_group(0, uniforms, &draw.uniform_offsets);
                    for (i, textures) in draw.textures.iter().enumerate() {
                        rpass.set_bind_group(i as u32 + 1, textures.as_ref(), &[]);
                    }
                    rpass.set_vertex_buffer(0, vertices.slice(draw.vertex_bytes.clone()));
                    match &draw.elements {
                        Elements::Vertices(range) => rpass.draw(range.clone(), 0..1),
                        Elements::Indices(range) => rpass.draw_indexed(range.clone(), 0, 0..1),
                    }
                }
            }
        }

        log::trace!("rendered {} draws", self.frame.draws.len());
        self.frame.clear();
    }
}

impl GraphicsBackend for WgpuBackend {
    fn limits(&self) -> BackendLimits {
        self.limits
    }

    fn context_events(&self) -> &ContextEvents {
        &self.events
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, BackendError> {
        self.ensure_live()?;
        let uniforms = self.uniform_layout(desc.label, desc.uniform_blocks)?;

        let module = |stage: &str, source: &str| -> Result<wgpu::ShaderModule, BackendError> {
            let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{} {stage}", desc.label)),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            match pollster::block_on(scope.pop()) {
                None => Ok(module),
                Some(err) => Err(BackendError::ProgramCreation(format!(
                    "{} {stage} module rejected by the device: {err}",
                    desc.label
                ))),
            }
        };
        let vertex = module("vertex", desc.vertex_source)?;
        let fragment = module("fragment", desc.fragment_source)?;

        let mut group_layouts = vec![&uniforms.layout];
        group_layouts.extend(desc.sampler_groups.iter().map(|_| &self.texture_layout));
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &group_layouts,
            immediate_size: 0,
        });

        let program = GpuProgram {
            label: desc.label.to_string(),
            vertex,
            vertex_entry: desc.vertex_entry.to_string(),
            fragment,
            fragment_entry: desc.fragment_entry.to_string(),
            pipeline_layout,
            blocks: desc
                .uniform_blocks
                .iter()
                .map(|b| (b.binding, vec![0; b.size as usize]))
                .collect(),
            uniforms: Arc::new(uniforms),
            sampler_units: desc.sampler_groups.iter().map(|&g| (g, 0)).collect(),
        };
        let id = ProgramId::from_raw(self.alloc_id());
        self.programs.insert(id, program);
        log::debug!("program `{}` created as {id:?}", desc.label);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_some() {
            self.pipelines.retain(|key, _| key.program != program);
            if self.current == Some(program) {
                self.current = None;
            }
        }
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), BackendError> {
        self.ensure_live()?;
        if !self.programs.contains_key(&program) {
            return Err(BackendError::UnknownProgram(program));
        }
        self.current = Some(program);
        Ok(())
    }

    fn write_uniform(
        &mut self,
        program: ProgramId,
        binding: u32,
        offset: u32,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        self.ensure_live()?;
        let state = self
            .programs
            .get_mut(&program)
            .ok_or(BackendError::UnknownProgram(program))?;
        let out_of_bounds = || BackendError::UniformOutOfBounds {
            binding,
            offset,
            len: bytes.len(),
        };
        let block = state.blocks.get_mut(&binding).ok_or_else(out_of_bounds)?;
        let dst = block
            .get_mut(offset as usize..offset as usize + bytes.len())
            .ok_or_else(out_of_bounds)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    fn set_sampler_unit(&mut self, program: ProgramId, group: u32, unit: u32) -> Result<(), BackendError> {
        self.ensure_live()?;
        let max = self.limits.max_texture_units;
        if unit >= max {
            return Err(BackendError::TextureUnitOutOfRange { unit, max });
        }
        let state = self
            .programs
            .get_mut(&program)
            .ok_or(BackendError::UnknownProgram(program))?;
        let slot = state
            .sampler_units
            .get_mut(&group)
            .ok_or(BackendError::UnknownSamplerGroup(group))?;
        *slot = unit;
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, BackendError> {
        self.ensure_live()?;
        let texture = self.upload(desc)?;
        let id = TextureId::from_raw(self.alloc_id());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn update_texture(&mut self, texture: TextureId, desc: &TextureDesc<'_>) -> Result<(), BackendError> {
        self.ensure_live()?;
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::UnknownTexture(texture));
        }
        // Draws already recorded keep the previous texture object.
        let replacement = self.upload(desc)?;
        self.textures.insert(texture, replacement);
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() {
            for unit in self.units.iter_mut().filter(|u| **u == Some(texture)) {
                *unit = None;
            }
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) -> Result<(), BackendError> {
        self.ensure_live()?;
        let max = self.limits.max_texture_units;
        if let Some(t) = texture {
            if !self.textures.contains_key(&t) {
                return Err(BackendError::UnknownTexture(t));
            }
        }
        let slot = self
            .units
            .get_mut(unit as usize)
            .ok_or(BackendError::TextureUnitOutOfRange { unit, max })?;
        *slot = texture;
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError> {
        self.ensure_live()?;
        let program_id = self.current.ok_or(BackendError::NoProgramBound)?;

        if call.topology == Topology::Quads && (call.mode != DrawMode::Triangles || call.vertex_count % 4 != 0) {
            return Err(BackendError::InvalidDraw {
                vertex_count: call.vertex_count,
                mode: "quad",
            });
        }
        let stride = call.input.stride as usize;
        let len = call.vertex_count as usize * stride;
        let vertices = call.vertices.get(..len).ok_or(BackendError::InvalidDraw {
            vertex_count: call.vertex_count,
            mode: "buffer",
        })?;
        if vertices.is_empty() {
            return Ok(());
        }

        let program = self
            .programs
            .get(&program_id)
            .ok_or(BackendError::UnknownProgram(program_id))?;

        let mut textures = Vec::with_capacity(program.sampler_units.len());
        for &unit in program.sampler_units.values() {
            let bound = self
                .units
                .get(unit as usize)
                .copied()
                .flatten()
                .and_then(|t| self.textures.get(&t));
            match bound {
                Some(texture) => textures.push(Arc::clone(&texture.bind_group)),
                None => {
                    if !self.warned_missing_texture {
                        log::warn!("`{}` samples empty texture unit {unit}; draw skipped", program.label);
                        self.warned_missing_texture = true;
                    }
                    return Ok(());
                }
            }
        }

        let uniforms = Arc::clone(&program.uniforms);
        let mut uniform_offsets = Vec::with_capacity(uniforms.blocks.len());
        for (binding, _) in &uniforms.blocks {
            let Some(block) = program.blocks.get(binding) else { continue };
            let offset = align_to(self.frame.uniforms.len() as u64, self.uniform_alignment);
            self.frame.uniforms.resize(offset as usize, 0);
            self.frame.uniforms.extend_from_slice(block);
            uniform_offsets.push(offset as u32);
        }

        let pipeline = self.pipeline(PipelineKey {
            program: program_id,
            input: call.input.clone(),
            topology: primitive_topology(call.mode),
        })?;

        let start = self.frame.vertices.len() as u64;
        self.frame.vertices.extend_from_slice(vertices);
        let mut vertex_count = call.vertex_count;
        if call.mode == DrawMode::LineLoop && vertex_count > 1 {
            self.frame.vertices.extend_from_slice(&vertices[..stride]);
            vertex_count += 1;
        }
        let vertex_bytes = start..self.frame.vertices.len() as u64;

        let elements = match draw_indices(call.mode, call.topology, vertex_count) {
            Some(indices) => {
                let first = self.frame.indices.len() as u32;
                self.frame.indices.extend_from_slice(&indices);
                Elements::Indices(first..self.frame.indices.len() as u32)
            }
            None => Elements::Vertices(0..vertex_count),
        };

        self.frame.draws.push(RecordedPass {
            program: program_id,
            pipeline,
            uniforms,
            uniform_offsets,
            textures,
            vertex_bytes,
            elements,
        });
        Ok(())
    }
}
