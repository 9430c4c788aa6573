use std::collections::{BTreeMap, HashMap};

use super::{
    BackendError, BackendLimits, ContextEvent, ContextEvents, DrawCall, DrawMode, Filter,
    GraphicsBackend, ProgramDesc, ProgramId, Repeat, TextureDesc, TextureId, Topology,
};

/// A draw as seen by the [`HeadlessBackend`], with the state it sampled.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub program: ProgramId,
    pub mode: DrawMode,
    pub topology: Topology,
    pub vertex_count: u32,
    pub stride: u32,
    pub vertices: Vec<u8>,
    /// Texture sampled by each of the program's sampler groups, in group order.
    pub textures: Vec<Option<TextureId>>,
}

impl RecordedDraw {
    /// Reads the `f32` at `float_index` of vertex `vertex`.
    pub fn float(&self, vertex: usize, float_index: usize) -> f32 {
        f32::from_bits(self.word(vertex, float_index))
    }

    /// Reads the raw 32-bit word at `float_index` of vertex `vertex`.
    pub fn word(&self, vertex: usize, float_index: usize) -> u32 {
        let at = vertex * self.stride as usize + float_index * 4;
        let v = &self.vertices;
        u32::from_le_bytes([v[at], v[at + 1], v[at + 2], v[at + 3]])
    }
}

/// Every call made against a [`HeadlessBackend`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    CreateProgram { program: ProgramId, label: String },
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    WriteUniform { program: ProgramId, binding: u32, offset: u32, bytes: Vec<u8> },
    SetSamplerUnit { program: ProgramId, group: u32, unit: u32 },
    CreateTexture { texture: TextureId, width: u32, height: u32, filter: Filter, repeat: Repeat },
    UpdateTexture { texture: TextureId, width: u32, height: u32 },
    DeleteTexture(TextureId),
    BindTexture { unit: u32, texture: Option<TextureId> },
    Draw(RecordedDraw),
}

#[derive(Debug, Default)]
struct HeadlessProgram {
    blocks: HashMap<u32, Vec<u8>>,
    sampler_units: BTreeMap<u32, u32>,
}

/// Backend that executes nothing and records everything.
///
/// It enforces the same state rules as the GPU backend (known handles, unit
/// range, uniform bounds, quad topology) so batching logic can be verified
/// without a device.
#[derive(Debug)]
pub struct HeadlessBackend {
    limits: BackendLimits,
    events: ContextEvents,
    lost: bool,
    next_id: u32,
    programs: HashMap<ProgramId, HeadlessProgram>,
    textures: HashMap<TextureId, (u32, u32)>,
    units: Vec<Option<TextureId>>,
    current: Option<ProgramId>,
    commands: Vec<BackendCommand>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::with_limits(BackendLimits::default())
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: BackendLimits) -> Self {
        Self {
            limits,
            events: ContextEvents::new(),
            lost: false,
            next_id: 1,
            programs: HashMap::new(),
            textures: HashMap::new(),
            units: vec![None; limits.max_texture_units as usize],
            current: None,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn draws(&self) -> impl Iterator<Item = &RecordedDraw> {
        self.commands.iter().filter_map(|c| match c {
            BackendCommand::Draw(d) => Some(d),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.draws().count()
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.current
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn unit(&self, unit: u32) -> Option<TextureId> {
        self.units.get(unit as usize).copied().flatten()
    }

    /// Current contents of a program's uniform block.
    pub fn uniform_block(&self, program: ProgramId, binding: u32) -> Option<&[u8]> {
        self.programs
            .get(&program)?
            .blocks
            .get(&binding)
            .map(Vec::as_slice)
    }

    /// Simulates a device loss: every object is dropped and `Lost` is broadcast.
    pub fn lose_context(&mut self) {
        self.lost = true;
        self.programs.clear();
        self.textures.clear();
        self.units.iter_mut().for_each(|u| *u = None);
        self.current = None;
        self.events.broadcast(ContextEvent::Lost {
            reason: "simulated context loss".to_string(),
        });
    }

    pub fn restore_context(&mut self) {
        self.lost = false;
        self.events.broadcast(ContextEvent::Restored);
    }

    fn ensure_live(&self) -> Result<(), BackendError> {
        if self.lost { Err(BackendError::ContextLost) } else { Ok(()) }
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn limits(&self) -> BackendLimits {
        self.limits
    }

    fn context_events(&self) -> &ContextEvents {
        &self.events
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, BackendError> {
        self.ensure_live()?;
        let program = ProgramId::from_raw(self.alloc_id());

        let mut state = HeadlessProgram::default();
        for block in desc.uniform_blocks {
            state.blocks.insert(block.binding, vec![0; block.size as usize]);
        }
        for &group in desc.sampler_groups {
            state.sampler_units.insert(group, 0);
        }
        self.programs.insert(program, state);

        self.commands.push(BackendCommand::CreateProgram {
            program,
            label: desc.label.to_string(),
        });
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_some() {
            if self.current == Some(program) {
                self.current = None;
            }
            self.commands.push(BackendCommand::DeleteProgram(program));
        }
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), BackendError> {
        self.ensure_live()?;
        if !self.programs.contains_key(&program) {
            return Err(BackendError::UnknownProgram(program));
        }
        self.current = Some(program);
        self.commands.push(BackendCommand::UseProgram(program));
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
        let out_of_bounds = BackendError::UniformOutOfBounds {
            binding,
            offset,
            len: bytes.len(),
        };
        let block = state.blocks.get_mut(&binding).ok_or(out_of_bounds.clone())?;
        let start = offset as usize;
        let end = start + bytes.len();
        if end > block.len() {
            return Err(out_of_bounds);
        }
        block[start..end].copy_from_slice(bytes);

        self.commands.push(BackendCommand::WriteUniform {
            program,
            binding,
            offset,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn set_sampler_unit(
        &mut self,
        program: ProgramId,
        group: u32,
        unit: u32,
    ) -> Result<(), BackendError> {
        self.ensure_live()?;
        if unit >= self.limits.max_texture_units {
            return Err(BackendError::TextureUnitOutOfRange {
                unit,
                max: self.limits.max_texture_units,
            });
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
        self.commands.push(BackendCommand::SetSamplerUnit { program, group, unit });
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, BackendError> {
        self.ensure_live()?;
        desc.validate(&self.limits)?;
        let texture = TextureId::from_raw(self.alloc_id());
        self.textures.insert(texture, (desc.width, desc.height));
        self.commands.push(BackendCommand::CreateTexture {
            texture,
            width: desc.width,
            height: desc.height,
            filter: desc.filter,
            repeat: desc.repeat,
        });
        Ok(texture)
    }

    fn update_texture(
        &mut self,
        texture: TextureId,
        desc: &TextureDesc<'_>,
    ) -> Result<(), BackendError> {
        self.ensure_live()?;
        desc.validate(&self.limits)?;
        let size = self
            .textures
            .get_mut(&texture)
            .ok_or(BackendError::UnknownTexture(texture))?;
        *size = (desc.width, desc.height);
        self.commands.push(BackendCommand::UpdateTexture {
            texture,
            width: desc.width,
            height: desc.height,
        });
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() {
            for unit in self.units.iter_mut().filter(|u| **u == Some(texture)) {
                *unit = None;
            }
            self.commands.push(BackendCommand::DeleteTexture(texture));
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) -> Result<(), BackendError> {
        self.ensure_live()?;
        let max = self.limits.max_texture_units;
        let slot = self
            .units
            .get_mut(unit as usize)
            .ok_or(BackendError::TextureUnitOutOfRange { unit, max })?;
        if let Some(t) = texture {
            if !self.textures.contains_key(&t) {
                return Err(BackendError::UnknownTexture(t));
            }
        }
        *slot = texture;
        self.commands.push(BackendCommand::BindTexture { unit, texture });
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError> {
        self.ensure_live()?;
        let program = self.current.ok_or(BackendError::NoProgramBound)?;

        if call.topology == Topology::Quads
            && (call.mode != DrawMode::Triangles || call.vertex_count % 4 != 0)
        {
            return Err(BackendError::InvalidDraw {
                vertex_count: call.vertex_count,
                mode: "quad",
            });
        }

        let len = call.vertex_count as usize * call.input.stride as usize;
        if call.vertices.len() < len {
            return Err(BackendError::InvalidDraw {
                vertex_count: call.vertex_count,
                mode: "buffer",
            });
        }
        let textures = self
            .programs
            .get(&program)
            .ok_or(BackendError::UnknownProgram(program))?
            .sampler_units
            .values()
            .map(|&unit| self.unit(unit))
            .collect();

        self.commands.push(BackendCommand::Draw(RecordedDraw {
            program,
            mode: call.mode,
            topology: call.topology,
            vertex_count: call.vertex_count,
            stride: call.input.stride,
            vertices: call.vertices[..len].to_vec(),
            textures,
        }));
        Ok(())
    }
}
