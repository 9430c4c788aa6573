use std::collections::HashMap;

use super::reflect::{self, UniformSlot};
use super::uniform::{self, UniformValue};
use super::{Precision, ShaderError, Stage, preprocess};
use crate::gfx::{ContextEvent, ContextEvents, ContextSubscription, GraphicsBackend, ProgramDesc, ProgramId};

/// A linked vertex + fragment program and its reflected interface.
///
/// Once destroyed (explicitly or by context loss) a program stays destroyed;
/// build a new one to recover.
#[derive(Debug)]
pub struct ShaderProgram {
    label: String,
    program: Option<ProgramId>,
    precision: Precision,
    attributes: HashMap<String, u32>,
    uniforms: HashMap<String, UniformSlot>,
    vertex_source: String,
    fragment_source: String,
    subscription: Option<ContextSubscription>,
}

impl ShaderProgram {
    /// Compiles, links and uploads a program.
    ///
    /// `precision` defaults to the highest the backend supports. The new
    /// program is subscribed to the backend's context events.
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        label: impl Into<String>,
        vertex: &str,
        fragment: &str,
        precision: Option<Precision>,
    ) -> Result<Self, ShaderError> {
        let label = label.into();
        let limits = backend.limits();

        let precision = match precision {
            Some(p) if !p.is_supported(&limits) => {
                return Err(ShaderError::UnsupportedPrecision { shader: label, precision: p });
            }
            Some(p) => p,
            None => Precision::highest(&limits),
        };

        let vertex_source = preprocess::prepare(vertex, precision);
        let fragment_source = preprocess::prepare(fragment, precision);

        let compile = |stage, source: &str| {
            reflect::compile(stage, source, &limits).map_err(|log| ShaderError::Compile {
                shader: label.clone(),
                stage,
                log,
            })
        };
        let vs = compile(Stage::Vertex, &vertex_source)?;
        let fs = compile(Stage::Fragment, &fragment_source)?;
        let linked = reflect::link(&vs, &fs).map_err(|log| ShaderError::Link {
            shader: label.clone(),
            log,
        })?;

        let program = backend.create_program(&ProgramDesc {
            label: &label,
            vertex_source: &vertex_source,
            vertex_entry: &vs.entry,
            fragment_source: &fragment_source,
            fragment_entry: &fs.entry,
            uniform_blocks: &linked.blocks,
            sampler_groups: &linked.sampler_groups,
        })?;

        log::debug!(
            "shader `{label}` linked ({:?}): {} attributes, {} uniforms",
            precision,
            linked.attributes.len(),
            linked.uniforms.len()
        );

        let subscription = Some(backend.context_events().subscribe());
        Ok(Self {
            label,
            program: Some(program),
            precision,
            attributes: linked.attributes,
            uniforms: linked.uniforms,
            vertex_source,
            fragment_source,
            subscription,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn is_destroyed(&self) -> bool {
        self.program.is_none()
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Preprocessed vertex source as handed to the backend.
    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    /// Location of a vertex input, or `None` when the program has no such input.
    pub fn attrib_location(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.keys().map(String::as_str)
    }

    fn live_id(&self) -> Result<ProgramId, ShaderError> {
        self.program.ok_or_else(|| ShaderError::Destroyed(self.label.clone()))
    }

    /// Makes this program current. Does not flush anything.
    pub fn bind<B: GraphicsBackend>(&self, backend: &mut B) -> Result<(), ShaderError> {
        backend.use_program(self.live_id()?)?;
        Ok(())
    }

    /// Writes a uniform. Sampler uniforms take the texture unit as an integer.
    pub fn set_uniform<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), ShaderError> {
        let program = self.live_id()?;
        let value = value.into();
        let slot = self.uniforms.get(name).ok_or_else(|| ShaderError::UnknownUniform {
            name: name.to_string(),
            shader: self.label.clone(),
        })?;

        match slot {
            UniformSlot::Sampler { group } => {
                let unit = value.as_unit().ok_or_else(|| ShaderError::UniformTypeMismatch {
                    name: name.to_string(),
                    shader: self.label.clone(),
                    expected: "a sampler (texture unit)".to_string(),
                    found: value.kind_name(),
                })?;
                backend.set_sampler_unit(program, *group, unit)?;
            }
            UniformSlot::Block { binding, offset, kind } => {
                let bytes = uniform::encode(kind, &value).ok_or_else(|| {
                    ShaderError::UniformTypeMismatch {
                        name: name.to_string(),
                        shader: self.label.clone(),
                        expected: kind.to_string(),
                        found: value.kind_name(),
                    }
                })?;
                backend.write_uniform(program, *binding, *offset, &bytes)?;
            }
        }
        Ok(())
    }

    /// Releases the backend program. Safe to call more than once.
    pub fn destroy<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let Some(program) = self.program.take() {
            backend.delete_program(program);
            log::debug!("shader `{}` destroyed", self.label);
        }
    }

    /// Replaces the context subscription (e.g. after switching backends).
    pub fn subscribe(&mut self, events: &ContextEvents) {
        self.subscription = Some(events.subscribe());
    }

    /// Drains context events; on loss the program is destroyed. Returns
    /// whether the program is destroyed afterwards.
    pub fn poll_context<B: GraphicsBackend>(&mut self, backend: &mut B) -> bool {
        let lost = self
            .subscription
            .as_ref()
            .map(|sub| sub.drain().iter().any(|e| matches!(e, ContextEvent::Lost { .. })))
            .unwrap_or(false);
        if lost {
            log::debug!("shader `{}` released after context loss", self.label);
            self.destroy(backend);
        }
        self.is_destroyed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{BackendCommand, BackendError, BackendLimits, HeadlessBackend};

    const VS: &str = "
        // transforms the vertex
        @group(0) @binding(0) var<uniform> uProjectionMatrix: mat4x4<f32>;
        struct Out { @builtin(position) pos: vec4<f32>, @location(0) color: vec4<f32> };
        @vertex
        fn main(@location(0) aVertex: vec2<f32>, @location(1) aColor: vec4<f32>) -> Out {
            var o: Out;
            o.pos = uProjectionMatrix * vec4<f32>(aVertex, 0.0, 1.0);
            o.color = aColor;
            return o;
        }";

    const FS: &str = "
        struct Params { uTint: vec4<f32>, uAlpha: f32 };
        @group(0) @binding(1) var<uniform> params: Params;
        @fragment
        fn main(@location(0) color: vec4<f32>) -> @location(0) vec4<f32> {
            let alpha = pfloat(params.uAlpha);
            return color * params.uTint * f32(alpha);
        }";

    fn program(backend: &mut HeadlessBackend) -> ShaderProgram {
        ShaderProgram::new(backend, "test", VS, FS, None).unwrap()
    }

    #[test]
    fn reflects_attribute_locations() {
        let mut backend = HeadlessBackend::new();
        let shader = program(&mut backend);
        assert_eq!(shader.attrib_location("aVertex"), Some(0));
        assert_eq!(shader.attrib_location("aColor"), Some(1));
        assert_eq!(shader.attrib_location("aRegion"), None);
    }

    #[test]
    fn precision_alias_is_injected_once() {
        let mut backend = HeadlessBackend::new();
        let shader = program(&mut backend);
        assert!(shader.vertex_source().starts_with("alias pfloat = f32;"));
        assert_eq!(shader.fragment_source().matches("alias pfloat").count(), 1);
        assert!(!shader.vertex_source().contains("transforms the vertex"));
    }

    #[test]
    fn medium_precision_without_f16_is_rejected() {
        let mut backend = HeadlessBackend::new();
        let err = ShaderProgram::new(&mut backend, "m", VS, FS, Some(Precision::Medium)).unwrap_err();
        assert!(matches!(err, ShaderError::UnsupportedPrecision { .. }));
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn medium_precision_compiles_with_f16() {
        let mut backend = HeadlessBackend::with_limits(BackendLimits {
            supports_f16: true,
            ..BackendLimits::default()
        });
        let shader = ShaderProgram::new(&mut backend, "m", VS, FS, Some(Precision::Medium)).unwrap();
        assert!(shader.vertex_source().starts_with("enable f16;\nalias pfloat = f16;"));
    }

    const HALF_VS: &str = "enable f16;
        @vertex
        fn main(@location(0) aVertex: vec2<f32>) -> @builtin(position) vec4<f32> {
            let h: pfloat = pfloat(aVertex.x);
            return vec4<f32>(f32(h), aVertex.y, 0.0, 1.0);
        }";

    const PLAIN_FS: &str = "@fragment fn main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";

    #[test]
    fn medium_precision_keeps_the_source_f16_enable() {
        let mut backend = HeadlessBackend::with_limits(BackendLimits {
            supports_f16: true,
            ..BackendLimits::default()
        });
        let shader =
            ShaderProgram::new(&mut backend, "half", HALF_VS, PLAIN_FS, Some(Precision::Medium)).unwrap();
        assert!(shader.vertex_source().starts_with("enable f16;\nalias pfloat = f16;"));
        assert_eq!(shader.vertex_source().matches("enable f16").count(), 1);
        assert!(shader.fragment_source().starts_with("enable f16;\nalias pfloat = f16;"));
    }

    #[test]
    fn high_precision_alias_follows_source_directives() {
        let mut backend = HeadlessBackend::new();
        let vs = "diagnostic(off, derivative_uniformity);
            @vertex
            fn main(@location(0) aVertex: vec2<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(pfloat(aVertex.x), aVertex.y, 0.0, 1.0);
            }";
        let shader = ShaderProgram::new(&mut backend, "diag", vs, PLAIN_FS, Some(Precision::High)).unwrap();
        assert!(shader
            .vertex_source()
            .starts_with("diagnostic(off, derivative_uniformity);\nalias pfloat = f32;"));
    }

    #[test]
    fn f16_code_without_device_support_fails_to_compile() {
        let mut backend = HeadlessBackend::new();
        let vs = "enable f16;
            alias pfloat = f32;
            @vertex
            fn main(@location(0) aVertex: vec2<f32>) -> @builtin(position) vec4<f32> {
                let h: f16 = f16(aVertex.x);
                return vec4<f32>(f32(h), aVertex.y, 0.0, 1.0);
            }";
        let err = ShaderProgram::new(&mut backend, "half", vs, PLAIN_FS, None).unwrap_err();
        assert!(matches!(err, ShaderError::Compile { stage: Stage::Vertex, .. }));
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn matrix_uniform_lands_in_its_block() {
        let mut backend = HeadlessBackend::new();
        let shader = program(&mut backend);
        let m = glam::Mat4::from_scale(glam::Vec3::new(2.0, 3.0, 1.0));
        shader.set_uniform(&mut backend, "uProjectionMatrix", m).unwrap();

        let block = backend.uniform_block(shader.id().unwrap(), 0).unwrap();
        assert_eq!(block, bytemuck::cast_slice::<f32, u8>(&m.to_cols_array()));
    }

    #[test]
    fn struct_members_are_addressed_by_name() {
        let mut backend = HeadlessBackend::new();
        let shader = program(&mut backend);
        shader.set_uniform(&mut backend, "uAlpha", 0.5f32).unwrap();

        let block = backend.uniform_block(shader.id().unwrap(), 1).unwrap();
        assert_eq!(&block[16..20], &0.5f32.to_le_bytes());
    }

    #[test]
    fn unknown_uniform_names_uniform_and_shader() {
        let mut backend = HeadlessBackend::new();
        let shader = program(&mut backend);
        let err = shader.set_uniform(&mut backend, "uMissing", 1.0f32).unwrap_err();
        assert_eq!(
            err,
            ShaderError::UnknownUniform { name: "uMissing".into(), shader: "test".into() }
        );
        let text = err.to_string();
        assert!(text.contains("uMissing") && text.contains("test"));
    }

    #[test]
    fn wrong_value_shape_is_a_type_mismatch() {
        let mut backend = HeadlessBackend::new();
        let shader = program(&mut backend);
        let err = shader.set_uniform(&mut backend, "uTint", 1.0f32).unwrap_err();
        assert!(matches!(err, ShaderError::UniformTypeMismatch { found: "float", .. }));
    }

    #[test]
    fn compile_error_reports_stage() {
        let mut backend = HeadlessBackend::new();
        let err = ShaderProgram::new(&mut backend, "bad", VS, "@fragment fn main( {", None).unwrap_err();
        assert!(matches!(err, ShaderError::Compile { stage: Stage::Fragment, .. }));
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut backend = HeadlessBackend::new();
        let mut shader = program(&mut backend);
        shader.destroy(&mut backend);
        shader.destroy(&mut backend);

        let deletes = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, BackendCommand::DeleteProgram(_)))
            .count();
        assert_eq!(deletes, 1);
        assert!(matches!(shader.bind(&mut backend), Err(ShaderError::Destroyed(_))));
    }

    #[test]
    fn context_loss_destroys_the_program() {
        let mut backend = HeadlessBackend::new();
        let mut shader = program(&mut backend);
        assert!(!shader.poll_context(&mut backend));

        backend.lose_context();
        assert!(shader.poll_context(&mut backend));
        assert!(shader.is_destroyed());
    }

    #[test]
    fn backend_errors_pass_through() {
        let mut backend = HeadlessBackend::new();
        let shader = program(&mut backend);
        backend.lose_context();
        let err = shader.bind(&mut backend).unwrap_err();
        assert_eq!(err, ShaderError::Backend(BackendError::ContextLost));
    }
}
