//! Stage compilation and program linking on top of `naga`.
//!
//! Binding conventions a program must follow:
//! - uniform buffers live in bind group 0; a struct-typed buffer exposes its
//!   members as uniforms, any other buffer is a single uniform named after
//!   the variable
//! - each sampled texture owns one bind group (1, 2, ...) with the
//!   `texture_2d` at binding 0 and its `sampler` at binding 1; the uniform
//!   selecting its texture unit is named after the texture variable

use std::collections::{BTreeMap, HashMap};

use naga::{AddressSpace, ArraySize, Binding, Handle, Module, ScalarKind, Type, TypeInner};

use super::Stage;
use super::uniform::{ScalarType, UniformKind};
use crate::gfx::{BackendLimits, UniformBlockDesc};

/// One `@location` input or output of an entry point.
#[derive(Debug, Clone)]
pub(super) struct Varying {
    pub name: String,
    pub location: u32,
    pub ty: TypeInner,
}

#[derive(Debug, Clone, PartialEq)]
struct BlockField {
    name: String,
    offset: u32,
    kind: UniformKind,
}

#[derive(Debug, Clone, PartialEq)]
struct Block {
    name: String,
    group: u32,
    binding: u32,
    size: u32,
    fields: Vec<BlockField>,
}

#[derive(Debug, Clone)]
struct Resource {
    name: String,
    group: u32,
    binding: u32,
    texture: bool,
}

/// A compiled and validated stage, with its interface reflected.
#[derive(Debug)]
pub(super) struct CompiledStage {
    pub entry: String,
    pub inputs: Vec<Varying>,
    pub outputs: Vec<Varying>,
    blocks: Vec<Block>,
    resources: Vec<Resource>,
}

/// Where a uniform lives in a linked program.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UniformSlot {
    Block {
        binding: u32,
        offset: u32,
        kind: UniformKind,
    },
    Sampler {
        group: u32,
    },
}

#[derive(Debug)]
pub(super) struct LinkedProgram {
    pub attributes: HashMap<String, u32>,
    pub uniforms: HashMap<String, UniformSlot>,
    pub blocks: Vec<UniformBlockDesc>,
    pub sampler_groups: Vec<u32>,
}

/// Shader capabilities the device behind `limits` can run.
fn capabilities(limits: &BackendLimits) -> naga::valid::Capabilities {
    let mut caps = naga::valid::Capabilities::default();
    if limits.supports_f16 {
        caps |= naga::valid::Capabilities::SHADER_FLOAT16;
    }
    caps
}

/// Parses and validates one stage against what `limits` allows. The error
/// string is the compiler log.
pub(super) fn compile(stage: Stage, source: &str, limits: &BackendLimits) -> Result<CompiledStage, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    let mut validator =
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), capabilities(limits));
    validator
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let naga_stage = match stage {
        Stage::Vertex => naga::ShaderStage::Vertex,
        Stage::Fragment => naga::ShaderStage::Fragment,
    };
    let mut entries = module.entry_points.iter().filter(|ep| ep.stage == naga_stage);
    let entry = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        (None, _) => return Err(format!("no @{stage} entry point")),
        (Some(_), Some(_)) => return Err(format!("more than one @{stage} entry point")),
    };

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        collect_varyings(&module, arg.name.as_deref(), arg.ty, arg.binding.as_ref(), &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_varyings(&module, None, result.ty, result.binding.as_ref(), &mut outputs);
    }

    let (blocks, resources) = reflect_globals(&module)?;

    Ok(CompiledStage {
        entry: entry.name.clone(),
        inputs,
        outputs,
        blocks,
        resources,
    })
}

fn collect_varyings(
    module: &Module,
    name: Option<&str>,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Vec<Varying>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(Varying {
            name: name.unwrap_or_default().to_string(),
            location: *location,
            ty: module.types[ty].inner.clone(),
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for m in members {
                    collect_varyings(module, m.name.as_deref(), m.ty, m.binding.as_ref(), out);
                }
            }
        }
    }
}

fn reflect_globals(module: &Module) -> Result<(Vec<Block>, Vec<Resource>), String> {
    let mut blocks = Vec::new();
    let mut resources = Vec::new();

    for (_, var) in module.global_variables.iter() {
        let Some(rb) = &var.binding else { continue };
        let name = var.name.clone().unwrap_or_default();
        let inner = &module.types[var.ty].inner;

        match var.space {
            AddressSpace::Uniform => {
                let fields = match inner {
                    TypeInner::Struct { members, .. } => members
                        .iter()
                        .map(|m| {
                            let field = m.name.clone().unwrap_or_default();
                            let kind = uniform_kind(module, m.ty)
                                .ok_or_else(|| format!("uniform `{field}` has an unsupported type"))?;
                            Ok(BlockField { name: field, offset: m.offset, kind })
                        })
                        .collect::<Result<Vec<_>, String>>()?,
                    _ => {
                        let kind = uniform_kind(module, var.ty)
                            .ok_or_else(|| format!("uniform `{name}` has an unsupported type"))?;
                        vec![BlockField { name: name.clone(), offset: 0, kind }]
                    }
                };
                blocks.push(Block {
                    name,
                    group: rb.group,
                    binding: rb.binding,
                    size: inner.size(module.to_ctx()),
                    fields,
                });
            }
            AddressSpace::Handle => match inner {
                TypeInner::Image { .. } | TypeInner::Sampler { .. } => resources.push(Resource {
                    name,
                    group: rb.group,
                    binding: rb.binding,
                    texture: matches!(inner, TypeInner::Image { .. }),
                }),
                _ => {}
            },
            _ => {}
        }
    }
    Ok((blocks, resources))
}

fn scalar_type(scalar: naga::Scalar) -> Option<ScalarType> {
    if scalar.width != 4 {
        return None;
    }
    match scalar.kind {
        ScalarKind::Float => Some(ScalarType::Float),
        ScalarKind::Sint => Some(ScalarType::Sint),
        ScalarKind::Uint => Some(ScalarType::Uint),
        _ => None,
    }
}

fn uniform_kind(module: &Module, ty: Handle<Type>) -> Option<UniformKind> {
    match &module.types[ty].inner {
        TypeInner::Scalar(s) => scalar_type(*s).map(UniformKind::Scalar),
        TypeInner::Vector { size, scalar } => {
            Some(UniformKind::Vector(scalar_type(*scalar)?, *size as u8))
        }
        TypeInner::Matrix { columns, rows, scalar } => {
            (scalar_type(*scalar)? == ScalarType::Float).then(|| UniformKind::Matrix {
                columns: *columns as u8,
                rows: *rows as u8,
            })
        }
        TypeInner::Array {
            base,
            size: ArraySize::Constant(len),
            stride,
        } => Some(UniformKind::Array {
            element: Box::new(uniform_kind(module, *base)?),
            len: len.get(),
            stride: *stride,
        }),
        _ => None,
    }
}

/// Checks the two stages against each other and builds the program tables.
/// The error string is the linker log.
pub(super) fn link(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<LinkedProgram, String> {
    for input in &fragment.inputs {
        let output = vertex
            .outputs
            .iter()
            .find(|o| o.location == input.location)
            .ok_or_else(|| {
                format!(
                    "fragment input `{}` at location {} has no matching vertex output",
                    input.name, input.location
                )
            })?;
        if output.ty != input.ty {
            return Err(format!(
                "fragment input `{}` at location {} does not match the vertex output type",
                input.name, input.location
            ));
        }
    }

    let mut blocks: BTreeMap<u32, (Block, bool, bool)> = BTreeMap::new();
    for (stage, is_vertex) in [(vertex, true), (fragment, false)] {
        for block in &stage.blocks {
            if block.group != 0 {
                return Err(format!(
                    "uniform buffer `{}` must be in group 0, found group {}",
                    block.name, block.group
                ));
            }
            match blocks.get_mut(&block.binding) {
                Some((existing, v, f)) => {
                    if existing.size != block.size || existing.fields != block.fields {
                        return Err(format!(
                            "uniform buffer at binding {} differs between stages",
                            block.binding
                        ));
                    }
                    *v |= is_vertex;
                    *f |= !is_vertex;
                }
                None => {
                    blocks.insert(block.binding, (block.clone(), is_vertex, !is_vertex));
                }
            }
        }
    }

    // group -> (texture name, has sampler)
    let mut groups: BTreeMap<u32, (Option<String>, bool)> = BTreeMap::new();
    for resource in vertex.resources.iter().chain(&fragment.resources) {
        if resource.group == 0 {
            return Err(format!("texture or sampler `{}` must not be in group 0", resource.name));
        }
        let expected = if resource.texture { 0 } else { 1 };
        if resource.binding != expected {
            return Err(format!(
                "`{}` must use binding {expected} of group {}",
                resource.name, resource.group
            ));
        }
        let entry = groups.entry(resource.group).or_default();
        if resource.texture {
            if let Some(other) = &entry.0 {
                if other != &resource.name {
                    return Err(format!(
                        "textures `{other}` and `{}` share group {}",
                        resource.name, resource.group
                    ));
                }
            }
            entry.0 = Some(resource.name.clone());
        } else {
            entry.1 = true;
        }
    }

    let mut uniforms = HashMap::new();
    let mut sampler_groups = Vec::with_capacity(groups.len());
    for (expected, (group, (texture, has_sampler))) in (1u32..).zip(&groups) {
        let Some(texture) = texture else {
            return Err(format!("group {group} has a sampler but no texture"));
        };
        if !has_sampler {
            return Err(format!("texture `{texture}` in group {group} has no sampler"));
        }
        if *group != expected {
            return Err(format!("texture groups must be contiguous from 1; found group {group}"));
        }
        uniforms.insert(texture.clone(), UniformSlot::Sampler { group: *group });
        sampler_groups.push(*group);
    }

    for (block, _, _) in blocks.values() {
        for field in &block.fields {
            let slot = UniformSlot::Block {
                binding: block.binding,
                offset: field.offset,
                kind: field.kind.clone(),
            };
            if uniforms.insert(field.name.clone(), slot).is_some() {
                return Err(format!("uniform `{}` is declared more than once", field.name));
            }
        }
    }

    let attributes = vertex
        .inputs
        .iter()
        .map(|v| (v.name.clone(), v.location))
        .collect();

    let blocks = blocks
        .into_values()
        .map(|(block, vertex, fragment)| UniformBlockDesc {
            binding: block.binding,
            size: block.size,
            vertex,
            fragment,
        })
        .collect();

    Ok(LinkedProgram {
        attributes,
        uniforms,
        blocks,
        sampler_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(stage: Stage, source: &str) -> Result<CompiledStage, String> {
        super::compile(stage, source, &BackendLimits::default())
    }

    const VS: &str = "
        struct Globals { proj: mat4x4<f32>, tint: vec4<f32>, weights: array<vec4<f32>, 2> };
        @group(0) @binding(0) var<uniform> globals: Globals;
        struct Out { @builtin(position) pos: vec4<f32>, @location(0) uv: vec2<f32> };
        @vertex
        fn vs_main(@location(0) aVertex: vec2<f32>, @location(3) aRegion: vec2<f32>) -> Out {
            var o: Out;
            o.pos = globals.proj * vec4<f32>(aVertex, 0.0, 1.0);
            o.uv = aRegion;
            return o;
        }";

    const FS: &str = "
        @group(1) @binding(0) var uSampler: texture_2d<f32>;
        @group(1) @binding(1) var uSamplerState: sampler;
        @fragment
        fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
            return textureSample(uSampler, uSamplerState, uv);
        }";

    #[test]
    fn reflects_attributes_uniforms_and_samplers() {
        let vs = compile(Stage::Vertex, VS).unwrap();
        let fs = compile(Stage::Fragment, FS).unwrap();
        let linked = link(&vs, &fs).unwrap();

        assert_eq!(vs.entry, "vs_main");
        assert_eq!(linked.attributes.get("aRegion"), Some(&3));
        assert_eq!(linked.sampler_groups, vec![1]);
        assert_eq!(linked.uniforms.get("uSampler"), Some(&UniformSlot::Sampler { group: 1 }));
        assert_eq!(
            linked.uniforms.get("tint"),
            Some(&UniformSlot::Block {
                binding: 0,
                offset: 64,
                kind: UniformKind::Vector(ScalarType::Float, 4),
            })
        );
        match linked.uniforms.get("weights") {
            Some(UniformSlot::Block { offset: 80, kind: UniformKind::Array { len: 2, stride: 16, .. }, .. }) => {}
            other => panic!("unexpected slot {other:?}"),
        }
        assert_eq!(linked.blocks.len(), 1);
        assert_eq!(linked.blocks[0].size, 112);
        assert!(linked.blocks[0].vertex && !linked.blocks[0].fragment);
    }

    #[test]
    fn parse_errors_carry_the_compiler_log() {
        let log = compile(Stage::Vertex, "fn broken( {").unwrap_err();
        assert!(!log.is_empty());
    }

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let log = compile(Stage::Vertex, FS).unwrap_err();
        assert!(log.contains("vertex"));
    }

    #[test]
    fn unmatched_fragment_input_fails_to_link() {
        let vs = compile(Stage::Vertex, VS).unwrap();
        let fs = compile(
            Stage::Fragment,
            "@fragment fn main(@location(5) c: vec4<f32>) -> @location(0) vec4<f32> { return c; }",
        )
        .unwrap();
        let log = link(&vs, &fs).unwrap_err();
        assert!(log.contains("location 5"));
    }

    #[test]
    fn mismatched_varying_type_fails_to_link() {
        let vs = compile(Stage::Vertex, VS).unwrap();
        let fs = compile(
            Stage::Fragment,
            "@fragment fn main(@location(0) c: vec4<f32>) -> @location(0) vec4<f32> { return c; }",
        )
        .unwrap();
        assert!(link(&vs, &fs).is_err());
    }

    #[test]
    fn texture_without_sampler_fails_to_link() {
        let vs = compile(Stage::Vertex, VS).unwrap();
        let fs = compile(
            Stage::Fragment,
            "@group(1) @binding(0) var t: texture_2d<f32>;
             @fragment fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
                 return textureLoad(t, vec2<i32>(uv), 0);
             }",
        )
        .unwrap();
        let log = link(&vs, &fs).unwrap_err();
        assert!(log.contains("no sampler"));
    }

    #[test]
    fn f16_needs_the_device_capability() {
        let src = "enable f16;
            @fragment fn main() -> @location(0) vec4<f32> {
                let h: f16 = 0.5h;
                return vec4<f32>(f32(h));
            }";
        let log = compile(Stage::Fragment, src).unwrap_err();
        assert!(!log.is_empty());

        let f16 = BackendLimits { supports_f16: true, ..BackendLimits::default() };
        assert!(super::compile(Stage::Fragment, src, &f16).is_ok());
    }
}
