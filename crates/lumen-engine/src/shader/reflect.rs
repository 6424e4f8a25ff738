//! Stage compilation and interface reflection on top of `naga`.
//!
//! Both backends share this front end: a stage source is parsed (WGSL or GLSL),
//! validated, and reduced to the parts a program cares about at link time:
//! location-bound inputs/outputs, active uniform scalars and bound resources.

use std::collections::HashMap;
use std::fmt;

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, Module, ScalarKind, Type, TypeInner};

use super::kind::StageKind;
use super::source::SourceLanguage;

/// Scalar element type of an interface variable or uniform.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ScalarType {
    F32,
    I32,
    U32,
    Bool,
}

impl ScalarType {
    fn from_naga(scalar: naga::Scalar) -> Option<Self> {
        match (scalar.kind, scalar.width) {
            (ScalarKind::Float, 4) => Some(ScalarType::F32),
            (ScalarKind::Sint, 4) => Some(ScalarType::I32),
            (ScalarKind::Uint, 4) => Some(ScalarType::U32),
            (ScalarKind::Bool, _) => Some(ScalarType::Bool),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ScalarType::F32 => "f32",
            ScalarType::I32 => "i32",
            ScalarType::U32 => "u32",
            ScalarType::Bool => "bool",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a location-bound stage input or output (scalar or vector).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct IoType {
    pub scalar: ScalarType,
    /// 1 for scalars, 2..=4 for vectors.
    pub components: u8,
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components == 1 {
            write!(f, "{}", self.scalar)
        } else {
            write!(f, "vec{}<{}>", self.components, self.scalar)
        }
    }
}

/// A `@location(n)` input or output of an entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceVar {
    pub location: u32,
    pub name: Option<String>,
    pub ty: IoType,
}

impl InterfaceVar {
    fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("`{name}` (location {})", self.location),
            None => format!("location {}", self.location),
        }
    }
}

/// An active scalar uniform: either a whole `var<uniform>` or one member of a
/// uniform struct.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformVar {
    /// Fully qualified name (`var` or `var.member`).
    pub name: String,
    /// Member name for struct members; also resolvable on its own when unambiguous.
    pub member: Option<String>,
    pub group: u32,
    pub binding: u32,
    /// Byte offset inside the bound buffer.
    pub offset: u32,
    pub ty: ScalarType,
}

/// A bound resource used by an entry point.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ResourceSlot {
    pub group: u32,
    pub binding: u32,
    /// Byte size for uniform buffers; `None` for textures, samplers and storage.
    pub uniform_size: Option<u32>,
}

/// A compiled and validated stage, reduced to its link-time interface.
#[derive(Debug, Clone)]
pub struct StageReflection {
    kind: StageKind,
    language: SourceLanguage,
    module: Module,
    entry_point: String,
    inputs: Vec<InterfaceVar>,
    outputs: Vec<InterfaceVar>,
    uniforms: Vec<UniformVar>,
    resources: Vec<ResourceSlot>,
}

impl StageReflection {
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn language(&self) -> SourceLanguage {
        self.language
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn inputs(&self) -> &[InterfaceVar] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[InterfaceVar] {
        &self.outputs
    }

    pub fn uniforms(&self) -> &[UniformVar] {
        &self.uniforms
    }

    pub fn resources(&self) -> &[ResourceSlot] {
        &self.resources
    }
}

/// Parses and validates `source` as a `kind` stage.
///
/// On failure the returned string is the rendered compiler output, suitable
/// as a compile log.
pub fn compile_stage(kind: StageKind, source: &str) -> Result<StageReflection, String> {
    let language = SourceLanguage::detect(source);

    let module = match language {
        SourceLanguage::Wgsl => {
            naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?
        }
        SourceLanguage::Glsl => {
            let options = naga::front::glsl::Options::from(kind.naga_stage());
            naga::front::glsl::Frontend::default()
                .parse(&options, source)
                .map_err(|e| e.emit_to_string(source))?
        }
    };

    let info = Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let stage = kind.naga_stage();
    let candidates: Vec<usize> = module
        .entry_points
        .iter()
        .enumerate()
        .filter(|(_, ep)| ep.stage == stage)
        .map(|(i, _)| i)
        .collect();

    let ep_index = match candidates.as_slice() {
        [index] => *index,
        [] => return Err(format!("error: no {kind} entry point found")),
        _ => {
            let names: Vec<&str> = candidates
                .iter()
                .map(|&i| module.entry_points[i].name.as_str())
                .collect();
            return Err(format!(
                "error: expected one {kind} entry point, found {}: {}",
                names.len(),
                names.join(", ")
            ));
        }
    };

    let ep = &module.entry_points[ep_index];

    let mut inputs = Vec::new();
    for arg in &ep.function.arguments {
        collect_io(&module, arg.ty, arg.binding.as_ref(), arg.name.as_deref(), &mut inputs)?;
    }

    let mut outputs = Vec::new();
    if let Some(result) = &ep.function.result {
        collect_io(&module, result.ty, result.binding.as_ref(), None, &mut outputs)?;
    }

    let usage = info.get_entry_point(ep_index);
    let mut uniforms = Vec::new();
    let mut resources = Vec::new();

    for (handle, var) in module.global_variables.iter() {
        if usage[handle].is_empty() {
            continue;
        }
        let Some(rb) = var.binding.as_ref() else { continue };

        let is_uniform = var.space == AddressSpace::Uniform;
        let inner = &module.types[var.ty].inner;
        resources.push(ResourceSlot {
            group: rb.group,
            binding: rb.binding,
            uniform_size: is_uniform.then(|| inner.size(module.to_ctx())),
        });

        if !is_uniform {
            continue;
        }

        let var_name = var.name.clone().unwrap_or_default();
        match inner {
            TypeInner::Scalar(scalar) => {
                if let Some(ty) = ScalarType::from_naga(*scalar) {
                    uniforms.push(UniformVar {
                        name: var_name,
                        member: None,
                        group: rb.group,
                        binding: rb.binding,
                        offset: 0,
                        ty,
                    });
                }
            }
            TypeInner::Struct { members, .. } => {
                for m in members {
                    let TypeInner::Scalar(scalar) = module.types[m.ty].inner else { continue };
                    let (Some(ty), Some(member)) = (ScalarType::from_naga(scalar), m.name.clone())
                    else {
                        continue;
                    };
                    let name = if var_name.is_empty() {
                        member.clone()
                    } else {
                        format!("{var_name}.{member}")
                    };
                    uniforms.push(UniformVar {
                        name,
                        member: Some(member),
                        group: rb.group,
                        binding: rb.binding,
                        offset: m.offset,
                        ty,
                    });
                }
            }
            _ => {}
        }
    }

    Ok(StageReflection {
        kind,
        language,
        entry_point: ep.name.clone(),
        module,
        inputs,
        outputs,
        uniforms,
        resources,
    })
}

fn collect_io(
    module: &Module,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    name: Option<&str>,
    out: &mut Vec<InterfaceVar>,
) -> Result<(), String> {
    let inner = &module.types[ty].inner;
    match binding {
        Some(Binding::BuiltIn(_)) => Ok(()),
        Some(Binding::Location { location, .. }) => {
            let io = match *inner {
                TypeInner::Scalar(scalar) => {
                    ScalarType::from_naga(scalar).map(|scalar| IoType { scalar, components: 1 })
                }
                TypeInner::Vector { size, scalar } => ScalarType::from_naga(scalar)
                    .map(|scalar| IoType { scalar, components: size as u8 }),
                _ => None,
            };
            let ty = io.ok_or_else(|| {
                format!("error: unsupported interface type at location {location}")
            })?;
            out.push(InterfaceVar {
                location: *location,
                name: name.map(str::to_string),
                ty,
            });
            Ok(())
        }
        None => {
            if let TypeInner::Struct { members, .. } = inner {
                for m in members {
                    collect_io(module, m.ty, m.binding.as_ref(), m.name.as_deref(), out)?;
                }
            }
            Ok(())
        }
    }
}

/// Name → uniform lookup for a linked program.
#[derive(Debug, Clone, Default)]
pub struct UniformTable {
    entries: Vec<UniformVar>,
    names: HashMap<String, usize>,
}

impl UniformTable {
    fn build<'a>(vars: impl IntoIterator<Item = &'a UniformVar>) -> Self {
        let mut entries: Vec<UniformVar> = Vec::new();
        for var in vars {
            let dup = entries.iter().any(|e| {
                e.group == var.group && e.binding == var.binding && e.offset == var.offset
            });
            if !dup {
                entries.push(var.clone());
            }
        }

        let mut names: HashMap<String, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();

        let mut aliases: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, e) in entries.iter().enumerate() {
            if let Some(member) = &e.member {
                aliases.entry(member.as_str()).or_default().push(i);
            }
        }
        for (alias, indices) in aliases {
            if let [index] = indices.as_slice() {
                names.entry(alias.to_string()).or_insert(*index);
            }
        }

        Self { entries, names }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn get(&self, index: usize) -> Option<&UniformVar> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UniformVar> {
        self.entries.iter()
    }
}

/// Interface of a successfully linked vertex + fragment pair.
#[derive(Debug, Clone)]
pub struct LinkedInterface {
    pub vertex_inputs: Vec<InterfaceVar>,
    pub fragment_outputs: Vec<InterfaceVar>,
    pub uniforms: UniformTable,
    pub resources: Vec<ResourceSlot>,
}

/// Checks that `fragment` only reads what `vertex` writes and that both
/// stages agree on shared uniforms.
///
/// On failure the returned string is the link log, one problem per line.
pub fn link_stages(
    vertex: &StageReflection,
    fragment: &StageReflection,
) -> Result<LinkedInterface, String> {
    let mut errors = Vec::new();

    for input in &fragment.inputs {
        match vertex.outputs.iter().find(|o| o.location == input.location) {
            None => errors.push(format!(
                "error: fragment input {} is not written by the vertex stage",
                input.describe()
            )),
            Some(output) if output.ty != input.ty => errors.push(format!(
                "error: type mismatch at location {}: vertex writes {}, fragment reads {}",
                input.location, output.ty, input.ty
            )),
            Some(_) => {}
        }
    }

    for f in &fragment.uniforms {
        for v in &vertex.uniforms {
            let same_slot = v.group == f.group && v.binding == f.binding && v.offset == f.offset;
            if same_slot && v.ty != f.ty {
                errors.push(format!(
                    "error: uniform `{}` is {} in the vertex stage but {} in the fragment stage",
                    f.name, v.ty, f.ty
                ));
            } else if !same_slot && v.name == f.name {
                errors.push(format!(
                    "error: uniform `{}` is bound at @group({}) @binding({}) in the vertex stage \
                     but @group({}) @binding({}) in the fragment stage",
                    f.name, v.group, v.binding, f.group, f.binding
                ));
            }
        }
    }

    let mut resources = vertex.resources.clone();
    for r in &fragment.resources {
        match resources
            .iter()
            .find(|e| e.group == r.group && e.binding == r.binding)
        {
            Some(existing) if existing.uniform_size != r.uniform_size => errors.push(format!(
                "error: @group({}) @binding({}) has a different type in each stage",
                r.group, r.binding
            )),
            Some(_) => {}
            None => resources.push(*r),
        }
    }

    if !errors.is_empty() {
        return Err(errors.join("\n"));
    }

    Ok(LinkedInterface {
        vertex_inputs: vertex.inputs.clone(),
        fragment_outputs: fragment.outputs.clone(),
        uniforms: UniformTable::build(vertex.uniforms.iter().chain(&fragment.uniforms)),
        resources,
    })
}
