//! [`ShaderBackend`] over a wgpu device.
//!
//! Mapping:
//! - a compiled stage is a `wgpu::ShaderModule` built from the validated naga module
//! - linking creates a render pipeline with an automatic layout; all vertex
//!   inputs are read from one interleaved buffer, tightly packed in location order
//! - every uniform binding is backed by its own buffer; bind groups are created
//!   for groups made only of uniform buffers. Groups that also hold textures,
//!   samplers or storage are completed by the caller through
//!   [`WgpuBackend::create_shared_bind_group`]
//! - uniform writes go through `Queue::write_buffer` into the current program
//!
//! wgpu validation errors raised while building modules, pipelines or bind
//! groups are captured and reported as compile or link logs.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use anyhow::Context;

use super::backend::{ShaderBackend, UniformValue, coerce, truncate_log};
use super::handle::{HandleAllocator, ProgramId, StageId, UniformSlot, select_stages};
use super::kind::StageKind;
use super::reflect::{
    self, InterfaceVar, IoType, LinkedInterface, ResourceSlot, ScalarType, StageReflection,
};
use crate::device::Gpu;

struct CompiledStage {
    reflection: StageReflection,
    module: wgpu::ShaderModule,
}

struct GpuStage {
    kind: StageKind,
    source: String,
    compiled: Option<Result<CompiledStage, String>>,
}

struct UniformBindings {
    buffers: HashMap<(u32, u32), wgpu::Buffer>,
    bind_groups: Vec<(u32, wgpu::BindGroup)>,
    shared_groups: Vec<u32>,
}

struct LinkedPipeline {
    interface: LinkedInterface,
    pipeline: wgpu::RenderPipeline,
    vertex_stride: u64,
    bindings: UniformBindings,
}

#[derive(Default)]
struct GpuProgram {
    attached: Vec<StageId>,
    linked: Option<Result<LinkedPipeline, String>>,
}

/// Shader backend that turns programs into wgpu render pipelines.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,

    ids: HandleAllocator,
    stages: HashMap<StageId, GpuStage>,
    programs: HashMap<ProgramId, GpuProgram>,
    current: Option<ProgramId>,
}

/// Runs `f` inside a validation error scope; a captured error becomes the log text.
fn capture_validation<T>(device: &wgpu::Device, f: impl FnOnce() -> T) -> Result<T, String> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    match pollster::block_on(scope.pop()) {
        None => Ok(value),
        Some(err) => Err(format!("error: {err}")),
    }
}

impl WgpuBackend {
    /// Creates a backend on `gpu`'s device, targeting its configured color format.
    pub fn new(gpu: &Gpu) -> Self {
        Self::from_parts(gpu.device().clone(), gpu.queue().clone(), gpu.target_format())
    }

    pub fn from_parts(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target_format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            device,
            queue,
            target_format,
            ids: HandleAllocator::default(),
            stages: HashMap::new(),
            programs: HashMap::new(),
            current: None,
        }
    }

    /// Color format every pipeline renders into.
    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    fn linked(&self, program: ProgramId) -> Option<&LinkedPipeline> {
        match &self.programs.get(&program)?.linked {
            Some(Ok(linked)) => Some(linked),
            _ => None,
        }
    }

    /// Render pipeline of a linked program.
    pub fn pipeline(&self, program: ProgramId) -> Option<&wgpu::RenderPipeline> {
        self.linked(program).map(|l| &l.pipeline)
    }

    /// Byte stride of the interleaved vertex buffer a linked program expects.
    /// Zero when the vertex stage takes no location inputs.
    pub fn vertex_stride(&self, program: ProgramId) -> Option<u64> {
        self.linked(program).map(|l| l.vertex_stride)
    }

    /// Buffer backing the uniform block at `(group, binding)` of a linked program.
    pub fn uniform_buffer(
        &self,
        program: ProgramId,
        group: u32,
        binding: u32,
    ) -> Option<&wgpu::Buffer> {
        self.linked(program)?.bindings.buffers.get(&(group, binding))
    }

    /// Groups holding textures, samplers or storage, possibly next to uniform
    /// blocks. [`bind_current`] leaves these unset.
    ///
    /// [`bind_current`]: WgpuBackend::bind_current
    pub fn shared_groups(&self, program: ProgramId) -> Option<&[u32]> {
        self.linked(program).map(|l| l.bindings.shared_groups.as_slice())
    }

    /// Builds bind group `group` of a linked program from the caller's
    /// texture/sampler/storage `entries`, filling in the program's own uniform
    /// buffers for every binding the caller did not supply.
    pub fn create_shared_bind_group(
        &self,
        program: ProgramId,
        group: u32,
        entries: &[wgpu::BindGroupEntry<'_>],
    ) -> anyhow::Result<wgpu::BindGroup> {
        let linked = self
            .linked(program)
            .with_context(|| format!("program {program:?} is not linked"))?;

        let mut all: Vec<wgpu::BindGroupEntry<'_>> = entries.to_vec();
        for ((g, binding), buffer) in &linked.bindings.buffers {
            if *g == group && !entries.iter().any(|e| e.binding == *binding) {
                all.push(wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: buffer.as_entire_binding(),
                });
            }
        }
        all.sort_by_key(|e| e.binding);

        capture_validation(&self.device, || {
            let layout = linked.pipeline.get_bind_group_layout(group);
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("lumen shared bind group"),
                layout: &layout,
                entries: &all,
            })
        })
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("failed to create bind group {group}"))
    }

    /// Sets the current program's pipeline and uniform bind groups on `pass`.
    ///
    /// Returns `false` (and touches nothing) when no linked program is current.
    pub fn bind_current(&self, pass: &mut wgpu::RenderPass<'_>) -> bool {
        let Some(linked) = self.current.and_then(|id| self.linked(id)) else {
            return false;
        };

        pass.set_pipeline(&linked.pipeline);
        for (group, bind_group) in &linked.bindings.bind_groups {
            pass.set_bind_group(*group, bind_group, &[]);
        }
        true
    }

    fn build_pipeline(&self, attached: &[StageId]) -> Result<LinkedPipeline, String> {
        let (vertex, fragment) = select_stages(attached, |id| {
            self.stages.get(&id).map(|s| (s.kind, s.compiled.as_ref()))
        })?;

        let interface = reflect::link_stages(&vertex.reflection, &fragment.reflection)?;
        let (vertex_stride, attributes) = vertex_layout(&interface.vertex_inputs)?;
        check_limits(&interface, vertex_stride, &self.device.limits())?;
        let targets = color_targets(&interface.fragment_outputs, self.target_format)?;

        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = if attributes.is_empty() {
            Vec::new()
        } else {
            vec![wgpu::VertexBufferLayout {
                array_stride: vertex_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            }]
        };

        let pipeline = capture_validation(&self.device, || {
            self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("lumen program pipeline"),
                layout: None,

                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some(vertex.reflection.entry_point()),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },

                fragment: Some(wgpu::FragmentState {
                    module: &fragment.module,
                    entry_point: Some(fragment.reflection.entry_point()),
                    compilation_options: Default::default(),
                    targets: &targets,
                }),

                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })?;

        let bindings = capture_validation(&self.device, || {
            self.create_uniform_bindings(&pipeline, &interface)
        })?;

        Ok(LinkedPipeline {
            interface,
            pipeline,
            vertex_stride,
            bindings,
        })
    }

    fn create_uniform_bindings(
        &self,
        pipeline: &wgpu::RenderPipeline,
        interface: &LinkedInterface,
    ) -> UniformBindings {
        let mut buffers = HashMap::new();
        for slot in &interface.resources {
            let Some(size) = slot.uniform_size else { continue };
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("lumen uniform buffer"),
                size: u64::from(size.max(4)).next_multiple_of(16),
                usage: wgpu::BufferUsages::UNIFORM
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            });
            buffers.insert((slot.group, slot.binding), buffer);
        }

        let (uniform_groups, shared_groups) = partition_groups(&interface.resources);
        for group in &shared_groups {
            log::debug!("bind group {group} holds textures or storage; caller completes it");
        }

        let mut bind_groups = Vec::new();
        for group in uniform_groups {
            let layout = pipeline.get_bind_group_layout(group);
            let mut entries: Vec<wgpu::BindGroupEntry<'_>> = buffers
                .iter()
                .filter(|((g, _), _)| *g == group)
                .map(|((_, binding), b)| wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: b.as_entire_binding(),
                })
                .collect();
            entries.sort_by_key(|e| e.binding);

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("lumen uniform bind group"),
                layout: &layout,
                entries: &entries,
            });
            bind_groups.push((group, bind_group));
        }

        UniformBindings {
            buffers,
            bind_groups,
            shared_groups,
        }
    }
}

/// Splits bound groups into uniform-only groups and groups shared with other
/// resource kinds. Both lists are sorted.
fn partition_groups(resources: &[ResourceSlot]) -> (Vec<u32>, Vec<u32>) {
    let mut all_uniform: BTreeMap<u32, bool> = BTreeMap::new();
    for slot in resources {
        let entry = all_uniform.entry(slot.group).or_insert(true);
        *entry &= slot.uniform_size.is_some();
    }

    let mut uniform_only = Vec::new();
    let mut shared = Vec::new();
    for (group, only_uniforms) in all_uniform {
        if only_uniforms {
            uniform_only.push(group);
        } else {
            shared.push(group);
        }
    }
    (uniform_only, shared)
}

/// Rejects interfaces the device cannot build a pipeline for.
fn check_limits(
    interface: &LinkedInterface,
    vertex_stride: u64,
    limits: &wgpu::Limits,
) -> Result<(), String> {
    for slot in &interface.resources {
        if slot.group >= limits.max_bind_groups {
            return Err(format!(
                "error: bind group {} is out of range; the device supports {} bind groups",
                slot.group, limits.max_bind_groups
            ));
        }
        if slot.binding >= limits.max_bindings_per_bind_group {
            return Err(format!(
                "error: binding {} in group {} exceeds the device limit of {}",
                slot.binding, slot.group, limits.max_bindings_per_bind_group
            ));
        }
        if let Some(size) = slot.uniform_size {
            if size > limits.max_uniform_buffer_binding_size {
                return Err(format!(
                    "error: uniform block at group {} binding {} is {size} bytes; the device allows {}",
                    slot.group, slot.binding, limits.max_uniform_buffer_binding_size
                ));
            }
        }
    }

    if interface.vertex_inputs.len() > limits.max_vertex_attributes as usize {
        return Err(format!(
            "error: {} vertex inputs exceed the device limit of {}",
            interface.vertex_inputs.len(),
            limits.max_vertex_attributes
        ));
    }
    if vertex_stride > u64::from(limits.max_vertex_buffer_array_stride) {
        return Err(format!(
            "error: vertex stride of {vertex_stride} bytes exceeds the device limit of {}",
            limits.max_vertex_buffer_array_stride
        ));
    }
    if let Some(last) = interface.fragment_outputs.iter().map(|o| o.location).max() {
        if last >= limits.max_color_attachments {
            return Err(format!(
                "error: fragment output location {last} exceeds the device limit of {} color attachments",
                limits.max_color_attachments
            ));
        }
    }

    Ok(())
}

fn vertex_format(ty: IoType) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;

    let format = match (ty.scalar, ty.components) {
        (ScalarType::F32, 1) => F::Float32,
        (ScalarType::F32, 2) => F::Float32x2,
        (ScalarType::F32, 3) => F::Float32x3,
        (ScalarType::F32, 4) => F::Float32x4,
        (ScalarType::I32, 1) => F::Sint32,
        (ScalarType::I32, 2) => F::Sint32x2,
        (ScalarType::I32, 3) => F::Sint32x3,
        (ScalarType::I32, 4) => F::Sint32x4,
        (ScalarType::U32, 1) => F::Uint32,
        (ScalarType::U32, 2) => F::Uint32x2,
        (ScalarType::U32, 3) => F::Uint32x3,
        (ScalarType::U32, 4) => F::Uint32x4,
        _ => return None,
    };
    Some(format)
}

/// Packs vertex inputs into one interleaved buffer, in location order.
fn vertex_layout(inputs: &[InterfaceVar]) -> Result<(u64, Vec<wgpu::VertexAttribute>), String> {
    let mut sorted: Vec<&InterfaceVar> = inputs.iter().collect();
    sorted.sort_by_key(|i| i.location);

    let mut offset = 0u64;
    let mut attributes = Vec::with_capacity(sorted.len());
    for input in sorted {
        let format = vertex_format(input.ty).ok_or_else(|| {
            format!(
                "error: vertex input at location {} has type {}, which cannot be fed from a vertex buffer",
                input.location, input.ty
            )
        })?;
        attributes.push(wgpu::VertexAttribute {
            format,
            offset,
            shader_location: input.location,
        });
        offset += format.size();
    }

    Ok((offset, attributes))
}

/// One color target per fragment output location; gaps stay `None`.
fn color_targets(
    outputs: &[InterfaceVar],
    format: wgpu::TextureFormat,
) -> Result<Vec<Option<wgpu::ColorTargetState>>, String> {
    let count = outputs.iter().map(|o| o.location + 1).max().unwrap_or(0) as usize;
    let mut targets = vec![None; count];

    for output in outputs {
        if output.ty.scalar != ScalarType::F32 {
            return Err(format!(
                "error: fragment output at location {} is {}, but the {format:?} target expects floats",
                output.location, output.ty
            ));
        }
        targets[output.location as usize] = Some(wgpu::ColorTargetState {
            format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        });
    }

    Ok(targets)
}

/// Host bytes for `value` stored into a `ty` uniform.
fn encode_uniform(value: UniformValue, ty: ScalarType) -> Option<[u8; 4]> {
    let bytes = match coerce(value, ty)? {
        UniformValue::Float(v) => bytemuck::cast(v),
        UniformValue::Int(v) if ty == ScalarType::U32 => bytemuck::cast(v as u32),
        UniformValue::Int(v) => bytemuck::cast(v),
        UniformValue::Bool(b) => bytemuck::cast(u32::from(b)),
    };
    Some(bytes)
}

impl ShaderBackend for WgpuBackend {
    type Stage = StageId;
    type Program = ProgramId;
    type Location = UniformSlot;

    fn create_stage(&mut self, kind: StageKind) -> StageId {
        let id = self.ids.stage();
        self.stages.insert(
            id,
            GpuStage {
                kind,
                source: String::new(),
                compiled: None,
            },
        );
        id
    }

    fn set_source(&mut self, stage: StageId, source: &str) {
        if let Some(obj) = self.stages.get_mut(&stage) {
            obj.source = source.to_string();
        }
    }

    fn compile(&mut self, stage: StageId) {
        let device = &self.device;
        let Some(obj) = self.stages.get_mut(&stage) else { return };

        let label = format!("lumen {} stage", obj.kind);
        let result = reflect::compile_stage(obj.kind, &obj.source).and_then(|reflection| {
            let module = capture_validation(device, || {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&label),
                    source: wgpu::ShaderSource::Naga(Cow::Owned(reflection.module().clone())),
                })
            })?;
            Ok(CompiledStage { reflection, module })
        });
        obj.compiled = Some(result);
    }

    fn compile_status(&self, stage: StageId) -> bool {
        matches!(
            self.stages.get(&stage).and_then(|s| s.compiled.as_ref()),
            Some(Ok(_))
        )
    }

    fn compile_log(&self, stage: StageId, max_len: usize) -> String {
        match self.stages.get(&stage).and_then(|s| s.compiled.as_ref()) {
            Some(Err(log)) => truncate_log(log, max_len),
            _ => String::new(),
        }
    }

    fn delete_stage(&mut self, stage: StageId) {
        self.stages.remove(&stage);
    }

    fn create_program(&mut self) -> ProgramId {
        let id = self.ids.program();
        self.programs.insert(id, GpuProgram::default());
        id
    }

    fn attach(&mut self, program: ProgramId, stage: StageId) {
        if !self.stages.contains_key(&stage) {
            return;
        }
        if let Some(obj) = self.programs.get_mut(&program) {
            if !obj.attached.contains(&stage) {
                obj.attached.push(stage);
            }
        }
    }

    fn link(&mut self, program: ProgramId) {
        let Some(obj) = self.programs.get(&program) else { return };
        let result = self.build_pipeline(&obj.attached);
        if let Some(obj) = self.programs.get_mut(&program) {
            obj.linked = Some(result);
        }
    }

    fn link_status(&self, program: ProgramId) -> bool {
        self.linked(program).is_some()
    }

    fn link_log(&self, program: ProgramId, max_len: usize) -> String {
        match self.programs.get(&program).and_then(|p| p.linked.as_ref()) {
            Some(Err(log)) => truncate_log(log, max_len),
            _ => String::new(),
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current == Some(program) {
            self.current = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current = program;
    }

    fn current_program(&self) -> Option<ProgramId> {
        self.current
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformSlot> {
        let linked = self.linked(program)?;
        UniformSlot::from_index(linked.interface.uniforms.index_of(name)?)
    }

    fn uniform_type(&self, program: ProgramId, location: UniformSlot) -> Option<ScalarType> {
        let linked = self.linked(program)?;
        linked.interface.uniforms.get(location.index()).map(|u| u.ty)
    }

    fn set_uniform(&mut self, location: UniformSlot, value: UniformValue) {
        let Some(linked) = self.current.and_then(|id| self.linked(id)) else { return };
        let Some(var) = linked.interface.uniforms.get(location.index()) else { return };

        let Some(bytes) = encode_uniform(value, var.ty) else {
            log::warn!(
                "uniform `{}` is {}; ignoring incompatible value {value:?}",
                var.name,
                var.ty
            );
            return;
        };

        if let Some(buffer) = linked.bindings.buffers.get(&(var.group, var.binding)) {
            self.queue.write_buffer(buffer, u64::from(var.offset), &bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::device::GpuInit;
    use crate::shader::kind::DiagnosticTag;
    use crate::shader::program::{ShaderConfig, ShaderProgram};
    use crate::shader::reflect::UniformTable;

    fn io(location: u32, scalar: ScalarType, components: u8) -> InterfaceVar {
        InterfaceVar {
            location,
            name: None,
            ty: IoType { scalar, components },
        }
    }

    fn slot(group: u32, binding: u32, uniform_size: Option<u32>) -> ResourceSlot {
        ResourceSlot {
            group,
            binding,
            uniform_size,
        }
    }

    fn interface(resources: Vec<ResourceSlot>, vertex_inputs: Vec<InterfaceVar>) -> LinkedInterface {
        LinkedInterface {
            vertex_inputs,
            fragment_outputs: vec![io(0, ScalarType::F32, 4)],
            uniforms: UniformTable::default(),
            resources,
        }
    }

    // ── vertex layout ─────────────────────────────────────────────────────

    #[test]
    fn vertex_inputs_pack_in_location_order() {
        let inputs = [
            io(2, ScalarType::F32, 2),
            io(0, ScalarType::F32, 3),
            io(1, ScalarType::F32, 2),
        ];
        let (stride, attrs) = vertex_layout(&inputs).unwrap();

        assert_eq!(stride, 28);
        let placed: Vec<(u32, u64)> = attrs.iter().map(|a| (a.shader_location, a.offset)).collect();
        assert_eq!(placed, vec![(0, 0), (1, 12), (2, 20)]);
    }

    #[test]
    fn no_vertex_inputs_means_no_stride() {
        let (stride, attrs) = vertex_layout(&[]).unwrap();
        assert_eq!(stride, 0);
        assert!(attrs.is_empty());
    }

    #[test]
    fn bool_vertex_input_is_rejected() {
        let err = vertex_layout(&[io(0, ScalarType::Bool, 1)]).unwrap_err();
        assert!(err.contains("location 0"), "{err}");
    }

    // ── color targets ─────────────────────────────────────────────────────

    #[test]
    fn color_targets_leave_gaps_empty() {
        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let targets =
            color_targets(&[io(0, ScalarType::F32, 4), io(2, ScalarType::F32, 4)], format)
                .unwrap();
        assert_eq!(targets.len(), 3);
        assert!(targets[0].is_some());
        assert!(targets[1].is_none());
        assert!(targets[2].is_some());
    }

    #[test]
    fn integer_fragment_output_is_rejected() {
        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        assert!(color_targets(&[io(0, ScalarType::I32, 4)], format).is_err());
    }

    // ── device limits ─────────────────────────────────────────────────────

    #[test]
    fn bind_group_past_device_limit_is_a_link_error() {
        let linked = interface(vec![slot(4, 0, Some(4))], Vec::new());
        let err = check_limits(&linked, 0, &wgpu::Limits::default()).unwrap_err();
        assert!(err.contains("bind group 4"), "{err}");
    }

    #[test]
    fn too_many_vertex_inputs_is_a_link_error() {
        let inputs: Vec<InterfaceVar> = (0..17).map(|l| io(l, ScalarType::F32, 1)).collect();
        let (stride, _) = vertex_layout(&inputs).unwrap();
        let err = check_limits(&interface(Vec::new(), inputs), stride, &wgpu::Limits::default())
            .unwrap_err();
        assert!(err.contains("17 vertex inputs"), "{err}");
    }

    #[test]
    fn ordinary_interface_fits_default_limits() {
        let linked = interface(
            vec![slot(0, 0, None), slot(0, 1, None), slot(1, 0, Some(8))],
            vec![io(0, ScalarType::F32, 3), io(1, ScalarType::F32, 2)],
        );
        assert_eq!(check_limits(&linked, 20, &wgpu::Limits::default()), Ok(()));
    }

    // ── bind group planning ───────────────────────────────────────────────

    #[test]
    fn group_with_textures_and_uniforms_is_shared() {
        let resources = [
            slot(0, 0, None),
            slot(0, 1, None),
            slot(0, 2, None),
            slot(0, 3, Some(4)),
            slot(1, 0, Some(8)),
        ];
        assert_eq!(partition_groups(&resources), (vec![1], vec![0]));
    }

    // ── uniform encoding ──────────────────────────────────────────────────

    #[test]
    fn uniforms_encode_as_host_scalars() {
        assert_eq!(
            encode_uniform(UniformValue::Float(1.0), ScalarType::F32),
            Some(1.0f32.to_ne_bytes())
        );
        assert_eq!(
            encode_uniform(UniformValue::Bool(true), ScalarType::U32),
            Some(1u32.to_ne_bytes())
        );
        assert_eq!(
            encode_uniform(UniformValue::Int(-2), ScalarType::I32),
            Some((-2i32).to_ne_bytes())
        );
        assert_eq!(encode_uniform(UniformValue::Float(1.0), ScalarType::I32), None);
    }

    // ── on a device ───────────────────────────────────────────────────────
    //
    // These build real pipelines and return early on machines without any
    // usable adapter.

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
    }

    fn try_gpu() -> Option<Gpu> {
        let software = GpuInit {
            force_fallback_adapter: true,
            ..Default::default()
        };
        match Gpu::blocking_headless(software).or_else(|_| Gpu::blocking_headless(GpuInit::default())) {
            Ok(gpu) => Some(gpu),
            Err(err) => {
                eprintln!("no wgpu adapter available, skipping: {err:#}");
                None
            }
        }
    }

    fn build(backend: &mut WgpuBackend, vs: &str, fs: &str) -> ShaderProgram<WgpuBackend> {
        ShaderProgram::from_files(backend, fixture(vs), fixture(fs), &ShaderConfig::default())
    }

    fn read_back(gpu: &Gpu, buffer: &wgpu::Buffer) -> Vec<u8> {
        let device = gpu.device();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: buffer.size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, buffer.size());
        gpu.queue().submit(std::iter::once(encoder.finish()));

        staging.map_async(wgpu::MapMode::Read, .., |r| r.unwrap());
        device.poll(wgpu::PollType::wait_indefinitely()).unwrap();
        let bytes = staging.get_mapped_range(..).to_vec();
        bytes
    }

    fn target_view(gpu: &Gpu) -> wgpu::TextureView {
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("test target"),
            size: wgpu::Extent3d {
                width: 4,
                height: 4,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: gpu.target_format(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    #[test]
    fn quad_links_on_device() {
        let Some(gpu) = try_gpu() else { return };
        let mut backend = WgpuBackend::new(&gpu);

        let program = build(&mut backend, "quad.vert.wgsl", "quad.frag.wgsl");
        assert!(program.is_usable(), "{:?}", program.report());

        let handle = program.handle().unwrap();
        assert!(backend.link_status(handle));
        assert_eq!(backend.vertex_stride(handle), Some(28));
        assert!(backend.pipeline(handle).is_some());
        assert_eq!(backend.shared_groups(handle), Some(&[0][..]));
        assert!(backend.uniform_location(handle, "mix_value").is_some());
        assert!(backend.uniform_location(handle, "nope").is_none());

        let flip = backend.uniform_location(handle, "params.flip").unwrap();
        assert_eq!(backend.uniform_type(handle, flip), Some(ScalarType::U32));
    }

    #[test]
    fn uniform_writes_land_at_member_offsets() {
        let Some(gpu) = try_gpu() else { return };
        let mut backend = WgpuBackend::new(&gpu);
        let program = build(&mut backend, "quad.vert.wgsl", "quad.frag.wgsl");
        let handle = program.handle().unwrap();

        program.activate(&mut backend);
        program.set_float(&mut backend, "mix_value", 0.25);
        program.set_bool(&mut backend, "flip", true);
        program.set_float(&mut backend, "nope", 9.0);

        let bytes = read_back(&gpu, backend.uniform_buffer(handle, 1, 0).unwrap());
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &0.25f32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &1u32.to_ne_bytes());
        assert_eq!(&bytes[8..16], &[0u8; 8]);
    }

    #[test]
    fn interface_mismatch_is_a_program_diagnostic_on_device() {
        let Some(gpu) = try_gpu() else { return };
        let mut backend = WgpuBackend::new(&gpu);

        let program = build(&mut backend, "quad.vert.wgsl", "mismatch.frag.wgsl");
        let tags: Vec<DiagnosticTag> =
            program.report().diagnostics().iter().map(|d| d.tag()).collect();
        assert_eq!(tags, vec![DiagnosticTag::Program]);
        assert!(!backend.link_log(program.handle().unwrap(), 1024).is_empty());
    }

    #[test]
    fn out_of_range_bind_group_fails_link_instead_of_panicking() {
        let Some(gpu) = try_gpu() else { return };
        let mut backend = WgpuBackend::new(&gpu);

        let vs = std::fs::read_to_string(fixture("quad.vert.wgsl")).unwrap();
        let fs = r#"
@group(4) @binding(0) var<uniform> x: f32;

@fragment
fn fs_main(@location(0) a: vec2<f32>, @location(1) b: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(a, b.x, x);
}
"#;
        let program = ShaderProgram::from_sources(&mut backend, &vs, fs, &ShaderConfig::default());
        assert!(!program.is_usable());
        let log = program.report().diagnostics()[0].message().to_string();
        assert!(log.contains("bind group 4"), "{log}");
    }

    #[test]
    fn shared_group_is_completed_by_caller() {
        let Some(gpu) = try_gpu() else { return };
        let mut backend = WgpuBackend::new(&gpu);
        let program = build(&mut backend, "quad.vert.wgsl", "shared.frag.wgsl");
        assert!(program.is_usable(), "{:?}", program.report());
        let handle = program.handle().unwrap();

        assert_eq!(backend.shared_groups(handle), Some(&[0][..]));
        program.activate(&mut backend);
        program.set_float(&mut backend, "mix_value", 0.5);
        let bytes = read_back(&gpu, backend.uniform_buffer(handle, 0, 3).unwrap());
        assert_eq!(&bytes[0..4], &0.5f32.to_ne_bytes());

        let texture = target_view(&gpu);
        let sampler = gpu.device().create_sampler(&wgpu::SamplerDescriptor::default());
        let group = backend
            .create_shared_bind_group(
                handle,
                0,
                &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&texture),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&texture),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            )
            .unwrap();

        // Missing the sampler: reported, not fatal.
        let err = backend
            .create_shared_bind_group(
                handle,
                0,
                &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture),
                }],
            )
            .unwrap_err();
        assert!(err.to_string().contains("bind group 0"), "{err:#}");

        let target = target_view(&gpu);
        let mut encoder = gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("test pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            assert!(backend.bind_current(&mut pass));
            pass.set_bind_group(0, &group, &[]);
        }
        gpu.queue().submit(std::iter::once(encoder.finish()));
    }

    #[test]
    fn bind_current_without_program_is_false() {
        let Some(gpu) = try_gpu() else { return };
        let backend = WgpuBackend::new(&gpu);

        let target = target_view(&gpu);
        let mut encoder = gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: None,
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        assert!(!backend.bind_current(&mut pass));
    }
}
