use crate::{ReflectError, UnsupportedExecutionModel};

/// The pipeline stage an entry point runs in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Tessellation control shader.
    TessellationControl,
    /// Tessellation evaluation shader.
    TessellationEvaluation,
    /// Geometry shader.
    Geometry,
    /// Fragment shader.
    Fragment,
    /// Compute shader.
    Compute,
    /// Ray generation shader.
    RayGeneration,
    /// Ray intersection shader.
    Intersection,
    /// Ray any-hit shader.
    AnyHit,
    /// Ray closest-hit shader.
    ClosestHit,
    /// Ray miss shader.
    Miss,
    /// Callable shader.
    Callable,
    /// Task shader.
    Task,
    /// Mesh shader.
    Mesh,
}

impl ShaderStage {
    /// Map a raw SPIR-V execution model to a stage. OpenCL kernels have no stage.
    pub fn from_execution_model(model: u32) -> Result<Self, ReflectError> {
        let stage = match model {
            0 => ShaderStage::Vertex,
            1 => ShaderStage::TessellationControl,
            2 => ShaderStage::TessellationEvaluation,
            3 => ShaderStage::Geometry,
            4 => ShaderStage::Fragment,
            5 => ShaderStage::Compute,
            5313 => ShaderStage::RayGeneration,
            5314 => ShaderStage::Intersection,
            5315 => ShaderStage::AnyHit,
            5316 => ShaderStage::ClosestHit,
            5317 => ShaderStage::Miss,
            5318 => ShaderStage::Callable,
            5364 => ShaderStage::Task,
            5365 => ShaderStage::Mesh,
            model => return Err(UnsupportedExecutionModel { model })?,
        };

        Ok(stage)
    }
}

/// A named entry point of a module.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntryPoint {
    /// The stage the entry point runs in.
    pub stage: ShaderStage,
    /// The name of the entry point function.
    pub name: String,
}

/// The kinds of resource a binding can hold. This set is closed: a binding that is none of these
/// fails reflection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorKind {
    /// A uniform buffer block.
    UniformBuffer,
    /// A storage buffer block.
    StorageBuffer,
    /// An image paired with a sampler.
    CombinedImageSampler,
    /// An image read and written without a sampler.
    StorageImage,
    /// A ray tracing acceleration structure.
    AccelerationStructure,
}

impl DescriptorKind {
    /// The number of descriptor kinds.
    pub const COUNT: usize = 5;

    /// Every descriptor kind, in declaration order.
    pub const ALL: [DescriptorKind; Self::COUNT] = [
        DescriptorKind::UniformBuffer,
        DescriptorKind::StorageBuffer,
        DescriptorKind::CombinedImageSampler,
        DescriptorKind::StorageImage,
        DescriptorKind::AccelerationStructure,
    ];

    /// The position of this kind within [`DescriptorKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A resource binding of a module: its slot and what it holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Binding {
    /// The descriptor set index.
    pub set: u32,
    /// The binding index within the set.
    pub binding: u32,
    /// The kind of resource bound.
    pub kind: DescriptorKind,
}

/// Everything reflected from one module: its entry points and its resource bindings.
///
/// Created with [`Reflection::parse()`]. Bindings are in the order their first decoration
/// appears in the module, and no two share a `(set, binding)` slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reflection {
    /// The entry points of the module.
    pub entry_points: Vec<EntryPoint>,
    /// The resource bindings of the module.
    pub bindings: Vec<Binding>,
}

impl Reflection {
    /// The first entry point that runs in `stage`.
    pub fn entry_point(&self, stage: ShaderStage) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|point| point.stage == stage)
    }

    /// The entry point called `name`.
    pub fn entry_point_named(&self, name: &str) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|point| point.name == name)
    }

    /// The bindings of descriptor set `set`.
    pub fn bindings_in_set(&self, set: u32) -> impl Iterator<Item = &Binding> {
        self.bindings.iter().filter(move |binding| binding.set == set)
    }

    /// One past the highest descriptor set index used, or zero without bindings.
    pub fn set_count(&self) -> u32 {
        self.bindings
            .iter()
            .map(|binding| binding.set + 1)
            .max()
            .unwrap_or(0)
    }
}
