pub use descry_reflect::{
    Binding, DescriptorKind, EntryPoint, ReflectError, Reflection, ShaderStage,
};

pub use crate::api::{ApiError, DescriptorWrite, GpuApi, ImageLayout};
pub use crate::context::{BindingConfig, BindingContext, BufferBuilder, ContextError};
pub use crate::frame::{
    FrameAllocError, FrameAllocator, FrameAllocatorConfig, DEFAULT_CHUNK_SIZE,
};
pub use crate::multikey::{Identity, KeyEq, MultiKeyCache};
pub use crate::reflect::{derive_layout, derive_merged_layout, MergedLayout, PipelineLayoutInfo};
pub use crate::resources::{
    dynamic_offsets, AccelStruct, AccelStructHandle, Buffer, BufferCopy, BufferHandle,
    BufferSlice, BufferUsages, CachedSet, Descriptor, DescriptorEq, DescriptorSetCache,
    DescriptorSetError, DescriptorSetHandle, GpuResources, ImageHandle, LayoutCache,
    LayoutError, LayoutSlot, LifetimeTracker, PipelineLayout, PipelineLayoutHandle, PoolBudget, PoolConfig,
    ResourceError, ResourceHandle, SamplerHandle, SetLayout, SetLayoutHandle,
};
pub use crate::util::align_up;
#[cfg(feature = "wgpu")]
pub use crate::wgpu_api::{wgpu_usages, WgpuApi};
