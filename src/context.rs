use descry_reflect::{ReflectError, Reflection};
use log::warn;
use thiserror::Error;

use crate::api::{ApiError, GpuApi};
use crate::frame::{FrameAllocError, FrameAllocator, FrameAllocatorConfig};
use crate::reflect::{derive_layout, derive_merged_layout, MergedLayout, PipelineLayoutInfo};
use crate::resources::{
    AccelStructHandle, BufferHandle, BufferSlice, BufferUsages, Descriptor, DescriptorSetCache,
    DescriptorSetError, DescriptorSetHandle, GpuResources, ImageHandle, LayoutCache, LayoutError,
    PoolConfig, ResourceError, ResourceHandle, SamplerHandle,
};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Reflect(#[from] ReflectError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    DescriptorSet(#[from] DescriptorSetError),
    #[error(transparent)]
    FrameAlloc(#[from] FrameAllocError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingConfig {
    pub pool: PoolConfig,
    pub frame: FrameAllocatorConfig,
}

impl BindingConfig {
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn frame(mut self, frame: FrameAllocatorConfig) -> Self {
        self.frame = frame;
        self
    }
}

/// Owns the GPU API object along with every resource, layout and descriptor set made through it.
///
/// Everything here is meant to be driven from the thread that records and submits GPU work.
/// Resources should be destroyed through this type, which drops the descriptor sets using a
/// resource before the resource itself is released.
pub struct BindingContext<A: GpuApi> {
    api: A,
    resources: GpuResources<A>,
    layouts: LayoutCache<A>,
    sets: DescriptorSetCache<A>,
    frame: FrameAllocator,
}

impl<A: GpuApi> BindingContext<A> {
    pub fn new(api: A, config: BindingConfig) -> Result<Self, ContextError> {
        Ok(Self {
            api,
            resources: GpuResources::new(),
            layouts: LayoutCache::new(),
            sets: DescriptorSetCache::new(config.pool),
            frame: FrameAllocator::new(config.frame)?,
        })
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn resources(&self) -> &GpuResources<A> {
        &self.resources
    }

    pub fn layouts(&self) -> &LayoutCache<A> {
        &self.layouts
    }

    pub fn descriptor_sets(&self) -> &DescriptorSetCache<A> {
        &self.sets
    }

    pub fn frame_allocator(&self) -> &FrameAllocator {
        &self.frame
    }

    /// Start building a buffer of `size` bytes.
    pub fn buffer(&mut self, size: u64) -> BufferBuilder<'_, A> {
        BufferBuilder {
            ctx: self,
            size,
            usage: BufferUsages::empty(),
        }
    }

    pub fn insert_image(&mut self, view: A::ImageView) -> ImageHandle {
        self.resources.insert_image(view)
    }

    pub fn insert_sampler(&mut self, sampler: A::Sampler) -> SamplerHandle {
        self.resources.insert_sampler(sampler)
    }

    /// Register an acceleration structure, which takes ownership of the buffer it was built in.
    pub fn insert_accel_struct(
        &mut self,
        accel: A::AccelStruct,
        buffer: BufferHandle,
    ) -> Result<AccelStructHandle, ContextError> {
        Ok(self.resources.insert_accel_struct(accel, buffer)?)
    }

    /// Reflect a compiled shader module.
    pub fn reflect(&self, spirv: &[u8]) -> Result<Reflection, ContextError> {
        Ok(Reflection::parse(spirv)?)
    }

    /// The layout of a pipeline made of `modules`.
    pub fn pipeline_layout(
        &mut self,
        modules: &[&Reflection],
    ) -> Result<PipelineLayoutInfo, ContextError> {
        Ok(derive_layout(&self.api, &mut self.layouts, modules)?)
    }

    /// The layout of a pipeline whose modules were merged, and maybe given dynamic buffers,
    /// ahead of time.
    pub fn merged_pipeline_layout(
        &mut self,
        merged: &MergedLayout,
    ) -> Result<PipelineLayoutInfo, ContextError> {
        Ok(derive_merged_layout(&self.api, &mut self.layouts, merged)?)
    }

    /// The descriptor set holding `descriptors`, with `None` for unused binding indices.
    pub fn descriptor_set(
        &mut self,
        descriptors: &[Option<Descriptor>],
    ) -> Result<DescriptorSetHandle, ContextError> {
        Ok(self.sets.get_or_create(
            &self.api,
            &self.resources,
            &mut self.layouts,
            descriptors,
        )?)
    }

    pub fn native_descriptor_set(&self, handle: DescriptorSetHandle) -> Option<&A::DescriptorSet> {
        self.sets.get(handle).map(|set| set.native())
    }

    pub fn write(&self, slice: BufferSlice, data: &[u8]) -> Result<(), ContextError> {
        Ok(self.resources.write(&self.api, slice, data)?)
    }

    /// A range of a per-frame buffer, valid until the next [`BindingContext::new_frame()`].
    pub fn allocate(&mut self, usage: BufferUsages, size: u64) -> Result<BufferSlice, ContextError> {
        Ok(self
            .frame
            .allocate(&self.api, &mut self.resources, usage, size)?)
    }

    /// Copy `data` into a range of a per-frame buffer.
    pub fn allocate_data<T: bytemuck::Pod>(
        &mut self,
        usage: BufferUsages,
        data: &[T],
    ) -> Result<BufferSlice, ContextError> {
        Ok(self
            .frame
            .allocate_data(&self.api, &mut self.resources, usage, data)?)
    }

    pub fn new_frame(&mut self) {
        self.frame.new_frame();
    }

    /// Destroy a buffer. Returns false if it was already gone.
    pub fn destroy_buffer(&mut self, handle: BufferHandle) -> bool {
        self.invalidate(handle.into());
        self.frame.forget(handle);
        match self.resources.remove_buffer(handle) {
            Some(buffer) => {
                self.api.destroy_buffer(buffer.native);
                true
            }
            None => {
                warn!("buffer {handle:?} destroyed twice");
                false
            }
        }
    }

    pub fn destroy_image(&mut self, handle: ImageHandle) -> bool {
        self.invalidate(handle.into());
        match self.resources.remove_image(handle) {
            Some(view) => {
                self.api.destroy_image_view(view);
                true
            }
            None => {
                warn!("image {handle:?} destroyed twice");
                false
            }
        }
    }

    pub fn destroy_sampler(&mut self, handle: SamplerHandle) -> bool {
        self.invalidate(handle.into());
        match self.resources.remove_sampler(handle) {
            Some(sampler) => {
                self.api.destroy_sampler(sampler);
                true
            }
            None => {
                warn!("sampler {handle:?} destroyed twice");
                false
            }
        }
    }

    /// Destroy an acceleration structure and the buffer backing it.
    pub fn destroy_accel_struct(&mut self, handle: AccelStructHandle) -> bool {
        self.invalidate(handle.into());
        match self.resources.remove_accel_struct(handle) {
            Some(accel) => {
                self.api.destroy_accel_struct(accel.native);
                self.destroy_buffer(accel.buffer);
                true
            }
            None => {
                warn!("acceleration structure {handle:?} destroyed twice");
                false
            }
        }
    }

    /// Release everything: descriptor sets, layouts, per-frame buffers and every resource.
    pub fn destroy_all(&mut self) {
        self.sets.clear(&self.api);
        self.layouts.clear(&self.api);
        self.frame.clear();
        self.resources.destroy_all(&self.api);
    }

    fn invalidate(&mut self, resource: ResourceHandle) {
        self.sets.on_resource_destroyed(&self.api, resource);
    }
}

/// Collects the usages of a buffer before creating it with [`BufferBuilder::create()`].
pub struct BufferBuilder<'c, A: GpuApi> {
    ctx: &'c mut BindingContext<A>,
    size: u64,
    usage: BufferUsages,
}

impl<A: GpuApi> BufferBuilder<'_, A> {
    pub fn usage(mut self, usage: BufferUsages) -> Self {
        self.usage |= usage;
        self
    }

    pub fn uniform(self) -> Self {
        self.usage(BufferUsages::UNIFORM)
    }

    pub fn storage(self) -> Self {
        self.usage(BufferUsages::STORAGE)
    }

    pub fn vertex(self) -> Self {
        self.usage(BufferUsages::VERTEX)
    }

    pub fn index(self) -> Self {
        self.usage(BufferUsages::INDEX)
    }

    pub fn copy_src(self) -> Self {
        self.usage(BufferUsages::COPY_SRC)
    }

    pub fn copy_dst(self) -> Self {
        self.usage(BufferUsages::COPY_DST)
    }

    pub fn create(self) -> Result<BufferHandle, ContextError> {
        let ctx = self.ctx;
        Ok(ctx
            .resources
            .create_buffer(&ctx.api, self.size, self.usage)?)
    }
}
