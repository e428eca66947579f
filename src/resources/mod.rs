use std::ops::RangeBounds;

use slotmap::SlotMap;
use thiserror::Error;

use crate::api::{ApiError, GpuApi};

pub use self::accel::{AccelStruct, AccelStructHandle};
pub use self::buffer::{BufferHandle, BufferSlice, BufferUsages};
pub use self::descriptor::{dynamic_offsets, Descriptor, DescriptorEq};
pub use self::descriptor_set::{
    CachedSet, DescriptorSetCache, DescriptorSetError, DescriptorSetHandle, LifetimeTracker,
    PoolBudget, PoolConfig,
};
pub use self::image::ImageHandle;
pub use self::layout::{
    LayoutCache, LayoutError, LayoutSlot, PipelineLayout, PipelineLayoutHandle, SetLayout,
    SetLayoutHandle,
};
pub use self::sampler::SamplerHandle;

mod accel;
mod buffer;
mod descriptor;
mod descriptor_set;
mod image;
mod layout;
mod sampler;

/// Any resource a descriptor can reference.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ResourceHandle {
    Buffer(BufferHandle),
    Image(ImageHandle),
    Sampler(SamplerHandle),
    AccelStruct(AccelStructHandle),
}

impl From<BufferHandle> for ResourceHandle {
    fn from(handle: BufferHandle) -> Self {
        Self::Buffer(handle)
    }
}

impl From<ImageHandle> for ResourceHandle {
    fn from(handle: ImageHandle) -> Self {
        Self::Image(handle)
    }
}

impl From<SamplerHandle> for ResourceHandle {
    fn from(handle: SamplerHandle) -> Self {
        Self::Sampler(handle)
    }
}

impl From<AccelStructHandle> for ResourceHandle {
    fn from(handle: AccelStructHandle) -> Self {
        Self::AccelStruct(handle)
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource {0:?} has already been destroyed")]
    Stale(ResourceHandle),
    #[error("range is out of bounds of buffer {buffer:?} of {size} bytes")]
    OutOfBounds { buffer: BufferHandle, size: u64 },
    #[error("cannot copy a range of {src} bytes into a range of {dst} bytes")]
    SizeMismatch { src: u64, dst: u64 },
    #[error(transparent)]
    Api(#[from] ApiError),
}

pub struct Buffer<A: GpuApi> {
    pub(crate) native: A::Buffer,
    pub(crate) size: u64,
    pub(crate) usage: BufferUsages,
}

impl<A: GpuApi> Buffer<A> {
    pub fn native(&self) -> &A::Buffer {
        &self.native
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> BufferUsages {
        self.usage
    }
}

/// A copy between two equally sized buffer ranges.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferCopy {
    src: BufferSlice,
    dst: BufferSlice,
}

impl BufferCopy {
    pub fn new(src: BufferSlice, dst: BufferSlice) -> Result<Self, ResourceError> {
        if src.size != dst.size {
            return Err(ResourceError::SizeMismatch {
                src: src.size,
                dst: dst.size,
            });
        }

        Ok(Self { src, dst })
    }

    pub fn src(&self) -> BufferSlice {
        self.src
    }

    pub fn dst(&self) -> BufferSlice {
        self.dst
    }

    pub fn size(&self) -> u64 {
        self.src.size
    }
}

/// Every live buffer, image view, sampler and acceleration structure, addressed by handle.
///
/// Handles are never reused for a different resource, so a handle kept past its resource's
/// destruction is detectably stale instead of silently naming something else.
pub struct GpuResources<A: GpuApi> {
    buffers: SlotMap<BufferHandle, Buffer<A>>,
    images: SlotMap<ImageHandle, A::ImageView>,
    samplers: SlotMap<SamplerHandle, A::Sampler>,
    accel_structs: SlotMap<AccelStructHandle, AccelStruct<A>>,
}

impl<A: GpuApi> Default for GpuResources<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: GpuApi> GpuResources<A> {
    pub fn new() -> Self {
        Self {
            buffers: SlotMap::with_key(),
            images: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            accel_structs: SlotMap::with_key(),
        }
    }

    pub fn create_buffer(
        &mut self,
        api: &A,
        size: u64,
        usage: BufferUsages,
    ) -> Result<BufferHandle, ApiError> {
        let native = api.create_buffer(size, usage)?;
        Ok(self.buffers.insert(Buffer {
            native,
            size,
            usage,
        }))
    }

    pub fn insert_image(&mut self, view: A::ImageView) -> ImageHandle {
        self.images.insert(view)
    }

    pub fn insert_sampler(&mut self, sampler: A::Sampler) -> SamplerHandle {
        self.samplers.insert(sampler)
    }

    /// Register an acceleration structure built into `buffer`, which it takes ownership of.
    pub fn insert_accel_struct(
        &mut self,
        native: A::AccelStruct,
        buffer: BufferHandle,
    ) -> Result<AccelStructHandle, ResourceError> {
        if !self.buffers.contains_key(buffer) {
            return Err(ResourceError::Stale(buffer.into()));
        }

        Ok(self.accel_structs.insert(AccelStruct { native, buffer }))
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&Buffer<A>> {
        self.buffers.get(handle)
    }

    pub fn image(&self, handle: ImageHandle) -> Option<&A::ImageView> {
        self.images.get(handle)
    }

    pub fn sampler(&self, handle: SamplerHandle) -> Option<&A::Sampler> {
        self.samplers.get(handle)
    }

    pub fn accel_struct(&self, handle: AccelStructHandle) -> Option<&AccelStruct<A>> {
        self.accel_structs.get(handle)
    }

    pub fn contains(&self, handle: ResourceHandle) -> bool {
        match handle {
            ResourceHandle::Buffer(handle) => self.buffers.contains_key(handle),
            ResourceHandle::Image(handle) => self.images.contains_key(handle),
            ResourceHandle::Sampler(handle) => self.samplers.contains_key(handle),
            ResourceHandle::AccelStruct(handle) => self.accel_structs.contains_key(handle),
        }
    }

    /// A bounds-checked slice of `handle`. An unbounded end runs to the end of the buffer.
    pub fn slice(
        &self,
        handle: BufferHandle,
        range: impl RangeBounds<u64>,
    ) -> Result<BufferSlice, ResourceError> {
        let size = self.buffer_size(handle)?;
        let (offset, len) = buffer::resolve_range(range, size).ok_or(ResourceError::OutOfBounds {
            buffer: handle,
            size,
        })?;

        Ok(BufferSlice::new(handle, offset, len))
    }

    /// Write `data` into `slice`, which must be at least as large as the data.
    pub fn write(&self, api: &A, slice: BufferSlice, data: &[u8]) -> Result<(), ResourceError> {
        let buffer = self.checked_buffer(&slice)?;
        if (data.len() as u64) > slice.size {
            return Err(ResourceError::OutOfBounds {
                buffer: slice.buffer,
                size: slice.size,
            });
        }

        api.write_buffer(&buffer.native, slice.offset, data);
        Ok(())
    }

    /// Check that both ends of `copy` are live and in bounds.
    pub fn validate_copy(&self, copy: &BufferCopy) -> Result<(), ResourceError> {
        self.checked_buffer(&copy.src)?;
        self.checked_buffer(&copy.dst)?;
        Ok(())
    }

    pub(crate) fn remove_buffer(&mut self, handle: BufferHandle) -> Option<Buffer<A>> {
        self.buffers.remove(handle)
    }

    pub(crate) fn remove_image(&mut self, handle: ImageHandle) -> Option<A::ImageView> {
        self.images.remove(handle)
    }

    pub(crate) fn remove_sampler(&mut self, handle: SamplerHandle) -> Option<A::Sampler> {
        self.samplers.remove(handle)
    }

    pub(crate) fn remove_accel_struct(
        &mut self,
        handle: AccelStructHandle,
    ) -> Option<AccelStruct<A>> {
        self.accel_structs.remove(handle)
    }

    /// Release every resource. Acceleration structures go before the buffers backing them.
    pub(crate) fn destroy_all(&mut self, api: &A) {
        for (_, accel) in self.accel_structs.drain() {
            api.destroy_accel_struct(accel.native);
        }
        for (_, buffer) in self.buffers.drain() {
            api.destroy_buffer(buffer.native);
        }
        for (_, view) in self.images.drain() {
            api.destroy_image_view(view);
        }
        for (_, sampler) in self.samplers.drain() {
            api.destroy_sampler(sampler);
        }
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn buffer_size(&self, handle: BufferHandle) -> Result<u64, ResourceError> {
        self.buffers
            .get(handle)
            .map(Buffer::size)
            .ok_or(ResourceError::Stale(handle.into()))
    }

    fn checked_buffer(&self, slice: &BufferSlice) -> Result<&Buffer<A>, ResourceError> {
        let buffer = self
            .buffers
            .get(slice.buffer)
            .ok_or(ResourceError::Stale(slice.buffer.into()))?;
        if slice.end().map_or(true, |end| end > buffer.size) {
            return Err(ResourceError::OutOfBounds {
                buffer: slice.buffer,
                size: buffer.size,
            });
        }

        Ok(buffer)
    }
}
