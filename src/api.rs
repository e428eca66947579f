//! The seam between the caches and the graphics API that owns the actual objects.

use descry_reflect::DescriptorKind;
use thiserror::Error;

use crate::resources::{BufferUsages, LayoutSlot};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to create {0}: {1}")]
    CreationFailed(&'static str, String),
    #[error("out of device memory while creating {0}")]
    OutOfMemory(&'static str),
    #[error("descriptor kind {0:?} is not supported by this backend")]
    Unsupported(DescriptorKind),
}

/// The layout an image is in while a descriptor set references it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Storage images are read and written in the general layout.
    General,
    /// Sampled images are only read.
    ShaderReadOnly,
}

/// One write into a freshly allocated descriptor set. The payload shape follows the kind of
/// resource being written.
pub enum DescriptorWrite<'a, A: GpuApi + ?Sized> {
    /// `offset` is zero for a dynamic binding. The real offset is given when the set is bound.
    Buffer {
        binding: u32,
        kind: DescriptorKind,
        dynamic: bool,
        buffer: &'a A::Buffer,
        offset: u64,
        range: u64,
    },
    StorageImage {
        binding: u32,
        view: &'a A::ImageView,
        layout: ImageLayout,
    },
    CombinedImageSampler {
        binding: u32,
        view: &'a A::ImageView,
        sampler: &'a A::Sampler,
        layout: ImageLayout,
    },
    AccelStruct {
        binding: u32,
        accel: &'a A::AccelStruct,
    },
}

impl<A: GpuApi + ?Sized> DescriptorWrite<'_, A> {
    pub fn binding(&self) -> u32 {
        match *self {
            DescriptorWrite::Buffer { binding, .. }
            | DescriptorWrite::StorageImage { binding, .. }
            | DescriptorWrite::CombinedImageSampler { binding, .. }
            | DescriptorWrite::AccelStruct { binding, .. } => binding,
        }
    }

    pub fn kind(&self) -> DescriptorKind {
        match *self {
            DescriptorWrite::Buffer { kind, .. } => kind,
            DescriptorWrite::StorageImage { .. } => DescriptorKind::StorageImage,
            DescriptorWrite::CombinedImageSampler { .. } => DescriptorKind::CombinedImageSampler,
            DescriptorWrite::AccelStruct { .. } => DescriptorKind::AccelerationStructure,
        }
    }

    /// The layout slot this write has to land in.
    pub fn slot(&self) -> LayoutSlot {
        match *self {
            DescriptorWrite::Buffer { kind, dynamic, .. } => LayoutSlot { kind, dynamic },
            _ => LayoutSlot::new(self.kind()),
        }
    }
}

/// The graphics API primitives the binding caches are built on.
///
/// Every call is synchronous and is expected to come from the thread that records and submits
/// GPU work. Objects are returned by value and handed back by value when they are destroyed, so
/// an implementation never has to track them itself.
pub trait GpuApi {
    type Buffer;
    type ImageView;
    type Sampler;
    type AccelStruct;
    type SetLayout;
    type PipelineLayout;
    type DescriptorSet;

    /// Create a set layout with one binding per `Some` slot, numbered by slot index. `None`
    /// slots reserve their index without describing a binding.
    fn create_set_layout(&self, slots: &[Option<LayoutSlot>]) -> Result<Self::SetLayout, ApiError>;

    fn destroy_set_layout(&self, layout: Self::SetLayout);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[&Self::SetLayout],
    ) -> Result<Self::PipelineLayout, ApiError>;

    fn destroy_pipeline_layout(&self, layout: Self::PipelineLayout);

    /// Allocate a descriptor set of `layout` and apply `writes` to it.
    fn create_descriptor_set(
        &self,
        layout: &Self::SetLayout,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> Result<Self::DescriptorSet, ApiError>;

    /// Return a descriptor set to the pool it was allocated from.
    fn free_descriptor_set(&self, set: Self::DescriptorSet);

    /// Create a host-writable buffer of `size` bytes.
    fn create_buffer(&self, size: u64, usage: BufferUsages) -> Result<Self::Buffer, ApiError>;

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

    fn destroy_buffer(&self, buffer: Self::Buffer);

    fn destroy_image_view(&self, view: Self::ImageView);

    fn destroy_sampler(&self, sampler: Self::Sampler);

    fn destroy_accel_struct(&self, accel: Self::AccelStruct);

    /// The alignment of offsets into a buffer bound as a uniform buffer.
    fn min_uniform_offset_alignment(&self) -> u64;

    /// The alignment of offsets into a buffer bound as a storage buffer.
    fn min_storage_offset_alignment(&self) -> u64;
}
