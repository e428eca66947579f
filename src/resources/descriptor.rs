use descry_reflect::DescriptorKind;
use smallvec::SmallVec;

use super::{
    AccelStructHandle, BufferHandle, BufferSlice, GpuResources, ImageHandle, LayoutSlot,
    ResourceHandle, SamplerHandle,
};
use crate::api::GpuApi;
use crate::multikey::KeyEq;
use crate::resources::DescriptorSetError;

/// A resource bound to one slot of a descriptor set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Descriptor {
    /// A whole buffer.
    Buffer(BufferHandle),
    /// A sub-range of a buffer, bound at a dynamic offset.
    SubBuffer(BufferSlice),
    StorageImage(ImageHandle),
    SampledImage(ImageHandle, SamplerHandle),
    AccelStruct(AccelStructHandle),
}

impl From<BufferHandle> for Descriptor {
    fn from(handle: BufferHandle) -> Self {
        Self::Buffer(handle)
    }
}

impl From<BufferSlice> for Descriptor {
    fn from(slice: BufferSlice) -> Self {
        Self::SubBuffer(slice)
    }
}

impl From<AccelStructHandle> for Descriptor {
    fn from(handle: AccelStructHandle) -> Self {
        Self::AccelStruct(handle)
    }
}

impl Descriptor {
    /// Every resource this descriptor keeps referenced while it sits in a set.
    pub fn resources(&self) -> SmallVec<[ResourceHandle; 2]> {
        match *self {
            Descriptor::Buffer(buffer) => smallvec::smallvec![buffer.into()],
            Descriptor::SubBuffer(slice) => smallvec::smallvec![slice.buffer.into()],
            Descriptor::StorageImage(image) => smallvec::smallvec![image.into()],
            Descriptor::SampledImage(image, sampler) => {
                smallvec::smallvec![image.into(), sampler.into()]
            }
            Descriptor::AccelStruct(accel) => smallvec::smallvec![accel.into()],
        }
    }

    pub fn references(&self, resource: ResourceHandle) -> bool {
        self.resources().contains(&resource)
    }

    /// The kind of layout slot this descriptor fills. Buffers take theirs from their usage.
    pub fn kind<A: GpuApi>(
        &self,
        resources: &GpuResources<A>,
    ) -> Result<DescriptorKind, DescriptorSetError> {
        let buffer_kind = |handle: BufferHandle| match resources.buffer(handle) {
            Some(buffer) => buffer
                .usage()
                .descriptor_kind()
                .ok_or(DescriptorSetError::NotADescriptor(handle)),
            None => Err(DescriptorSetError::StaleResource(handle.into())),
        };

        match *self {
            Descriptor::Buffer(buffer) => buffer_kind(buffer),
            Descriptor::SubBuffer(slice) => buffer_kind(slice.buffer),
            Descriptor::StorageImage(_) => Ok(DescriptorKind::StorageImage),
            Descriptor::SampledImage(..) => Ok(DescriptorKind::CombinedImageSampler),
            Descriptor::AccelStruct(_) => Ok(DescriptorKind::AccelerationStructure),
        }
    }

    /// The layout slot this descriptor fills. Sub-ranges are bound at a dynamic offset.
    pub fn slot<A: GpuApi>(
        &self,
        resources: &GpuResources<A>,
    ) -> Result<LayoutSlot, DescriptorSetError> {
        Ok(LayoutSlot {
            kind: self.kind(resources)?,
            dynamic: matches!(self, Descriptor::SubBuffer(_)),
        })
    }
}

/// Compares descriptors the way a descriptor set sees them.
///
/// A sub-range is bound as its whole buffer plus a dynamic offset, so two sub-ranges match when
/// they share a buffer and a size, whatever their offsets. A whole buffer never matches a
/// sub-range of itself, since the two are written into the set differently.
#[derive(Copy, Clone, Debug, Default)]
pub struct DescriptorEq;

impl KeyEq<Descriptor> for DescriptorEq {
    fn key_eq(&self, a: &Descriptor, b: &Descriptor) -> bool {
        match (a, b) {
            (Descriptor::SubBuffer(a), Descriptor::SubBuffer(b)) => {
                a.buffer == b.buffer && a.size == b.size
            }
            (a, b) => a == b,
        }
    }
}

impl KeyEq<Option<Descriptor>> for DescriptorEq {
    fn key_eq(&self, a: &Option<Descriptor>, b: &Option<Descriptor>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => KeyEq::<Descriptor>::key_eq(self, a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// The offset of every sub-range in `descriptors`, in slot order. Bind a set that was looked up
/// with these descriptors at these offsets.
pub fn dynamic_offsets(descriptors: &[Option<Descriptor>]) -> SmallVec<[u64; 4]> {
    descriptors
        .iter()
        .filter_map(|descriptor| match descriptor {
            Some(Descriptor::SubBuffer(slice)) => Some(slice.offset),
            _ => None,
        })
        .collect()
}
