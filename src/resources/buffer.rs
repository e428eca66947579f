use std::ops::{Bound, Range, RangeBounds};

use descry_reflect::DescriptorKind;
use slotmap::new_key_type;

new_key_type! { pub struct BufferHandle; }

bitflags::bitflags! {
    /// What a buffer will be used for.
    pub struct BufferUsages: u32 {
        const UNIFORM = 1 << 0;
        const STORAGE = 1 << 1;
        const VERTEX = 1 << 2;
        const INDEX = 1 << 3;
        const INDIRECT = 1 << 4;
        const COPY_SRC = 1 << 5;
        const COPY_DST = 1 << 6;
        /// Geometry or instance input to an acceleration structure build.
        const ACCEL_STRUCT_INPUT = 1 << 7;
        /// Backing storage of an acceleration structure.
        const ACCEL_STRUCT_STORAGE = 1 << 8;
    }
}

impl BufferUsages {
    /// The descriptor kind a buffer with these usages binds as. Uniform wins over storage.
    pub fn descriptor_kind(self) -> Option<DescriptorKind> {
        if self.contains(BufferUsages::UNIFORM) {
            Some(DescriptorKind::UniformBuffer)
        } else if self.contains(BufferUsages::STORAGE) {
            Some(DescriptorKind::StorageBuffer)
        } else {
            None
        }
    }
}

impl BufferHandle {
    /// A slice of this buffer covering `range`. The range is not checked against the buffer's
    /// size; use [`GpuResources::slice()`](super::GpuResources::slice) for that.
    pub fn slice(self, range: Range<u64>) -> BufferSlice {
        BufferSlice {
            buffer: self,
            offset: range.start,
            size: range.end.saturating_sub(range.start),
        }
    }
}

/// A sub-range of a buffer, `size` bytes long starting at `offset`.
///
/// Bound as a descriptor, a slice describes the whole buffer at a dynamic offset, so two slices
/// of the same buffer and size fill a descriptor slot identically wherever they start.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferSlice {
    pub(crate) buffer: BufferHandle,
    pub(crate) offset: u64,
    pub(crate) size: u64,
}

impl BufferSlice {
    pub fn new(buffer: BufferHandle, offset: u64, size: u64) -> Self {
        Self {
            buffer,
            offset,
            size,
        }
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// One past the last byte of the slice, or `None` if that is past `u64::MAX`.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }

    /// Whether this slice and `other` share any byte.
    pub fn overlaps(&self, other: &BufferSlice) -> bool {
        let ends_before =
            |a: &BufferSlice, b: &BufferSlice| a.end().is_some_and(|end| end <= b.offset);
        self.buffer == other.buffer && !ends_before(self, other) && !ends_before(other, self)
    }
}

/// Turn a range over a buffer of `buffer_size` bytes into an offset and size, if it fits.
pub(crate) fn resolve_range(
    range: impl RangeBounds<u64>,
    buffer_size: u64,
) -> Option<(u64, u64)> {
    let offset = match range.start_bound() {
        Bound::Included(&i) => i,
        Bound::Excluded(&i) => i.checked_add(1)?,
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&i) => i.checked_add(1)?,
        Bound::Excluded(&i) => i,
        Bound::Unbounded => buffer_size,
    };

    (offset <= end && end <= buffer_size).then_some((offset, end - offset))
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    #[test]
    fn usage_kinds() {
        assert_eq!(
            (BufferUsages::UNIFORM | BufferUsages::STORAGE).descriptor_kind(),
            Some(DescriptorKind::UniformBuffer)
        );
        assert_eq!(
            (BufferUsages::STORAGE | BufferUsages::COPY_DST).descriptor_kind(),
            Some(DescriptorKind::StorageBuffer)
        );
        assert_eq!(BufferUsages::VERTEX.descriptor_kind(), None);
    }

    #[test]
    fn ranges() {
        assert_eq!(resolve_range(.., 64), Some((0, 64)));
        assert_eq!(resolve_range(16.., 64), Some((16, 48)));
        assert_eq!(resolve_range(16..32, 64), Some((16, 16)));
        assert_eq!(resolve_range(16..=31, 64), Some((16, 16)));
        assert_eq!(resolve_range(0..65, 64), None);
        assert_eq!(resolve_range(32..16, 64), None);
    }

    #[test]
    fn overlap() {
        let mut map = SlotMap::<BufferHandle, ()>::with_key();
        let a = map.insert(());
        let b = map.insert(());

        assert!(a.slice(0..64).overlaps(&a.slice(32..96)));
        assert!(!a.slice(0..64).overlaps(&a.slice(64..128)));
        assert!(!a.slice(0..64).overlaps(&b.slice(0..64)));

        let past_the_end = BufferSlice::new(a, u64::MAX, 4);
        assert_eq!(past_the_end.end(), None);
        assert!(past_the_end.overlaps(&BufferSlice::new(a, u64::MAX - 2, 8)));
        assert!(!past_the_end.overlaps(&a.slice(0..64)));
    }
}
