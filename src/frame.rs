//! Per-frame bump allocation of short-lived buffer ranges.

use log::debug;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::api::{ApiError, GpuApi};
use crate::resources::{BufferHandle, BufferSlice, BufferUsages, GpuResources, ResourceError};
use crate::util::align_up;

pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameAllocError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("an allocation of {0} bytes does not fit in any buffer")]
    TooLarge(u64),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameAllocatorConfig {
    /// Backing buffers are created in multiples of this many bytes.
    pub chunk_size: u64,
}

impl Default for FrameAllocatorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl FrameAllocatorConfig {
    pub fn chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct BumpBuffer {
    buffer: BufferHandle,
    capacity: u64,
    used: u64,
}

impl BumpBuffer {
    /// Where an allocation of `size` would start, and how much room it would leave.
    fn fit(&self, size: u64, alignment: u64) -> Option<(u64, u64)> {
        let start = align_up(self.used, alignment)?;
        let end = start.checked_add(size)?;
        (end <= self.capacity).then_some((start, self.capacity - end))
    }
}

#[derive(Clone, Debug, Default)]
struct BumpAllocator {
    alignment: u64,
    buffers: Vec<BumpBuffer>,
}

/// Hands out buffer ranges that live until the next [`FrameAllocator::new_frame()`].
///
/// Each usage gets its own list of backing buffers. An allocation goes to the buffer it fills
/// most tightly, and a new buffer is created only when none has room. Buffers are never shrunk
/// or freed while the allocator is in use, so a steady workload stops allocating after a few
/// frames.
#[derive(Clone, Debug)]
pub struct FrameAllocator {
    config: FrameAllocatorConfig,
    classes: FxHashMap<BufferUsages, BumpAllocator>,
}

impl FrameAllocator {
    pub fn new(config: FrameAllocatorConfig) -> Result<Self, FrameAllocError> {
        if config.chunk_size == 0 {
            return Err(FrameAllocError::ZeroChunkSize);
        }

        Ok(Self {
            config,
            classes: FxHashMap::default(),
        })
    }

    pub fn config(&self) -> FrameAllocatorConfig {
        self.config
    }

    /// Reserve `size` bytes for `usage`. Uniform and storage ranges are aligned so they can be
    /// bound at a dynamic offset.
    pub fn allocate<A: GpuApi>(
        &mut self,
        api: &A,
        resources: &mut GpuResources<A>,
        usage: BufferUsages,
        size: u64,
    ) -> Result<BufferSlice, FrameAllocError> {
        let class = self.classes.entry(usage).or_insert_with(|| BumpAllocator {
            alignment: if usage.contains(BufferUsages::UNIFORM) {
                api.min_uniform_offset_alignment()
            } else if usage.contains(BufferUsages::STORAGE) {
                api.min_storage_offset_alignment()
            } else {
                1
            },
            buffers: vec![],
        });
        let alignment = class.alignment;

        let best = class
            .buffers
            .iter()
            .enumerate()
            .filter_map(|(i, buffer)| Some((i, buffer.fit(size, alignment)?)))
            .min_by_key(|&(_, (_, remaining))| remaining);

        let (index, start) = match best {
            Some((index, (start, _))) => (index, start),
            None => {
                let capacity = align_up(size.max(1), self.config.chunk_size)
                    .ok_or(FrameAllocError::TooLarge(size))?;
                let buffer = resources.create_buffer(api, capacity, usage)?;
                debug!(
                    "frame allocator grew {usage:?} by {capacity} bytes ({} buffers)",
                    class.buffers.len() + 1
                );
                class.buffers.push(BumpBuffer {
                    buffer,
                    capacity,
                    used: 0,
                });
                (class.buffers.len() - 1, 0)
            }
        };

        let bump = &mut class.buffers[index];
        bump.used = start + size;
        Ok(BufferSlice::new(bump.buffer, start, size))
    }

    /// Allocate room for `data` and write it there.
    pub fn allocate_data<A: GpuApi, T: bytemuck::Pod>(
        &mut self,
        api: &A,
        resources: &mut GpuResources<A>,
        usage: BufferUsages,
        data: &[T],
    ) -> Result<BufferSlice, FrameAllocError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let slice = self.allocate(api, resources, usage, bytes.len() as u64)?;
        resources.write(api, slice, bytes)?;
        Ok(slice)
    }

    /// Make every backing buffer empty again. Ranges handed out before are invalid afterwards.
    pub fn new_frame(&mut self) {
        for buffer in self.classes.values_mut().flat_map(|class| class.buffers.iter_mut()) {
            buffer.used = 0;
        }
    }

    pub fn buffer_count(&self, usage: BufferUsages) -> usize {
        self.classes
            .get(&usage)
            .map_or(0, |class| class.buffers.len())
    }

    /// Every backing buffer of every usage.
    pub fn buffers(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        self.classes
            .values()
            .flat_map(|class| class.buffers.iter().map(|bump| bump.buffer))
    }

    /// Stop allocating from `buffer`, which is about to be destroyed.
    pub(crate) fn forget(&mut self, buffer: BufferHandle) {
        for class in self.classes.values_mut() {
            class.buffers.retain(|bump| bump.buffer != buffer);
        }
    }

    /// Forget every backing buffer. The buffers stay in the registry they were created in.
    pub(crate) fn clear(&mut self) {
        self.classes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockApi;

    const MIB: u64 = 1024 * 1024;

    fn allocator(chunk_size: u64) -> FrameAllocator {
        FrameAllocator::new(FrameAllocatorConfig::default().chunk_size(chunk_size)).unwrap()
    }

    #[test]
    fn small_uniform_allocations_share_a_chunk() {
        let api = MockApi::new();
        let mut resources = GpuResources::new();
        let mut frame = allocator(8 * MIB);

        let a = frame
            .allocate(&api, &mut resources, BufferUsages::UNIFORM, 64)
            .unwrap();
        let b = frame
            .allocate(&api, &mut resources, BufferUsages::UNIFORM, 4096)
            .unwrap();

        assert_eq!(frame.buffer_count(BufferUsages::UNIFORM), 1);
        assert_eq!(api.buffers_created(), 1);
        assert_eq!(resources.buffer(a.buffer()).unwrap().size(), 8 * MIB);
        assert_eq!(a.buffer(), b.buffer());
        assert!(!a.overlaps(&b));
        assert_eq!(b.offset(), 256);
    }

    #[test]
    fn no_overlap_within_a_frame() {
        let api = MockApi::new();
        let mut resources = GpuResources::new();
        let mut frame = allocator(4096);

        let sizes = [100, 1000, 3000, 7, 4096, 2500, 1, 900];
        let slices: Vec<_> = sizes
            .iter()
            .map(|&size| {
                frame
                    .allocate(&api, &mut resources, BufferUsages::STORAGE, size)
                    .unwrap()
            })
            .collect();

        for (i, a) in slices.iter().enumerate() {
            assert!(a.end().unwrap() <= resources.buffer(a.buffer()).unwrap().size());
            for b in &slices[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn best_fit_picks_tightest_buffer() {
        let api = MockApi::new();
        let mut resources = GpuResources::new();
        let mut frame = allocator(1024);

        // 924 bytes left in the first buffer, 24 in the second.
        let loose = frame
            .allocate(&api, &mut resources, BufferUsages::VERTEX, 100)
            .unwrap();
        let tight = frame
            .allocate(&api, &mut resources, BufferUsages::VERTEX, 1000)
            .unwrap();
        assert_ne!(loose.buffer(), tight.buffer());

        let small = frame
            .allocate(&api, &mut resources, BufferUsages::VERTEX, 20)
            .unwrap();
        assert_eq!(small.buffer(), tight.buffer());
        assert_eq!(small.offset(), 1000);
        assert_eq!(frame.buffer_count(BufferUsages::VERTEX), 2);
    }

    #[test]
    fn new_frame_reuses_capacity() {
        let api = MockApi::new();
        let mut resources = GpuResources::new();
        let mut frame = allocator(MIB);

        let first = frame
            .allocate(&api, &mut resources, BufferUsages::UNIFORM, MIB)
            .unwrap();
        frame.new_frame();
        let second = frame
            .allocate(&api, &mut resources, BufferUsages::UNIFORM, MIB)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(api.buffers_created(), 1);
    }

    #[test]
    fn large_requests_round_up_to_chunks() {
        let api = MockApi::new();
        let mut resources = GpuResources::new();
        let mut frame = allocator(MIB);

        let slice = frame
            .allocate(&api, &mut resources, BufferUsages::STORAGE, MIB + 1)
            .unwrap();

        let native = *resources.buffer(slice.buffer()).unwrap().native();
        assert_eq!(api.buffer_size(native), Some(2 * MIB));
        assert_eq!(slice.size(), MIB + 1);
    }

    #[test]
    fn oversized_requests_fail_without_creating_a_buffer() {
        let api = MockApi::new();
        let mut resources = GpuResources::new();
        let mut frame = allocator(4 * MIB);

        assert!(matches!(
            frame.allocate(&api, &mut resources, BufferUsages::STORAGE, u64::MAX - 10),
            Err(FrameAllocError::TooLarge(size)) if size == u64::MAX - 10
        ));
        assert_eq!(api.buffers_created(), 0);
        assert_eq!(frame.buffer_count(BufferUsages::STORAGE), 0);

        let slice = frame
            .allocate(&api, &mut resources, BufferUsages::STORAGE, 16)
            .unwrap();
        assert_eq!(slice.offset(), 0);
    }

    #[test]
    fn storage_ranges_use_the_storage_alignment() {
        let api = MockApi::new();
        let mut resources = GpuResources::new();
        let mut frame = allocator(MIB);

        frame
            .allocate(&api, &mut resources, BufferUsages::STORAGE, 3)
            .unwrap();
        let second = frame
            .allocate(&api, &mut resources, BufferUsages::STORAGE, 3)
            .unwrap();
        let vertices = frame
            .allocate(&api, &mut resources, BufferUsages::VERTEX, 3)
            .unwrap();
        let more_vertices = frame
            .allocate(&api, &mut resources, BufferUsages::VERTEX, 3)
            .unwrap();

        assert_eq!(second.offset(), api.min_storage_offset_alignment());
        assert_eq!(vertices.offset(), 0);
        assert_eq!(more_vertices.offset(), 3);
    }

    #[test]
    fn usages_get_separate_buffers() {
        let api = MockApi::new();
        let mut resources = GpuResources::new();
        let mut frame = allocator(MIB);

        let uniform = frame
            .allocate(&api, &mut resources, BufferUsages::UNIFORM, 16)
            .unwrap();
        let index = frame
            .allocate(&api, &mut resources, BufferUsages::INDEX, 16)
            .unwrap();

        assert_ne!(uniform.buffer(), index.buffer());
        assert_eq!(
            resources.buffer(index.buffer()).unwrap().usage(),
            BufferUsages::INDEX
        );
        assert_eq!(frame.buffers().count(), 2);
    }

    #[test]
    fn allocate_data_writes() {
        let api = MockApi::with_uniform_alignment(64);
        let mut resources = GpuResources::new();
        let mut frame = allocator(MIB);

        frame
            .allocate_data(&api, &mut resources, BufferUsages::UNIFORM, &[1u32])
            .unwrap();
        let slice = frame
            .allocate_data(&api, &mut resources, BufferUsages::UNIFORM, &[2u32, 3])
            .unwrap();

        assert_eq!((slice.offset(), slice.size()), (64, 8));
        let native = *resources.buffer(slice.buffer()).unwrap().native();
        assert_eq!(
            api.writes().last().unwrap(),
            &(native, 64, bytemuck::cast_slice::<u32, u8>(&[2, 3]).to_vec())
        );
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(
            FrameAllocator::new(FrameAllocatorConfig::default().chunk_size(0)),
            Err(FrameAllocError::ZeroChunkSize)
        ));
    }
}
