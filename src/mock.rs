//! A [`GpuApi`] that hands out integer handles and records what it is asked to do.

use std::cell::RefCell;

use descry_reflect::DescriptorKind;
use rustc_hash::FxHashMap;

use crate::api::{ApiError, DescriptorWrite, GpuApi, ImageLayout};
use crate::resources::{BufferUsages, LayoutSlot};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MockHandle(pub u64);

/// A descriptor write with the native objects replaced by their handles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockWrite {
    Buffer {
        binding: u32,
        kind: DescriptorKind,
        dynamic: bool,
        buffer: MockHandle,
        offset: u64,
        range: u64,
    },
    StorageImage {
        binding: u32,
        view: MockHandle,
        layout: ImageLayout,
    },
    CombinedImageSampler {
        binding: u32,
        view: MockHandle,
        sampler: MockHandle,
        layout: ImageLayout,
    },
    AccelStruct {
        binding: u32,
        accel: MockHandle,
    },
}

impl From<&DescriptorWrite<'_, MockApi>> for MockWrite {
    fn from(write: &DescriptorWrite<'_, MockApi>) -> Self {
        match *write {
            DescriptorWrite::Buffer {
                binding,
                kind,
                dynamic,
                buffer,
                offset,
                range,
            } => MockWrite::Buffer {
                binding,
                kind,
                dynamic,
                buffer: *buffer,
                offset,
                range,
            },
            DescriptorWrite::StorageImage {
                binding,
                view,
                layout,
            } => MockWrite::StorageImage {
                binding,
                view: *view,
                layout,
            },
            DescriptorWrite::CombinedImageSampler {
                binding,
                view,
                sampler,
                layout,
            } => MockWrite::CombinedImageSampler {
                binding,
                view: *view,
                sampler: *sampler,
                layout,
            },
            DescriptorWrite::AccelStruct { binding, accel } => MockWrite::AccelStruct {
                binding,
                accel: *accel,
            },
        }
    }
}

#[derive(Default)]
struct MockState {
    next: u64,
    set_layouts: FxHashMap<MockHandle, Vec<Option<LayoutSlot>>>,
    pipeline_layouts: FxHashMap<MockHandle, Vec<MockHandle>>,
    sets: FxHashMap<MockHandle, Vec<MockWrite>>,
    buffers: FxHashMap<MockHandle, (u64, BufferUsages)>,
    writes: Vec<(MockHandle, u64, Vec<u8>)>,
    destroyed: Vec<MockHandle>,
    set_layouts_created: usize,
    pipeline_layouts_created: usize,
    sets_created: usize,
    buffers_created: usize,
    fail_next_set: bool,
}

impl MockState {
    fn handle(&mut self) -> MockHandle {
        self.next += 1;
        MockHandle(self.next)
    }
}

pub struct MockApi {
    state: RefCell<MockState>,
    uniform_alignment: u64,
    storage_alignment: u64,
}

impl MockApi {
    pub fn new() -> Self {
        Self::with_uniform_alignment(256)
    }

    pub fn with_uniform_alignment(uniform_alignment: u64) -> Self {
        Self {
            state: RefCell::default(),
            uniform_alignment,
            storage_alignment: 32,
        }
    }

    /// A fresh handle, for image views, samplers and acceleration structures made outside the
    /// API.
    pub fn handle(&self) -> MockHandle {
        self.state.borrow_mut().handle()
    }

    /// Make the next descriptor set allocation fail as if the pool were out of memory.
    pub fn fail_next_set(&self) {
        self.state.borrow_mut().fail_next_set = true;
    }

    pub fn set_layouts_created(&self) -> usize {
        self.state.borrow().set_layouts_created
    }

    pub fn pipeline_layouts_created(&self) -> usize {
        self.state.borrow().pipeline_layouts_created
    }

    pub fn sets_created(&self) -> usize {
        self.state.borrow().sets_created
    }

    pub fn buffers_created(&self) -> usize {
        self.state.borrow().buffers_created
    }

    pub fn live_set_layouts(&self) -> usize {
        self.state.borrow().set_layouts.len()
    }

    pub fn live_pipeline_layouts(&self) -> usize {
        self.state.borrow().pipeline_layouts.len()
    }

    pub fn live_sets(&self) -> usize {
        self.state.borrow().sets.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn buffer_size(&self, buffer: MockHandle) -> Option<u64> {
        self.state.borrow().buffers.get(&buffer).map(|&(size, _)| size)
    }

    pub fn set_writes(&self, set: MockHandle) -> Option<Vec<MockWrite>> {
        self.state.borrow().sets.get(&set).cloned()
    }

    pub fn writes(&self) -> Vec<(MockHandle, u64, Vec<u8>)> {
        self.state.borrow().writes.clone()
    }

    /// Every handle destroyed or freed so far, in order.
    pub fn destroyed(&self) -> Vec<MockHandle> {
        self.state.borrow().destroyed.clone()
    }
}

impl GpuApi for MockApi {
    type Buffer = MockHandle;
    type ImageView = MockHandle;
    type Sampler = MockHandle;
    type AccelStruct = MockHandle;
    type SetLayout = MockHandle;
    type PipelineLayout = MockHandle;
    type DescriptorSet = MockHandle;

    fn create_set_layout(&self, slots: &[Option<LayoutSlot>]) -> Result<MockHandle, ApiError> {
        let mut state = self.state.borrow_mut();
        let handle = state.handle();
        state.set_layouts.insert(handle, slots.to_vec());
        state.set_layouts_created += 1;
        Ok(handle)
    }

    fn destroy_set_layout(&self, layout: MockHandle) {
        let mut state = self.state.borrow_mut();
        state.set_layouts.remove(&layout);
        state.destroyed.push(layout);
    }

    fn create_pipeline_layout(&self, set_layouts: &[&MockHandle]) -> Result<MockHandle, ApiError> {
        let mut state = self.state.borrow_mut();
        let handle = state.handle();
        let sets = set_layouts.iter().map(|&&set| set).collect();
        state.pipeline_layouts.insert(handle, sets);
        state.pipeline_layouts_created += 1;
        Ok(handle)
    }

    fn destroy_pipeline_layout(&self, layout: MockHandle) {
        let mut state = self.state.borrow_mut();
        state.pipeline_layouts.remove(&layout);
        state.destroyed.push(layout);
    }

    fn create_descriptor_set(
        &self,
        layout: &MockHandle,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> Result<MockHandle, ApiError> {
        let mut state = self.state.borrow_mut();
        if std::mem::take(&mut state.fail_next_set) {
            return Err(ApiError::OutOfMemory("descriptor set"));
        }

        let slots = state.set_layouts.get(layout).cloned().unwrap_or_default();
        for write in writes {
            let slot = slots.get(write.binding() as usize).copied().flatten();
            assert_eq!(slot, Some(write.slot()), "write doesn't match its layout");
            if let DescriptorWrite::Buffer {
                dynamic: true,
                offset,
                ..
            } = *write
            {
                assert_eq!(offset, 0, "dynamic buffers are written at offset zero");
            }
        }

        let handle = state.handle();
        state
            .sets
            .insert(handle, writes.iter().map(MockWrite::from).collect());
        state.sets_created += 1;
        Ok(handle)
    }

    fn free_descriptor_set(&self, set: MockHandle) {
        let mut state = self.state.borrow_mut();
        assert!(state.sets.remove(&set).is_some(), "double free of {set:?}");
        state.destroyed.push(set);
    }

    fn create_buffer(&self, size: u64, usage: BufferUsages) -> Result<MockHandle, ApiError> {
        let mut state = self.state.borrow_mut();
        let handle = state.handle();
        state.buffers.insert(handle, (size, usage));
        state.buffers_created += 1;
        Ok(handle)
    }

    fn write_buffer(&self, buffer: &MockHandle, offset: u64, data: &[u8]) {
        self.state
            .borrow_mut()
            .writes
            .push((*buffer, offset, data.to_vec()));
    }

    fn destroy_buffer(&self, buffer: MockHandle) {
        let mut state = self.state.borrow_mut();
        state.buffers.remove(&buffer);
        state.destroyed.push(buffer);
    }

    fn destroy_image_view(&self, view: MockHandle) {
        self.state.borrow_mut().destroyed.push(view);
    }

    fn destroy_sampler(&self, sampler: MockHandle) {
        self.state.borrow_mut().destroyed.push(sampler);
    }

    fn destroy_accel_struct(&self, accel: MockHandle) {
        self.state.borrow_mut().destroyed.push(accel);
    }

    fn min_uniform_offset_alignment(&self) -> u64 {
        self.uniform_alignment
    }

    fn min_storage_offset_alignment(&self) -> u64 {
        self.storage_alignment
    }
}
