use descry_reflect::DescriptorKind;
use log::{debug, trace};
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use thiserror::Error;

use crate::api::{ApiError, GpuApi};
use crate::multikey::MultiKeyCache;

new_key_type! { pub struct SetLayoutHandle; }
new_key_type! { pub struct PipelineLayoutHandle; }

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error(
        "binding {binding} of set {set} is a {first:?} in one shader stage and a {second:?} in another"
    )]
    IncompatibleDescriptorType {
        set: u32,
        binding: u32,
        first: DescriptorKind,
        second: DescriptorKind,
    },
    #[error("binding {binding} of set {set} is not a buffer and can't take a dynamic offset")]
    NotADynamicBuffer { set: u32, binding: u32 },
    #[error("set layout {0:?} was not created by this cache")]
    UnknownSetLayout(SetLayoutHandle),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// What one binding index of a set layout holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayoutSlot {
    pub kind: DescriptorKind,
    /// The binding's offset is given when the set is bound instead of when it is written. Only
    /// buffers are ever dynamic.
    pub dynamic: bool,
}

impl LayoutSlot {
    pub fn new(kind: DescriptorKind) -> Self {
        Self {
            kind,
            dynamic: false,
        }
    }

    pub fn dynamic(kind: DescriptorKind) -> Self {
        Self {
            kind,
            dynamic: true,
        }
    }
}

impl From<DescriptorKind> for LayoutSlot {
    fn from(kind: DescriptorKind) -> Self {
        Self::new(kind)
    }
}

pub struct SetLayout<A: GpuApi> {
    pub(crate) native: A::SetLayout,
    pub(crate) slots: SmallVec<[Option<LayoutSlot>; 8]>,
}

impl<A: GpuApi> SetLayout<A> {
    pub fn native(&self) -> &A::SetLayout {
        &self.native
    }

    /// What every binding index holds, `None` where the index is unused.
    pub fn slots(&self) -> &[Option<LayoutSlot>] {
        &self.slots
    }
}

pub struct PipelineLayout<A: GpuApi> {
    pub(crate) native: A::PipelineLayout,
    pub(crate) sets: SmallVec<[SetLayoutHandle; 4]>,
}

impl<A: GpuApi> PipelineLayout<A> {
    pub fn native(&self) -> &A::PipelineLayout {
        &self.native
    }

    pub fn sets(&self) -> &[SetLayoutHandle] {
        &self.sets
    }
}

/// Set layouts keyed by their slots, and pipeline layouts keyed by their set layouts.
///
/// Layouts are few and are reused for the life of the process, so nothing is ever evicted. Equal
/// keys always give back the same handle.
pub struct LayoutCache<A: GpuApi> {
    set_layouts: SlotMap<SetLayoutHandle, SetLayout<A>>,
    pipeline_layouts: SlotMap<PipelineLayoutHandle, PipelineLayout<A>>,
    set_layout_keys: MultiKeyCache<Option<LayoutSlot>, SetLayoutHandle>,
    pipeline_layout_keys: MultiKeyCache<SetLayoutHandle, PipelineLayoutHandle>,
}

impl<A: GpuApi> Default for LayoutCache<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: GpuApi> LayoutCache<A> {
    pub fn new() -> Self {
        Self {
            set_layouts: SlotMap::with_key(),
            pipeline_layouts: SlotMap::with_key(),
            set_layout_keys: MultiKeyCache::new(),
            pipeline_layout_keys: MultiKeyCache::new(),
        }
    }

    /// The set layout whose binding `i` holds `slots[i]`.
    pub fn set_layout(
        &mut self,
        api: &A,
        slots: &[Option<LayoutSlot>],
    ) -> Result<SetLayoutHandle, LayoutError> {
        if let Some(&handle) = self.set_layout_keys.get(slots) {
            trace!("set layout cache hit for {slots:?}");
            return Ok(handle);
        }

        let native = api.create_set_layout(slots)?;
        let handle = self.set_layouts.insert(SetLayout {
            native,
            slots: slots.iter().copied().collect(),
        });
        self.set_layout_keys.insert(slots, handle);
        debug!("created set layout {handle:?} for {slots:?}");

        Ok(handle)
    }

    /// The pipeline layout made of `sets`, in order.
    pub fn pipeline_layout(
        &mut self,
        api: &A,
        sets: &[SetLayoutHandle],
    ) -> Result<PipelineLayoutHandle, LayoutError> {
        if let Some(&handle) = self.pipeline_layout_keys.get(sets) {
            trace!("pipeline layout cache hit for {sets:?}");
            return Ok(handle);
        }

        let natives = sets
            .iter()
            .map(|&set| {
                self.set_layouts
                    .get(set)
                    .map(SetLayout::native)
                    .ok_or(LayoutError::UnknownSetLayout(set))
            })
            .collect::<Result<SmallVec<[_; 4]>, _>>()?;

        let native = api.create_pipeline_layout(&natives)?;
        let handle = self.pipeline_layouts.insert(PipelineLayout {
            native,
            sets: sets.iter().copied().collect(),
        });
        self.pipeline_layout_keys.insert(sets, handle);
        debug!("created pipeline layout {handle:?} from {} set layouts", sets.len());

        Ok(handle)
    }

    pub fn get_set_layout(&self, handle: SetLayoutHandle) -> Option<&SetLayout<A>> {
        self.set_layouts.get(handle)
    }

    pub fn get_pipeline_layout(&self, handle: PipelineLayoutHandle) -> Option<&PipelineLayout<A>> {
        self.pipeline_layouts.get(handle)
    }

    pub fn set_layout_count(&self) -> usize {
        self.set_layouts.len()
    }

    pub fn pipeline_layout_count(&self) -> usize {
        self.pipeline_layouts.len()
    }

    /// Destroy every layout. Pipeline layouts go first, since they refer to set layouts.
    pub fn clear(&mut self, api: &A) {
        self.pipeline_layout_keys.drain().for_each(drop);
        self.set_layout_keys.drain().for_each(drop);

        for (_, layout) in self.pipeline_layouts.drain() {
            api.destroy_pipeline_layout(layout.native);
        }
        for (_, layout) in self.set_layouts.drain() {
            api.destroy_set_layout(layout.native);
        }
    }
}
