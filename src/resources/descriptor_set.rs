use descry_reflect::DescriptorKind;
use log::{debug, trace};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use thiserror::Error;

use super::{
    BufferHandle, Descriptor, DescriptorEq, GpuResources, LayoutCache, LayoutError, LayoutSlot,
    ResourceHandle, SetLayoutHandle,
};
use crate::api::{ApiError, DescriptorWrite, GpuApi, ImageLayout};
use crate::multikey::MultiKeyCache;
use crate::reflect::Slots;

new_key_type! { pub struct DescriptorSetHandle; }

#[derive(Debug, Error)]
pub enum DescriptorSetError {
    #[error("the descriptor pool has no room for another set")]
    PoolExhausted,
    #[error("the descriptor pool has no room for another {0:?} descriptor")]
    KindExhausted(DescriptorKind),
    #[error("resource {0:?} has been destroyed")]
    StaleResource(ResourceHandle),
    #[error("buffer {0:?} has neither uniform nor storage usage and can't be bound")]
    NotADescriptor(BufferHandle),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The fixed capacity of the descriptor pool sets are allocated from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_sets: u32,
    /// How many descriptors of each kind the pool holds.
    pub descriptors_per_kind: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sets: 100,
            descriptors_per_kind: 100,
        }
    }
}

impl PoolConfig {
    pub fn max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    pub fn descriptors_per_kind(mut self, count: u32) -> Self {
        self.descriptors_per_kind = count;
        self
    }
}

/// Tracks what is left of the descriptor pool.
#[derive(Clone, Debug)]
pub struct PoolBudget {
    config: PoolConfig,
    sets: u32,
    descriptors: [u32; DescriptorKind::COUNT],
}

impl PoolBudget {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            sets: 0,
            descriptors: [0; DescriptorKind::COUNT],
        }
    }

    /// Take room for one set holding `slots`, or nothing at all if it doesn't fit.
    pub fn reserve(&mut self, slots: &[Option<LayoutSlot>]) -> Result<(), DescriptorSetError> {
        if self.sets >= self.config.max_sets {
            return Err(DescriptorSetError::PoolExhausted);
        }

        let needed = count_kinds(slots);
        for kind in DescriptorKind::ALL {
            if self.descriptors[kind.index()] + needed[kind.index()]
                > self.config.descriptors_per_kind
            {
                return Err(DescriptorSetError::KindExhausted(kind));
            }
        }

        self.sets += 1;
        for (used, needed) in self.descriptors.iter_mut().zip(needed) {
            *used += needed;
        }

        Ok(())
    }

    /// Give back the room taken by a set holding `slots`. Every release must match an earlier
    /// successful reserve.
    pub fn release(&mut self, slots: &[Option<LayoutSlot>]) {
        debug_assert!(self.sets > 0, "released a set that was never reserved");
        self.sets = self.sets.saturating_sub(1);
        for (kind, (used, freed)) in DescriptorKind::ALL
            .into_iter()
            .zip(self.descriptors.iter_mut().zip(count_kinds(slots)))
        {
            debug_assert!(*used >= freed, "released more {kind:?} descriptors than reserved");
            *used = used.saturating_sub(freed);
        }
    }

    pub fn sets_in_use(&self) -> u32 {
        self.sets
    }

    pub fn descriptors_in_use(&self, kind: DescriptorKind) -> u32 {
        self.descriptors[kind.index()]
    }

    fn reset(&mut self) {
        self.sets = 0;
        self.descriptors = [0; DescriptorKind::COUNT];
    }
}

fn count_kinds(slots: &[Option<LayoutSlot>]) -> [u32; DescriptorKind::COUNT] {
    let mut counts = [0; DescriptorKind::COUNT];
    for slot in slots.iter().flatten() {
        counts[slot.kind.index()] += 1;
    }
    counts
}

/// Which descriptor sets reference each resource.
#[derive(Clone, Debug, Default)]
pub struct LifetimeTracker {
    users: FxHashMap<ResourceHandle, SmallVec<[DescriptorSetHandle; 4]>>,
}

impl LifetimeTracker {
    pub fn track(&mut self, set: DescriptorSetHandle, descriptors: &[Option<Descriptor>]) {
        for resource in descriptors.iter().flatten().flat_map(Descriptor::resources) {
            let users = self.users.entry(resource).or_default();
            if !users.contains(&set) {
                users.push(set);
            }
        }
    }

    /// Stop tracking `set` for every resource in `descriptors`.
    pub fn forget(&mut self, set: DescriptorSetHandle, descriptors: &[Option<Descriptor>]) {
        for resource in descriptors.iter().flatten().flat_map(Descriptor::resources) {
            if let Some(users) = self.users.get_mut(&resource) {
                users.retain(|user| *user != set);
                if users.is_empty() {
                    self.users.remove(&resource);
                }
            }
        }
    }

    /// Every set referencing `resource`. The resource is no longer tracked afterwards.
    pub fn take(&mut self, resource: ResourceHandle) -> SmallVec<[DescriptorSetHandle; 4]> {
        self.users.remove(&resource).unwrap_or_default()
    }

    pub fn users(&self, resource: ResourceHandle) -> &[DescriptorSetHandle] {
        self.users.get(&resource).map_or(&[], |users| &users[..])
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}

pub struct CachedSet<A: GpuApi> {
    native: A::DescriptorSet,
    layout: SetLayoutHandle,
    slots: Slots,
    descriptors: SmallVec<[Option<Descriptor>; 8]>,
}

impl<A: GpuApi> CachedSet<A> {
    pub fn native(&self) -> &A::DescriptorSet {
        &self.native
    }

    pub fn layout(&self) -> SetLayoutHandle {
        self.layout
    }

    pub fn descriptors(&self) -> &[Option<Descriptor>] {
        &self.descriptors
    }
}

/// Descriptor sets keyed by the resources written into them.
///
/// A set stays cached until one of its resources is destroyed. Destruction has to be reported
/// through [`DescriptorSetCache::on_resource_destroyed()`] before the resource itself is
/// released, so no live set ever points at freed memory.
pub struct DescriptorSetCache<A: GpuApi> {
    sets: SlotMap<DescriptorSetHandle, CachedSet<A>>,
    keys: MultiKeyCache<Option<Descriptor>, DescriptorSetHandle, DescriptorEq>,
    tracker: LifetimeTracker,
    budget: PoolBudget,
}

impl<A: GpuApi> DescriptorSetCache<A> {
    pub fn new(pool: PoolConfig) -> Self {
        Self {
            sets: SlotMap::with_key(),
            keys: MultiKeyCache::with_eq(DescriptorEq),
            tracker: LifetimeTracker::default(),
            budget: PoolBudget::new(pool),
        }
    }

    /// The set holding `descriptors`, with `None` for unused binding indices. On a miss the
    /// set's layout is derived from the descriptors' kinds and a new set is allocated and
    /// written. Sub-ranges get dynamic slots.
    pub fn get_or_create(
        &mut self,
        api: &A,
        resources: &GpuResources<A>,
        layouts: &mut LayoutCache<A>,
        descriptors: &[Option<Descriptor>],
    ) -> Result<DescriptorSetHandle, DescriptorSetError> {
        if let Some(handle) = self.find(descriptors) {
            trace!("descriptor set cache hit: {handle:?}");
            return Ok(handle);
        }

        let slots = descriptors
            .iter()
            .map(|descriptor| descriptor.map(|d| d.slot(resources)).transpose())
            .collect::<Result<Slots, _>>()?;
        let layout = layouts.set_layout(api, &slots)?;
        let native_layout = layouts
            .get_set_layout(layout)
            .ok_or(LayoutError::UnknownSetLayout(layout))?
            .native();

        let writes = descriptors
            .iter()
            .zip(&slots)
            .enumerate()
            .filter_map(|(binding, (&descriptor, &slot))| {
                Some((binding as u32, descriptor?, slot?))
            })
            .map(|(binding, descriptor, slot)| write_for(resources, binding, descriptor, slot.kind))
            .collect::<Result<Vec<_>, _>>()?;

        self.budget.reserve(&slots)?;
        let native = match api.create_descriptor_set(native_layout, &writes) {
            Ok(native) => native,
            Err(err) => {
                self.budget.release(&slots);
                return Err(err.into());
            }
        };

        let handle = self.sets.insert(CachedSet {
            native,
            layout,
            slots,
            descriptors: descriptors.iter().copied().collect(),
        });
        self.keys.insert(descriptors, handle);
        self.tracker.track(handle, descriptors);
        debug!(
            "created descriptor set {handle:?} with {} descriptors ({} sets live)",
            writes.len(),
            self.sets.len()
        );

        Ok(handle)
    }

    /// The cached set holding `descriptors`, if there is one.
    pub fn find(&self, descriptors: &[Option<Descriptor>]) -> Option<DescriptorSetHandle> {
        self.keys.get(descriptors).copied()
    }

    pub fn get(&self, handle: DescriptorSetHandle) -> Option<&CachedSet<A>> {
        self.sets.get(handle)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn tracker(&self) -> &LifetimeTracker {
        &self.tracker
    }

    pub fn budget(&self) -> &PoolBudget {
        &self.budget
    }

    /// Free every set that references `resource` and drop it from the cache. Returns how many
    /// sets were freed.
    pub fn on_resource_destroyed(&mut self, api: &A, resource: ResourceHandle) -> usize {
        let stale = self.tracker.take(resource);
        if stale.is_empty() {
            return 0;
        }

        self.keys.remove_where(|_, handle| stale.contains(handle));
        for &handle in &stale {
            if let Some(set) = self.sets.remove(handle) {
                self.tracker.forget(handle, &set.descriptors);
                self.budget.release(&set.slots);
                api.free_descriptor_set(set.native);
            }
        }

        debug!(
            "{resource:?} destroyed, freed {} descriptor sets",
            stale.len()
        );
        stale.len()
    }

    /// Free every set.
    pub fn clear(&mut self, api: &A) {
        self.keys.drain().for_each(drop);
        self.tracker.clear();
        self.budget.reset();
        for (_, set) in self.sets.drain() {
            api.free_descriptor_set(set.native);
        }
    }
}

fn stale(resource: impl Into<ResourceHandle>) -> DescriptorSetError {
    DescriptorSetError::StaleResource(resource.into())
}

fn write_for<'r, A: GpuApi>(
    resources: &'r GpuResources<A>,
    binding: u32,
    descriptor: Descriptor,
    kind: DescriptorKind,
) -> Result<DescriptorWrite<'r, A>, DescriptorSetError> {
    let write = match descriptor {
        Descriptor::Buffer(handle) => {
            let buffer = resources
                .buffer(handle)
                .ok_or_else(|| stale(handle))?;
            DescriptorWrite::Buffer {
                binding,
                kind,
                dynamic: false,
                buffer: buffer.native(),
                offset: 0,
                range: buffer.size(),
            }
        }
        Descriptor::SubBuffer(slice) => {
            let buffer = resources
                .buffer(slice.buffer)
                .ok_or_else(|| stale(slice.buffer))?;
            DescriptorWrite::Buffer {
                binding,
                kind,
                dynamic: true,
                buffer: buffer.native(),
                offset: 0,
                range: slice.size,
            }
        }
        Descriptor::StorageImage(image) => DescriptorWrite::StorageImage {
            binding,
            view: resources.image(image).ok_or_else(|| stale(image))?,
            layout: ImageLayout::General,
        },
        Descriptor::SampledImage(image, sampler) => DescriptorWrite::CombinedImageSampler {
            binding,
            view: resources.image(image).ok_or_else(|| stale(image))?,
            sampler: resources.sampler(sampler).ok_or_else(|| stale(sampler))?,
            layout: ImageLayout::ShaderReadOnly,
        },
        Descriptor::AccelStruct(accel) => DescriptorWrite::AccelStruct {
            binding,
            accel: resources
                .accel_struct(accel)
                .ok_or_else(|| stale(accel))?
                .native(),
        },
    };

    Ok(write)
}
