use descry_reflect::{DescriptorKind, Reflection, ShaderStage};
use log::debug;
use smallvec::SmallVec;

use crate::api::GpuApi;
use crate::resources::{
    LayoutCache, LayoutError, LayoutSlot, PipelineLayoutHandle, SetLayoutHandle,
};

pub(crate) type Slots = SmallVec<[Option<LayoutSlot>; 8]>;

/// The bindings of every module of one pipeline, indexed by set and then by binding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergedLayout {
    sets: Vec<Slots>,
    stages: SmallVec<[ShaderStage; 4]>,
}

impl MergedLayout {
    /// Merge the bindings of `modules`. Modules may share a slot as long as they agree on what
    /// it holds.
    pub fn merge(modules: &[&Reflection]) -> Result<Self, LayoutError> {
        let mut merged = MergedLayout::default();

        for module in modules {
            for binding in &module.bindings {
                let set = binding.set as usize;
                let index = binding.binding as usize;

                if merged.sets.len() <= set {
                    merged.sets.resize_with(set + 1, Slots::new);
                }
                let slots = &mut merged.sets[set];
                if slots.len() <= index {
                    slots.resize(index + 1, None);
                }

                let existing = slots[index];
                match existing {
                    Some(first) if first.kind != binding.kind => {
                        return Err(LayoutError::IncompatibleDescriptorType {
                            set: binding.set,
                            binding: binding.binding,
                            first: first.kind,
                            second: binding.kind,
                        })
                    }
                    _ => slots[index] = Some(LayoutSlot::new(binding.kind)),
                }
            }

            for entry_point in &module.entry_points {
                if !merged.stages.contains(&entry_point.stage) {
                    merged.stages.push(entry_point.stage);
                }
            }
        }

        Ok(merged)
    }

    /// Take the offset of the buffer at `set`, `binding` when the set is bound. Sets made of
    /// buffer sub-ranges are laid out this way.
    pub fn make_dynamic(&mut self, set: u32, binding: u32) -> Result<(), LayoutError> {
        let slot = self
            .sets
            .get_mut(set as usize)
            .and_then(|slots| slots.get_mut(binding as usize))
            .and_then(Option::as_mut)
            .filter(|slot| {
                matches!(
                    slot.kind,
                    DescriptorKind::UniformBuffer | DescriptorKind::StorageBuffer
                )
            })
            .ok_or(LayoutError::NotADynamicBuffer { set, binding })?;

        slot.dynamic = true;
        Ok(())
    }

    /// One past the highest set index any module uses.
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn set(&self, index: usize) -> Option<&[Option<LayoutSlot>]> {
        self.sets.get(index).map(|slots| &slots[..])
    }

    pub fn sets(&self) -> impl Iterator<Item = &[Option<LayoutSlot>]> {
        self.sets.iter().map(|slots| &slots[..])
    }

    /// Every stage the merged modules have an entry point for, in first-seen order.
    pub fn stages(&self) -> &[ShaderStage] {
        &self.stages
    }
}

/// What pipeline construction needs to know about the layout of a pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineLayoutInfo {
    pub pipeline: PipelineLayoutHandle,
    /// The layout of every set up to the highest one used, in set order.
    pub sets: SmallVec<[SetLayoutHandle; 4]>,
    pub stages: SmallVec<[ShaderStage; 4]>,
}

/// Merge `modules` and fetch the layouts of the result from `cache`, creating whatever is missing.
pub fn derive_layout<A: GpuApi>(
    api: &A,
    cache: &mut LayoutCache<A>,
    modules: &[&Reflection],
) -> Result<PipelineLayoutInfo, LayoutError> {
    derive_merged_layout(api, cache, &MergedLayout::merge(modules)?)
}

/// Fetch the layouts of an already merged pipeline from `cache`, creating whatever is missing.
pub fn derive_merged_layout<A: GpuApi>(
    api: &A,
    cache: &mut LayoutCache<A>,
    merged: &MergedLayout,
) -> Result<PipelineLayoutInfo, LayoutError> {
    let sets = merged
        .sets()
        .map(|slots| cache.set_layout(api, slots))
        .collect::<Result<SmallVec<[_; 4]>, _>>()?;
    let pipeline = cache.pipeline_layout(api, &sets)?;

    debug!(
        "derived pipeline layout {pipeline:?} with {} sets for stages {:?}",
        sets.len(),
        merged.stages()
    );

    Ok(PipelineLayoutInfo {
        pipeline,
        sets,
        stages: merged.stages.clone(),
    })
}

#[cfg(test)]
mod tests {
    use descry_reflect::{Binding, EntryPoint};

    use super::*;
    use crate::mock::MockApi;

    use DescriptorKind::*;

    fn slot(kind: DescriptorKind) -> Option<LayoutSlot> {
        Some(LayoutSlot::new(kind))
    }

    fn module(stage: ShaderStage, bindings: &[(u32, u32, DescriptorKind)]) -> Reflection {
        Reflection {
            entry_points: vec![EntryPoint {
                stage,
                name: "main".into(),
            }],
            bindings: bindings
                .iter()
                .map(|&(set, binding, kind)| Binding { set, binding, kind })
                .collect(),
        }
    }

    #[test]
    fn uniform_and_sampler_share_set_zero() {
        let fragment = module(
            ShaderStage::Fragment,
            &[(0, 0, UniformBuffer), (0, 1, CombinedImageSampler)],
        );

        let merged = MergedLayout::merge(&[&fragment]).unwrap();

        assert_eq!(merged.set_count(), 1);
        assert_eq!(
            merged.set(0).unwrap(),
            &[slot(UniformBuffer), slot(CombinedImageSampler)]
        );
    }

    #[test]
    fn matching_declarations_merge() {
        let vertex = module(ShaderStage::Vertex, &[(0, 0, UniformBuffer)]);
        let fragment = module(ShaderStage::Fragment, &[(0, 0, UniformBuffer)]);

        let merged = MergedLayout::merge(&[&vertex, &fragment]).unwrap();

        assert_eq!(merged.set(0).unwrap(), &[slot(UniformBuffer)]);
        assert_eq!(
            merged.stages(),
            &[ShaderStage::Vertex, ShaderStage::Fragment]
        );
    }

    #[test]
    fn conflicting_declarations_fail() {
        let vertex = module(ShaderStage::Vertex, &[(1, 2, UniformBuffer)]);
        let fragment = module(ShaderStage::Fragment, &[(1, 2, StorageBuffer)]);

        let err = MergedLayout::merge(&[&vertex, &fragment]).unwrap_err();

        assert!(matches!(
            err,
            LayoutError::IncompatibleDescriptorType {
                set: 1,
                binding: 2,
                first: UniformBuffer,
                second: StorageBuffer,
            }
        ));
    }

    #[test]
    fn gaps_stay_reserved() {
        let compute = module(
            ShaderStage::Compute,
            &[(2, 3, StorageImage), (2, 0, StorageBuffer)],
        );

        let merged = MergedLayout::merge(&[&compute]).unwrap();

        assert_eq!(merged.set_count(), 3);
        assert!(merged.set(0).unwrap().is_empty());
        assert!(merged.set(1).unwrap().is_empty());
        assert_eq!(
            merged.set(2).unwrap(),
            &[slot(StorageBuffer), None, None, slot(StorageImage)]
        );
    }

    #[test]
    fn equal_pipelines_share_layouts() {
        let api = MockApi::new();
        let mut cache = LayoutCache::new();
        let raygen = module(
            ShaderStage::RayGeneration,
            &[(0, 0, AccelerationStructure), (0, 1, StorageImage)],
        );
        let miss = module(ShaderStage::Miss, &[(1, 0, UniformBuffer)]);
        let other = module(ShaderStage::Compute, &[(1, 0, StorageBuffer)]);

        let a = derive_layout(&api, &mut cache, &[&raygen, &miss]).unwrap();
        let b = derive_layout(&api, &mut cache, &[&miss, &raygen]).unwrap();
        let c = derive_layout(&api, &mut cache, &[&raygen, &other]).unwrap();

        assert_eq!(a.pipeline, b.pipeline);
        assert_eq!(a.sets, b.sets);
        assert_ne!(a.pipeline, c.pipeline);
        assert_eq!(a.sets[0], c.sets[0]);
        assert_ne!(a.sets[1], c.sets[1]);
        assert_eq!(
            a.stages.as_slice(),
            &[ShaderStage::RayGeneration, ShaderStage::Miss]
        );
        assert_eq!(api.set_layouts_created(), 3);
        assert_eq!(api.pipeline_layouts_created(), 2);
    }

    #[test]
    fn modules_without_bindings_get_an_empty_layout() {
        let api = MockApi::new();
        let mut cache = LayoutCache::new();
        let compute = module(ShaderStage::Compute, &[]);

        let info = derive_layout(&api, &mut cache, &[&compute]).unwrap();

        assert!(info.sets.is_empty());
        assert!(cache.get_pipeline_layout(info.pipeline).is_some());
    }

    #[test]
    fn buffers_can_be_made_dynamic() {
        let api = MockApi::new();
        let mut cache = LayoutCache::new();
        let vertex = module(
            ShaderStage::Vertex,
            &[(0, 0, UniformBuffer), (0, 2, CombinedImageSampler)],
        );
        let mut merged = MergedLayout::merge(&[&vertex]).unwrap();
        let fixed = derive_merged_layout(&api, &mut cache, &merged).unwrap();

        merged.make_dynamic(0, 0).unwrap();
        assert_eq!(
            merged.set(0).unwrap(),
            &[
                Some(LayoutSlot::dynamic(UniformBuffer)),
                None,
                slot(CombinedImageSampler)
            ]
        );
        for (set, binding) in [(0, 1), (0, 2), (1, 0)] {
            assert!(matches!(
                merged.make_dynamic(set, binding),
                Err(LayoutError::NotADynamicBuffer { .. })
            ));
        }

        let dynamic = derive_merged_layout(&api, &mut cache, &merged).unwrap();
        assert_ne!(fixed.sets[0], dynamic.sets[0]);
        assert_ne!(fixed.pipeline, dynamic.pipeline);
    }
}
