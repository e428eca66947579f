//! Classification of bindings by following `variable -> pointer -> pointee`.

use rustc_hash::FxHashMap;

use crate::op::{ImageSampling, Op, StorageClass};
use crate::reflection::DescriptorKind;
use crate::{InvalidDescriptorType, NotAPointer, NotAVariable, ReflectError};

/// The instruction that defined each id reflection indexes.
pub(crate) type Producers = FxHashMap<u32, Op>;

pub(crate) fn descriptor_kind(
    producers: &Producers,
    id: u32,
) -> Result<DescriptorKind, ReflectError> {
    let Some(&Op::Variable { result_type, .. }) = producers.get(&id) else {
        return Err(NotAVariable { id })?;
    };

    let Some(&Op::TypePointer {
        storage_class,
        pointee,
        ..
    }) = producers.get(&result_type)
    else {
        return Err(NotAPointer { id })?;
    };

    match storage_class {
        StorageClass::Uniform => return Ok(DescriptorKind::UniformBuffer),
        StorageClass::StorageBuffer => return Ok(DescriptorKind::StorageBuffer),
        _ => {}
    }

    let kind = match producers.get(&pointee) {
        Some(&Op::TypeSampledImage { image, .. }) => match producers.get(&image) {
            Some(&Op::TypeImage {
                sampling: ImageSampling::Sampled,
                ..
            }) => Some(DescriptorKind::CombinedImageSampler),
            _ => None,
        },
        Some(&Op::TypeImage {
            sampling: ImageSampling::Storage,
            ..
        }) => Some(DescriptorKind::StorageImage),
        Some(&Op::TypeAccelerationStructure { .. }) => {
            Some(DescriptorKind::AccelerationStructure)
        }
        _ => None,
    };

    kind.ok_or_else(|| InvalidDescriptorType { id }.into())
}
