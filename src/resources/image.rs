use slotmap::new_key_type;

use super::sampler::SamplerHandle;
use crate::resources::Descriptor;

new_key_type! { pub struct ImageHandle; }

impl ImageHandle {
    /// Bind this image as a storage image, read and written in the general layout.
    pub fn storage(self) -> Descriptor {
        Descriptor::StorageImage(self)
    }

    /// Bind this image together with `sampler`, read-only.
    pub fn sampled(self, sampler: SamplerHandle) -> Descriptor {
        Descriptor::SampledImage(self, sampler)
    }
}
