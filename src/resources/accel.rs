use slotmap::new_key_type;

use super::BufferHandle;
use crate::api::GpuApi;

new_key_type! { pub struct AccelStructHandle; }

/// An acceleration structure and the buffer its nodes live in. The buffer is owned by the
/// structure and destroyed with it.
pub struct AccelStruct<A: GpuApi> {
    pub(crate) native: A::AccelStruct,
    pub(crate) buffer: BufferHandle,
}

impl<A: GpuApi> AccelStruct<A> {
    pub fn native(&self) -> &A::AccelStruct {
        &self.native
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }
}
