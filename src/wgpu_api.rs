use std::convert::Infallible;
use std::num::NonZeroU64;

use descry_reflect::DescriptorKind;
use futures_lite::future::block_on;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, Buffer, BufferBinding,
    BufferBindingType, BufferDescriptor, Device, ErrorFilter, PipelineLayout,
    PipelineLayoutDescriptor, Queue, Sampler, ShaderStages, StorageTextureAccess, TextureFormat,
    TextureView, TextureViewDimension,
};

use crate::api::{ApiError, DescriptorWrite, GpuApi};
use crate::resources::{BufferUsages, LayoutSlot};

/// [`GpuApi`] on a `wgpu` device.
///
/// wgpu has no combined image samplers and no acceleration structures, so layouts and sets
/// holding either fail with [`ApiError::Unsupported`]. Storage images are bound write-only as 2D
/// views of [`WgpuApi::storage_format()`]. Dynamic buffer slots become bind group layout entries
/// with `has_dynamic_offset`, so their offsets are passed to `set_bind_group`.
#[derive(Copy, Clone, Debug)]
pub struct WgpuApi<'d, 'q> {
    device: &'d Device,
    queue: &'q Queue,
    storage_format: TextureFormat,
}

impl<'d, 'q> WgpuApi<'d, 'q> {
    pub fn new(device: &'d Device, queue: &'q Queue) -> Self {
        Self {
            device,
            queue,
            storage_format: TextureFormat::Rgba8Unorm,
        }
    }

    pub fn storage_format(mut self, format: TextureFormat) -> Self {
        self.storage_format = format;
        self
    }

    pub fn device(&self) -> &'d Device {
        self.device
    }

    pub fn queue(&self) -> &'q Queue {
        self.queue
    }

    /// Run `create` and turn any error wgpu reports for it into an [`ApiError`].
    fn checked<T>(&self, what: &'static str, create: impl FnOnce() -> T) -> Result<T, ApiError> {
        self.device.push_error_scope(ErrorFilter::OutOfMemory);
        self.device.push_error_scope(ErrorFilter::Validation);
        let value = create();
        let validation = block_on(self.device.pop_error_scope());
        let out_of_memory = block_on(self.device.pop_error_scope());

        if out_of_memory.is_some() {
            return Err(ApiError::OutOfMemory(what));
        }
        if let Some(err) = validation {
            return Err(ApiError::CreationFailed(what, err.to_string()));
        }

        Ok(value)
    }
}

fn binding_type(slot: LayoutSlot, storage_format: TextureFormat) -> Result<BindingType, ApiError> {
    let ty = match slot.kind {
        DescriptorKind::UniformBuffer => BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: slot.dynamic,
            min_binding_size: None,
        },
        DescriptorKind::StorageBuffer => BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: slot.dynamic,
            min_binding_size: None,
        },
        DescriptorKind::StorageImage => BindingType::StorageTexture {
            access: StorageTextureAccess::WriteOnly,
            format: storage_format,
            view_dimension: TextureViewDimension::D2,
        },
        kind @ (DescriptorKind::CombinedImageSampler
        | DescriptorKind::AccelerationStructure) => return Err(ApiError::Unsupported(kind)),
    };

    Ok(ty)
}

pub fn wgpu_usages(usage: BufferUsages) -> wgpu::BufferUsages {
    let mut wgpu_usage = wgpu::BufferUsages::COPY_DST;
    for (ours, theirs) in [
        (BufferUsages::UNIFORM, wgpu::BufferUsages::UNIFORM),
        (BufferUsages::STORAGE, wgpu::BufferUsages::STORAGE),
        (BufferUsages::VERTEX, wgpu::BufferUsages::VERTEX),
        (BufferUsages::INDEX, wgpu::BufferUsages::INDEX),
        (BufferUsages::INDIRECT, wgpu::BufferUsages::INDIRECT),
        (BufferUsages::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
    ] {
        if usage.contains(ours) {
            wgpu_usage |= theirs;
        }
    }
    wgpu_usage
}

impl GpuApi for WgpuApi<'_, '_> {
    type Buffer = Buffer;
    type ImageView = TextureView;
    type Sampler = Sampler;
    type AccelStruct = Infallible;
    type SetLayout = BindGroupLayout;
    type PipelineLayout = PipelineLayout;
    type DescriptorSet = BindGroup;

    fn create_set_layout(
        &self,
        slots: &[Option<LayoutSlot>],
    ) -> Result<BindGroupLayout, ApiError> {
        let entries = slots
            .iter()
            .enumerate()
            .filter_map(|(binding, slot)| Some((binding as u32, (*slot)?)))
            .map(|(binding, slot)| {
                Ok(BindGroupLayoutEntry {
                    binding,
                    visibility: ShaderStages::all(),
                    ty: binding_type(slot, self.storage_format)?,
                    count: None,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        self.checked("bind group layout", || {
            self.device
                .create_bind_group_layout(&BindGroupLayoutDescriptor {
                    label: None,
                    entries: &entries,
                })
        })
    }

    fn destroy_set_layout(&self, _layout: BindGroupLayout) {}

    fn create_pipeline_layout(
        &self,
        set_layouts: &[&BindGroupLayout],
    ) -> Result<PipelineLayout, ApiError> {
        self.checked("pipeline layout", || {
            self.device
                .create_pipeline_layout(&PipelineLayoutDescriptor {
                    label: None,
                    bind_group_layouts: set_layouts,
                    push_constant_ranges: &[],
                })
        })
    }

    fn destroy_pipeline_layout(&self, _layout: PipelineLayout) {}

    fn create_descriptor_set(
        &self,
        layout: &BindGroupLayout,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> Result<BindGroup, ApiError> {
        let entries = writes
            .iter()
            .map(|write| {
                let resource = match *write {
                    DescriptorWrite::Buffer {
                        buffer,
                        offset,
                        range,
                        ..
                    } => BindingResource::Buffer(BufferBinding {
                        buffer,
                        offset,
                        size: NonZeroU64::new(range),
                    }),
                    DescriptorWrite::StorageImage { view, .. } => BindingResource::TextureView(view),
                    DescriptorWrite::CombinedImageSampler { .. } => {
                        return Err(ApiError::Unsupported(write.kind()))
                    }
                    DescriptorWrite::AccelStruct { accel, .. } => match *accel {},
                };

                Ok(BindGroupEntry {
                    binding: write.binding(),
                    resource,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        self.checked("bind group", || {
            self.device.create_bind_group(&BindGroupDescriptor {
                label: None,
                layout,
                entries: &entries,
            })
        })
    }

    fn free_descriptor_set(&self, _set: BindGroup) {}

    fn create_buffer(&self, size: u64, usage: BufferUsages) -> Result<Buffer, ApiError> {
        self.checked("buffer", || {
            self.device.create_buffer(&BufferDescriptor {
                label: None,
                size,
                usage: wgpu_usages(usage),
                mapped_at_creation: false,
            })
        })
    }

    fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    fn destroy_buffer(&self, buffer: Buffer) {
        buffer.destroy();
    }

    fn destroy_image_view(&self, _view: TextureView) {}

    fn destroy_sampler(&self, _sampler: Sampler) {}

    fn destroy_accel_struct(&self, accel: Infallible) {
        match accel {}
    }

    fn min_uniform_offset_alignment(&self) -> u64 {
        self.device.limits().min_uniform_buffer_offset_alignment as u64
    }

    fn min_storage_offset_alignment(&self) -> u64 {
        self.device.limits().min_storage_buffer_offset_alignment as u64
    }
}
