//! Device-local buffers.

use std::sync::Arc;

use crate::backend::{ResourceDesc, ResourceFlags, UavDesc, UavDimension};
use crate::descriptor::UnorderedAccessView;
use crate::device::Device;
use crate::error::GpuResult;
use crate::resource::{AsGpuResource, GpuResource};
use crate::transient::align_up;
use crate::types::{PixelFormat, ResourceState};

/// A device-local buffer with a raw byte-address UAV.
///
/// The reported size is the requested size rounded up to a 256-byte
/// multiple; the UAV exposes it as `size / 4` 32-bit elements.
pub struct GpuBuffer {
    resource: GpuResource,
    size: u64,
    uav: UnorderedAccessView,
}

impl GpuBuffer {
    /// Create a buffer of at least `size` bytes.
    pub fn new(device: &Arc<Device>, size: u64, label: Option<&str>) -> GpuResult<Self> {
        let size = align_up(size.max(1), 256);
        let mut desc = ResourceDesc::buffer(size).with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS);
        if let Some(label) = label {
            desc = desc.with_label(label);
        }
        let raw = device
            .raw()
            .create_committed_resource(desc, ResourceState::COMMON)?;
        let uav = UnorderedAccessView::new(
            device,
            UavDesc {
                resource: raw.clone(),
                format: PixelFormat::Unknown,
                dimension: UavDimension::RawBuffer {
                    element_count: (size / 4) as u32,
                },
            },
        )?;
        Ok(Self {
            resource: GpuResource::new(raw, ResourceState::COMMON),
            size,
            uav,
        })
    }

    /// Rounded-up size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// GPU virtual address of the buffer start.
    pub fn gpu_address(&self) -> u64 {
        self.resource.raw().gpu_address()
    }

    /// The raw byte-address UAV.
    pub fn byte_address_uav(&self) -> &UnorderedAccessView {
        &self.uav
    }
}

impl AsGpuResource for GpuBuffer {
    fn resource(&self) -> &GpuResource {
        &self.resource
    }
}

/// A [`GpuBuffer`] with a fixed element layout and a structured UAV.
pub struct StructuredBuffer {
    buffer: GpuBuffer,
    element_size: u32,
    element_count: u32,
    structured_uav: UnorderedAccessView,
}

impl StructuredBuffer {
    /// Create a buffer of `element_count` elements of `element_size` bytes.
    pub fn new(
        device: &Arc<Device>,
        element_count: u32,
        element_size: u32,
        label: Option<&str>,
    ) -> GpuResult<Self> {
        let buffer = GpuBuffer::new(device, element_count as u64 * element_size as u64, label)?;
        let structured_uav = UnorderedAccessView::new(
            device,
            UavDesc {
                resource: buffer.resource.raw().clone(),
                format: PixelFormat::Unknown,
                dimension: UavDimension::StructuredBuffer {
                    element_size,
                    element_count,
                },
            },
        )?;
        Ok(Self {
            buffer,
            element_size,
            element_count,
            structured_uav,
        })
    }

    /// Size of one element in bytes.
    pub fn element_size(&self) -> u32 {
        self.element_size
    }

    /// Number of elements.
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// Rounded-up buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.buffer.size()
    }

    /// GPU virtual address of the buffer start.
    pub fn gpu_address(&self) -> u64 {
        self.buffer.gpu_address()
    }

    /// The structured UAV.
    pub fn structured_uav(&self) -> &UnorderedAccessView {
        &self.structured_uav
    }

    /// The raw byte-address UAV of the underlying buffer.
    pub fn byte_address_uav(&self) -> &UnorderedAccessView {
        self.buffer.byte_address_uav()
    }
}

impl AsGpuResource for StructuredBuffer {
    fn resource(&self) -> &GpuResource {
        &self.buffer.resource
    }
}
