//! Typed RAII wrappers over CPU descriptor slots.
//!
//! Each view owns exactly one slot from the device's matching slab
//! allocator and returns it on drop. Views are movable but not clonable;
//! the owning resource keeps them alive for as long as the descriptor may
//! be referenced.

use crate::backend::{CpuDescriptorHandle, DsvDesc, RtvDesc, SamplerDesc, SrvDesc, UavDesc};
use crate::descriptor::CpuDescriptorAllocator;
use crate::device::Device;
use crate::error::GpuResult;

/// One owned slot; drop returns it to the allocator it came from.
struct ViewSlot {
    handle: CpuDescriptorHandle,
    allocator: CpuDescriptorAllocator,
}

impl ViewSlot {
    fn allocate(allocator: &CpuDescriptorAllocator) -> GpuResult<Self> {
        Ok(Self {
            handle: allocator.allocate()?,
            allocator: allocator.clone(),
        })
    }
}

impl Drop for ViewSlot {
    fn drop(&mut self) {
        self.allocator.free(self.handle);
    }
}

/// A constant buffer view over a 256-aligned GPU address range.
pub struct ConstantBufferView {
    slot: ViewSlot,
}

impl ConstantBufferView {
    /// Allocate a slot and write the view.
    pub fn new(device: &Device, gpu_address: u64, size: u32) -> GpuResult<Self> {
        let slot = ViewSlot::allocate(device.cbv_srv_uav_slots())?;
        device.raw().write_cbv(slot.handle, gpu_address, size);
        Ok(Self { slot })
    }

    /// The owned descriptor slot.
    pub fn handle(&self) -> CpuDescriptorHandle {
        self.slot.handle
    }
}

/// A shader resource view.
pub struct ShaderResourceView {
    slot: ViewSlot,
}

impl ShaderResourceView {
    /// Allocate a slot and write the view.
    pub fn new(device: &Device, desc: SrvDesc) -> GpuResult<Self> {
        let slot = ViewSlot::allocate(device.cbv_srv_uav_slots())?;
        device.raw().write_srv(slot.handle, desc);
        Ok(Self { slot })
    }

    /// The owned descriptor slot.
    pub fn handle(&self) -> CpuDescriptorHandle {
        self.slot.handle
    }
}

/// An unordered access view.
pub struct UnorderedAccessView {
    slot: ViewSlot,
}

impl UnorderedAccessView {
    /// Allocate a slot and write the view.
    pub fn new(device: &Device, desc: UavDesc) -> GpuResult<Self> {
        let slot = ViewSlot::allocate(device.cbv_srv_uav_slots())?;
        device.raw().write_uav(slot.handle, desc);
        Ok(Self { slot })
    }

    /// The owned descriptor slot.
    pub fn handle(&self) -> CpuDescriptorHandle {
        self.slot.handle
    }
}

/// A sampler.
pub struct SamplerView {
    slot: ViewSlot,
}

impl SamplerView {
    /// Allocate a slot and write the sampler.
    pub fn new(device: &Device, desc: SamplerDesc) -> GpuResult<Self> {
        let slot = ViewSlot::allocate(device.sampler_slots())?;
        device.raw().write_sampler(slot.handle, desc);
        Ok(Self { slot })
    }

    /// The owned descriptor slot.
    pub fn handle(&self) -> CpuDescriptorHandle {
        self.slot.handle
    }
}

/// A render target view.
pub struct RenderTargetView {
    slot: ViewSlot,
}

impl RenderTargetView {
    /// Allocate a slot and write the view.
    pub fn new(device: &Device, desc: RtvDesc) -> GpuResult<Self> {
        let slot = ViewSlot::allocate(device.rtv_slots())?;
        device.raw().write_rtv(slot.handle, desc);
        Ok(Self { slot })
    }

    /// The owned descriptor slot.
    pub fn handle(&self) -> CpuDescriptorHandle {
        self.slot.handle
    }
}

/// A depth stencil view.
pub struct DepthStencilView {
    slot: ViewSlot,
}

impl DepthStencilView {
    /// Allocate a slot and write the view.
    pub fn new(device: &Device, desc: DsvDesc) -> GpuResult<Self> {
        let slot = ViewSlot::allocate(device.dsv_slots())?;
        device.raw().write_dsv(slot.handle, desc);
        Ok(Self { slot })
    }

    /// The owned descriptor slot.
    pub fn handle(&self) -> CpuDescriptorHandle {
        self.slot.handle
    }
}
