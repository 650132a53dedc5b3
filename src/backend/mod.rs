//! The underlying explicit graphics API.
//!
//! Everything above this module speaks D3D12-class vocabulary: committed
//! resources with tracked states, descriptor heaps (CPU-only and
//! shader-visible), root signatures, command allocators and lists, a direct
//! queue, and fence-based synchronization. This module is the single seam a
//! native backend replaces.
//!
//! The backend shipped here is a software device: resources carry real byte
//! storage, a worker thread plays the GPU (executing copies and clears,
//! validating transition barriers against its own state tracking, and
//! completing fence signals in submission order). That makes the whole
//! submission core — recycling, barrier discipline, sync-point retirement —
//! exercisable and assertable without GPU hardware.

mod command;
mod descriptor;
mod device;
mod queue;
mod resource;

pub use command::{RawCommandAllocator, RawCommandList};
pub use descriptor::{
    AddressMode, DescriptorRegistry, DsvDesc, FilterMode, RawDescriptor, RawDescriptorHeap,
    RtvDesc, SamplerDesc, SrvDesc, SrvDimension, UavDesc, UavDimension,
};
pub use device::{
    DescriptorRange, DescriptorRangeKind, DeviceDesc, PipelineKind, RawDevice, RawPipelineState,
    RawRootSignature, RawSwapChain, RootParameter, RootSignatureDesc,
};
pub use queue::{RawFence, RawQueue};
pub use resource::{HeapKind, RawResource, ResourceDesc, ResourceFlags, ResourceKind};

/// The kinds of descriptor heap the API distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// Constant-buffer, shader-resource and unordered-access views.
    CbvSrvUav,
    /// Samplers.
    Sampler,
    /// Render-target views (never shader-visible).
    Rtv,
    /// Depth-stencil views (never shader-visible).
    Dsv,
}

/// A CPU-side descriptor handle: an address into a descriptor heap.
///
/// A handle with `ptr == 0` is the null sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuDescriptorHandle {
    /// The heap kind this handle addresses into.
    pub kind: DescriptorHeapKind,
    /// Opaque descriptor address; stable for the heap's lifetime.
    pub ptr: u64,
}

impl CpuDescriptorHandle {
    /// The null handle for a heap kind.
    pub const fn null(kind: DescriptorHeapKind) -> Self {
        Self { kind, ptr: 0 }
    }

    /// Whether this is the null sentinel.
    pub fn is_null(&self) -> bool {
        self.ptr == 0
    }

    /// The handle `count` descriptors further into the same heap.
    pub fn offset(self, count: u64, increment: u64) -> Self {
        Self {
            kind: self.kind,
            ptr: self.ptr + count * increment,
        }
    }
}

/// A GPU-side descriptor handle into a shader-visible heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GpuDescriptorHandle {
    /// Opaque descriptor address.
    pub ptr: u64,
}

impl GpuDescriptorHandle {
    /// The handle `count` descriptors further into the same heap.
    pub fn offset(self, count: u64, increment: u64) -> Self {
        Self {
            ptr: self.ptr + count * increment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        let h = CpuDescriptorHandle::null(DescriptorHeapKind::Rtv);
        assert!(h.is_null());
        assert!(!h.offset(1, 8).is_null());
    }
}
