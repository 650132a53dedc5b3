//! # Vermilion
//!
//! Explicit GPU resource and command submission core over a D3D12-class API.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Device`] - Root object owning the queue, timeline and recycling pools
//! - [`CommandRecorder`] - Command recording with automatic barriers,
//!   transient uploads and shader-visible descriptor staging
//! - [`SyncPoint`] - Monotonic fence values pacing every recycling pool
//! - [`resource`] - Buffers, textures and render/depth targets with RAII views
//! - [`SwapChain`] - Presentable surfaces paced by sync points
//! - A software backend executing submissions on a worker thread, so the
//!   whole submission core runs and asserts without GPU hardware
//!
//! ## Example
//!
//! ```
//! use vermilion::{backend::DeviceDesc, CommandRecorder, Device, GpuBuffer};
//!
//! let device = Device::new(DeviceDesc::default()).unwrap();
//! let buffer = GpuBuffer::new(&device, 1024, Some("scratch")).unwrap();
//!
//! let mut recorder = CommandRecorder::new(&device).unwrap();
//! recorder.copy_buffer_data(&[1, 2, 3, 4], &buffer, 0).unwrap();
//! let sync = recorder.submit();
//! device.wait(sync);
//! ```

pub mod backend;
pub mod descriptor;
pub mod error;
pub mod pipeline;
pub mod recorder;
pub mod resource;
pub mod root_signature;
pub mod swapchain;
pub mod timeline;
pub mod transient;
pub mod types;

mod device;

// Re-export main types for convenience
pub use descriptor::{
    ConstantBufferView, DepthStencilView, RenderTargetView, SamplerView, ShaderResourceView,
    UnorderedAccessView,
};
pub use device::Device;
pub use error::{GpuError, GpuResult};
pub use pipeline::{ComputePipelineDesc, GraphicsPipelineDesc, PipelineState};
pub use recorder::CommandRecorder;
pub use resource::{
    AsGpuResource, ColorBuffer, ColorBufferDesc, DepthBuffer, DepthBufferDesc, GpuBuffer,
    GpuResource, StructuredBuffer, Texture, TextureDesc,
};
pub use root_signature::RootSignature;
pub use swapchain::{SwapChain, SwapChainDesc};
pub use timeline::{GpuTimeline, SyncPoint};
pub use transient::{TransientAllocation, TransientKind, DEFAULT_PAGE_SIZE, TRANSIENT_ALIGNMENT};
pub use types::{PixelFormat, PrimitiveTopology, ResourceState, ScissorRect, Viewport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the submission core.
///
/// This should be called before using any other functionality.
pub fn init() {
    log::info!("Vermilion v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
