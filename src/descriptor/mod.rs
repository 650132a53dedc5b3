//! Descriptor management: CPU slabs, RAII views, shader-visible staging.

mod cpu;
mod dynamic;
mod view;

pub use cpu::CpuDescriptorAllocator;
pub use dynamic::DynamicDescriptorHeap;
pub use view::{
    ConstantBufferView, DepthStencilView, RenderTargetView, SamplerView, ShaderResourceView,
    UnorderedAccessView,
};

pub(crate) use dynamic::ShaderVisibleHeapPool;
