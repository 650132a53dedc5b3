//! The software device: factory for every other backend object.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use raw_window_handle::RawWindowHandle;

use super::command::{RawCommandAllocator, RawCommandList};
use super::descriptor::{
    DescriptorRegistry, DsvDesc, RawDescriptor, RawDescriptorHeap, RtvDesc, SamplerDesc, SrvDesc,
    UavDesc,
};
use super::queue::{RawFence, RawQueue};
use super::resource::{HeapKind, RawResource, ResourceDesc, ResourceFlags, ResourceKind};
use super::{CpuDescriptorHandle, DescriptorHeapKind};
use crate::error::{GpuError, GpuResult, E_INVALIDARG};
use crate::types::{PixelFormat, ResourceState};

/// Descriptor handle space starts above zero so the null sentinel never
/// collides with a real handle.
const DESCRIPTOR_BASE: u64 = 0x0010_0000;
const VA_BASE: u64 = 0x1_0000_0000;
const VA_ALIGNMENT: u64 = 64 * 1024;

/// Adapter profile of the software device.
#[derive(Debug, Clone)]
pub struct DeviceDesc {
    /// Debug label.
    pub label: Option<String>,
    /// Whether the adapter reports typed UAV loads for the extended
    /// format set.
    pub typed_uav_loads: bool,
    /// Whether the adapter reports raytracing support.
    pub raytracing: bool,
}

impl Default for DeviceDesc {
    fn default() -> Self {
        Self {
            label: None,
            typed_uav_loads: true,
            raytracing: false,
        }
    }
}

impl DeviceDesc {
    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set typed UAV load support.
    pub fn with_typed_uav_loads(mut self, supported: bool) -> Self {
        self.typed_uav_loads = supported;
        self
    }

    /// Set raytracing support.
    pub fn with_raytracing(mut self, supported: bool) -> Self {
        self.raytracing = supported;
        self
    }
}

/// The kind of descriptors a range in a descriptor table binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorRangeKind {
    /// Constant buffer views.
    Cbv,
    /// Shader resource views.
    Srv,
    /// Unordered access views.
    Uav,
    /// Samplers.
    Sampler,
}

/// A contiguous register range inside a descriptor table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRange {
    /// What the range binds.
    pub kind: DescriptorRangeKind,
    /// Number of descriptors.
    pub count: u32,
    /// First shader register.
    pub base_register: u32,
    /// Register space.
    pub register_space: u32,
}

/// One root parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootParameter {
    /// Inline 32-bit constants.
    Constants {
        /// Bound shader register.
        shader_register: u32,
        /// Register space.
        register_space: u32,
        /// Number of 32-bit values.
        num_values: u32,
    },
    /// A root constant buffer view (a raw GPU address).
    Cbv {
        /// Bound shader register.
        shader_register: u32,
        /// Register space.
        register_space: u32,
    },
    /// A descriptor table.
    DescriptorTable {
        /// The ranges the table binds, in declaration order.
        ranges: Vec<DescriptorRange>,
    },
}

impl RootParameter {
    /// Cost of the parameter in root signature DWORDs.
    pub fn cost(&self) -> u32 {
        match self {
            Self::Constants { num_values, .. } => *num_values,
            Self::Cbv { .. } => 2,
            Self::DescriptorTable { .. } => 1,
        }
    }
}

/// Description of a root signature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootSignatureDesc {
    /// Root parameters in binding order.
    pub parameters: Vec<RootParameter>,
    /// Samplers baked into the signature, costing no descriptor slots.
    pub static_samplers: Vec<SamplerDesc>,
}

impl RootSignatureDesc {
    /// An empty signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a root parameter.
    pub fn with_parameter(mut self, parameter: RootParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Append a static sampler.
    pub fn with_static_sampler(mut self, sampler: SamplerDesc) -> Self {
        self.static_samplers.push(sampler);
        self
    }
}

/// A validated, immutable root signature.
pub struct RawRootSignature {
    id: u64,
    desc: RootSignatureDesc,
}

impl RawRootSignature {
    /// Unique id within the device.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The validated description.
    pub fn desc(&self) -> &RootSignatureDesc {
        &self.desc
    }
}

impl std::fmt::Debug for RawRootSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawRootSignature")
            .field("id", &self.id)
            .field("parameters", &self.desc.parameters.len())
            .finish()
    }
}

/// Whether a pipeline drives the graphics or the compute pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Vertex/pixel pipeline.
    Graphics,
    /// Compute pipeline.
    Compute,
}

/// A compiled pipeline state object.
///
/// The software device does not shade, so the object is an identity the
/// recorder can bind and compare.
pub struct RawPipelineState {
    id: u64,
    kind: PipelineKind,
    label: Option<String>,
}

impl RawPipelineState {
    /// Unique id within the device.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Graphics or compute.
    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Debug label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl std::fmt::Debug for RawPipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawPipelineState")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .finish()
    }
}

struct DeviceInner {
    desc: DeviceDesc,
    descriptor_cursor: AtomicU64,
    va_cursor: AtomicU64,
    next_id: AtomicU64,
    registry: Arc<DescriptorRegistry>,
}

/// The software device. Cheap to clone; all clones share one device.
#[derive(Clone)]
pub struct RawDevice {
    inner: Arc<DeviceInner>,
}

impl RawDevice {
    /// Open the software adapter.
    pub fn new(desc: DeviceDesc) -> GpuResult<Self> {
        log::info!(
            "opening software device{}",
            desc.label
                .as_deref()
                .map(|l| format!(" '{l}'"))
                .unwrap_or_default()
        );
        Ok(Self {
            inner: Arc::new(DeviceInner {
                desc,
                descriptor_cursor: AtomicU64::new(DESCRIPTOR_BASE),
                va_cursor: AtomicU64::new(VA_BASE),
                next_id: AtomicU64::new(1),
                registry: Arc::new(DescriptorRegistry::default()),
            }),
        })
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// The registry resolving descriptor handles back to heap slots.
    pub fn descriptor_registry(&self) -> &Arc<DescriptorRegistry> {
        &self.inner.registry
    }

    /// Whether typed UAV loads beyond the guaranteed formats are supported.
    pub fn typed_uav_loads(&self) -> bool {
        self.inner.desc.typed_uav_loads
    }

    /// Whether the adapter reports raytracing support.
    pub fn raytracing(&self) -> bool {
        self.inner.desc.raytracing
    }

    /// Whether presents may tear (vsync off).
    pub fn supports_tearing(&self) -> bool {
        true
    }

    /// Handle increment for a descriptor heap kind.
    pub fn descriptor_increment(&self, kind: DescriptorHeapKind) -> u64 {
        match kind {
            DescriptorHeapKind::CbvSrvUav => 32,
            DescriptorHeapKind::Sampler => 16,
            DescriptorHeapKind::Rtv => 8,
            DescriptorHeapKind::Dsv => 8,
        }
    }

    /// Create the direct command queue.
    pub fn create_queue(&self) -> RawQueue {
        RawQueue::new()
    }

    /// Create a fence starting at zero.
    pub fn create_fence(&self) -> RawFence {
        RawFence::new()
    }

    /// Create a command allocator.
    pub fn create_command_allocator(&self) -> RawCommandAllocator {
        RawCommandAllocator::new(self.next_id())
    }

    /// Create an open command list recording against `allocator`.
    pub fn create_command_list(&self, allocator: &RawCommandAllocator) -> RawCommandList {
        RawCommandList::new(allocator, self.inner.registry.clone())
    }

    /// Create a committed resource in `initial_state`.
    pub fn create_committed_resource(
        &self,
        desc: ResourceDesc,
        initial_state: ResourceState,
    ) -> GpuResult<RawResource> {
        if desc.storage_size() == 0 {
            return Err(GpuError::backend(
                E_INVALIDARG,
                "committed resource with zero size",
            ));
        }
        match desc.heap {
            HeapKind::Upload if initial_state != ResourceState::GENERIC_READ => {
                return Err(GpuError::backend(
                    E_INVALIDARG,
                    "upload heap resources must start in GENERIC_READ",
                ));
            }
            HeapKind::Readback if initial_state != ResourceState::COPY_DEST => {
                return Err(GpuError::backend(
                    E_INVALIDARG,
                    "readback heap resources must start in COPY_DEST",
                ));
            }
            _ => {}
        }
        if let ResourceKind::Texture2D { format, .. } = &desc.kind {
            if format.is_depth() && !desc.flags.contains(ResourceFlags::ALLOW_DEPTH_STENCIL) {
                return Err(GpuError::backend(
                    E_INVALIDARG,
                    "depth format textures require ALLOW_DEPTH_STENCIL",
                ));
            }
        }
        let gpu_address = match &desc.kind {
            ResourceKind::Buffer { size } => {
                let reserved = size.div_ceil(VA_ALIGNMENT) * VA_ALIGNMENT;
                self.inner.va_cursor.fetch_add(reserved, Ordering::Relaxed)
            }
            ResourceKind::Texture2D { .. } => 0,
        };
        Ok(RawResource::new(
            self.next_id(),
            desc,
            gpu_address,
            initial_state,
        ))
    }

    /// Create a descriptor heap with `capacity` slots.
    pub fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
        shader_visible: bool,
    ) -> GpuResult<RawDescriptorHeap> {
        if capacity == 0 {
            return Err(GpuError::backend(E_INVALIDARG, "descriptor heap of size 0"));
        }
        if shader_visible
            && !matches!(
                kind,
                DescriptorHeapKind::CbvSrvUav | DescriptorHeapKind::Sampler
            )
        {
            return Err(GpuError::backend(
                E_INVALIDARG,
                "only CBV/SRV/UAV and sampler heaps may be shader-visible",
            ));
        }
        let increment = self.descriptor_increment(kind);
        let base = self
            .inner
            .descriptor_cursor
            .fetch_add(capacity as u64 * increment, Ordering::Relaxed);
        let heap = RawDescriptorHeap::new(kind, capacity, shader_visible, base, increment);
        self.inner.registry.register(&heap);
        Ok(heap)
    }

    /// Validate and create a root signature.
    pub fn create_root_signature(&self, desc: RootSignatureDesc) -> GpuResult<RawRootSignature> {
        let cost: u32 = desc.parameters.iter().map(RootParameter::cost).sum();
        if cost > 64 {
            return Err(GpuError::backend(
                E_INVALIDARG,
                format!("root signature cost {cost} DWORDs exceeds the limit of 64"),
            ));
        }
        for parameter in &desc.parameters {
            let spaces: Vec<u32> = match parameter {
                RootParameter::Constants { register_space, .. }
                | RootParameter::Cbv { register_space, .. } => vec![*register_space],
                RootParameter::DescriptorTable { ranges } => {
                    if ranges.is_empty() {
                        return Err(GpuError::backend(
                            E_INVALIDARG,
                            "descriptor table with no ranges",
                        ));
                    }
                    let samplers = ranges
                        .iter()
                        .filter(|r| r.kind == DescriptorRangeKind::Sampler)
                        .count();
                    if samplers != 0 && samplers != ranges.len() {
                        return Err(GpuError::backend(
                            E_INVALIDARG,
                            "a descriptor table may not mix samplers with resource views",
                        ));
                    }
                    ranges.iter().map(|r| r.register_space).collect()
                }
            };
            if let Some(space) = spaces.iter().find(|s| **s > 15) {
                return Err(GpuError::backend(
                    E_INVALIDARG,
                    format!("register space {space} exceeds the supported maximum of 15"),
                ));
            }
        }
        Ok(RawRootSignature {
            id: self.next_id(),
            desc,
        })
    }

    /// Create a pipeline state object.
    pub fn create_pipeline_state(
        &self,
        kind: PipelineKind,
        label: Option<String>,
    ) -> RawPipelineState {
        RawPipelineState {
            id: self.next_id(),
            kind,
            label,
        }
    }

    /// Create a swap chain; `window == None` runs headless.
    pub fn create_swap_chain(
        &self,
        window: Option<RawWindowHandle>,
        width: u32,
        height: u32,
        buffer_count: u32,
        format: PixelFormat,
    ) -> GpuResult<RawSwapChain> {
        if width == 0 || height == 0 {
            return Err(GpuError::backend(E_INVALIDARG, "zero-sized swap chain"));
        }
        if !(2..=16).contains(&buffer_count) {
            return Err(GpuError::backend(
                E_INVALIDARG,
                format!("swap chain buffer count {buffer_count} outside 2..=16"),
            ));
        }
        let windowed = window.is_some();
        log::info!(
            "creating {} swap chain: {width}x{height}, {buffer_count} buffers, {format:?}",
            if windowed { "windowed" } else { "headless" }
        );
        let buffers = self.make_back_buffers(width, height, buffer_count, format)?;
        Ok(RawSwapChain {
            device: self.clone(),
            format,
            windowed,
            state: Mutex::new(SwapChainState {
                width,
                height,
                buffers,
                current_index: 0,
            }),
        })
    }

    fn make_back_buffers(
        &self,
        width: u32,
        height: u32,
        count: u32,
        format: PixelFormat,
    ) -> GpuResult<Vec<RawResource>> {
        (0..count)
            .map(|i| {
                self.create_committed_resource(
                    ResourceDesc::texture_2d(width, height, format)
                        .with_flags(ResourceFlags::ALLOW_RENDER_TARGET)
                        .with_label(format!("back buffer {i}")),
                    ResourceState::PRESENT,
                )
            })
            .collect()
    }

    fn write_descriptor(&self, handle: CpuDescriptorHandle, descriptor: RawDescriptor) {
        match self.inner.registry.resolve(handle) {
            Some((heap, index)) => heap.write_slot(index, descriptor),
            None => log::error!("descriptor write through unresolvable handle {handle:?}"),
        }
    }

    /// Write a constant buffer view.
    pub fn write_cbv(&self, handle: CpuDescriptorHandle, gpu_address: u64, size: u32) {
        debug_assert_eq!(handle.kind, DescriptorHeapKind::CbvSrvUav);
        debug_assert_eq!(size % 256, 0, "CBV sizes are 256-byte aligned");
        self.write_descriptor(handle, RawDescriptor::ConstantBuffer { gpu_address, size });
    }

    /// Write a shader resource view.
    pub fn write_srv(&self, handle: CpuDescriptorHandle, desc: SrvDesc) {
        debug_assert_eq!(handle.kind, DescriptorHeapKind::CbvSrvUav);
        self.write_descriptor(handle, RawDescriptor::ShaderResource(desc));
    }

    /// Write an unordered access view.
    pub fn write_uav(&self, handle: CpuDescriptorHandle, desc: UavDesc) {
        debug_assert_eq!(handle.kind, DescriptorHeapKind::CbvSrvUav);
        self.write_descriptor(handle, RawDescriptor::UnorderedAccess(desc));
    }

    /// Write a sampler.
    pub fn write_sampler(&self, handle: CpuDescriptorHandle, desc: SamplerDesc) {
        debug_assert_eq!(handle.kind, DescriptorHeapKind::Sampler);
        self.write_descriptor(handle, RawDescriptor::Sampler(desc));
    }

    /// Write a render target view.
    pub fn write_rtv(&self, handle: CpuDescriptorHandle, desc: RtvDesc) {
        debug_assert_eq!(handle.kind, DescriptorHeapKind::Rtv);
        self.write_descriptor(handle, RawDescriptor::RenderTarget(desc));
    }

    /// Write a depth stencil view.
    pub fn write_dsv(&self, handle: CpuDescriptorHandle, desc: DsvDesc) {
        debug_assert_eq!(handle.kind, DescriptorHeapKind::Dsv);
        self.write_descriptor(handle, RawDescriptor::DepthStencil(desc));
    }

    /// Copy one descriptor between heaps of the same kind.
    pub fn copy_descriptor(&self, dst: CpuDescriptorHandle, src: CpuDescriptorHandle) {
        debug_assert_eq!(dst.kind, src.kind);
        let descriptor = self.inner.registry.read(src);
        self.write_descriptor(dst, descriptor);
    }

    /// Read back the descriptor a handle points at.
    pub fn read_descriptor(&self, handle: CpuDescriptorHandle) -> RawDescriptor {
        self.inner.registry.read(handle)
    }
}

impl std::fmt::Debug for RawDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDevice")
            .field("label", &self.inner.desc.label)
            .finish_non_exhaustive()
    }
}

struct SwapChainState {
    width: u32,
    height: u32,
    buffers: Vec<RawResource>,
    current_index: u32,
}

/// A flip-discard swap chain over software back buffers.
pub struct RawSwapChain {
    device: RawDevice,
    format: PixelFormat,
    windowed: bool,
    state: Mutex<SwapChainState>,
}

impl RawSwapChain {
    /// Back buffer format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Whether a window is attached.
    pub fn is_windowed(&self) -> bool {
        self.windowed
    }

    /// Number of back buffers.
    pub fn buffer_count(&self) -> u32 {
        self.state.lock().buffers.len() as u32
    }

    /// Current back buffer dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    /// The back buffer at `index`.
    pub fn buffer(&self, index: u32) -> RawResource {
        self.state.lock().buffers[index as usize].clone()
    }

    /// Index of the buffer the next frame renders into.
    pub fn current_back_buffer_index(&self) -> u32 {
        self.state.lock().current_index
    }

    /// Present the current back buffer and rotate to the next.
    pub fn present(&self, queue: &RawQueue, allow_tearing: bool) -> GpuResult<()> {
        if allow_tearing && !self.device.supports_tearing() {
            return Err(GpuError::backend(
                E_INVALIDARG,
                "tearing present without tearing support",
            ));
        }
        let mut state = self.state.lock();
        let index = state.current_index;
        queue.present(&state.buffers[index as usize]);
        state.current_index = (index + 1) % state.buffers.len() as u32;
        Ok(())
    }

    /// Drop all back buffers and recreate them at the new size.
    ///
    /// The caller must guarantee the queue is idle and every outside
    /// reference to the old buffers has been released.
    pub fn resize(&self, width: u32, height: u32) -> GpuResult<()> {
        if width == 0 || height == 0 {
            return Err(GpuError::backend(E_INVALIDARG, "zero-sized swap chain"));
        }
        let mut state = self.state.lock();
        let count = state.buffers.len() as u32;
        state.buffers = self
            .device
            .make_back_buffers(width, height, count, self.format)?;
        state.width = width;
        state.height = height;
        state.current_index = 0;
        Ok(())
    }
}

impl std::fmt::Debug for RawSwapChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (width, height) = self.dimensions();
        f.debug_struct("RawSwapChain")
            .field("format", &self.format)
            .field("width", &width)
            .field("height", &height)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> RawDevice {
        RawDevice::new(DeviceDesc::default()).unwrap()
    }

    #[test]
    fn test_upload_heap_requires_generic_read() {
        let device = device();
        let desc = ResourceDesc::buffer(256).with_heap(HeapKind::Upload);
        assert!(device
            .create_committed_resource(desc.clone(), ResourceState::COPY_DEST)
            .is_err());
        assert!(device
            .create_committed_resource(desc, ResourceState::GENERIC_READ)
            .is_ok());
    }

    #[test]
    fn test_buffer_addresses_do_not_overlap() {
        let device = device();
        let a = device
            .create_committed_resource(ResourceDesc::buffer(VA_ALIGNMENT * 2), ResourceState::COMMON)
            .unwrap();
        let b = device
            .create_committed_resource(ResourceDesc::buffer(64), ResourceState::COMMON)
            .unwrap();
        assert!(b.gpu_address() >= a.gpu_address() + VA_ALIGNMENT * 2);
    }

    #[test]
    fn test_root_signature_validation() {
        let device = device();
        let too_big = RootSignatureDesc::new().with_parameter(RootParameter::Constants {
            shader_register: 0,
            register_space: 0,
            num_values: 65,
        });
        assert!(device.create_root_signature(too_big).is_err());

        let bad_space = RootSignatureDesc::new().with_parameter(RootParameter::Cbv {
            shader_register: 0,
            register_space: 16,
        });
        assert!(device.create_root_signature(bad_space).is_err());

        let mixed = RootSignatureDesc::new().with_parameter(RootParameter::DescriptorTable {
            ranges: vec![
                DescriptorRange {
                    kind: DescriptorRangeKind::Srv,
                    count: 1,
                    base_register: 0,
                    register_space: 0,
                },
                DescriptorRange {
                    kind: DescriptorRangeKind::Sampler,
                    count: 1,
                    base_register: 0,
                    register_space: 0,
                },
            ],
        });
        assert!(device.create_root_signature(mixed).is_err());
    }

    #[test]
    fn test_shader_visible_heap_kinds() {
        let device = device();
        assert!(device
            .create_descriptor_heap(DescriptorHeapKind::Rtv, 16, true)
            .is_err());
        assert!(device
            .create_descriptor_heap(DescriptorHeapKind::CbvSrvUav, 1024, true)
            .is_ok());
    }

    #[test]
    fn test_swap_chain_rotation_and_resize() {
        let device = device();
        let queue = device.create_queue();
        let swap_chain = device
            .create_swap_chain(None, 64, 64, 3, PixelFormat::Bgra8Unorm)
            .unwrap();
        assert_eq!(swap_chain.current_back_buffer_index(), 0);
        swap_chain.present(&queue, false).unwrap();
        assert_eq!(swap_chain.current_back_buffer_index(), 1);
        swap_chain.present(&queue, true).unwrap();
        swap_chain.present(&queue, false).unwrap();
        assert_eq!(swap_chain.current_back_buffer_index(), 0);

        swap_chain.resize(128, 32).unwrap();
        assert_eq!(swap_chain.dimensions(), (128, 32));
        assert_eq!(swap_chain.current_back_buffer_index(), 0);
    }
}
