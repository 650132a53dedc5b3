//! Command allocators and command lists.
//!
//! Lists record into a plain command vector. State-setting calls (pipelines,
//! root bindings, input assembler, rasterizer state) are validated at record
//! time but carry no work the software queue would execute, so only the
//! operations with observable effects are kept in the recorded stream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::descriptor::{DescriptorRegistry, DsvDesc, RawDescriptor, RtvDesc};
use super::device::{RawPipelineState, RawRootSignature};
use super::resource::RawResource;
use super::{CpuDescriptorHandle, GpuDescriptorHandle, RawDescriptorHeap};
use crate::types::{PrimitiveTopology, ResourceState, ScissorRect, Viewport};

/// One recorded command with an observable effect.
#[derive(Debug, Clone)]
pub(crate) enum Command {
    Transition {
        resource: RawResource,
        before: ResourceState,
        after: ResourceState,
    },
    UavBarrier {
        resource: Option<RawResource>,
    },
    CopyResource {
        dst: RawResource,
        src: RawResource,
    },
    CopyBufferRegion {
        dst: RawResource,
        dst_offset: u64,
        src: RawResource,
        src_offset: u64,
        size: u64,
    },
    BufferToTexture {
        dst: RawResource,
        mip: u32,
        slice: u32,
        src: RawResource,
        src_offset: u64,
        row_pitch: u64,
    },
    ClearRenderTarget {
        view: RtvDesc,
        color: [f32; 4],
    },
    ClearDepthStencil {
        view: DsvDesc,
        /// `None` leaves the depth plane untouched.
        depth: Option<f32>,
        /// `None` leaves the stencil plane untouched.
        stencil: Option<u8>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}

struct AllocatorInner {
    id: u64,
    recorded: AtomicUsize,
}

/// Backing memory for command recording.
///
/// `reset` reclaims the memory; the caller must guarantee no submitted list
/// recorded from this allocator is still in flight.
#[derive(Clone)]
pub struct RawCommandAllocator {
    inner: Arc<AllocatorInner>,
}

impl RawCommandAllocator {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            inner: Arc::new(AllocatorInner {
                id,
                recorded: AtomicUsize::new(0),
            }),
        }
    }

    /// Unique id of the allocator within its device.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of commands recorded against this allocator since reset.
    pub fn recorded_commands(&self) -> usize {
        self.inner.recorded.load(Ordering::Relaxed)
    }

    /// Reclaim the allocator's memory for reuse.
    pub fn reset(&self) {
        self.inner.recorded.store(0, Ordering::Relaxed);
    }

    fn note_command(&self) {
        self.inner.recorded.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for RawCommandAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCommandAllocator")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

/// A command list in the open/closed recording lifecycle of the API.
pub struct RawCommandList {
    commands: Vec<Command>,
    closed: bool,
    allocator: RawCommandAllocator,
    registry: Arc<DescriptorRegistry>,
}

impl RawCommandList {
    pub(crate) fn new(allocator: &RawCommandAllocator, registry: Arc<DescriptorRegistry>) -> Self {
        Self {
            commands: Vec::new(),
            closed: false,
            allocator: allocator.clone(),
            registry,
        }
    }

    /// Whether the list is closed and ready for execution.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the list for execution.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Reopen the list, recording against `allocator` from a clean slate.
    pub fn reset(&mut self, allocator: &RawCommandAllocator) {
        self.commands.clear();
        self.closed = false;
        self.allocator = allocator.clone();
    }

    pub(crate) fn cloned_commands(&self) -> Vec<Command> {
        self.commands.clone()
    }

    fn record(&mut self, command: Command) {
        debug_assert!(!self.closed, "recording into a closed command list");
        self.allocator.note_command();
        self.commands.push(command);
    }

    /// Record a transition barrier.
    pub fn resource_barrier(
        &mut self,
        resource: &RawResource,
        before: ResourceState,
        after: ResourceState,
    ) {
        self.record(Command::Transition {
            resource: resource.clone(),
            before,
            after,
        });
    }

    /// Record a UAV barrier; `None` orders all UAV accesses.
    pub fn uav_barrier(&mut self, resource: Option<&RawResource>) {
        self.record(Command::UavBarrier {
            resource: resource.cloned(),
        });
    }

    /// Copy an entire resource.
    pub fn copy_resource(&mut self, dst: &RawResource, src: &RawResource) {
        self.record(Command::CopyResource {
            dst: dst.clone(),
            src: src.clone(),
        });
    }

    /// Copy a byte range between buffers.
    pub fn copy_buffer_region(
        &mut self,
        dst: &RawResource,
        dst_offset: u64,
        src: &RawResource,
        src_offset: u64,
        size: u64,
    ) {
        self.record(Command::CopyBufferRegion {
            dst: dst.clone(),
            dst_offset,
            src: src.clone(),
            src_offset,
            size,
        });
    }

    /// Copy a buffer footprint into one texture subresource. Rows in the
    /// source are `row_pitch` bytes apart.
    pub fn copy_buffer_to_texture(
        &mut self,
        dst: &RawResource,
        mip: u32,
        slice: u32,
        src: &RawResource,
        src_offset: u64,
        row_pitch: u64,
    ) {
        self.record(Command::BufferToTexture {
            dst: dst.clone(),
            mip,
            slice,
            src: src.clone(),
            src_offset,
            row_pitch,
        });
    }

    /// Bind render targets and an optional depth target.
    pub fn om_set_render_targets(
        &mut self,
        _rtvs: &[CpuDescriptorHandle],
        _dsv: Option<CpuDescriptorHandle>,
    ) {
        debug_assert!(!self.closed);
    }

    /// Clear the render target a CPU handle points at.
    pub fn clear_render_target(&mut self, rtv: CpuDescriptorHandle, color: [f32; 4]) {
        // Resolved at record time; the handle may be recycled before the
        // queue executes, the descriptor contents may not.
        if let RawDescriptor::RenderTarget(view) = self.registry.read(rtv) {
            self.record(Command::ClearRenderTarget { view, color });
        } else {
            log::error!("clear_render_target: handle does not address a render target view");
        }
    }

    /// Clear the depth target a CPU handle points at. A `None` plane is
    /// left untouched, so depth-only and stencil-only clears never disturb
    /// the other plane of a packed format.
    pub fn clear_depth_stencil(
        &mut self,
        dsv: CpuDescriptorHandle,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) {
        debug_assert!(depth.is_some() || stencil.is_some());
        if let RawDescriptor::DepthStencil(view) = self.registry.read(dsv) {
            self.record(Command::ClearDepthStencil {
                view,
                depth,
                stencil,
            });
        } else {
            log::error!("clear_depth_stencil: handle does not address a depth stencil view");
        }
    }

    /// Bind a pipeline state object.
    pub fn set_pipeline_state(&mut self, _pipeline: &RawPipelineState) {
        debug_assert!(!self.closed);
    }

    /// Bind the graphics root signature.
    pub fn set_graphics_root_signature(&mut self, _root_signature: &RawRootSignature) {
        debug_assert!(!self.closed);
    }

    /// Bind the compute root signature.
    pub fn set_compute_root_signature(&mut self, _root_signature: &RawRootSignature) {
        debug_assert!(!self.closed);
    }

    /// Bind the shader-visible heaps descriptors are read from.
    pub fn set_descriptor_heaps(&mut self, heaps: &[&RawDescriptorHeap]) {
        debug_assert!(!self.closed);
        debug_assert!(heaps.iter().all(|h| h.is_shader_visible()));
    }

    /// Point a graphics root parameter at a descriptor table.
    pub fn set_graphics_root_descriptor_table(
        &mut self,
        _param_index: u32,
        _base: GpuDescriptorHandle,
    ) {
        debug_assert!(!self.closed);
    }

    /// Point a compute root parameter at a descriptor table.
    pub fn set_compute_root_descriptor_table(
        &mut self,
        _param_index: u32,
        _base: GpuDescriptorHandle,
    ) {
        debug_assert!(!self.closed);
    }

    /// Set inline root constants on the graphics pipe.
    pub fn set_graphics_root_constants(&mut self, _param_index: u32, _values: &[u32]) {
        debug_assert!(!self.closed);
    }

    /// Set inline root constants on the compute pipe.
    pub fn set_compute_root_constants(&mut self, _param_index: u32, _values: &[u32]) {
        debug_assert!(!self.closed);
    }

    /// Point a graphics root parameter at a constant buffer address.
    pub fn set_graphics_root_cbv(&mut self, _param_index: u32, _gpu_address: u64) {
        debug_assert!(!self.closed);
    }

    /// Point a compute root parameter at a constant buffer address.
    pub fn set_compute_root_cbv(&mut self, _param_index: u32, _gpu_address: u64) {
        debug_assert!(!self.closed);
    }

    /// Bind a vertex buffer.
    pub fn ia_set_vertex_buffer(
        &mut self,
        _slot: u32,
        _gpu_address: u64,
        _size: u64,
        _stride: u32,
    ) {
        debug_assert!(!self.closed);
    }

    /// Bind an index buffer; `stride` is 2 or 4.
    pub fn ia_set_index_buffer(&mut self, _gpu_address: u64, _size: u64, stride: u32) {
        debug_assert!(!self.closed);
        debug_assert!(stride == 2 || stride == 4);
    }

    /// Set the primitive topology.
    pub fn ia_set_primitive_topology(&mut self, _topology: PrimitiveTopology) {
        debug_assert!(!self.closed);
    }

    /// Set rasterizer viewports.
    pub fn rs_set_viewports(&mut self, _viewports: &[Viewport]) {
        debug_assert!(!self.closed);
    }

    /// Set rasterizer scissor rectangles.
    pub fn rs_set_scissor_rects(&mut self, _scissors: &[ScissorRect]) {
        debug_assert!(!self.closed);
    }

    /// Record a non-indexed draw.
    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        _start_vertex: u32,
        _start_instance: u32,
    ) {
        self.record(Command::Draw {
            vertex_count,
            instance_count,
        });
    }

    /// Record an indexed draw.
    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _start_index: u32,
        _base_vertex: i32,
        _start_instance: u32,
    ) {
        self.record(Command::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    /// Record a compute dispatch.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.record(Command::Dispatch { x, y, z });
    }
}

impl std::fmt::Debug for RawCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCommandList")
            .field("commands", &self.commands.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
