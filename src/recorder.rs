//! Command recording with automatic barrier discipline.
//!
//! A [`CommandRecorder`] borrows a command allocator from the device pool,
//! tracks the current state of every resource it touches and emits
//! transition barriers on demand, stages per-draw descriptors through its
//! shader-visible rings, and serves transient uploads from its linear
//! allocator. `submit` executes the recorded work and tags everything the
//! recorder borrowed with the submit's sync point, so it recycles only once
//! the GPU is done with it.
//!
//! A recorder is owned by one thread between `reset` and `submit`;
//! different threads use distinct recorders over the same device.

use std::sync::Arc;

use bytemuck::Pod;

use crate::backend::{
    CpuDescriptorHandle, DescriptorHeapKind, DescriptorRangeKind, GpuDescriptorHandle,
    RawCommandAllocator, RawCommandList, RawDescriptorHeap,
};
use crate::descriptor::{DynamicDescriptorHeap, SamplerView, ShaderResourceView, UnorderedAccessView};
use crate::device::Device;
use crate::error::GpuResult;
use crate::pipeline::{PipelineState, MAX_RENDER_TARGETS};
use crate::resource::{AsGpuResource, ColorBuffer, DepthBuffer, GpuResource, StructuredBuffer};
use crate::root_signature::RootSignature;
use crate::timeline::SyncPoint;
use crate::transient::{align_up, LinearAllocator, TransientAllocation};
use crate::types::{PixelFormat, PrimitiveTopology, ResourceState, ScissorRect, Viewport};

/// Records GPU work and submits it against the device's timeline.
pub struct CommandRecorder {
    device: Arc<Device>,
    list: RawCommandList,
    allocator: Option<RawCommandAllocator>,
    last_submit: SyncPoint,
    transient: LinearAllocator,
    resource_heap: DynamicDescriptorHeap,
    sampler_heap: DynamicDescriptorHeap,
    graphics_signature: Option<Arc<RootSignature>>,
    compute_signature: Option<Arc<RootSignature>>,
}

impl CommandRecorder {
    /// Borrow an allocator from the device pool and open a command list.
    pub fn new(device: &Arc<Device>) -> GpuResult<Self> {
        let allocator = device.acquire_command_allocator();
        let list = device.raw().create_command_list(&allocator);
        Ok(Self {
            device: device.clone(),
            list,
            allocator: Some(allocator),
            last_submit: SyncPoint::ZERO,
            transient: LinearAllocator::new(device.clone()),
            resource_heap: DynamicDescriptorHeap::new(device.clone(), DescriptorHeapKind::CbvSrvUav),
            sampler_heap: DynamicDescriptorHeap::new(device.clone(), DescriptorHeapKind::Sampler),
            graphics_signature: None,
            compute_signature: None,
        })
    }

    /// The sync point of the last submit; `SyncPoint::ZERO` before any.
    pub fn last_sync_point(&self) -> SyncPoint {
        self.last_submit
    }

    // ============================================================
    // Barriers
    // ============================================================

    /// Transition a resource into `new_state`.
    ///
    /// A same-state transition is a no-op. Entering `UNORDERED_ACCESS`
    /// additionally emits a UAV barrier, ordering prior UAV accesses.
    pub fn transition(&mut self, target: &impl AsGpuResource, new_state: ResourceState) {
        let resource = target.resource();
        let current = resource.current_state();
        if current == new_state {
            return;
        }
        self.list.resource_barrier(resource.raw(), current, new_state);
        if new_state == ResourceState::UNORDERED_ACCESS {
            self.list.uav_barrier(Some(resource.raw()));
        }
        resource.set_current_state(new_state);
    }

    fn ensure_state(&mut self, resource: &GpuResource, required: ResourceState) {
        if !resource.current_state().contains(required) {
            let current = resource.current_state();
            self.list.resource_barrier(resource.raw(), current, required);
            resource.set_current_state(required);
        }
    }

    // ============================================================
    // Copies
    // ============================================================

    /// Full-resource copy, transitioning both sides as needed.
    pub fn copy(&mut self, src: &impl AsGpuResource, dst: &impl AsGpuResource) {
        self.ensure_state(src.resource(), ResourceState::COPY_SOURCE);
        self.ensure_state(dst.resource(), ResourceState::COPY_DEST);
        self.list
            .copy_resource(dst.resource().raw(), src.resource().raw());
    }

    /// Copy a byte range between buffers.
    pub fn copy_buffer(
        &mut self,
        src: &impl AsGpuResource,
        src_offset: u64,
        dst: &impl AsGpuResource,
        dst_offset: u64,
        size: u64,
    ) {
        self.ensure_state(src.resource(), ResourceState::COPY_SOURCE);
        self.ensure_state(dst.resource(), ResourceState::COPY_DEST);
        self.list.copy_buffer_region(
            dst.resource().raw(),
            dst_offset,
            src.resource().raw(),
            src_offset,
            size,
        );
    }

    /// Copy CPU bytes into a buffer through a transient upload.
    ///
    /// # Errors
    ///
    /// Fails only if transient page creation fails.
    pub fn copy_buffer_data(
        &mut self,
        data: &[u8],
        dst: &impl AsGpuResource,
        dst_offset: u64,
    ) -> GpuResult<()> {
        let staging = self.transient.allocate_upload(data.len() as u64)?;
        staging.write(data);
        self.ensure_state(dst.resource(), ResourceState::COPY_DEST);
        // Upload pages sit permanently in GENERIC_READ; no barrier needed.
        self.list.copy_buffer_region(
            dst.resource().raw(),
            dst_offset,
            staging.resource(),
            staging.offset(),
            data.len() as u64,
        );
        Ok(())
    }

    /// Copy CPU pixels into one texture mip through a transient upload.
    ///
    /// `row_pitch` is the byte stride between rows of `data`; the staging
    /// footprint re-pitches rows to the API's 256-byte row alignment.
    ///
    /// # Errors
    ///
    /// Fails only if transient page creation fails.
    pub fn copy_texture(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: &[u8],
        row_pitch: u64,
        dst: &impl AsGpuResource,
        mip: u32,
    ) -> GpuResult<()> {
        let row_bytes = width as u64 * format.bytes_per_pixel() as u64;
        debug_assert!(row_pitch >= row_bytes);
        let staged_pitch = align_up(row_bytes, 256);
        let staging = self.transient.allocate_upload(staged_pitch * height as u64)?;
        for row in 0..height as u64 {
            let src = &data[(row * row_pitch) as usize..][..row_bytes as usize];
            staging.write_at(row * staged_pitch, src);
        }
        self.ensure_state(dst.resource(), ResourceState::COPY_DEST);
        self.list.copy_buffer_to_texture(
            dst.resource().raw(),
            mip,
            0,
            staging.resource(),
            staging.offset(),
            staged_pitch,
        );
        Ok(())
    }

    /// Allocate device-local UAV scratch valid until this recording's
    /// submit, after which the page recycles like upload memory.
    ///
    /// The backing page is permanently in `UNORDERED_ACCESS`; bind the
    /// allocation through its GPU address or a raw-buffer view.
    ///
    /// # Errors
    ///
    /// Fails only if transient page creation fails.
    pub fn allocate_transient_uav(&mut self, size: u64) -> GpuResult<TransientAllocation> {
        self.transient.allocate_uav(size)
    }

    // ============================================================
    // Render targets and clears
    // ============================================================

    /// Bind one color target.
    pub fn set_render_target(&mut self, target: &ColorBuffer) {
        self.set_render_targets(&[target], None);
    }

    /// Bind one color target and a depth target.
    pub fn set_render_target_with_depth(&mut self, target: &ColorBuffer, depth: &DepthBuffer) {
        self.set_render_targets(&[target], Some(depth));
    }

    /// Bind a depth target only.
    pub fn set_depth_target(&mut self, depth: &DepthBuffer) {
        self.set_render_targets(&[], Some(depth));
    }

    /// Bind up to eight color targets and an optional depth target,
    /// transitioning each into its writable state.
    pub fn set_render_targets(&mut self, targets: &[&ColorBuffer], depth: Option<&DepthBuffer>) {
        debug_assert!(targets.len() <= MAX_RENDER_TARGETS);
        let mut rtvs = Vec::with_capacity(targets.len());
        for target in targets {
            self.transition(*target, ResourceState::RENDER_TARGET);
            rtvs.push(target.rtv().handle());
        }
        let dsv = depth.map(|depth| {
            self.transition(depth, ResourceState::DEPTH_WRITE);
            depth.dsv().handle()
        });
        self.list.om_set_render_targets(&rtvs, dsv);
    }

    /// Clear a color target to its default clear color.
    pub fn clear_color(&mut self, target: &ColorBuffer) {
        self.clear_color_with(target, target.clear_color());
    }

    /// Clear a color target to `color`.
    ///
    /// The target must already be in `RENDER_TARGET`; the
    /// `set_render_targets` paths guarantee that.
    pub fn clear_color_with(&mut self, target: &ColorBuffer, color: [f32; 4]) {
        self.list.clear_render_target(target.rtv().handle(), color);
    }

    /// Clear depth and stencil to the target's defaults.
    pub fn clear_depth_stencil(&mut self, depth: &DepthBuffer) {
        self.clear_depth_stencil_with(depth, depth.clear_depth(), depth.clear_stencil());
    }

    /// Clear only the depth plane to the target's default; the stencil
    /// plane keeps its contents.
    pub fn clear_depth(&mut self, depth: &DepthBuffer) {
        self.list
            .clear_depth_stencil(depth.dsv().handle(), Some(depth.clear_depth()), None);
    }

    /// Clear only the stencil plane to the target's default; the depth
    /// plane keeps its contents.
    pub fn clear_stencil(&mut self, depth: &DepthBuffer) {
        self.list
            .clear_depth_stencil(depth.dsv().handle(), None, Some(depth.clear_stencil()));
    }

    /// Clear depth and stencil to explicit values.
    pub fn clear_depth_stencil_with(&mut self, depth: &DepthBuffer, value: f32, stencil: u8) {
        self.list
            .clear_depth_stencil(depth.dsv().handle(), Some(value), Some(stencil));
    }

    // ============================================================
    // Root signatures and descriptor staging
    // ============================================================

    /// Bind the graphics root signature; rebinding the same one is a no-op.
    /// Both staging rings reserve fresh windows sized to the signature.
    ///
    /// # Errors
    ///
    /// Fails only if a fresh shader-visible heap cannot be created.
    pub fn set_graphics_root_signature(&mut self, signature: &Arc<RootSignature>) -> GpuResult<()> {
        if self
            .graphics_signature
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(bound, signature))
        {
            return Ok(());
        }
        self.graphics_signature = Some(signature.clone());
        self.resource_heap.parse_root_signature(signature)?;
        self.sampler_heap.parse_root_signature(signature)?;
        self.list.set_graphics_root_signature(signature.raw());
        Ok(())
    }

    /// Bind the compute root signature; rebinding the same one is a no-op.
    ///
    /// # Errors
    ///
    /// Fails only if a fresh shader-visible heap cannot be created.
    pub fn set_compute_root_signature(&mut self, signature: &Arc<RootSignature>) -> GpuResult<()> {
        if self
            .compute_signature
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(bound, signature))
        {
            return Ok(());
        }
        self.compute_signature = Some(signature.clone());
        self.resource_heap.parse_root_signature(signature)?;
        self.sampler_heap.parse_root_signature(signature)?;
        self.list.set_compute_root_signature(signature.raw());
        Ok(())
    }

    /// Stage an SRV at `(space, register)` of the bound signature.
    pub fn set_graphics_srv(&mut self, space: u32, register: u32, view: &ShaderResourceView) {
        self.resource_heap
            .stage_copy(DescriptorRangeKind::Srv, space, register, view.handle());
    }

    /// Stage a UAV at `(space, register)` of the bound signature.
    pub fn set_graphics_uav(&mut self, space: u32, register: u32, view: &UnorderedAccessView) {
        self.resource_heap
            .stage_copy(DescriptorRangeKind::Uav, space, register, view.handle());
    }

    /// Stage a sampler at `(space, register)` of the bound signature.
    pub fn set_graphics_sampler(&mut self, space: u32, register: u32, sampler: &SamplerView) {
        self.sampler_heap
            .stage_copy(DescriptorRangeKind::Sampler, space, register, sampler.handle());
    }

    /// Stage an arbitrary CPU descriptor at `(space, register)`.
    pub fn set_graphics_descriptor(
        &mut self,
        kind: DescriptorRangeKind,
        space: u32,
        register: u32,
        handle: CpuDescriptorHandle,
    ) {
        match kind {
            DescriptorRangeKind::Sampler => {
                self.sampler_heap.stage_copy(kind, space, register, handle)
            }
            _ => self.resource_heap.stage_copy(kind, space, register, handle),
        }
    }

    /// Compute-side mirror of [`CommandRecorder::set_graphics_srv`].
    pub fn set_compute_srv(&mut self, space: u32, register: u32, view: &ShaderResourceView) {
        self.set_graphics_srv(space, register, view);
    }

    /// Compute-side mirror of [`CommandRecorder::set_graphics_uav`].
    pub fn set_compute_uav(&mut self, space: u32, register: u32, view: &UnorderedAccessView) {
        self.set_graphics_uav(space, register, view);
    }

    /// Compute-side mirror of [`CommandRecorder::set_graphics_sampler`].
    pub fn set_compute_sampler(&mut self, space: u32, register: u32, sampler: &SamplerView) {
        self.set_graphics_sampler(space, register, sampler);
    }

    /// Set 32-bit root constants on graphics root parameter `slot`.
    pub fn set_graphics_constants(&mut self, slot: u32, values: &[u32]) {
        self.list.set_graphics_root_constants(slot, values);
    }

    /// Set 32-bit root constants on compute root parameter `slot`.
    pub fn set_compute_constants(&mut self, slot: u32, values: &[u32]) {
        self.list.set_compute_root_constants(slot, values);
    }

    /// Upload `value` and bind it as the root CBV at parameter `slot`.
    ///
    /// # Errors
    ///
    /// Fails only if transient page creation fails.
    pub fn set_graphics_constant_buffer<T: Pod>(&mut self, slot: u32, value: &T) -> GpuResult<()> {
        let staging = self.transient.allocate_upload(std::mem::size_of::<T>() as u64)?;
        staging.write_value(value);
        self.list.set_graphics_root_cbv(slot, staging.gpu_address());
        Ok(())
    }

    /// Compute-side mirror of [`CommandRecorder::set_graphics_constant_buffer`].
    pub fn set_compute_constant_buffer<T: Pod>(&mut self, slot: u32, value: &T) -> GpuResult<()> {
        let staging = self.transient.allocate_upload(std::mem::size_of::<T>() as u64)?;
        staging.write_value(value);
        self.list.set_compute_root_cbv(slot, staging.gpu_address());
        Ok(())
    }

    /// Upload `value` and stage a CBV for it at `(space, register)` of the
    /// bound signature's resource table.
    ///
    /// # Errors
    ///
    /// Fails only if transient page creation fails.
    pub fn set_graphics_table_constant_buffer<T: Pod>(
        &mut self,
        space: u32,
        register: u32,
        value: &T,
    ) -> GpuResult<()> {
        let staging = self.transient.allocate_upload(std::mem::size_of::<T>() as u64)?;
        staging.write_value(value);
        self.resource_heap
            .stage_cbv(space, register, staging.gpu_address(), staging.size() as u32);
        Ok(())
    }

    // ============================================================
    // Input assembler
    // ============================================================

    /// Bind a vertex buffer by GPU address.
    pub fn set_vertex_buffer(&mut self, slot: u32, gpu_address: u64, count: u32, stride: u32) {
        // The byte size outgrows u32 for large streams.
        let size = count as u64 * stride as u64;
        self.list.ia_set_vertex_buffer(slot, gpu_address, size, stride);
    }

    /// Bind a structured buffer as the vertex stream for `slot`.
    pub fn set_vertex_buffer_structured(&mut self, slot: u32, buffer: &StructuredBuffer) {
        self.set_vertex_buffer(
            slot,
            buffer.gpu_address(),
            buffer.element_count(),
            buffer.element_size(),
        );
    }

    /// Upload `vertices` and bind them as the vertex stream for `slot`.
    ///
    /// # Errors
    ///
    /// Fails only if transient page creation fails.
    pub fn set_transient_vertex_buffer<T: Pod>(&mut self, slot: u32, vertices: &[T]) -> GpuResult<()> {
        let staging = self
            .transient
            .allocate_upload(std::mem::size_of_val(vertices) as u64)?;
        staging.write_slice(vertices);
        self.set_vertex_buffer(
            slot,
            staging.gpu_address(),
            vertices.len() as u32,
            std::mem::size_of::<T>() as u32,
        );
        Ok(())
    }

    /// Bind an index buffer by GPU address; 16-bit indices iff `format16`.
    pub fn set_index_buffer(&mut self, gpu_address: u64, count: u32, format16: bool) {
        let stride: u32 = if format16 { 2 } else { 4 };
        self.list
            .ia_set_index_buffer(gpu_address, count as u64 * stride as u64, stride);
    }

    /// Bind a structured buffer as the index stream; 16-bit iff its
    /// elements are 2 bytes.
    pub fn set_index_buffer_structured(&mut self, buffer: &StructuredBuffer) {
        self.set_index_buffer(
            buffer.gpu_address(),
            buffer.element_count(),
            buffer.element_size() == 2,
        );
    }

    /// Upload `indices` and bind them as the index stream. `T` must be
    /// `u16` or `u32` sized.
    ///
    /// # Errors
    ///
    /// Fails only if transient page creation fails.
    pub fn set_transient_index_buffer<T: Pod>(&mut self, indices: &[T]) -> GpuResult<()> {
        let stride = std::mem::size_of::<T>();
        debug_assert!(stride == 2 || stride == 4);
        let staging = self
            .transient
            .allocate_upload(std::mem::size_of_val(indices) as u64)?;
        staging.write_slice(indices);
        self.set_index_buffer(staging.gpu_address(), indices.len() as u32, stride == 2);
        Ok(())
    }

    // ============================================================
    // Fixed state
    // ============================================================

    /// Bind a pipeline state object.
    pub fn set_pipeline_state(&mut self, pipeline: &PipelineState) {
        self.list.set_pipeline_state(pipeline.raw());
    }

    /// Set the primitive topology.
    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.list.ia_set_primitive_topology(topology);
    }

    /// Set one viewport.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.list.rs_set_viewports(&[viewport]);
    }

    /// Set multiple viewports.
    pub fn set_viewports(&mut self, viewports: &[Viewport]) {
        self.list.rs_set_viewports(viewports);
    }

    /// Set one scissor rectangle.
    pub fn set_scissor(&mut self, scissor: ScissorRect) {
        self.list.rs_set_scissor_rects(&[scissor]);
    }

    /// Set multiple scissor rectangles.
    pub fn set_scissors(&mut self, scissors: &[ScissorRect]) {
        self.list.rs_set_scissor_rects(scissors);
    }

    // ============================================================
    // Draw / dispatch / submit
    // ============================================================

    fn commit(&mut self, graphics: bool) {
        let signature = if graphics {
            self.graphics_signature.clone()
        } else {
            self.compute_signature.clone()
        };
        let Some(signature) = signature else {
            return;
        };
        let resource_window = (signature.total_resource_descriptors() > 0)
            .then(|| self.resource_heap.window())
            .flatten();
        let sampler_window = (signature.total_sampler_descriptors() > 0)
            .then(|| self.sampler_heap.window())
            .flatten();

        let mut heaps: Vec<&RawDescriptorHeap> = Vec::with_capacity(2);
        if let Some((heap, _)) = &resource_window {
            heaps.push(heap);
        }
        if let Some((heap, _)) = &sampler_window {
            heaps.push(heap);
        }
        if !heaps.is_empty() {
            self.list.set_descriptor_heaps(&heaps);
        }

        let mut param = 0;
        if let Some((_, base)) = resource_window {
            self.set_table(graphics, param, base);
            param += 1;
        }
        if let Some((_, base)) = sampler_window {
            self.set_table(graphics, param, base);
        }
    }

    fn set_table(&mut self, graphics: bool, param: u32, base: GpuDescriptorHandle) {
        if graphics {
            self.list.set_graphics_root_descriptor_table(param, base);
        } else {
            self.list.set_compute_root_descriptor_table(param, base);
        }
    }

    /// Commit staged descriptors and record a non-indexed draw.
    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.commit(true);
        self.list.draw_instanced(vertex_count, 1, first_vertex, 0);
    }

    /// Commit staged descriptors and record an indexed draw.
    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        self.commit(true);
        self.list
            .draw_indexed_instanced(index_count, 1, first_index, base_vertex, 0);
    }

    /// Commit staged descriptors and record a compute dispatch.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commit(false);
        self.list.dispatch(x, y, z);
    }

    /// Close, execute, and recycle everything this recording borrowed.
    ///
    /// Returns the submit's sync point; transient pages, rolled-over
    /// shader-visible heaps and the command allocator become reusable once
    /// it is reached. The recorder is immediately ready to record again.
    pub fn submit(&mut self) -> SyncPoint {
        self.list.close();
        self.device.queue().execute_command_list(&self.list);
        let sync = self.device.acquire_sync_point();

        self.transient.retire_all(sync);
        self.resource_heap.retire(sync);
        self.sampler_heap.retire(sync);
        self.graphics_signature = None;
        self.compute_signature = None;

        if let Some(old) = self.allocator.take() {
            self.device.release_command_allocator(sync, old);
        }
        let fresh = self.device.acquire_command_allocator();
        self.list.reset(&fresh);
        self.allocator = Some(fresh);

        self.last_submit = sync;
        sync
    }

    /// Discard the recording without executing it.
    pub fn reset(&mut self) {
        self.list.close();
        self.transient.retire_all(self.last_submit);
        self.resource_heap.retire(self.last_submit);
        self.sampler_heap.retire(self.last_submit);
        self.graphics_signature = None;
        self.compute_signature = None;
        if let Some(allocator) = &self.allocator {
            // Nothing recorded on this allocator has been executed.
            allocator.reset();
            self.list.reset(allocator);
        }
    }

    /// Block until the last submit completes.
    pub fn wait_for_completion(&self) {
        self.device.wait(self.last_submit);
    }

    /// The shader-visible window reserved for the bound signature's
    /// resource tables: GPU base handle plus slot count.
    pub fn staged_resource_window(&self) -> Option<(GpuDescriptorHandle, u32)> {
        let (_, base) = self.resource_heap.window()?;
        let (_, size) = self.resource_heap.window_range()?;
        Some((base, size))
    }
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            self.device
                .release_command_allocator(self.last_submit, allocator);
        }
        self.resource_heap.retire(self.last_submit);
        self.sampler_heap.retire(self.last_submit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceDesc;
    use crate::resource::{DepthBuffer, DepthBufferDesc, GpuBuffer};

    fn device() -> Arc<Device> {
        Device::new(DeviceDesc::default()).unwrap()
    }

    #[test]
    fn test_same_state_transition_is_noop() {
        let device = device();
        let mut recorder = CommandRecorder::new(&device).unwrap();
        let buffer = GpuBuffer::new(&device, 256, None).unwrap();

        recorder.transition(&buffer, ResourceState::COPY_DEST);
        let after_first = recorder.list.cloned_commands().len();
        recorder.transition(&buffer, ResourceState::COPY_DEST);
        assert_eq!(recorder.list.cloned_commands().len(), after_first);
    }

    #[test]
    fn test_uav_transition_adds_uav_barrier() {
        let device = device();
        let mut recorder = CommandRecorder::new(&device).unwrap();
        let buffer = GpuBuffer::new(&device, 256, None).unwrap();

        recorder.transition(&buffer, ResourceState::UNORDERED_ACCESS);
        // One transition plus one UAV barrier.
        assert_eq!(recorder.list.cloned_commands().len(), 2);
    }

    #[test]
    fn test_submit_twice_orders_sync_points() {
        let device = device();
        let mut recorder = CommandRecorder::new(&device).unwrap();
        let first = recorder.submit();
        let second = recorder.submit();
        assert!(first < second);
        device.wait(second);
        assert!(device.timeline().reached(first));
        assert!(device.timeline().reached(second));
    }

    #[test]
    fn test_plane_selective_clears_keep_the_other_plane() {
        let device = device();
        let mut recorder = CommandRecorder::new(&device).unwrap();
        let desc = DepthBufferDesc::new(4, 4, PixelFormat::D24UnormS8Uint).with_clear(0.0, 0x12);
        let depth = DepthBuffer::new(&device, &desc).unwrap();

        recorder.set_depth_target(&depth);
        recorder.clear_depth_stencil_with(&depth, 1.0, 0xab);
        recorder.clear_depth(&depth);
        device.wait(recorder.submit());
        // Depth-only clear reset the depth bits; the 0xab stencil survives.
        let texel = depth.resource().read_back_range(0, 4);
        assert_eq!(u32::from_le_bytes(texel.try_into().unwrap()), 0xab_00_00_00);

        recorder.clear_stencil(&depth);
        device.wait(recorder.submit());
        // Stencil-only clear set 0x12; the zero depth bits survive.
        let texel = depth.resource().read_back_range(0, 4);
        assert_eq!(u32::from_le_bytes(texel.try_into().unwrap()), 0x12_00_00_00);
        assert_eq!(device.barrier_violations(), 0);
    }

    #[test]
    fn test_large_vertex_stream_size_does_not_overflow() {
        let device = device();
        let mut recorder = CommandRecorder::new(&device).unwrap();
        // 16 Mi vertices at a 256-byte stride: a 4 GiB stream past u32.
        recorder.set_vertex_buffer(0, 0x1_0000_0000, 16 << 20, 256);
        recorder.set_index_buffer(0x1_0000_0000, u32::MAX, false);
    }

    #[test]
    fn test_copy_buffer_data_lands_in_destination() {
        let device = device();
        let mut recorder = CommandRecorder::new(&device).unwrap();
        let buffer = GpuBuffer::new(&device, 256, None).unwrap();

        let payload = [7u8, 8, 9, 10];
        recorder.copy_buffer_data(&payload, &buffer, 32).unwrap();
        let sync = recorder.submit();
        device.wait(sync);

        assert_eq!(buffer.resource().read_back_range(32, 4), payload);
        assert_eq!(device.barrier_violations(), 0);
    }
}
