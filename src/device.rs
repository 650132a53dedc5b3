//! The device: owner of the queue, timeline and every recycling pool.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use static_assertions::assert_impl_all;

use crate::backend::{
    DescriptorHeapKind, DeviceDesc, RawCommandAllocator, RawDevice, RawQueue,
};
use crate::descriptor::{CpuDescriptorAllocator, ShaderVisibleHeapPool};
use crate::error::GpuResult;
use crate::timeline::{GpuTimeline, SyncPoint};
use crate::transient::{TransientKind, TransientPagePool};
use crate::types::PixelFormat;

/// The device: the root object everything else hangs off.
///
/// Owns the underlying device, the direct queue and its timeline, the four
/// CPU descriptor slab allocators, the command-allocator recycling FIFO,
/// the transient page pools and the shader-visible heap pools. There is no
/// process-wide state; independent devices are fully isolated.
///
/// # Thread Safety
///
/// `Device` is `Send + Sync`. All pools use interior mutability; recorders
/// on different threads share one device safely.
pub struct Device {
    raw: RawDevice,
    queue: Arc<RawQueue>,
    timeline: GpuTimeline,
    allocator_pool: Mutex<VecDeque<(SyncPoint, RawCommandAllocator)>>,
    cbv_srv_uav_slots: CpuDescriptorAllocator,
    sampler_slots: CpuDescriptorAllocator,
    rtv_slots: CpuDescriptorAllocator,
    dsv_slots: CpuDescriptorAllocator,
    transient_pages: TransientPagePool,
    resource_heaps: ShaderVisibleHeapPool,
    sampler_heaps: ShaderVisibleHeapPool,
}

assert_impl_all!(Device: Send, Sync);

impl Device {
    /// Open the device and bring up the direct queue.
    ///
    /// # Errors
    ///
    /// Propagates adapter and queue creation failures.
    pub fn new(desc: DeviceDesc) -> GpuResult<Arc<Self>> {
        let raw = RawDevice::new(desc)?;
        let queue = Arc::new(raw.create_queue());
        let fence = raw.create_fence();
        let timeline = GpuTimeline::new(queue.clone(), fence);
        log::info!("device ready");
        Ok(Arc::new(Self {
            cbv_srv_uav_slots: CpuDescriptorAllocator::new(
                raw.clone(),
                DescriptorHeapKind::CbvSrvUav,
            ),
            sampler_slots: CpuDescriptorAllocator::new(raw.clone(), DescriptorHeapKind::Sampler),
            rtv_slots: CpuDescriptorAllocator::new(raw.clone(), DescriptorHeapKind::Rtv),
            dsv_slots: CpuDescriptorAllocator::new(raw.clone(), DescriptorHeapKind::Dsv),
            transient_pages: TransientPagePool::new(raw.clone()),
            resource_heaps: ShaderVisibleHeapPool::new(raw.clone(), DescriptorHeapKind::CbvSrvUav),
            sampler_heaps: ShaderVisibleHeapPool::new(raw.clone(), DescriptorHeapKind::Sampler),
            allocator_pool: Mutex::new(VecDeque::new()),
            timeline,
            queue,
            raw,
        }))
    }

    /// The underlying device.
    pub fn raw(&self) -> &RawDevice {
        &self.raw
    }

    /// The direct queue.
    pub fn queue(&self) -> &Arc<RawQueue> {
        &self.queue
    }

    /// The GPU timeline.
    pub fn timeline(&self) -> &GpuTimeline {
        &self.timeline
    }

    /// Acquire a sync point signaled after all work submitted so far.
    pub fn acquire_sync_point(&self) -> SyncPoint {
        self.timeline.acquire()
    }

    /// Block until `sync` passes.
    pub fn wait(&self, sync: SyncPoint) {
        self.timeline.wait(sync);
    }

    /// Drain all submitted work.
    pub fn sync(&self) {
        self.timeline.sync();
    }

    // ============================================================
    // Command allocator recycling
    // ============================================================

    /// Reuse the oldest pooled allocator if its sync point passed, else
    /// create a fresh one. Never blocks on the GPU.
    pub fn acquire_command_allocator(&self) -> RawCommandAllocator {
        {
            let mut pool = self.allocator_pool.lock();
            if let Some((sync, _)) = pool.front() {
                if self.timeline.reached(*sync) {
                    if let Some((_, allocator)) = pool.pop_front() {
                        allocator.reset();
                        return allocator;
                    }
                }
            }
        }
        log::trace!("new command allocator");
        self.raw.create_command_allocator()
    }

    /// Return an allocator for reuse once `sync` passes.
    pub fn release_command_allocator(&self, sync: SyncPoint, allocator: RawCommandAllocator) {
        self.allocator_pool.lock().push_back((sync, allocator));
    }

    // ============================================================
    // Descriptor slot allocators
    // ============================================================

    pub(crate) fn cbv_srv_uav_slots(&self) -> &CpuDescriptorAllocator {
        &self.cbv_srv_uav_slots
    }

    pub(crate) fn sampler_slots(&self) -> &CpuDescriptorAllocator {
        &self.sampler_slots
    }

    pub(crate) fn rtv_slots(&self) -> &CpuDescriptorAllocator {
        &self.rtv_slots
    }

    pub(crate) fn dsv_slots(&self) -> &CpuDescriptorAllocator {
        &self.dsv_slots
    }

    pub(crate) fn transient_pages(&self) -> &TransientPagePool {
        &self.transient_pages
    }

    pub(crate) fn shader_visible_heaps(&self, kind: DescriptorHeapKind) -> &ShaderVisibleHeapPool {
        match kind {
            DescriptorHeapKind::Sampler => &self.sampler_heaps,
            _ => &self.resource_heaps,
        }
    }

    // ============================================================
    // Capability queries
    // ============================================================

    /// Whether the adapter supports raytracing. The core only queries;
    /// no raytracing pipeline is built here.
    pub fn supports_raytracing(&self) -> bool {
        self.raw.raytracing()
    }

    /// Whether `format` supports typed UAV loads on this adapter.
    pub fn supports_unordered_access(&self, format: PixelFormat) -> bool {
        format.uav_load_always_supported()
            || (self.raw.typed_uav_loads() && format.uav_load_needs_capability())
    }

    // ============================================================
    // Pool introspection
    // ============================================================

    /// Backing slab heaps ever created for a descriptor kind.
    pub fn descriptor_heap_count(&self, kind: DescriptorHeapKind) -> usize {
        match kind {
            DescriptorHeapKind::CbvSrvUav => self.cbv_srv_uav_slots.heap_count(),
            DescriptorHeapKind::Sampler => self.sampler_slots.heap_count(),
            DescriptorHeapKind::Rtv => self.rtv_slots.heap_count(),
            DescriptorHeapKind::Dsv => self.dsv_slots.heap_count(),
        }
    }

    /// Default transient pages ever created for a kind.
    pub fn transient_default_page_count(&self, kind: TransientKind) -> usize {
        self.transient_pages.default_page_count(kind)
    }

    /// Shader-visible heaps ever created for a kind.
    pub fn shader_visible_heap_count(&self, kind: DescriptorHeapKind) -> usize {
        self.shader_visible_heaps(kind).created_count()
    }

    /// Invalid barriers the queue has executed; 0 in a correct program.
    pub fn barrier_violations(&self) -> usize {
        self.queue.barrier_violations()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // Let the queue drain before the pools tear their objects down.
        self.timeline.sync();
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("timeline", &self.timeline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_allocator_recycling() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let first = device.acquire_command_allocator();
        let first_id = first.id();

        let sync = device.acquire_sync_point();
        device.release_command_allocator(sync, first);
        device.wait(sync);

        // Reached head is reset and reused instead of growing the pool.
        let second = device.acquire_command_allocator();
        assert_eq!(second.id(), first_id);
    }

    #[test]
    fn test_unreached_allocator_is_not_reused() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let first = device.acquire_command_allocator();
        let first_id = first.id();

        // Release under a sync point that has not been signaled yet.
        device.release_command_allocator(SyncPoint(u64::MAX), first);
        let second = device.acquire_command_allocator();
        assert_ne!(second.id(), first_id);
    }

    #[test]
    fn test_uav_capability_table() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        assert!(device.supports_unordered_access(PixelFormat::R32Float));
        assert!(device.supports_unordered_access(PixelFormat::R32Uint));
        assert!(device.supports_unordered_access(PixelFormat::Rgba8Unorm));
        assert!(!device.supports_unordered_access(PixelFormat::D32Float));

        let limited = Device::new(DeviceDesc::default().with_typed_uav_loads(false)).unwrap();
        assert!(limited.supports_unordered_access(PixelFormat::R32Float));
        assert!(!limited.supports_unordered_access(PixelFormat::Rgba8Unorm));
    }
}
