//! Shader-visible descriptor staging.
//!
//! A [`DynamicDescriptorHeap`] is a per-recorder ring over fixed-capacity
//! shader-visible heaps drawn from the device's pool. Binding a root
//! signature reserves a contiguous window sized to the signature's
//! descriptor total; staged writes keyed on `(space, register)` land at
//! deterministic offsets inside that window; committing binds the window's
//! base as the descriptor table for the draw.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{
    CpuDescriptorHandle, DescriptorHeapKind, DescriptorRangeKind, GpuDescriptorHandle,
    RawDescriptorHeap, RawDevice,
};
use crate::device::Device;
use crate::error::GpuResult;
use crate::root_signature::RootSignature;
use crate::timeline::{GpuTimeline, SyncPoint};

/// Slots per shader-visible heap.
pub(crate) const SHADER_VISIBLE_CAPACITY: u32 = 1024;

/// Device-wide pool of shader-visible heaps, recycled on sync points.
pub(crate) struct ShaderVisibleHeapPool {
    raw: RawDevice,
    kind: DescriptorHeapKind,
    retired: Mutex<VecDeque<(SyncPoint, RawDescriptorHeap)>>,
    created: AtomicUsize,
}

impl ShaderVisibleHeapPool {
    pub(crate) fn new(raw: RawDevice, kind: DescriptorHeapKind) -> Self {
        Self {
            raw,
            kind,
            retired: Mutex::new(VecDeque::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Reuse the oldest retired heap if its sync point passed, else create.
    pub(crate) fn acquire(&self, timeline: &GpuTimeline) -> GpuResult<RawDescriptorHeap> {
        {
            let mut retired = self.retired.lock();
            if let Some((sync, _)) = retired.front() {
                if timeline.reached(*sync) {
                    if let Some((_, heap)) = retired.pop_front() {
                        return Ok(heap);
                    }
                }
            }
        }
        let heap = self
            .raw
            .create_descriptor_heap(self.kind, SHADER_VISIBLE_CAPACITY, true)?;
        let total = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        log::trace!("new shader-visible {:?} heap ({total} total)", self.kind);
        Ok(heap)
    }

    pub(crate) fn retire(&self, sync: SyncPoint, heaps: impl IntoIterator<Item = RawDescriptorHeap>) {
        let mut retired = self.retired.lock();
        for heap in heaps {
            retired.push_back((sync, heap));
        }
    }

    /// Number of heaps ever created.
    pub(crate) fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

/// Per-recorder staging ring for one shader-visible heap kind.
pub struct DynamicDescriptorHeap {
    device: Arc<Device>,
    kind: DescriptorHeapKind,
    heap: Option<RawDescriptorHeap>,
    /// First unreserved slot in the current heap.
    next_slot: u32,
    window_base: u32,
    window_size: u32,
    signature: Option<Arc<RootSignature>>,
    retired: Vec<RawDescriptorHeap>,
}

impl DynamicDescriptorHeap {
    pub(crate) fn new(device: Arc<Device>, kind: DescriptorHeapKind) -> Self {
        debug_assert!(matches!(
            kind,
            DescriptorHeapKind::CbvSrvUav | DescriptorHeapKind::Sampler
        ));
        Self {
            device,
            kind,
            heap: None,
            next_slot: 0,
            window_base: 0,
            window_size: 0,
            signature: None,
            retired: Vec::new(),
        }
    }

    fn signature_total(&self, signature: &RootSignature) -> u32 {
        match self.kind {
            DescriptorHeapKind::Sampler => signature.total_sampler_descriptors(),
            _ => signature.total_resource_descriptors(),
        }
    }

    /// Reserve a descriptor window for `signature`, rolling to a fresh heap
    /// when the current one cannot hold it.
    pub(crate) fn parse_root_signature(&mut self, signature: &Arc<RootSignature>) -> GpuResult<()> {
        let total = self.signature_total(signature);
        self.signature = Some(signature.clone());
        self.window_size = total;
        if total == 0 {
            return Ok(());
        }
        let exhausted = match &self.heap {
            Some(_) => SHADER_VISIBLE_CAPACITY - self.next_slot < total,
            None => true,
        };
        if exhausted {
            if let Some(old) = self.heap.take() {
                self.retired.push(old);
            }
            let pool = self.device.shader_visible_heaps(self.kind);
            self.heap = Some(pool.acquire(self.device.timeline())?);
            self.next_slot = 0;
        }
        self.window_base = self.next_slot;
        self.next_slot += total;
        Ok(())
    }

    fn window_slot(&self, range_kind: DescriptorRangeKind, space: u32, register: u32) -> Option<CpuDescriptorHandle> {
        let signature = match &self.signature {
            Some(signature) => signature,
            None => {
                log::error!("descriptor staged with no root signature bound");
                return None;
            }
        };
        let heap = self.heap.as_ref()?;
        let slot = self.window_base + signature.table_base(range_kind, space) + register;
        debug_assert!(
            slot < self.window_base + self.window_size,
            "staged descriptor outside the reserved window"
        );
        Some(heap.cpu_handle(slot))
    }

    /// Copy an existing CPU descriptor into the window slot for
    /// `(space, register)`.
    pub(crate) fn stage_copy(
        &self,
        range_kind: DescriptorRangeKind,
        space: u32,
        register: u32,
        src: CpuDescriptorHandle,
    ) {
        if let Some(dst) = self.window_slot(range_kind, space, register) {
            self.device.raw().copy_descriptor(dst, src);
        }
    }

    /// Synthesize a constant buffer view directly into the window slot,
    /// skipping the CPU slab round-trip.
    pub(crate) fn stage_cbv(&self, space: u32, register: u32, gpu_address: u64, size: u32) {
        if let Some(dst) = self.window_slot(DescriptorRangeKind::Cbv, space, register) {
            self.device.raw().write_cbv(dst, gpu_address, size);
        }
    }

    /// The current window: heap plus GPU base handle, if non-empty.
    pub(crate) fn window(&self) -> Option<(RawDescriptorHeap, GpuDescriptorHandle)> {
        if self.window_size == 0 {
            return None;
        }
        self.heap
            .as_ref()
            .map(|heap| (heap.clone(), heap.gpu_handle(self.window_base)))
    }

    /// Slot span of the current window within its heap.
    pub(crate) fn window_range(&self) -> Option<(u32, u32)> {
        (self.window_size > 0).then_some((self.window_base, self.window_size))
    }

    /// Hand rolled-over heaps back to the device pool under `sync`. The
    /// current heap is kept; its remaining slots serve future windows.
    pub(crate) fn retire(&mut self, sync: SyncPoint) {
        if self.retired.is_empty() {
            return;
        }
        let pool = self.device.shader_visible_heaps(self.kind);
        pool.retire(sync, self.retired.drain(..));
    }
}

impl Drop for DynamicDescriptorHeap {
    fn drop(&mut self) {
        let pool = self.device.shader_visible_heaps(self.kind);
        pool.retire(self.device.timeline().acquire(), self.retired.drain(..));
        if let Some(heap) = self.heap.take() {
            pool.retire(self.device.timeline().acquire(), [heap]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DescriptorRange, DeviceDesc, RootParameter, RootSignatureDesc};

    fn signature(device: &Arc<Device>, count: u32, space: u32) -> Arc<RootSignature> {
        let desc = RootSignatureDesc::new().with_parameter(RootParameter::DescriptorTable {
            ranges: vec![DescriptorRange {
                kind: DescriptorRangeKind::Srv,
                count,
                base_register: 0,
                register_space: space,
            }],
        });
        Arc::new(RootSignature::new(device, desc).unwrap())
    }

    #[test]
    fn test_windows_are_consecutive() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut heap = DynamicDescriptorHeap::new(device.clone(), DescriptorHeapKind::CbvSrvUav);

        heap.parse_root_signature(&signature(&device, 3, 0)).unwrap();
        assert_eq!(heap.window_range(), Some((0, 3)));
        heap.parse_root_signature(&signature(&device, 5, 0)).unwrap();
        assert_eq!(heap.window_range(), Some((3, 5)));
    }

    #[test]
    fn test_exhausted_heap_rolls_over() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut heap = DynamicDescriptorHeap::new(device.clone(), DescriptorHeapKind::CbvSrvUav);
        let big = signature(&device, SHADER_VISIBLE_CAPACITY - 4, 0);
        let small = signature(&device, 8, 0);

        heap.parse_root_signature(&big).unwrap();
        let (first_heap, _) = heap.window().unwrap();
        // 4 slots left cannot hold 8; a fresh heap starts the window at 0.
        heap.parse_root_signature(&small).unwrap();
        assert_eq!(heap.window_range(), Some((0, 8)));
        let (second_heap, _) = heap.window().unwrap();
        assert_ne!(first_heap.cpu_handle(0).ptr, second_heap.cpu_handle(0).ptr);
        assert_eq!(heap.retired.len(), 1);
    }

    #[test]
    fn test_empty_signature_reserves_nothing() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut heap = DynamicDescriptorHeap::new(device.clone(), DescriptorHeapKind::Sampler);
        // No sampler tables: the sampler ring reserves no window.
        heap.parse_root_signature(&signature(&device, 2, 0)).unwrap();
        assert_eq!(heap.window_range(), None);
        assert!(heap.window().is_none());
    }

    #[test]
    fn test_staged_write_lands_at_parsed_offset() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut heap = DynamicDescriptorHeap::new(device.clone(), DescriptorHeapKind::CbvSrvUav);

        let desc = RootSignatureDesc::new().with_parameter(RootParameter::DescriptorTable {
            ranges: vec![
                DescriptorRange {
                    kind: DescriptorRangeKind::Cbv,
                    count: 2,
                    base_register: 0,
                    register_space: 0,
                },
                DescriptorRange {
                    kind: DescriptorRangeKind::Srv,
                    count: 2,
                    base_register: 0,
                    register_space: 0,
                },
            ],
        });
        let signature = Arc::new(RootSignature::new(&device, desc).unwrap());
        heap.parse_root_signature(&signature).unwrap();

        // srv b1 space0 sits after the two CBVs: slot 3 of the window.
        let slot = heap.window_slot(DescriptorRangeKind::Srv, 0, 1).unwrap();
        let base = heap.heap.as_ref().unwrap().cpu_handle(0);
        let increment = device.raw().descriptor_increment(DescriptorHeapKind::CbvSrvUav);
        assert_eq!(slot.ptr, base.ptr + 3 * increment);
    }
}
