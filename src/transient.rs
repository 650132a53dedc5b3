//! Transient per-submission memory.
//!
//! Short-lived upload and UAV scratch comes from 2 MiB pages pooled on the
//! device. A recorder bumps 256-byte aligned allocations out of its current
//! page; at submit, every page the recorder touched is retired under the
//! submit's sync point. Default-sized pages recycle once their sync point is
//! reached; oversized pages are one-shot and queue for deletion.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::backend::{HeapKind, RawDevice, RawResource, ResourceDesc, ResourceFlags};
use crate::device::Device;
use crate::error::GpuResult;
use crate::timeline::{GpuTimeline, SyncPoint};
use crate::types::ResourceState;

/// Size of a pooled transient page.
pub const DEFAULT_PAGE_SIZE: u64 = 2 * 1024 * 1024;

/// Alignment of every transient allocation.
pub const TRANSIENT_ALIGNMENT: u64 = 256;

pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// The two transient memory kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientKind {
    /// CPU-writable upload memory, persistently mapped.
    Upload,
    /// Device-local UAV scratch, never mapped.
    Uav,
}

/// One transient page: a buffer plus pooling metadata.
pub struct TransientPage {
    kind: TransientKind,
    size: u64,
    is_default: bool,
    resource: RawResource,
}

impl TransientPage {
    /// The page's memory kind.
    pub fn kind(&self) -> TransientKind {
        self.kind
    }

    /// Page size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the page recycles through the default pool.
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// GPU virtual address of the page start.
    pub fn gpu_address(&self) -> u64 {
        self.resource.gpu_address()
    }

    /// The backing buffer.
    pub fn resource(&self) -> &RawResource {
        &self.resource
    }
}

struct PoolSide {
    retired: Mutex<VecDeque<(SyncPoint, Arc<TransientPage>)>>,
    /// Owns every default page ever created; never shrinks.
    pinned: Mutex<Vec<Arc<TransientPage>>>,
    /// Oversized pages awaiting their sync point; dropped at teardown.
    deletion: Mutex<VecDeque<(SyncPoint, Arc<TransientPage>)>>,
    default_pages: AtomicUsize,
}

impl PoolSide {
    fn new() -> Self {
        Self {
            retired: Mutex::new(VecDeque::new()),
            pinned: Mutex::new(Vec::new()),
            deletion: Mutex::new(VecDeque::new()),
            default_pages: AtomicUsize::new(0),
        }
    }
}

/// Device-wide pools of transient pages, one per kind.
pub(crate) struct TransientPagePool {
    raw: RawDevice,
    upload: PoolSide,
    uav: PoolSide,
}

impl TransientPagePool {
    pub(crate) fn new(raw: RawDevice) -> Self {
        Self {
            raw,
            upload: PoolSide::new(),
            uav: PoolSide::new(),
        }
    }

    fn side(&self, kind: TransientKind) -> &PoolSide {
        match kind {
            TransientKind::Upload => &self.upload,
            TransientKind::Uav => &self.uav,
        }
    }

    fn create_page(&self, kind: TransientKind, size: u64) -> GpuResult<Arc<TransientPage>> {
        let (desc, initial_state) = match kind {
            TransientKind::Upload => (
                ResourceDesc::buffer(size)
                    .with_heap(HeapKind::Upload)
                    .with_label("transient upload page"),
                ResourceState::GENERIC_READ,
            ),
            TransientKind::Uav => (
                ResourceDesc::buffer(size)
                    .with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS)
                    .with_label("transient uav page"),
                ResourceState::UNORDERED_ACCESS,
            ),
        };
        let resource = self.raw.create_committed_resource(desc, initial_state)?;
        let is_default = size == DEFAULT_PAGE_SIZE;
        let page = Arc::new(TransientPage {
            kind,
            size,
            is_default,
            resource,
        });
        if is_default {
            let side = self.side(kind);
            side.pinned.lock().push(page.clone());
            let total = side.default_pages.fetch_add(1, Ordering::Relaxed) + 1;
            log::trace!("new default {kind:?} transient page ({total} total)");
        } else {
            log::trace!("new oversized {kind:?} transient page ({size} bytes)");
        }
        Ok(page)
    }

    /// Pop the oldest retired default page if reusable, else create one.
    pub(crate) fn acquire_default(
        &self,
        kind: TransientKind,
        timeline: &GpuTimeline,
    ) -> GpuResult<Arc<TransientPage>> {
        {
            let mut retired = self.side(kind).retired.lock();
            if let Some((sync, _)) = retired.front() {
                if timeline.reached(*sync) {
                    if let Some((_, page)) = retired.pop_front() {
                        return Ok(page);
                    }
                }
            }
        }
        self.create_page(kind, DEFAULT_PAGE_SIZE)
    }

    /// Create a dedicated one-shot page for an oversized request.
    pub(crate) fn create_dedicated(
        &self,
        kind: TransientKind,
        size: u64,
    ) -> GpuResult<Arc<TransientPage>> {
        self.create_page(kind, size)
    }

    /// Hand pages back under `sync`: default pages to the recycle queue,
    /// oversized ones to the deletion queue.
    pub(crate) fn retire(
        &self,
        kind: TransientKind,
        sync: SyncPoint,
        pages: impl IntoIterator<Item = Arc<TransientPage>>,
    ) {
        let side = self.side(kind);
        for page in pages {
            if page.is_default {
                side.retired.lock().push_back((sync, page));
            } else {
                side.deletion.lock().push_back((sync, page));
            }
        }
    }

    /// Number of default pages ever created for `kind`.
    pub(crate) fn default_page_count(&self, kind: TransientKind) -> usize {
        self.side(kind).default_pages.load(Ordering::Relaxed)
    }
}

/// One 256-byte aligned slice of a transient page.
pub struct TransientAllocation {
    page: Arc<TransientPage>,
    offset: u64,
    size: u64,
}

impl TransientAllocation {
    /// Byte offset within the page.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Aligned allocation size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// GPU virtual address of the allocation start.
    pub fn gpu_address(&self) -> u64 {
        self.page.gpu_address() + self.offset
    }

    /// The page the allocation lives in.
    pub fn page(&self) -> &Arc<TransientPage> {
        &self.page
    }

    /// The backing buffer, for copy sources.
    pub fn resource(&self) -> &RawResource {
        self.page.resource()
    }

    /// Write bytes through the page's persistent mapping (upload only).
    pub fn write(&self, data: &[u8]) {
        self.write_at(0, data);
    }

    /// Write bytes at a byte offset within the allocation (upload only).
    pub fn write_at(&self, offset: u64, data: &[u8]) {
        debug_assert_eq!(self.page.kind, TransientKind::Upload, "UAV pages are not mapped");
        debug_assert!(offset + data.len() as u64 <= self.size);
        self.page.resource.write(self.offset + offset, data);
    }

    /// Write one `Pod` value.
    pub fn write_value<T: Pod>(&self, value: &T) {
        self.write(bytemuck::bytes_of(value));
    }

    /// Write a `Pod` slice.
    pub fn write_slice<T: Pod>(&self, values: &[T]) {
        self.write(bytemuck::cast_slice(values));
    }
}

struct Lane {
    kind: TransientKind,
    current: Option<(Arc<TransientPage>, u64)>,
    retired: Vec<Arc<TransientPage>>,
}

impl Lane {
    fn new(kind: TransientKind) -> Self {
        Self {
            kind,
            current: None,
            retired: Vec::new(),
        }
    }
}

/// Per-recorder bump allocator over the device's transient pools.
pub(crate) struct LinearAllocator {
    device: Arc<Device>,
    upload: Lane,
    uav: Lane,
}

impl LinearAllocator {
    pub(crate) fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            upload: Lane::new(TransientKind::Upload),
            uav: Lane::new(TransientKind::Uav),
        }
    }

    fn allocate(&mut self, kind: TransientKind, size: u64) -> GpuResult<TransientAllocation> {
        let aligned = align_up(size.max(1), TRANSIENT_ALIGNMENT);
        let pool = self.device.transient_pages();
        let lane = match kind {
            TransientKind::Upload => &mut self.upload,
            TransientKind::Uav => &mut self.uav,
        };

        // Requests reaching the page size get a dedicated one-shot page.
        if aligned >= DEFAULT_PAGE_SIZE {
            let page = pool.create_dedicated(kind, aligned)?;
            lane.retired.push(page.clone());
            return Ok(TransientAllocation {
                page,
                offset: 0,
                size: aligned,
            });
        }

        let exhausted = match &lane.current {
            Some((_, offset)) => DEFAULT_PAGE_SIZE - offset < aligned,
            None => true,
        };
        if exhausted {
            if let Some((page, _)) = lane.current.take() {
                lane.retired.push(page);
            }
            let page = pool.acquire_default(kind, self.device.timeline())?;
            lane.current = Some((page, 0));
        }
        match &mut lane.current {
            Some((page, offset)) => {
                let allocation = TransientAllocation {
                    page: page.clone(),
                    offset: *offset,
                    size: aligned,
                };
                *offset += aligned;
                Ok(allocation)
            }
            // Unreachable: the branch above always installs a page.
            None => self.allocate(kind, size),
        }
    }

    /// Allocate mapped upload memory.
    pub(crate) fn allocate_upload(&mut self, size: u64) -> GpuResult<TransientAllocation> {
        self.allocate(TransientKind::Upload, size)
    }

    /// Allocate device-local UAV scratch.
    pub(crate) fn allocate_uav(&mut self, size: u64) -> GpuResult<TransientAllocation> {
        self.allocate(TransientKind::Uav, size)
    }

    /// Retire every page this allocator touched under `sync`.
    pub(crate) fn retire_all(&mut self, sync: SyncPoint) {
        let pool = self.device.transient_pages();
        for lane in [&mut self.upload, &mut self.uav] {
            if let Some((page, _)) = lane.current.take() {
                lane.retired.push(page);
            }
            if !lane.retired.is_empty() {
                pool.retire(lane.kind, sync, lane.retired.drain(..));
            }
        }
    }
}

impl Drop for LinearAllocator {
    fn drop(&mut self) {
        let has_pages = self.upload.current.is_some()
            || !self.upload.retired.is_empty()
            || self.uav.current.is_some()
            || !self.uav.retired.is_empty();
        if has_pages {
            self.retire_all(self.device.timeline().acquire());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceDesc;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn test_exact_page_size_is_dedicated() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut allocator = LinearAllocator::new(device.clone());
        let allocation = allocator.allocate_upload(DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(allocation.offset(), 0);
        assert_eq!(allocation.size(), DEFAULT_PAGE_SIZE);
        // Exactly page-sized: dedicated now, recyclable later.
        assert!(allocation.page().is_default());
        // The next small allocation must not share the dedicated page.
        let small = allocator.allocate_upload(64).unwrap();
        assert!(!Arc::ptr_eq(small.page(), allocation.page()));
    }

    #[test]
    fn test_oversized_page_is_one_shot() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut allocator = LinearAllocator::new(device.clone());
        let allocation = allocator.allocate_upload(DEFAULT_PAGE_SIZE + 1).unwrap();
        assert!(!allocation.page().is_default());
    }

    #[test]
    fn test_bump_allocations_are_aligned_and_disjoint() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut allocator = LinearAllocator::new(device.clone());
        let a = allocator.allocate_upload(100).unwrap();
        let b = allocator.allocate_upload(100).unwrap();
        assert!(Arc::ptr_eq(a.page(), b.page()));
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 256);
        assert_eq!(b.gpu_address() % TRANSIENT_ALIGNMENT, 0);
    }

    #[test]
    fn test_uav_lane_is_separate_from_upload() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut allocator = LinearAllocator::new(device.clone());
        let upload = allocator.allocate_upload(64).unwrap();
        let scratch = allocator.allocate_uav(64).unwrap();

        assert!(!Arc::ptr_eq(upload.page(), scratch.page()));
        assert_eq!(scratch.page().kind(), TransientKind::Uav);
        assert_eq!(device.transient_default_page_count(TransientKind::Uav), 1);
        // UAV bumps share their page like upload bumps do.
        let next = allocator.allocate_uav(64).unwrap();
        assert!(Arc::ptr_eq(next.page(), scratch.page()));
        assert_eq!(next.offset(), 256);
    }

    #[test]
    fn test_upload_write_lands_in_page() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut allocator = LinearAllocator::new(device.clone());
        let _skip = allocator.allocate_upload(64).unwrap();
        let allocation = allocator.allocate_upload(16).unwrap();
        allocation.write_slice(&[1u32, 2, 3, 4]);
        let bytes = allocation.resource().read(allocation.offset(), 16);
        assert_eq!(bytes, bytemuck::cast_slice::<u32, u8>(&[1, 2, 3, 4]));
    }
}
