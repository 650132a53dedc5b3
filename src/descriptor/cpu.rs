//! CPU-side descriptor slot allocator.
//!
//! One allocator per heap kind. Slots come from a stack of fixed-size
//! backing heaps that never shrinks, so handed-out handles stay valid for
//! the allocator's lifetime. Freed slots go onto a shared free stack and are
//! re-handed out before the bump cursor advances, so churn reuses slots
//! instead of growing new heaps.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{CpuDescriptorHandle, DescriptorHeapKind, RawDescriptorHeap, RawDevice};
use crate::error::GpuResult;

/// Slots per backing heap.
pub(crate) const SLAB_CAPACITY: u32 = 64;

struct HeapStack {
    heaps: Vec<RawDescriptorHeap>,
    /// Total slots ever bump-allocated; `cursor / SLAB_CAPACITY` indexes the
    /// heap the next fresh slot comes from.
    cursor: u32,
}

struct AllocatorInner {
    raw: RawDevice,
    kind: DescriptorHeapKind,
    free_slots: Mutex<Vec<CpuDescriptorHandle>>,
    stack: Mutex<HeapStack>,
}

/// Slab allocator for non-shader-visible descriptor slots.
#[derive(Clone)]
pub struct CpuDescriptorAllocator {
    inner: Arc<AllocatorInner>,
}

impl CpuDescriptorAllocator {
    pub(crate) fn new(raw: RawDevice, kind: DescriptorHeapKind) -> Self {
        Self {
            inner: Arc::new(AllocatorInner {
                raw,
                kind,
                free_slots: Mutex::new(Vec::new()),
                stack: Mutex::new(HeapStack {
                    heaps: Vec::new(),
                    cursor: 0,
                }),
            }),
        }
    }

    /// The heap kind this allocator serves.
    pub fn kind(&self) -> DescriptorHeapKind {
        self.inner.kind
    }

    /// Allocate a descriptor slot, reusing a freed one when available.
    ///
    /// # Errors
    ///
    /// Propagates the backend error if a new backing heap cannot be created.
    pub fn allocate(&self) -> GpuResult<CpuDescriptorHandle> {
        if let Some(handle) = self.inner.free_slots.lock().pop() {
            return Ok(handle);
        }
        let mut stack = self.inner.stack.lock();
        let heap_index = (stack.cursor / SLAB_CAPACITY) as usize;
        if heap_index == stack.heaps.len() {
            let heap = self
                .inner
                .raw
                .create_descriptor_heap(self.inner.kind, SLAB_CAPACITY, false)?;
            log::trace!(
                "new {:?} descriptor slab ({} heaps total)",
                self.inner.kind,
                stack.heaps.len() + 1
            );
            stack.heaps.push(heap);
        }
        let slot = stack.cursor % SLAB_CAPACITY;
        stack.cursor += 1;
        Ok(stack.heaps[heap_index].cpu_handle(slot))
    }

    /// Return a slot to the free stack.
    ///
    /// Null handles are ignored. Double-free is not validated.
    pub fn free(&self, handle: CpuDescriptorHandle) {
        if handle.is_null() {
            return;
        }
        debug_assert_eq!(handle.kind, self.inner.kind);
        self.inner.free_slots.lock().push(handle);
    }

    /// Number of backing heaps ever created.
    pub fn heap_count(&self) -> usize {
        self.inner.stack.lock().heaps.len()
    }
}

impl std::fmt::Debug for CpuDescriptorAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuDescriptorAllocator")
            .field("kind", &self.inner.kind)
            .field("heaps", &self.heap_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceDesc;

    fn allocator(kind: DescriptorHeapKind) -> CpuDescriptorAllocator {
        let raw = RawDevice::new(DeviceDesc::default()).unwrap();
        CpuDescriptorAllocator::new(raw, kind)
    }

    #[test]
    fn test_slots_do_not_alias() {
        let alloc = allocator(DescriptorHeapKind::CbvSrvUav);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let handle = alloc.allocate().unwrap();
            assert!(seen.insert(handle.ptr));
        }
        assert_eq!(alloc.heap_count(), 200usize.div_ceil(64));
    }

    #[test]
    fn test_free_list_recycles_before_growing() {
        let alloc = allocator(DescriptorHeapKind::Rtv);
        let handles: Vec<_> = (0..64).map(|_| alloc.allocate().unwrap()).collect();
        assert_eq!(alloc.heap_count(), 1);
        for handle in handles {
            alloc.free(handle);
        }
        for _ in 0..64 {
            alloc.allocate().unwrap();
        }
        assert_eq!(alloc.heap_count(), 1);
    }

    #[test]
    fn test_lifo_reuse() {
        let alloc = allocator(DescriptorHeapKind::Dsv);
        let a = alloc.allocate().unwrap();
        let _b = alloc.allocate().unwrap();
        alloc.free(a);
        assert_eq!(alloc.allocate().unwrap(), a);
    }
}
