//! The GPU timeline: monotonic sync points over a fence.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{RawFence, RawQueue};

/// A point on the GPU timeline.
///
/// Acquired from [`GpuTimeline::acquire`]; the point is *reached* once the
/// GPU has completed every piece of work submitted before it was acquired.
/// Sync points order totally: a later acquire always compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SyncPoint(pub(crate) u64);

impl SyncPoint {
    /// The point before all work; always reached.
    pub const ZERO: SyncPoint = SyncPoint(0);

    /// The raw fence value behind this point.
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Monotonic sync-point counter backed by the direct queue's fence.
///
/// # Thread Safety
///
/// All operations are safe from any thread; `acquire` is atomic and the
/// fence wait uses a shared condvar.
pub struct GpuTimeline {
    queue: Arc<RawQueue>,
    fence: RawFence,
    next: Mutex<u64>,
}

impl GpuTimeline {
    pub(crate) fn new(queue: Arc<RawQueue>, fence: RawFence) -> Self {
        Self {
            queue,
            fence,
            next: Mutex::new(0),
        }
    }

    /// Acquire the next sync point and schedule its fence signal after all
    /// work submitted so far. Strictly monotonic.
    pub fn acquire(&self) -> SyncPoint {
        // The increment and the signal enqueue must be one step: two
        // acquires racing between them would enqueue their signals out of
        // order and the fence would regress.
        let mut next = self.next.lock();
        *next += 1;
        self.queue.signal(&self.fence, *next);
        SyncPoint(*next)
    }

    /// Whether the GPU has passed `point`.
    pub fn reached(&self, point: SyncPoint) -> bool {
        point.0 <= self.fence.completed_value()
    }

    /// Block until the GPU passes `point`.
    pub fn wait(&self, point: SyncPoint) {
        if !self.reached(point) {
            self.fence.wait(point.0);
        }
    }

    /// Drain the timeline: acquire a fresh point and wait for it.
    ///
    /// Used at shutdown and before destructive reconfiguration such as a
    /// swap chain resize.
    pub fn sync(&self) {
        self.wait(self.acquire());
    }
}

impl std::fmt::Debug for GpuTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuTimeline")
            .field("next", &*self.next.lock())
            .field("completed", &self.fence.completed_value())
            .finish()
    }
}
