//! GPU resources and the state tracking the recorder relies on.

mod buffer;
mod pixel;
mod texture;

pub use buffer::{GpuBuffer, StructuredBuffer};
pub use pixel::{ColorBuffer, ColorBufferDesc, DepthBuffer, DepthBufferDesc, PixelBuffer};
pub use texture::{Texture, TextureDesc};

use std::sync::atomic::{AtomicU32, Ordering};

use crate::backend::RawResource;
use crate::types::ResourceState;

/// A raw resource paired with the state it was last transitioned into.
///
/// The recorder is the single writer of `current_state`; it compares against
/// it to elide redundant barriers and records the before-state of every
/// transition it emits.
pub struct GpuResource {
    raw: RawResource,
    state: AtomicU32,
}

impl GpuResource {
    pub(crate) fn new(raw: RawResource, initial_state: ResourceState) -> Self {
        Self {
            raw,
            state: AtomicU32::new(initial_state.bits()),
        }
    }

    /// The underlying resource.
    pub fn raw(&self) -> &RawResource {
        &self.raw
    }

    /// The state the resource was last transitioned into.
    pub fn current_state(&self) -> ResourceState {
        ResourceState::from_bits_truncate(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_current_state(&self, state: ResourceState) {
        self.state.store(state.bits(), Ordering::Release);
    }

    /// Total size of the resource in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        self.raw.size_in_bytes()
    }

    /// Read the full resource contents back.
    ///
    /// Callers must wait on the sync point of the submit that last wrote
    /// the resource before the bytes are meaningful.
    pub fn read_back(&self) -> Vec<u8> {
        self.raw.read(0, self.raw.size_in_bytes())
    }

    /// Read a byte range back; see [`GpuResource::read_back`].
    pub fn read_back_range(&self, offset: u64, len: u64) -> Vec<u8> {
        self.raw.read(offset, len)
    }
}

impl std::fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuResource")
            .field("raw", &self.raw)
            .field("state", &self.current_state())
            .finish()
    }
}

/// Anything the recorder can transition, copy and bind.
pub trait AsGpuResource {
    /// The state-tracked resource core.
    fn resource(&self) -> &GpuResource;
}

impl AsGpuResource for GpuResource {
    fn resource(&self) -> &GpuResource {
        self
    }
}
