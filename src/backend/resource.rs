//! Committed resources with byte storage and queue-side state tracking.

use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::types::{PixelFormat, ResourceState};

bitflags! {
    /// Creation flags enabling the views a resource may expose.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceFlags: u32 {
        /// The resource may be bound as a render target.
        const ALLOW_RENDER_TARGET = 1 << 0;
        /// The resource may be bound as a depth-stencil target.
        const ALLOW_DEPTH_STENCIL = 1 << 1;
        /// The resource may be accessed through unordered access views.
        const ALLOW_UNORDERED_ACCESS = 1 << 2;
    }
}

/// The memory class a committed resource lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeapKind {
    /// Device-local memory.
    #[default]
    Default,
    /// CPU-writable memory, persistently mapped; permanently GENERIC_READ.
    Upload,
    /// CPU-readable memory; permanently COPY_DEST.
    Readback,
}

/// What a committed resource is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// A linear buffer.
    Buffer {
        /// Size in bytes.
        size: u64,
    },
    /// A 2D texture (or texture array).
    Texture2D {
        /// Width in pixels of mip 0.
        width: u32,
        /// Height in pixels of mip 0.
        height: u32,
        /// Array size (cubes use multiples of 6).
        array_size: u32,
        /// Number of mip levels.
        mip_levels: u32,
        /// Samples per pixel.
        sample_count: u32,
        /// Pixel format.
        format: PixelFormat,
    },
}

/// Description of a committed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDesc {
    /// Buffer or texture shape.
    pub kind: ResourceKind,
    /// Memory class.
    pub heap: HeapKind,
    /// View-enabling flags.
    pub flags: ResourceFlags,
    /// Debug label.
    pub label: Option<String>,
}

impl ResourceDesc {
    /// Describe a device-local buffer.
    pub fn buffer(size: u64) -> Self {
        Self {
            kind: ResourceKind::Buffer { size },
            heap: HeapKind::Default,
            flags: ResourceFlags::empty(),
            label: None,
        }
    }

    /// Describe a 2D texture.
    pub fn texture_2d(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            kind: ResourceKind::Texture2D {
                width,
                height,
                array_size: 1,
                mip_levels: 1,
                sample_count: 1,
                format,
            },
            heap: HeapKind::Default,
            flags: ResourceFlags::empty(),
            label: None,
        }
    }

    /// Set the memory class.
    pub fn with_heap(mut self, heap: HeapKind) -> Self {
        self.heap = heap;
        self
    }

    /// Set view-enabling flags.
    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set array size, mips and sample count on a texture description.
    pub fn with_texture_layout(mut self, array_size: u32, mip_levels: u32, samples: u32) -> Self {
        if let ResourceKind::Texture2D {
            array_size: a,
            mip_levels: m,
            sample_count: s,
            ..
        } = &mut self.kind
        {
            *a = array_size.max(1);
            *m = mip_levels.max(1);
            *s = samples.max(1);
        }
        self
    }

    /// Total byte size of linear storage for this resource.
    pub fn storage_size(&self) -> u64 {
        match &self.kind {
            ResourceKind::Buffer { size } => *size,
            ResourceKind::Texture2D {
                width,
                height,
                array_size,
                mip_levels,
                format,
                ..
            } => slice_storage_size(*width, *height, *mip_levels, *format) * *array_size as u64,
        }
    }
}

fn mip_extent(base: u32, mip: u32) -> u32 {
    (base >> mip).max(1)
}

fn slice_storage_size(width: u32, height: u32, mip_levels: u32, format: PixelFormat) -> u64 {
    let bpp = format.bytes_per_pixel() as u64;
    (0..mip_levels)
        .map(|m| mip_extent(width, m) as u64 * mip_extent(height, m) as u64 * bpp)
        .sum()
}

struct ResourceInner {
    id: u64,
    desc: ResourceDesc,
    gpu_address: u64,
    storage: Mutex<Vec<u8>>,
    /// The state the queue believes the resource to be in; updated as
    /// barriers execute and checked against their before-state.
    tracked_state: Mutex<ResourceState>,
}

/// Handle to a committed resource. Cheap to clone.
#[derive(Clone)]
pub struct RawResource {
    inner: Arc<ResourceInner>,
}

impl RawResource {
    pub(crate) fn new(
        id: u64,
        desc: ResourceDesc,
        gpu_address: u64,
        initial_state: ResourceState,
    ) -> Self {
        let storage = vec![0u8; desc.storage_size() as usize];
        Self {
            inner: Arc::new(ResourceInner {
                id,
                desc,
                gpu_address,
                storage: Mutex::new(storage),
                tracked_state: Mutex::new(initial_state),
            }),
        }
    }

    /// Unique id of the resource within its device.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The creation description.
    pub fn desc(&self) -> &ResourceDesc {
        &self.inner.desc
    }

    /// GPU virtual address (buffers only; textures report 0).
    pub fn gpu_address(&self) -> u64 {
        self.inner.gpu_address
    }

    /// Total storage size in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        self.inner.desc.storage_size()
    }

    /// Byte offset of a texture subresource in linear storage.
    pub fn subresource_offset(&self, mip: u32, slice: u32) -> u64 {
        match &self.inner.desc.kind {
            ResourceKind::Buffer { .. } => 0,
            ResourceKind::Texture2D {
                width,
                height,
                mip_levels,
                format,
                ..
            } => {
                let slice_size = slice_storage_size(*width, *height, *mip_levels, *format);
                let bpp = format.bytes_per_pixel() as u64;
                let within: u64 = (0..mip)
                    .map(|m| mip_extent(*width, m) as u64 * mip_extent(*height, m) as u64 * bpp)
                    .sum();
                slice as u64 * slice_size + within
            }
        }
    }

    /// Width and height of a texture mip.
    pub fn mip_dimensions(&self, mip: u32) -> (u32, u32) {
        match &self.inner.desc.kind {
            ResourceKind::Buffer { .. } => (0, 0),
            ResourceKind::Texture2D { width, height, .. } => {
                (mip_extent(*width, mip), mip_extent(*height, mip))
            }
        }
    }

    /// Write bytes into storage (the software mapping).
    pub fn write(&self, offset: u64, data: &[u8]) {
        let mut storage = self.inner.storage.lock();
        let offset = offset as usize;
        let end = offset + data.len();
        debug_assert!(end <= storage.len(), "write past end of resource storage");
        if end <= storage.len() {
            storage[offset..end].copy_from_slice(data);
        }
    }

    /// Read bytes back from storage.
    pub fn read(&self, offset: u64, len: u64) -> Vec<u8> {
        let storage = self.inner.storage.lock();
        let offset = offset as usize;
        let end = (offset + len as usize).min(storage.len());
        storage[offset.min(storage.len())..end].to_vec()
    }

    pub(crate) fn with_storage<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        f(&mut self.inner.storage.lock())
    }

    pub(crate) fn tracked_state(&self) -> ResourceState {
        *self.inner.tracked_state.lock()
    }

    pub(crate) fn set_tracked_state(&self, state: ResourceState) {
        *self.inner.tracked_state.lock() = state;
    }
}

impl std::fmt::Debug for RawResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResource")
            .field("id", &self.inner.id)
            .field("label", &self.inner.desc.label)
            .field("kind", &self.inner.desc.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_storage_layout() {
        let desc = ResourceDesc::texture_2d(8, 4, PixelFormat::Rgba8Unorm)
            .with_texture_layout(2, 3, 1);
        // Per slice: 8*4 + 4*2 + 2*1 = 42 pixels, 4 bytes each.
        assert_eq!(desc.storage_size(), 42 * 4 * 2);

        let res = RawResource::new(1, desc, 0, ResourceState::COMMON);
        assert_eq!(res.subresource_offset(0, 0), 0);
        assert_eq!(res.subresource_offset(1, 0), 8 * 4 * 4);
        assert_eq!(res.subresource_offset(0, 1), 42 * 4);
        assert_eq!(res.mip_dimensions(2), (2, 1));
    }

    #[test]
    fn test_buffer_read_write_roundtrip() {
        let res = RawResource::new(
            1,
            ResourceDesc::buffer(256),
            0x1_0000,
            ResourceState::GENERIC_READ,
        );
        res.write(16, &[1, 2, 3, 4]);
        assert_eq!(res.read(16, 4), vec![1, 2, 3, 4]);
        assert_eq!(res.gpu_address(), 0x1_0000);
    }
}
