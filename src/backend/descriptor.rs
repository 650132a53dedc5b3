//! Descriptor heaps and the descriptors written into them.
//!
//! Heaps hand out contiguous handle ranges from a device-wide address space,
//! so handle arithmetic (base + index * increment) behaves exactly like the
//! API being modeled. A [`DescriptorRegistry`] resolves a handle back to the
//! heap slot it addresses, which is how clears and descriptor copies read the
//! descriptor contents behind an opaque handle.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::resource::RawResource;
use super::{CpuDescriptorHandle, DescriptorHeapKind, GpuDescriptorHandle};
use crate::types::PixelFormat;

/// Texture filtering mode of a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest-neighbor filtering.
    Nearest,
    /// Linear filtering.
    #[default]
    Linear,
}

/// Texture addressing mode of a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Clamp to edge.
    #[default]
    Clamp,
    /// Repeat.
    Repeat,
    /// Mirrored repeat.
    Mirror,
    /// Border color.
    Border,
}

/// Description of a sampler descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    /// Filtering mode.
    pub filter: FilterMode,
    /// Addressing mode, applied to all three coordinates.
    pub address: AddressMode,
    /// Maximum anisotropy; 1 disables anisotropic filtering.
    pub max_anisotropy: u32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: FilterMode::Linear,
            address: AddressMode::Clamp,
            max_anisotropy: 1,
        }
    }
}

/// The shape a shader resource view exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SrvDimension {
    /// Structured or raw buffer view.
    Buffer {
        /// Element stride in bytes.
        element_size: u32,
        /// Number of elements.
        element_count: u32,
    },
    /// 2D texture view.
    Texture2D,
    /// 2D texture array view.
    Texture2DArray {
        /// Number of array slices.
        array_size: u32,
    },
    /// Cube view over six slices.
    TextureCube,
    /// Cube array view.
    TextureCubeArray {
        /// Number of cubes.
        cube_count: u32,
    },
}

/// Description of a shader resource view.
#[derive(Debug, Clone)]
pub struct SrvDesc {
    /// The viewed resource.
    pub resource: RawResource,
    /// Typed format of the view; may remap a depth plane to its color alias.
    pub format: PixelFormat,
    /// View shape.
    pub dimension: SrvDimension,
    /// Number of mip levels exposed.
    pub mip_levels: u32,
}

/// The shape an unordered access view exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UavDimension {
    /// Raw (byte-address) buffer view of 32-bit elements.
    RawBuffer {
        /// Number of 32-bit elements.
        element_count: u32,
    },
    /// Structured buffer view.
    StructuredBuffer {
        /// Element stride in bytes.
        element_size: u32,
        /// Number of elements.
        element_count: u32,
    },
    /// Single mip of a 2D texture.
    Texture2D {
        /// The viewed mip level.
        mip: u32,
    },
}

/// Description of an unordered access view.
#[derive(Debug, Clone)]
pub struct UavDesc {
    /// The viewed resource.
    pub resource: RawResource,
    /// Typed format of the view (`Unknown` for structured/raw buffers).
    pub format: PixelFormat,
    /// View shape.
    pub dimension: UavDimension,
}

/// Description of a render target view.
#[derive(Debug, Clone)]
pub struct RtvDesc {
    /// The viewed resource.
    pub resource: RawResource,
    /// Typed format of the view.
    pub format: PixelFormat,
    /// The viewed mip level.
    pub mip: u32,
}

/// Description of a depth stencil view.
#[derive(Debug, Clone)]
pub struct DsvDesc {
    /// The viewed resource.
    pub resource: RawResource,
    /// Typed depth format of the view.
    pub format: PixelFormat,
    /// Whether the view is read-only (usable while sampling the same depth).
    pub read_only: bool,
}

/// The contents of one descriptor heap slot.
#[derive(Debug, Clone, Default)]
pub enum RawDescriptor {
    /// Unwritten slot.
    #[default]
    Empty,
    /// Constant buffer view.
    ConstantBuffer {
        /// GPU virtual address of the buffer range.
        gpu_address: u64,
        /// Size of the range in bytes (256-aligned).
        size: u32,
    },
    /// Shader resource view.
    ShaderResource(SrvDesc),
    /// Unordered access view.
    UnorderedAccess(UavDesc),
    /// Sampler.
    Sampler(SamplerDesc),
    /// Render target view.
    RenderTarget(RtvDesc),
    /// Depth stencil view.
    DepthStencil(DsvDesc),
}

struct HeapShared {
    kind: DescriptorHeapKind,
    capacity: u32,
    shader_visible: bool,
    base_cpu: u64,
    base_gpu: u64,
    increment: u64,
    slots: Mutex<Vec<RawDescriptor>>,
}

/// A descriptor heap: a slab of descriptor slots with a stable handle range.
#[derive(Clone)]
pub struct RawDescriptorHeap {
    shared: Arc<HeapShared>,
}

impl RawDescriptorHeap {
    pub(crate) fn new(
        kind: DescriptorHeapKind,
        capacity: u32,
        shader_visible: bool,
        base_cpu: u64,
        increment: u64,
    ) -> Self {
        let base_gpu = if shader_visible { base_cpu } else { 0 };
        Self {
            shared: Arc::new(HeapShared {
                kind,
                capacity,
                shader_visible,
                base_cpu,
                base_gpu,
                increment,
                slots: Mutex::new(vec![RawDescriptor::Empty; capacity as usize]),
            }),
        }
    }

    /// The heap kind.
    pub fn kind(&self) -> DescriptorHeapKind {
        self.shared.kind
    }

    /// Number of descriptor slots.
    pub fn capacity(&self) -> u32 {
        self.shared.capacity
    }

    /// Whether shaders can read descriptors from this heap.
    pub fn is_shader_visible(&self) -> bool {
        self.shared.shader_visible
    }

    /// Handle increment between adjacent slots.
    pub fn increment(&self) -> u64 {
        self.shared.increment
    }

    /// CPU handle of slot `index`.
    pub fn cpu_handle(&self, index: u32) -> CpuDescriptorHandle {
        debug_assert!(index < self.shared.capacity);
        CpuDescriptorHandle {
            kind: self.shared.kind,
            ptr: self.shared.base_cpu + index as u64 * self.shared.increment,
        }
    }

    /// GPU handle of slot `index`; only meaningful on shader-visible heaps.
    pub fn gpu_handle(&self, index: u32) -> GpuDescriptorHandle {
        debug_assert!(self.shared.shader_visible);
        debug_assert!(index < self.shared.capacity);
        GpuDescriptorHandle {
            ptr: self.shared.base_gpu + index as u64 * self.shared.increment,
        }
    }

    pub(crate) fn write_slot(&self, index: u32, descriptor: RawDescriptor) {
        let mut slots = self.shared.slots.lock();
        if let Some(slot) = slots.get_mut(index as usize) {
            *slot = descriptor;
        }
    }

    pub(crate) fn read_slot(&self, index: u32) -> RawDescriptor {
        self.shared
            .slots
            .lock()
            .get(index as usize)
            .cloned()
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for RawDescriptorHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDescriptorHeap")
            .field("kind", &self.shared.kind)
            .field("capacity", &self.shared.capacity)
            .field("shader_visible", &self.shared.shader_visible)
            .finish_non_exhaustive()
    }
}

struct HeapRecord {
    base: u64,
    end: u64,
    increment: u64,
    heap: Weak<HeapShared>,
}

/// Resolves descriptor handles back to the heap slot they address.
#[derive(Default)]
pub struct DescriptorRegistry {
    heaps: Mutex<Vec<HeapRecord>>,
}

impl DescriptorRegistry {
    pub(crate) fn register(&self, heap: &RawDescriptorHeap) {
        let mut heaps = self.heaps.lock();
        // Drop records for heaps that have been destroyed.
        heaps.retain(|r| r.heap.strong_count() > 0);
        heaps.push(HeapRecord {
            base: heap.shared.base_cpu,
            end: heap.shared.base_cpu + heap.shared.capacity as u64 * heap.shared.increment,
            increment: heap.shared.increment,
            heap: Arc::downgrade(&heap.shared),
        });
    }

    /// Resolve a CPU handle to its heap and slot index.
    pub fn resolve(&self, handle: CpuDescriptorHandle) -> Option<(RawDescriptorHeap, u32)> {
        if handle.is_null() {
            return None;
        }
        let heaps = self.heaps.lock();
        for record in heaps.iter() {
            if handle.ptr >= record.base && handle.ptr < record.end {
                let shared = record.heap.upgrade()?;
                let index = ((handle.ptr - record.base) / record.increment) as u32;
                return Some((RawDescriptorHeap { shared }, index));
            }
        }
        None
    }

    /// Read the descriptor a CPU handle points at.
    pub fn read(&self, handle: CpuDescriptorHandle) -> RawDescriptor {
        self.resolve(handle)
            .map(|(heap, index)| heap.read_slot(index))
            .unwrap_or_default()
    }
}
