//! Resource states consumed by the barrier machinery.

use bitflags::bitflags;

bitflags! {
    /// The state a resource occupies on the GPU timeline.
    ///
    /// States are flags because read states may be combined (see
    /// [`ResourceState::GENERIC_READ`]). `COMMON` and `PRESENT` share the
    /// zero encoding, exactly as in the API this core models.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceState: u32 {
        /// Common / present state.
        const COMMON = 0;
        /// Readable as a vertex or constant buffer.
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        /// Readable as an index buffer.
        const INDEX_BUFFER = 1 << 1;
        /// Writable as a render target.
        const RENDER_TARGET = 1 << 2;
        /// Read/write through unordered access views.
        const UNORDERED_ACCESS = 1 << 3;
        /// Writable as a depth target.
        const DEPTH_WRITE = 1 << 4;
        /// Readable as a depth target.
        const DEPTH_READ = 1 << 5;
        /// Readable from non-pixel shader stages.
        const NON_PIXEL_SHADER_RESOURCE = 1 << 6;
        /// Readable from the pixel shader stage.
        const PIXEL_SHADER_RESOURCE = 1 << 7;
        /// Readable as indirect draw/dispatch arguments.
        const INDIRECT_ARGUMENT = 1 << 9;
        /// Writable as a copy destination.
        const COPY_DEST = 1 << 10;
        /// Readable as a copy source.
        const COPY_SOURCE = 1 << 11;
        /// The union of every read state; the required (and permanent)
        /// state of upload-heap resources.
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits();
        /// Alias of `COMMON`: the state back buffers occupy around `Present`.
        const PRESENT = 0;
    }
}
