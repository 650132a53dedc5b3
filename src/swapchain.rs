//! Presentable surfaces.
//!
//! A [`SwapChain`] wraps the raw flip-discard chain and adopts each back
//! buffer as a [`ColorBuffer`] the recorder can render into. Every present
//! tags the outgoing buffer with a sync point; re-acquiring that buffer
//! waits on its sync point first, so a frame never records into memory the
//! GPU is still presenting. With 2 or 3 buffers in flight the wait is the
//! natural frame pacing.

use std::sync::Arc;

use raw_window_handle::RawWindowHandle;

use crate::backend::RawSwapChain;
use crate::device::Device;
use crate::error::GpuResult;
use crate::resource::ColorBuffer;
use crate::timeline::SyncPoint;
use crate::types::PixelFormat;

/// Description of a [`SwapChain`].
#[derive(Debug, Clone)]
pub struct SwapChainDesc {
    /// Back buffer width in pixels.
    pub width: u32,
    /// Back buffer height in pixels.
    pub height: u32,
    /// Requested back buffer count; clamped to 2..=3.
    pub num_buffers: u32,
    /// Back buffer format.
    pub format: PixelFormat,
    /// Present with tearing allowed (vsync off).
    pub allow_tearing: bool,
}

impl SwapChainDesc {
    /// Describe a double-buffered chain.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            num_buffers: 2,
            format,
            allow_tearing: false,
        }
    }

    /// Request a back buffer count; values outside 2..=3 are clamped.
    pub fn with_num_buffers(mut self, num_buffers: u32) -> Self {
        self.num_buffers = num_buffers.clamp(2, 3);
        self
    }

    /// Allow tearing presents.
    pub fn with_tearing(mut self) -> Self {
        self.allow_tearing = true;
        self
    }
}

/// A presentable chain of back buffers paced by sync points.
pub struct SwapChain {
    device: Arc<Device>,
    raw: RawSwapChain,
    buffers: Vec<ColorBuffer>,
    /// Sync point of the present that last used each buffer.
    present_sync_points: Vec<SyncPoint>,
    current_index: u32,
    allow_tearing: bool,
}

impl SwapChain {
    /// Create a swap chain; `window` is `None` for headless operation.
    ///
    /// # Errors
    ///
    /// Propagates zero-sized surfaces and back buffer creation failures.
    pub fn new(
        device: &Arc<Device>,
        window: Option<RawWindowHandle>,
        desc: &SwapChainDesc,
    ) -> GpuResult<Self> {
        let num_buffers = desc.num_buffers.clamp(2, 3);
        let raw = device.raw().create_swap_chain(
            window,
            desc.width,
            desc.height,
            num_buffers,
            desc.format,
        )?;
        let buffers = adopt_buffers(device, &raw)?;
        let count = buffers.len();
        Ok(Self {
            device: device.clone(),
            raw,
            buffers,
            present_sync_points: vec![SyncPoint::ZERO; count],
            current_index: 0,
            allow_tearing: desc.allow_tearing && device.raw().supports_tearing(),
        })
    }

    /// Back buffer format.
    pub fn format(&self) -> PixelFormat {
        self.raw.format()
    }

    /// Current back buffer dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        self.raw.dimensions()
    }

    /// Number of back buffers.
    pub fn buffer_count(&self) -> u32 {
        self.buffers.len() as u32
    }

    /// Index of the buffer the next frame renders into.
    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    /// The buffer the next frame renders into, after waiting out the
    /// present that last used it.
    ///
    /// The recorder must transition it to `PRESENT` before [`present`]
    /// hands it to the queue.
    ///
    /// [`present`]: SwapChain::present
    pub fn current_back_buffer(&self) -> &ColorBuffer {
        self.device
            .wait(self.present_sync_points[self.current_index as usize]);
        &self.buffers[self.current_index as usize]
    }

    /// Present the current back buffer and advance to the next.
    ///
    /// Returns the present's sync point. A failed raw present is logged
    /// and the chain still advances, keeping frame pacing alive.
    pub fn present(&mut self) -> SyncPoint {
        let index = self.current_index as usize;
        if let Err(err) = self.raw.present(self.device.queue(), self.allow_tearing) {
            log::warn!("present failed: {err}");
        }
        let sync = self.device.acquire_sync_point();
        self.present_sync_points[index] = sync;
        self.current_index = (self.current_index + 1) % self.buffers.len() as u32;
        sync
    }

    /// Resize the back buffers, draining the GPU first.
    ///
    /// All adopted buffers are dropped and recreated; sync points reset,
    /// so no frame blocks on presents of the old surface.
    ///
    /// # Errors
    ///
    /// Propagates zero-sized surfaces and back buffer creation failures.
    pub fn resize(&mut self, width: u32, height: u32) -> GpuResult<()> {
        self.device.sync();
        // Old adopted buffers must die before the raw chain recreates.
        self.buffers.clear();
        self.raw.resize(width, height)?;
        self.buffers = adopt_buffers(&self.device, &self.raw)?;
        self.present_sync_points = vec![SyncPoint::ZERO; self.buffers.len()];
        self.current_index = 0;
        Ok(())
    }
}

fn adopt_buffers(device: &Arc<Device>, raw: &RawSwapChain) -> GpuResult<Vec<ColorBuffer>> {
    let (width, height) = raw.dimensions();
    (0..raw.buffer_count())
        .map(|i| ColorBuffer::from_swap_chain(device, raw.buffer(i), width, height, raw.format()))
        .collect()
}

impl std::fmt::Debug for SwapChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapChain")
            .field("raw", &self.raw)
            .field("current_index", &self.current_index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceDesc;
    use crate::types::ResourceState;

    fn chain(device: &Arc<Device>, num_buffers: u32) -> SwapChain {
        let desc =
            SwapChainDesc::new(64, 64, PixelFormat::Rgba8Unorm).with_num_buffers(num_buffers);
        SwapChain::new(device, None, &desc).unwrap()
    }

    #[test]
    fn test_buffer_count_is_clamped() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        assert_eq!(chain(&device, 1).buffer_count(), 2);
        assert_eq!(chain(&device, 5).buffer_count(), 3);
    }

    #[test]
    fn test_present_rotates_buffers() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut chain = chain(&device, 2);
        assert_eq!(chain.current_index(), 0);
        let first = chain.present();
        assert_eq!(chain.current_index(), 1);
        let second = chain.present();
        assert_eq!(chain.current_index(), 0);
        assert!(first < second);
    }

    #[test]
    fn test_adopted_buffers_start_in_present_state() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let chain = chain(&device, 2);
        let buffer = chain.current_back_buffer();
        assert_eq!(
            crate::resource::AsGpuResource::resource(buffer).current_state(),
            ResourceState::PRESENT
        );
    }

    #[test]
    fn test_resize_resets_pacing() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut chain = chain(&device, 2);
        chain.present();
        chain.present();
        chain.resize(128, 32).unwrap();
        assert_eq!(chain.dimensions(), (128, 32));
        assert_eq!(chain.current_index(), 0);
        // Fresh buffers carry no pending present; acquisition cannot block.
        let _ = chain.current_back_buffer();
    }
}
