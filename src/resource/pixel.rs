//! Color and depth render targets.

use std::sync::Arc;

use crate::backend::{
    DsvDesc, RawResource, ResourceDesc, ResourceFlags, RtvDesc, SrvDesc, SrvDimension, UavDesc,
    UavDimension,
};
use crate::descriptor::{DepthStencilView, RenderTargetView, ShaderResourceView, UnorderedAccessView};
use crate::device::Device;
use crate::error::{GpuError, GpuResult, E_INVALIDARG};
use crate::resource::{AsGpuResource, GpuResource};
use crate::types::{PixelFormat, ResourceState};

/// The dimensioned core shared by every pixel-addressed resource.
pub struct PixelBuffer {
    resource: GpuResource,
    width: u32,
    height: u32,
    array_size: u32,
    mip_levels: u32,
    sample_count: u32,
    format: PixelFormat,
}

impl PixelBuffer {
    pub(crate) fn create(
        device: &Arc<Device>,
        width: u32,
        height: u32,
        array_size: u32,
        mip_levels: u32,
        sample_count: u32,
        format: PixelFormat,
        flags: ResourceFlags,
        initial_state: ResourceState,
        label: Option<&str>,
    ) -> GpuResult<Self> {
        let mut desc = ResourceDesc::texture_2d(width, height, format)
            .with_texture_layout(array_size, mip_levels, sample_count)
            .with_flags(flags);
        if let Some(label) = label {
            desc = desc.with_label(label);
        }
        let raw = device.raw().create_committed_resource(desc, initial_state)?;
        Ok(Self::adopt(
            raw,
            width,
            height,
            array_size,
            mip_levels,
            sample_count,
            format,
            initial_state,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn adopt(
        raw: RawResource,
        width: u32,
        height: u32,
        array_size: u32,
        mip_levels: u32,
        sample_count: u32,
        format: PixelFormat,
        initial_state: ResourceState,
    ) -> Self {
        Self {
            resource: GpuResource::new(raw, initial_state),
            width,
            height,
            array_size,
            mip_levels,
            sample_count,
            format,
        }
    }

    /// Width in pixels of mip 0.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels of mip 0.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of array slices.
    pub fn array_size(&self) -> u32 {
        self.array_size
    }

    /// Number of mip levels.
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Samples per pixel.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Pixel format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The state-tracked resource core.
    pub fn resource(&self) -> &GpuResource {
        &self.resource
    }
}

/// Description of a [`ColorBuffer`].
#[derive(Debug, Clone)]
pub struct ColorBufferDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: PixelFormat,
    /// Samples per pixel.
    pub sample_count: u32,
    /// Default clear color.
    pub clear_color: [f32; 4],
    /// Debug label.
    pub label: Option<String>,
}

impl ColorBufferDesc {
    /// Describe a single-sampled color target.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            sample_count: 1,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            label: None,
        }
    }

    /// Set the sample count.
    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count.max(1);
        self
    }

    /// Set the default clear color.
    pub fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A color render target with its RTV, SRV and (when single-sampled) UAV.
pub struct ColorBuffer {
    pixels: PixelBuffer,
    clear_color: [f32; 4],
    rtv: RenderTargetView,
    srv: Option<ShaderResourceView>,
    uav: Option<UnorderedAccessView>,
}

impl ColorBuffer {
    /// Create a color target; the UAV exists iff `sample_count == 1`.
    pub fn new(device: &Arc<Device>, desc: &ColorBufferDesc) -> GpuResult<Self> {
        let mut flags = ResourceFlags::ALLOW_RENDER_TARGET;
        if desc.sample_count == 1 {
            flags |= ResourceFlags::ALLOW_UNORDERED_ACCESS;
        }
        let pixels = PixelBuffer::create(
            device,
            desc.width,
            desc.height,
            1,
            1,
            desc.sample_count,
            desc.format,
            flags,
            ResourceState::COMMON,
            desc.label.as_deref(),
        )?;
        let raw = pixels.resource().raw().clone();

        let rtv = RenderTargetView::new(
            device,
            RtvDesc {
                resource: raw.clone(),
                format: desc.format,
                mip: 0,
            },
        )?;
        let srv = Some(ShaderResourceView::new(
            device,
            SrvDesc {
                resource: raw.clone(),
                format: desc.format,
                dimension: SrvDimension::Texture2D,
                mip_levels: 1,
            },
        )?);
        let uav = if desc.sample_count == 1 {
            Some(UnorderedAccessView::new(
                device,
                UavDesc {
                    resource: raw,
                    format: desc.format,
                    dimension: UavDimension::Texture2D { mip: 0 },
                },
            )?)
        } else {
            None
        };

        Ok(Self {
            pixels,
            clear_color: desc.clear_color,
            rtv,
            srv,
            uav,
        })
    }

    /// Adopt a swap-chain back buffer: only the RTV is created and the
    /// tracked state starts at PRESENT.
    pub(crate) fn from_swap_chain(
        device: &Arc<Device>,
        raw: RawResource,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> GpuResult<Self> {
        let rtv = RenderTargetView::new(
            device,
            RtvDesc {
                resource: raw.clone(),
                format,
                mip: 0,
            },
        )?;
        Ok(Self {
            pixels: PixelBuffer::adopt(raw, width, height, 1, 1, 1, format, ResourceState::PRESENT),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            rtv,
            srv: None,
            uav: None,
        })
    }

    /// The pixel core: dimensions and format.
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// The default clear color.
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// The render target view.
    pub fn rtv(&self) -> &RenderTargetView {
        &self.rtv
    }

    /// The shader resource view; absent on adopted back buffers.
    pub fn srv(&self) -> Option<&ShaderResourceView> {
        self.srv.as_ref()
    }

    /// The unordered access view; present iff single-sampled.
    pub fn uav(&self) -> Option<&UnorderedAccessView> {
        self.uav.as_ref()
    }

    /// Whether the buffer carries a UAV.
    pub fn has_uav(&self) -> bool {
        self.uav.is_some()
    }
}

impl AsGpuResource for ColorBuffer {
    fn resource(&self) -> &GpuResource {
        self.pixels.resource()
    }
}

/// Description of a [`DepthBuffer`].
#[derive(Debug, Clone)]
pub struct DepthBufferDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth (or depth-stencil) format.
    pub format: PixelFormat,
    /// Samples per pixel.
    pub sample_count: u32,
    /// Default clear depth.
    pub clear_depth: f32,
    /// Default clear stencil.
    pub clear_stencil: u8,
    /// Debug label.
    pub label: Option<String>,
}

impl DepthBufferDesc {
    /// Describe a single-sampled depth target clearing to 1.0.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            sample_count: 1,
            clear_depth: 1.0,
            clear_stencil: 0,
            label: None,
        }
    }

    /// Set the sample count.
    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count.max(1);
        self
    }

    /// Set the default clear values.
    pub fn with_clear(mut self, depth: f32, stencil: u8) -> Self {
        self.clear_depth = depth;
        self.clear_stencil = stencil;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A depth target with writable and read-only DSVs plus a depth-plane SRV.
pub struct DepthBuffer {
    pixels: PixelBuffer,
    clear_depth: f32,
    clear_stencil: u8,
    dsv: DepthStencilView,
    read_only_dsv: DepthStencilView,
    srv: ShaderResourceView,
    uav: Option<UnorderedAccessView>,
}

impl DepthBuffer {
    /// Create a depth target. The SRV aliases the depth plane through the
    /// fixed depth-to-color format remap; the UAV exists only for
    /// single-sampled `D32Float`.
    pub fn new(device: &Arc<Device>, desc: &DepthBufferDesc) -> GpuResult<Self> {
        let srv_format = desc.format.depth_srv_format().ok_or_else(|| {
            GpuError::backend(
                E_INVALIDARG,
                format!("{:?} is not a depth format", desc.format),
            )
        })?;
        let has_uav = desc.sample_count == 1 && desc.format == PixelFormat::D32Float;

        let mut flags = ResourceFlags::ALLOW_DEPTH_STENCIL;
        if has_uav {
            flags |= ResourceFlags::ALLOW_UNORDERED_ACCESS;
        }
        let pixels = PixelBuffer::create(
            device,
            desc.width,
            desc.height,
            1,
            1,
            desc.sample_count,
            desc.format,
            flags,
            ResourceState::COMMON,
            desc.label.as_deref(),
        )?;
        let raw = pixels.resource().raw().clone();

        let dsv = DepthStencilView::new(
            device,
            DsvDesc {
                resource: raw.clone(),
                format: desc.format,
                read_only: false,
            },
        )?;
        let read_only_dsv = DepthStencilView::new(
            device,
            DsvDesc {
                resource: raw.clone(),
                format: desc.format,
                read_only: true,
            },
        )?;
        let srv = ShaderResourceView::new(
            device,
            SrvDesc {
                resource: raw.clone(),
                format: srv_format,
                dimension: SrvDimension::Texture2D,
                mip_levels: 1,
            },
        )?;
        let uav = if has_uav {
            Some(UnorderedAccessView::new(
                device,
                UavDesc {
                    resource: raw,
                    format: PixelFormat::R32Float,
                    dimension: UavDimension::Texture2D { mip: 0 },
                },
            )?)
        } else {
            None
        };

        Ok(Self {
            pixels,
            clear_depth: desc.clear_depth,
            clear_stencil: desc.clear_stencil,
            dsv,
            read_only_dsv,
            srv,
            uav,
        })
    }

    /// The pixel core: dimensions and format.
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// The default clear depth.
    pub fn clear_depth(&self) -> f32 {
        self.clear_depth
    }

    /// The default clear stencil.
    pub fn clear_stencil(&self) -> u8 {
        self.clear_stencil
    }

    /// The writable depth stencil view.
    pub fn dsv(&self) -> &DepthStencilView {
        &self.dsv
    }

    /// The read-only depth stencil view.
    pub fn read_only_dsv(&self) -> &DepthStencilView {
        &self.read_only_dsv
    }

    /// The depth-plane SRV with the remapped color format.
    pub fn srv(&self) -> &ShaderResourceView {
        &self.srv
    }

    /// The depth UAV; present only for single-sampled `D32Float`.
    pub fn uav(&self) -> Option<&UnorderedAccessView> {
        self.uav.as_ref()
    }
}

impl AsGpuResource for DepthBuffer {
    fn resource(&self) -> &GpuResource {
        self.pixels.resource()
    }
}
