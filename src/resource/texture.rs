//! Sampled textures.

use std::sync::Arc;

use crate::backend::{ResourceFlags, SrvDesc, SrvDimension};
use crate::descriptor::ShaderResourceView;
use crate::device::Device;
use crate::error::GpuResult;
use crate::resource::pixel::PixelBuffer;
use crate::resource::{AsGpuResource, GpuResource};
use crate::types::{PixelFormat, ResourceState};

/// Description of a [`Texture`].
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Width in pixels of mip 0.
    pub width: u32,
    /// Height in pixels of mip 0.
    pub height: u32,
    /// Number of array slices.
    pub array_size: u32,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Pixel format.
    pub format: PixelFormat,
    /// Request a cube view; honored only when `array_size % 6 == 0`.
    pub is_cube: bool,
    /// Debug label.
    pub label: Option<String>,
}

impl TextureDesc {
    /// Describe a single 2D texture.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            array_size: 1,
            mip_levels: 1,
            format,
            is_cube: false,
            label: None,
        }
    }

    /// Set the array size.
    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size.max(1);
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }

    /// Request a cube view.
    pub fn as_cube(mut self) -> Self {
        self.is_cube = true;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A sampled texture with its SRV.
pub struct Texture {
    pixels: PixelBuffer,
    srv: ShaderResourceView,
    srv_is_cube: bool,
}

impl Texture {
    /// Create a texture. The SRV is a cube view iff the cube flag is set
    /// and the array size is a multiple of 6 (a cube array above 6).
    pub fn new(device: &Arc<Device>, desc: &TextureDesc) -> GpuResult<Self> {
        let pixels = PixelBuffer::create(
            device,
            desc.width,
            desc.height,
            desc.array_size,
            desc.mip_levels,
            1,
            desc.format,
            ResourceFlags::empty(),
            ResourceState::COMMON,
            desc.label.as_deref(),
        )?;

        let cube = desc.is_cube && desc.array_size % 6 == 0;
        let dimension = if cube {
            if desc.array_size > 6 {
                SrvDimension::TextureCubeArray {
                    cube_count: desc.array_size / 6,
                }
            } else {
                SrvDimension::TextureCube
            }
        } else if desc.array_size > 1 {
            SrvDimension::Texture2DArray {
                array_size: desc.array_size,
            }
        } else {
            SrvDimension::Texture2D
        };
        let srv = ShaderResourceView::new(
            device,
            SrvDesc {
                resource: pixels.resource().raw().clone(),
                format: desc.format,
                dimension,
                mip_levels: desc.mip_levels,
            },
        )?;

        Ok(Self {
            pixels,
            srv,
            srv_is_cube: cube,
        })
    }

    /// The pixel core: dimensions and format.
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// The shader resource view.
    pub fn srv(&self) -> &ShaderResourceView {
        &self.srv
    }

    /// Whether the SRV is a cube (or cube-array) view.
    pub fn srv_is_cube(&self) -> bool {
        self.srv_is_cube
    }
}

impl AsGpuResource for Texture {
    fn resource(&self) -> &GpuResource {
        self.pixels.resource()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceDesc, RawDescriptor};
    use rstest::rstest;

    #[rstest]
    #[case(1, false, false)]
    #[case(6, false, false)]
    #[case(6, true, true)]
    #[case(12, true, true)]
    #[case(5, true, false)]
    fn test_cube_srv_rule(#[case] array_size: u32, #[case] is_cube: bool, #[case] expect: bool) {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let mut desc = TextureDesc::new(16, 16, PixelFormat::Rgba8Unorm).with_array_size(array_size);
        if is_cube {
            desc = desc.as_cube();
        }
        let texture = Texture::new(&device, &desc).unwrap();
        assert_eq!(texture.srv_is_cube(), expect);
    }

    #[test]
    fn test_cube_array_dimension() {
        let device = Device::new(DeviceDesc::default()).unwrap();
        let desc = TextureDesc::new(16, 16, PixelFormat::Rgba8Unorm)
            .with_array_size(12)
            .as_cube();
        let texture = Texture::new(&device, &desc).unwrap();
        match device.raw().read_descriptor(texture.srv().handle()) {
            RawDescriptor::ShaderResource(srv) => {
                assert_eq!(
                    srv.dimension,
                    crate::backend::SrvDimension::TextureCubeArray { cube_count: 2 }
                );
            }
            other => panic!("expected an SRV descriptor, got {other:?}"),
        }
    }
}
