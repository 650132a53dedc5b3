//! Pixel formats and the per-format tables the core relies on.

/// Pixel formats understood by the core.
///
/// The set mirrors the formats the submission core itself needs to reason
/// about: render-target and swap-chain formats, depth formats together with
/// the color formats their depth planes alias as, and the formats whose
/// typed UAV loads are conditional on adapter support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// Unspecified format.
    #[default]
    Unknown,
    /// 8-bit single channel, normalized.
    R8Unorm,
    /// 8-bit two channel, normalized.
    Rg8Unorm,
    /// 8-bit RGBA, normalized.
    Rgba8Unorm,
    /// 8-bit BGRA, normalized.
    Bgra8Unorm,
    /// 16-bit single channel, normalized.
    R16Unorm,
    /// 16-bit single channel float.
    R16Float,
    /// 16-bit two channel float.
    Rg16Float,
    /// 16-bit RGBA float.
    Rgba16Float,
    /// 32-bit single channel unsigned integer.
    R32Uint,
    /// 32-bit single channel float.
    R32Float,
    /// 32-bit two channel float.
    Rg32Float,
    /// 32-bit RGBA float.
    Rgba32Float,
    /// 24-bit normalized red with 8 unused bits; the color alias of
    /// [`PixelFormat::D24UnormS8Uint`]'s depth plane.
    R24UnormX8,
    /// 32-bit float red with 32 unused bits; the color alias of
    /// [`PixelFormat::D32FloatS8Uint`]'s depth plane.
    R32FloatX8X24,
    /// 16-bit normalized depth.
    D16Unorm,
    /// 24-bit normalized depth with 8-bit stencil.
    D24UnormS8Uint,
    /// 32-bit float depth.
    D32Float,
    /// 32-bit float depth with 8-bit stencil.
    D32FloatS8Uint,
}

impl PixelFormat {
    /// Bytes per pixel for linear storage of this format.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::R8Unorm => 1,
            Self::Rg8Unorm | Self::D16Unorm | Self::R16Unorm | Self::R16Float => 2,
            Self::Rgba8Unorm
            | Self::Bgra8Unorm
            | Self::Rg16Float
            | Self::R32Uint
            | Self::R32Float
            | Self::D32Float
            | Self::D24UnormS8Uint
            | Self::R24UnormX8 => 4,
            Self::Rgba16Float
            | Self::Rg32Float
            | Self::D32FloatS8Uint
            | Self::R32FloatX8X24 => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Whether this format describes a depth (or depth-stencil) target.
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Self::D16Unorm | Self::D24UnormS8Uint | Self::D32Float | Self::D32FloatS8Uint
        )
    }

    /// The color format a depth buffer's depth plane is sampled as.
    ///
    /// This mapping is part of the contract between `DepthBuffer` and its
    /// shader resource view: the SRV aliases the depth plane with the typed
    /// format remapped to the matching single-channel color format.
    pub fn depth_srv_format(self) -> Option<PixelFormat> {
        match self {
            Self::D16Unorm => Some(Self::R16Unorm),
            Self::D24UnormS8Uint => Some(Self::R24UnormX8),
            Self::D32Float => Some(Self::R32Float),
            Self::D32FloatS8Uint => Some(Self::R32FloatX8X24),
            _ => None,
        }
    }

    /// Formats for which typed UAV loads are unconditionally supported.
    pub fn uav_load_always_supported(self) -> bool {
        matches!(self, Self::R32Float | Self::R32Uint)
    }

    /// Formats for which typed UAV loads are supported only when the
    /// adapter reports the typed-UAV-load capability bit.
    pub fn uav_load_needs_capability(self) -> bool {
        matches!(
            self,
            Self::Rgba8Unorm
                | Self::Bgra8Unorm
                | Self::R8Unorm
                | Self::Rg8Unorm
                | Self::R16Float
                | Self::Rg16Float
                | Self::Rgba16Float
                | Self::Rg32Float
                | Self::Rgba32Float
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_srv_mapping() {
        assert_eq!(
            PixelFormat::D32Float.depth_srv_format(),
            Some(PixelFormat::R32Float)
        );
        assert_eq!(
            PixelFormat::D16Unorm.depth_srv_format(),
            Some(PixelFormat::R16Unorm)
        );
        assert_eq!(
            PixelFormat::D24UnormS8Uint.depth_srv_format(),
            Some(PixelFormat::R24UnormX8)
        );
        assert_eq!(
            PixelFormat::D32FloatS8Uint.depth_srv_format(),
            Some(PixelFormat::R32FloatX8X24)
        );
        assert_eq!(PixelFormat::Rgba8Unorm.depth_srv_format(), None);
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(PixelFormat::Rgba8Unorm.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgba16Float.bytes_per_pixel(), 8);
        assert_eq!(PixelFormat::Rgba32Float.bytes_per_pixel(), 16);
        assert_eq!(PixelFormat::D32Float.bytes_per_pixel(), 4);
    }

    #[test]
    fn test_depth_classification() {
        assert!(PixelFormat::D32Float.is_depth());
        assert!(PixelFormat::D24UnormS8Uint.is_depth());
        assert!(!PixelFormat::R32Float.is_depth());
    }
}
