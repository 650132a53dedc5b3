//! Pipeline state objects.
//!
//! Shader compilation is a collaborator: callers hand in compiled byte
//! blobs, and the core's only obligation is to bind whatever was built.

use crate::backend::{PipelineKind, RawPipelineState};
use crate::device::Device;
use crate::error::{GpuError, GpuResult, E_INVALIDARG};
use crate::types::{PixelFormat, PrimitiveTopology};

/// Most color targets a graphics pipeline may write.
pub const MAX_RENDER_TARGETS: usize = 8;

/// Description of a graphics pipeline.
#[derive(Debug, Clone, Default)]
pub struct GraphicsPipelineDesc {
    /// Compiled vertex shader blob.
    pub vertex_shader: Vec<u8>,
    /// Compiled pixel shader blob.
    pub pixel_shader: Vec<u8>,
    /// Formats of the bound color targets, in slot order.
    pub render_target_formats: Vec<PixelFormat>,
    /// Depth target format, if depth is bound.
    pub depth_format: Option<PixelFormat>,
    /// Primitive topology class.
    pub topology: PrimitiveTopology,
    /// Whether depth testing is enabled.
    pub depth_test: bool,
    /// Whether back faces are culled.
    pub cull_backfaces: bool,
    /// Debug label.
    pub label: Option<String>,
}

impl GraphicsPipelineDesc {
    /// Describe a pipeline from compiled shader blobs.
    pub fn new(vertex_shader: Vec<u8>, pixel_shader: Vec<u8>) -> Self {
        Self {
            vertex_shader,
            pixel_shader,
            ..Self::default()
        }
    }

    /// Append a color target format.
    pub fn with_render_target(mut self, format: PixelFormat) -> Self {
        self.render_target_formats.push(format);
        self
    }

    /// Set the depth target format.
    pub fn with_depth(mut self, format: PixelFormat) -> Self {
        self.depth_format = Some(format);
        self.depth_test = true;
        self
    }

    /// Set the topology class.
    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Enable back-face culling.
    pub fn with_backface_culling(mut self) -> Self {
        self.cull_backfaces = true;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Description of a compute pipeline.
#[derive(Debug, Clone, Default)]
pub struct ComputePipelineDesc {
    /// Compiled compute shader blob.
    pub shader: Vec<u8>,
    /// Debug label.
    pub label: Option<String>,
}

impl ComputePipelineDesc {
    /// Describe a pipeline from a compiled shader blob.
    pub fn new(shader: Vec<u8>) -> Self {
        Self {
            shader,
            label: None,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A compiled pipeline the recorder can bind.
pub struct PipelineState {
    raw: RawPipelineState,
    render_target_formats: Vec<PixelFormat>,
    depth_format: Option<PixelFormat>,
}

impl PipelineState {
    /// Build a graphics pipeline.
    pub fn new_graphics(device: &Device, desc: GraphicsPipelineDesc) -> GpuResult<Self> {
        if desc.render_target_formats.len() > MAX_RENDER_TARGETS {
            return Err(GpuError::backend(
                E_INVALIDARG,
                format!(
                    "{} render targets exceeds the limit of {MAX_RENDER_TARGETS}",
                    desc.render_target_formats.len()
                ),
            ));
        }
        if desc.vertex_shader.is_empty() {
            return Err(GpuError::backend(
                E_INVALIDARG,
                "graphics pipeline without a vertex shader",
            ));
        }
        let raw = device
            .raw()
            .create_pipeline_state(PipelineKind::Graphics, desc.label.clone());
        Ok(Self {
            raw,
            render_target_formats: desc.render_target_formats,
            depth_format: desc.depth_format,
        })
    }

    /// Build a compute pipeline.
    pub fn new_compute(device: &Device, desc: ComputePipelineDesc) -> GpuResult<Self> {
        if desc.shader.is_empty() {
            return Err(GpuError::backend(
                E_INVALIDARG,
                "compute pipeline without a shader",
            ));
        }
        let raw = device
            .raw()
            .create_pipeline_state(PipelineKind::Compute, desc.label.clone());
        Ok(Self {
            raw,
            render_target_formats: Vec::new(),
            depth_format: None,
        })
    }

    /// The raw object bound on command lists.
    pub fn raw(&self) -> &RawPipelineState {
        &self.raw
    }

    /// Graphics or compute.
    pub fn kind(&self) -> PipelineKind {
        self.raw.kind()
    }

    /// Color target formats of a graphics pipeline.
    pub fn render_target_formats(&self) -> &[PixelFormat] {
        &self.render_target_formats
    }

    /// Depth target format, if any.
    pub fn depth_format(&self) -> Option<PixelFormat> {
        self.depth_format
    }
}

impl std::fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineState")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}
