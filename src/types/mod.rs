//! Value types shared across the submission core.

mod common;
mod format;
mod state;

pub use common::{PrimitiveTopology, ScissorRect, Viewport};
pub use format::PixelFormat;
pub use state::ResourceState;
