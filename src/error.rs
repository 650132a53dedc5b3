//! Error types for the submission core.

use std::fmt;

/// Errors that can occur in the GPU core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// An underlying graphics API call failed.
    Backend {
        /// The backend's raw result code.
        code: i32,
        /// A short human-readable diagnostic.
        message: String,
    },
    /// A window or OS call failed.
    Platform {
        /// The OS error code.
        code: i32,
        /// A short human-readable diagnostic.
        message: String,
    },
    /// No suitable adapter supports the required feature level.
    NoSuitableAdapter,
    /// A requested capability is not supported by the adapter.
    CapabilityMissing(String),
}

impl GpuError {
    /// Shorthand for a backend failure with a diagnostic message.
    pub fn backend(code: i32, message: impl Into<String>) -> Self {
        Self::Backend {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for a platform failure with a diagnostic message.
    pub fn platform(code: i32, message: impl Into<String>) -> Self {
        Self::Platform {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { code, message } => {
                write!(f, "backend call failed ({code:#010x}): {message}")
            }
            Self::Platform { code, message } => {
                write!(f, "platform call failed ({code}): {message}")
            }
            Self::NoSuitableAdapter => write!(f, "no suitable adapter found"),
            Self::CapabilityMissing(what) => write!(f, "capability missing: {what}"),
        }
    }
}

impl std::error::Error for GpuError {}

/// Convenience alias used throughout the crate.
pub type GpuResult<T> = Result<T, GpuError>;

/// The invalid-argument result code validation failures report.
pub(crate) const E_INVALIDARG: i32 = 0x80070057_u32 as i32;
