//! Common utilities for submission integration tests.

use std::sync::{Arc, Once};

use vermilion::backend::DeviceDesc;
use vermilion::Device;

static INIT: Once = Once::new();

/// Initialize logging once for the whole test binary.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Create a device for testing.
pub fn test_device() -> Arc<Device> {
    init_logging();
    Device::new(DeviceDesc::default().with_label("test device")).expect("device creation failed")
}

/// Generate test data pattern for copy tests.
pub fn generate_test_pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}
