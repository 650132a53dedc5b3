//! Pool recycling tests.
//!
//! Every pool in the submission core recycles on sync points instead of
//! growing without bound. These tests drive each pool through sustained
//! churn and assert the number of backing objects ever created stays small.

mod common;

use std::sync::Arc;

use common::{generate_test_pattern, test_device};
use vermilion::backend::{
    DescriptorHeapKind, DescriptorRange, DescriptorRangeKind, RootParameter, RootSignatureDesc,
};
use vermilion::{
    CommandRecorder, GpuBuffer, PixelFormat, RootSignature, Texture, TextureDesc, TransientKind,
};

// ============================================================================
// Transient Pages
// ============================================================================

/// Sustained upload churn with a wait per submit reuses one default page.
#[test]
fn test_transient_pages_recycle() {
    let device = test_device();
    let mut recorder = CommandRecorder::new(&device).unwrap();
    let buffer = GpuBuffer::new(&device, 64 * 1024, None).unwrap();
    let data = generate_test_pattern(64 * 1024);

    for _ in 0..10_000 {
        recorder.copy_buffer_data(&data, &buffer, 0).unwrap();
        let sync = recorder.submit();
        device.wait(sync);
    }

    assert!(
        device.transient_default_page_count(TransientKind::Upload) <= 2,
        "created {} upload pages",
        device.transient_default_page_count(TransientKind::Upload)
    );
    assert_eq!(device.barrier_violations(), 0);
}

/// Oversized requests get one-shot pages and never inflate the default pool.
#[test]
fn test_oversized_uploads_bypass_default_pool() {
    let device = test_device();
    let mut recorder = CommandRecorder::new(&device).unwrap();
    let buffer = GpuBuffer::new(&device, 3 * 1024 * 1024, None).unwrap();
    let data = vec![0xABu8; 3 * 1024 * 1024];

    for _ in 0..4 {
        recorder.copy_buffer_data(&data, &buffer, 0).unwrap();
        device.wait(recorder.submit());
    }

    assert!(device.transient_default_page_count(TransientKind::Upload) <= 1);
}

/// Sustained UAV scratch churn recycles the UAV lane's default page the
/// same way the upload lane recycles.
#[test]
fn test_uav_scratch_pages_recycle() {
    let device = test_device();
    let mut recorder = CommandRecorder::new(&device).unwrap();

    for _ in 0..5_000 {
        let scratch = recorder.allocate_transient_uav(64 * 1024).unwrap();
        assert_eq!(scratch.gpu_address() % vermilion::TRANSIENT_ALIGNMENT, 0);
        device.wait(recorder.submit());
    }

    assert!(
        device.transient_default_page_count(TransientKind::Uav) <= 2,
        "created {} uav pages",
        device.transient_default_page_count(TransientKind::Uav)
    );
}

// ============================================================================
// CPU Descriptor Slots
// ============================================================================

/// Dropped views free their slots; a second wave of views fits in the
/// slabs the first wave created.
#[test]
fn test_descriptor_slots_recycle() {
    let device = test_device();
    let desc = TextureDesc::new(4, 4, PixelFormat::Rgba8Unorm);

    let first_wave: Vec<Texture> = (0..1000)
        .map(|_| Texture::new(&device, &desc).unwrap())
        .collect();
    let after_first = device.descriptor_heap_count(DescriptorHeapKind::CbvSrvUav);
    drop(first_wave);

    let _second_wave: Vec<Texture> = (0..1000)
        .map(|_| Texture::new(&device, &desc).unwrap())
        .collect();
    let after_second = device.descriptor_heap_count(DescriptorHeapKind::CbvSrvUav);

    assert!(after_first <= 16, "created {after_first} slab heaps");
    assert_eq!(after_first, after_second, "freed slots must be reused");
}

// ============================================================================
// Shader-Visible Heaps
// ============================================================================

fn cbv_table_signature(device: &Arc<vermilion::Device>, space: u32) -> Arc<RootSignature> {
    let desc = RootSignatureDesc::new().with_parameter(RootParameter::DescriptorTable {
        ranges: vec![DescriptorRange {
            kind: DescriptorRangeKind::Cbv,
            count: 1,
            base_register: 0,
            register_space: space,
        }],
    });
    Arc::new(RootSignature::new(device, desc).unwrap())
}

/// Rebinding a different root signature reserves a fresh window; staged
/// descriptors of the two signatures never alias.
#[test]
fn test_signature_change_reserves_fresh_window() {
    let device = test_device();
    let mut recorder = CommandRecorder::new(&device).unwrap();

    let a = cbv_table_signature(&device, 0);
    let b = cbv_table_signature(&device, 1);

    recorder.set_graphics_root_signature(&a).unwrap();
    let (base_a, size_a) = recorder.staged_resource_window().unwrap();
    recorder.set_graphics_root_signature(&b).unwrap();
    let (base_b, _) = recorder.staged_resource_window().unwrap();

    let increment = device
        .raw()
        .descriptor_increment(DescriptorHeapKind::CbvSrvUav);
    assert!(
        base_b.ptr >= base_a.ptr + size_a as u64 * increment,
        "windows of different signatures must not alias"
    );
}

/// Rebinding the same signature is a no-op and keeps the same window.
#[test]
fn test_same_signature_rebind_keeps_window() {
    let device = test_device();
    let mut recorder = CommandRecorder::new(&device).unwrap();

    let signature = cbv_table_signature(&device, 0);
    recorder.set_graphics_root_signature(&signature).unwrap();
    let first = recorder.staged_resource_window().unwrap();
    recorder.set_graphics_root_signature(&signature).unwrap();
    assert_eq!(recorder.staged_resource_window().unwrap(), first);
}

/// Submit-paced signature churn recycles shader-visible heaps.
#[test]
fn test_shader_visible_heaps_recycle() {
    let device = test_device();
    let mut recorder = CommandRecorder::new(&device).unwrap();
    let signatures: Vec<_> = (0..4).map(|space| cbv_table_signature(&device, space)).collect();

    for _ in 0..2_000 {
        for signature in &signatures {
            recorder.set_graphics_root_signature(signature).unwrap();
        }
        device.wait(recorder.submit());
    }

    assert!(
        device.shader_visible_heap_count(DescriptorHeapKind::CbvSrvUav) <= 3,
        "created {} shader-visible heaps",
        device.shader_visible_heap_count(DescriptorHeapKind::CbvSrvUav)
    );
}

// ============================================================================
// Command Allocators
// ============================================================================

/// Waited submits keep the allocator pool at two entries.
#[test]
fn test_command_allocators_recycle() {
    let device = test_device();
    let mut recorder = CommandRecorder::new(&device).unwrap();
    let buffer = GpuBuffer::new(&device, 256, None).unwrap();

    for _ in 0..1_000 {
        recorder.copy_buffer_data(&[0u8; 16], &buffer, 0).unwrap();
        device.wait(recorder.submit());
    }
    // No direct counter for allocators; the proxy is that nothing else
    // grew either while the loop reused pooled objects.
    assert_eq!(device.barrier_violations(), 0);
    assert!(device.transient_default_page_count(TransientKind::Upload) <= 2);
}
