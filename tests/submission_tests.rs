//! End-to-end submission tests.
//!
//! These exercise full frames against the software backend: recording,
//! barrier discipline, uploads, presents and resizes, with readback
//! validation where the scenario produces observable bytes.

mod common;

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use common::{generate_test_pattern, test_device};
use rstest::rstest;
use vermilion::backend::{DescriptorRange, DescriptorRangeKind, RootParameter, RootSignatureDesc};
use vermilion::{
    AsGpuResource, CommandRecorder, GpuBuffer, GraphicsPipelineDesc, PipelineState, PixelFormat,
    PrimitiveTopology, ResourceState, RootSignature, ScissorRect, SwapChain, SwapChainDesc,
    Texture, TextureDesc, Viewport,
};

// ============================================================================
// Frame Loop
// ============================================================================

/// Run a clear-and-present frame loop and verify the pools stay bounded.
///
/// With the swap chain pacing frames on present sync points, one recorder
/// reuses the same transient page and command allocator for every frame
/// instead of growing without limit.
#[rstest]
#[case::double_buffered(2)]
#[case::triple_buffered(3)]
fn test_frame_loop_pools_stay_bounded(#[case] num_buffers: u32) {
    let device = test_device();
    let desc = SwapChainDesc::new(64, 64, PixelFormat::Rgba8Unorm).with_num_buffers(num_buffers);
    let mut chain = SwapChain::new(&device, None, &desc).unwrap();
    let mut recorder = CommandRecorder::new(&device).unwrap();

    for frame in 0..100u32 {
        {
            let back = chain.current_back_buffer();
            recorder.set_render_target(back);
            let tint = frame as f32 / 100.0;
            recorder.clear_color_with(back, [tint, 0.0, 0.0, 1.0]);
            recorder.transition(back, ResourceState::PRESENT);
        }
        // A small per-frame upload keeps the transient lane active.
        let scratch = GpuBuffer::new(&device, 1024, None).unwrap();
        recorder
            .copy_buffer_data(&generate_test_pattern(1024), &scratch, 0)
            .unwrap();
        recorder.submit();
        chain.present();
    }
    device.sync();

    assert_eq!(device.barrier_violations(), 0);
    assert!(
        device.transient_default_page_count(vermilion::TransientKind::Upload) <= 2,
        "frame loop must recycle transient pages"
    );
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 4],
}

/// Run the canonical textured-triangle frame loop: root signature and
/// pipeline bound, a per-frame constant buffer and a sampled texture
/// staged, fixed state set, a transient vertex stream drawn, the back
/// buffer presented. Every frame must come out clean of barrier
/// violations.
#[test]
fn test_draw_frame_loop_presents_clean() {
    let device = test_device();
    let desc = SwapChainDesc::new(64, 64, PixelFormat::Rgba8Unorm);
    let mut chain = SwapChain::new(&device, None, &desc).unwrap();
    let mut recorder = CommandRecorder::new(&device).unwrap();

    // One table: a per-frame CBV at b0 and the albedo SRV at t0.
    let signature = Arc::new(
        RootSignature::new(
            &device,
            RootSignatureDesc::new().with_parameter(RootParameter::DescriptorTable {
                ranges: vec![
                    DescriptorRange {
                        kind: DescriptorRangeKind::Cbv,
                        count: 1,
                        base_register: 0,
                        register_space: 0,
                    },
                    DescriptorRange {
                        kind: DescriptorRangeKind::Srv,
                        count: 1,
                        base_register: 0,
                        register_space: 0,
                    },
                ],
            }),
        )
        .unwrap(),
    );
    let pipeline = PipelineState::new_graphics(
        &device,
        GraphicsPipelineDesc::new(vec![0x56], vec![0x50])
            .with_render_target(PixelFormat::Rgba8Unorm)
            .with_topology(PrimitiveTopology::TriangleList)
            .with_label("triangle"),
    )
    .unwrap();

    let albedo = Texture::new(&device, &TextureDesc::new(8, 8, PixelFormat::Rgba8Unorm)).unwrap();
    recorder
        .copy_texture(
            8,
            8,
            PixelFormat::Rgba8Unorm,
            &generate_test_pattern(8 * 8 * 4),
            8 * 4,
            &albedo,
            0,
        )
        .unwrap();
    recorder.transition(&albedo, ResourceState::PIXEL_SHADER_RESOURCE);

    let triangle = [
        Vertex { position: [-0.5, -0.5, 0.0], color: [1.0, 0.0, 0.0, 1.0] },
        Vertex { position: [0.5, -0.5, 0.0], color: [0.0, 1.0, 0.0, 1.0] },
        Vertex { position: [0.0, 0.5, 0.0], color: [0.0, 0.0, 1.0, 1.0] },
    ];

    for frame in 0..30u32 {
        {
            let back = chain.current_back_buffer();
            recorder.set_render_target(back);
            recorder.clear_color(back);

            recorder.set_graphics_root_signature(&signature).unwrap();
            let tint = [frame as f32 / 30.0; 4];
            recorder
                .set_graphics_table_constant_buffer(0, 0, &tint)
                .unwrap();
            recorder.set_graphics_srv(0, 0, albedo.srv());

            recorder.set_pipeline_state(&pipeline);
            recorder.set_primitive_topology(PrimitiveTopology::TriangleList);
            recorder.set_viewport(Viewport::new(0.0, 0.0, 64.0, 64.0));
            recorder.set_scissor(ScissorRect::new(0, 0, 64, 64));
            recorder.set_transient_vertex_buffer(0, &triangle[..]).unwrap();
            recorder.draw(3, 0);

            recorder.transition(back, ResourceState::PRESENT);
        }
        recorder.submit();
        chain.present();
    }
    device.sync();
    assert_eq!(device.barrier_violations(), 0);
}

/// Present syncs strictly increase and are all reached after a drain.
#[test]
fn test_present_sync_points_are_ordered() {
    let device = test_device();
    let desc = SwapChainDesc::new(32, 32, PixelFormat::Rgba8Unorm);
    let mut chain = SwapChain::new(&device, None, &desc).unwrap();

    let mut last = None;
    for _ in 0..8 {
        let sync = chain.present();
        if let Some(previous) = last {
            assert!(previous < sync);
        }
        last = Some(sync);
    }
    device.sync();
    assert!(device.timeline().reached(last.unwrap()));
}

/// Resizing mid-loop resets pacing; frames after the resize never block
/// on presents of the discarded surface.
#[test]
fn test_resize_mid_frame_loop() {
    let device = test_device();
    let desc = SwapChainDesc::new(64, 64, PixelFormat::Rgba8Unorm);
    let mut chain = SwapChain::new(&device, None, &desc).unwrap();
    let mut recorder = CommandRecorder::new(&device).unwrap();

    let mut frame = |chain: &mut SwapChain, recorder: &mut CommandRecorder| {
        {
            let back = chain.current_back_buffer();
            recorder.set_render_target(back);
            recorder.clear_color(back);
            recorder.transition(back, ResourceState::PRESENT);
        }
        recorder.submit();
        chain.present();
    };

    for _ in 0..5 {
        frame(&mut chain, &mut recorder);
    }
    chain.resize(128, 96).unwrap();
    assert_eq!(chain.dimensions(), (128, 96));
    for _ in 0..5 {
        frame(&mut chain, &mut recorder);
    }
    device.sync();
    assert_eq!(device.barrier_violations(), 0);
}

// ============================================================================
// Uploads and Readback
// ============================================================================

/// Upload pixels into a texture and read them back byte for byte.
#[test]
fn test_texture_upload_roundtrip() {
    let device = test_device();
    let mut recorder = CommandRecorder::new(&device).unwrap();

    let width = 16u32;
    let height = 16u32;
    let format = PixelFormat::Rgba8Unorm;
    let row_bytes = (width * format.bytes_per_pixel()) as u64;
    let data = generate_test_pattern((row_bytes * height as u64) as usize);

    let texture = Texture::new(&device, &TextureDesc::new(width, height, format)).unwrap();
    recorder
        .copy_texture(width, height, format, &data, row_bytes, &texture, 0)
        .unwrap();
    let sync = recorder.submit();
    device.wait(sync);

    assert_eq!(texture.resource().read_back(), data);
    assert_eq!(device.barrier_violations(), 0);
}

/// Upload pixels straight into a swap-chain back buffer and read them
/// back byte for byte before presenting.
#[test]
fn test_back_buffer_upload_roundtrip() {
    let device = test_device();
    let desc = SwapChainDesc::new(16, 16, PixelFormat::Rgba8Unorm);
    let mut chain = SwapChain::new(&device, None, &desc).unwrap();
    let mut recorder = CommandRecorder::new(&device).unwrap();

    let row_bytes = 16u64 * 4;
    let data = generate_test_pattern((row_bytes * 16) as usize);
    {
        let back = chain.current_back_buffer();
        recorder
            .copy_texture(16, 16, PixelFormat::Rgba8Unorm, &data, row_bytes, back, 0)
            .unwrap();
        recorder.transition(back, ResourceState::PRESENT);
        device.wait(recorder.submit());
        assert_eq!(back.resource().read_back(), data);
    }
    chain.present();
    assert_eq!(device.barrier_violations(), 0);
}

/// Upload with a padded source row pitch; padding bytes never land in
/// the texture.
#[test]
fn test_texture_upload_with_padded_pitch() {
    let device = test_device();
    let mut recorder = CommandRecorder::new(&device).unwrap();

    let width = 7u32;
    let height = 3u32;
    let format = PixelFormat::Rgba8Unorm;
    let row_bytes = (width * format.bytes_per_pixel()) as usize;
    let pitch = 64usize;

    let mut data = vec![0xCCu8; pitch * height as usize];
    let mut expected = Vec::new();
    for row in 0..height as usize {
        let payload = generate_test_pattern(row_bytes);
        data[row * pitch..row * pitch + row_bytes].copy_from_slice(&payload);
        expected.extend_from_slice(&payload);
    }

    let texture = Texture::new(&device, &TextureDesc::new(width, height, format)).unwrap();
    recorder
        .copy_texture(width, height, format, &data, pitch as u64, &texture, 0)
        .unwrap();
    device.wait(recorder.submit());

    assert_eq!(texture.resource().read_back(), expected);
}

/// Chain two buffer copies through explicit barrier states.
#[test]
fn test_buffer_copy_chain() {
    let device = test_device();
    let mut recorder = CommandRecorder::new(&device).unwrap();

    let data = generate_test_pattern(512);
    let first = GpuBuffer::new(&device, 512, Some("first")).unwrap();
    let second = GpuBuffer::new(&device, 512, Some("second")).unwrap();

    recorder.copy_buffer_data(&data, &first, 0).unwrap();
    recorder.copy_buffer(&first, 0, &second, 0, 512);
    device.wait(recorder.submit());

    assert_eq!(second.resource().read_back_range(0, 512), data);
    assert_eq!(device.barrier_violations(), 0);
}

/// Two submits from one recorder execute in order on the queue.
#[test]
fn test_double_submit_executes_in_order() {
    let device = test_device();
    let mut recorder = CommandRecorder::new(&device).unwrap();
    let buffer = GpuBuffer::new(&device, 256, None).unwrap();

    recorder.copy_buffer_data(&[1u8; 64], &buffer, 0).unwrap();
    let s1 = recorder.submit();
    recorder.copy_buffer_data(&[2u8; 64], &buffer, 0).unwrap();
    let s2 = recorder.submit();

    assert!(s1 < s2);
    device.wait(s2);
    assert!(device.timeline().reached(s1));
    // The second write wins.
    assert_eq!(buffer.resource().read_back_range(0, 64), vec![2u8; 64]);
}
