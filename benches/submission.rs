use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vermilion::backend::DeviceDesc;
use vermilion::{
    CommandRecorder, ConstantBufferView, Device, GpuBuffer, PixelFormat, ShaderResourceView,
    Texture, TextureDesc,
};

// ---------------------------------------------------------------------------
// CPU descriptor slot churn
// ---------------------------------------------------------------------------

fn bench_descriptor_slot_churn(c: &mut Criterion) {
    let device = Device::new(DeviceDesc::default()).unwrap();
    let buffer = GpuBuffer::new(&device, 4096, None).unwrap();

    c.bench_function("cbv_create_drop", |b| {
        b.iter(|| {
            let view = ConstantBufferView::new(&device, buffer.gpu_address(), 256).unwrap();
            black_box(view.handle());
        });
    });
}

fn bench_srv_create_drop(c: &mut Criterion) {
    let device = Device::new(DeviceDesc::default()).unwrap();
    let texture = Texture::new(&device, &TextureDesc::new(16, 16, PixelFormat::Rgba8Unorm))
        .unwrap();

    c.bench_function("srv_copy_handle", |b| {
        b.iter(|| {
            let srv: &ShaderResourceView = texture.srv();
            black_box(srv.handle());
        });
    });
}

// ---------------------------------------------------------------------------
// Transient allocation churn
// ---------------------------------------------------------------------------

fn bench_transient_upload(c: &mut Criterion) {
    let device = Device::new(DeviceDesc::default()).unwrap();
    let mut recorder = CommandRecorder::new(&device).unwrap();
    let buffer = GpuBuffer::new(&device, 64 * 1024, None).unwrap();
    let data = vec![0xA5u8; 4096];

    c.bench_function("transient_upload_4k_per_submit", |b| {
        b.iter(|| {
            recorder.copy_buffer_data(black_box(&data), &buffer, 0).unwrap();
            let sync = recorder.submit();
            device.wait(sync);
        });
    });
}

fn bench_submit_empty(c: &mut Criterion) {
    let device = Device::new(DeviceDesc::default()).unwrap();
    let mut recorder = CommandRecorder::new(&device).unwrap();

    c.bench_function("submit_empty_wait", |b| {
        b.iter(|| {
            let sync = recorder.submit();
            device.wait(sync);
            black_box(sync);
        });
    });
}

criterion_group!(
    benches,
    bench_descriptor_slot_churn,
    bench_srv_create_drop,
    bench_transient_upload,
    bench_submit_empty,
);
criterion_main!(benches);
