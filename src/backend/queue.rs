//! The direct queue and fence synchronization.
//!
//! A worker thread consumes submitted tasks in order: it executes command
//! streams against resource byte storage, validates transition barriers
//! against the tracked state each resource is actually in, and completes
//! fence signals strictly after all previously submitted work.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use super::command::{Command, RawCommandList};
use super::resource::RawResource;
use crate::types::{PixelFormat, ResourceState};

struct FenceInner {
    value: Mutex<u64>,
    cvar: Condvar,
}

/// A monotonically increasing completion counter.
#[derive(Clone)]
pub struct RawFence {
    inner: Arc<FenceInner>,
}

impl RawFence {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(FenceInner {
                value: Mutex::new(0),
                cvar: Condvar::new(),
            }),
        }
    }

    /// The last completed value.
    pub fn completed_value(&self) -> u64 {
        *self.inner.value.lock()
    }

    /// Block until the fence reaches `value`.
    pub fn wait(&self, value: u64) {
        let mut completed = self.inner.value.lock();
        while *completed < value {
            self.inner.cvar.wait(&mut completed);
        }
    }

    pub(crate) fn signal(&self, value: u64) {
        let mut completed = self.inner.value.lock();
        debug_assert!(*completed <= value, "fence values must not go backwards");
        *completed = value;
        self.inner.cvar.notify_all();
    }
}

impl std::fmt::Debug for RawFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFence")
            .field("completed", &self.completed_value())
            .finish()
    }
}

enum Task {
    Execute(Vec<Command>),
    Signal(RawFence, u64),
    Present(RawResource),
    Shutdown,
}

struct QueueShared {
    tasks: Mutex<VecDeque<Task>>,
    cvar: Condvar,
    barrier_violations: AtomicUsize,
}

/// The direct command queue.
pub struct RawQueue {
    shared: Arc<QueueShared>,
    worker: Option<JoinHandle<()>>,
}

impl RawQueue {
    pub(crate) fn new() -> Self {
        let shared = Arc::new(QueueShared {
            tasks: Mutex::new(VecDeque::new()),
            cvar: Condvar::new(),
            barrier_violations: AtomicUsize::new(0),
        });
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("gpu-queue".to_string())
            .spawn(move || worker_loop(worker_shared))
            .ok();
        if worker.is_none() {
            log::error!("failed to spawn queue worker thread");
        }
        Self { shared, worker }
    }

    fn push(&self, task: Task) {
        self.shared.tasks.lock().push_back(task);
        self.shared.cvar.notify_one();
    }

    /// Submit a closed command list for execution.
    pub fn execute_command_list(&self, list: &RawCommandList) {
        debug_assert!(list.is_closed(), "executing an open command list");
        self.push(Task::Execute(list.cloned_commands()));
    }

    /// Enqueue a fence signal after all previously submitted work.
    pub fn signal(&self, fence: &RawFence, value: u64) {
        self.push(Task::Signal(fence.clone(), value));
    }

    /// Enqueue a present of `back_buffer`.
    pub fn present(&self, back_buffer: &RawResource) {
        self.push(Task::Present(back_buffer.clone()));
    }

    /// Number of invalid transition barriers executed so far.
    pub fn barrier_violations(&self) -> usize {
        self.shared.barrier_violations.load(Ordering::Relaxed)
    }
}

impl Drop for RawQueue {
    fn drop(&mut self) {
        self.push(Task::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for RawQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawQueue")
            .field("barrier_violations", &self.barrier_violations())
            .finish_non_exhaustive()
    }
}

fn worker_loop(shared: Arc<QueueShared>) {
    loop {
        let task = {
            let mut tasks = shared.tasks.lock();
            loop {
                match tasks.pop_front() {
                    Some(task) => break task,
                    None => shared.cvar.wait(&mut tasks),
                }
            }
        };
        match task {
            Task::Execute(commands) => {
                for command in &commands {
                    execute(&shared, command);
                }
            }
            Task::Signal(fence, value) => fence.signal(value),
            Task::Present(back_buffer) => {
                let state = back_buffer.tracked_state();
                if state != ResourceState::PRESENT {
                    log::error!(
                        "present of back buffer in state {:?} (expected PRESENT)",
                        state
                    );
                    shared.barrier_violations.fetch_add(1, Ordering::Relaxed);
                }
            }
            Task::Shutdown => break,
        }
    }
}

fn note_violation(shared: &QueueShared, message: std::fmt::Arguments<'_>) {
    log::error!("{}", message);
    shared.barrier_violations.fetch_add(1, Ordering::Relaxed);
}

fn check_state(shared: &QueueShared, resource: &RawResource, required: ResourceState, op: &str) {
    let state = resource.tracked_state();
    // COMMON promotes to any read/copy state, as buffers and simultaneous
    // access textures do in the API being modeled. Keep the check strict for
    // everything that has left COMMON.
    if state != ResourceState::COMMON && !state.contains(required) {
        note_violation(
            shared,
            format_args!(
                "{op}: {resource:?} is in state {state:?}, requires {required:?}"
            ),
        );
    }
}

fn execute(shared: &QueueShared, command: &Command) {
    match command {
        Command::Transition {
            resource,
            before,
            after,
        } => {
            let tracked = resource.tracked_state();
            if tracked != *before {
                note_violation(
                    shared,
                    format_args!(
                        "transition of {resource:?}: recorded before-state {before:?} \
                         does not match tracked state {tracked:?}"
                    ),
                );
            }
            resource.set_tracked_state(*after);
        }
        Command::UavBarrier { .. } => {}
        Command::CopyResource { dst, src } => {
            check_state(shared, src, ResourceState::COPY_SOURCE, "copy_resource src");
            check_state(shared, dst, ResourceState::COPY_DEST, "copy_resource dst");
            let data = src.read(0, src.size_in_bytes());
            dst.write(0, &data[..data.len().min(dst.size_in_bytes() as usize)]);
        }
        Command::CopyBufferRegion {
            dst,
            dst_offset,
            src,
            src_offset,
            size,
        } => {
            check_state(shared, src, ResourceState::COPY_SOURCE, "copy_buffer src");
            check_state(shared, dst, ResourceState::COPY_DEST, "copy_buffer dst");
            let data = src.read(*src_offset, *size);
            dst.write(*dst_offset, &data);
        }
        Command::BufferToTexture {
            dst,
            mip,
            slice,
            src,
            src_offset,
            row_pitch,
        } => {
            check_state(shared, src, ResourceState::COPY_SOURCE, "copy_texture src");
            check_state(shared, dst, ResourceState::COPY_DEST, "copy_texture dst");
            let (width, height) = dst.mip_dimensions(*mip);
            let row_bytes = width as u64 * texture_bpp(dst) as u64;
            let base = dst.subresource_offset(*mip, *slice);
            for row in 0..height as u64 {
                let data = src.read(src_offset + row * row_pitch, row_bytes);
                dst.write(base + row * row_bytes, &data);
            }
        }
        Command::ClearRenderTarget { view, color } => {
            check_state(
                shared,
                &view.resource,
                ResourceState::RENDER_TARGET,
                "clear_render_target",
            );
            let texel = encode_color(view.format, *color);
            fill_subresource(&view.resource, view.mip, &texel);
        }
        Command::ClearDepthStencil {
            view,
            depth,
            stencil,
        } => {
            if !view.read_only {
                check_state(
                    shared,
                    &view.resource,
                    ResourceState::DEPTH_WRITE,
                    "clear_depth_stencil",
                );
            }
            let texel_size = view.format.bytes_per_pixel() as usize;
            mutate_subresource(&view.resource, 0, texel_size, |texel| {
                write_depth_stencil(view.format, texel, *depth, *stencil);
            });
        }
        // The software device does not shade.
        Command::Draw { .. } | Command::DrawIndexed { .. } | Command::Dispatch { .. } => {}
    }
}

fn texture_bpp(resource: &RawResource) -> u32 {
    match &resource.desc().kind {
        super::resource::ResourceKind::Texture2D { format, .. } => format.bytes_per_pixel(),
        super::resource::ResourceKind::Buffer { .. } => 1,
    }
}

fn fill_subresource(resource: &RawResource, mip: u32, texel: &[u8]) {
    if texel.is_empty() {
        return;
    }
    mutate_subresource(resource, mip, texel.len(), |chunk| {
        chunk.copy_from_slice(texel);
    });
}

fn mutate_subresource(resource: &RawResource, mip: u32, texel_size: usize, f: impl Fn(&mut [u8])) {
    if texel_size == 0 {
        return;
    }
    let (width, height) = resource.mip_dimensions(mip);
    let base = resource.subresource_offset(mip, 0) as usize;
    let size = width as usize * height as usize * texel_size;
    resource.with_storage(|storage| {
        let end = (base + size).min(storage.len());
        for chunk in storage[base..end].chunks_exact_mut(texel_size) {
            f(chunk);
        }
    });
}

fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

fn unorm16(value: f32) -> u16 {
    (value.clamp(0.0, 1.0) * 65535.0 + 0.5) as u16
}

fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32 - 127 + 15;
    let mantissa = bits & 0x007f_ffff;
    if exponent <= 0 {
        sign
    } else if exponent >= 0x1f {
        sign | 0x7c00
    } else {
        sign | ((exponent as u16) << 10) | ((mantissa >> 13) as u16)
    }
}

fn encode_color(format: PixelFormat, color: [f32; 4]) -> Vec<u8> {
    match format {
        PixelFormat::R8Unorm => vec![unorm8(color[0])],
        PixelFormat::Rg8Unorm => vec![unorm8(color[0]), unorm8(color[1])],
        PixelFormat::Rgba8Unorm => color.iter().map(|c| unorm8(*c)).collect(),
        PixelFormat::Bgra8Unorm => vec![
            unorm8(color[2]),
            unorm8(color[1]),
            unorm8(color[0]),
            unorm8(color[3]),
        ],
        PixelFormat::R16Unorm => unorm16(color[0]).to_le_bytes().to_vec(),
        PixelFormat::R16Float => f32_to_f16(color[0]).to_le_bytes().to_vec(),
        PixelFormat::Rg16Float => color[..2]
            .iter()
            .flat_map(|c| f32_to_f16(*c).to_le_bytes())
            .collect(),
        PixelFormat::Rgba16Float => color
            .iter()
            .flat_map(|c| f32_to_f16(*c).to_le_bytes())
            .collect(),
        PixelFormat::R32Uint => (color[0] as u32).to_le_bytes().to_vec(),
        PixelFormat::R32Float => color[0].to_le_bytes().to_vec(),
        PixelFormat::Rg32Float => color[..2].iter().flat_map(|c| c.to_le_bytes()).collect(),
        PixelFormat::Rgba32Float => color.iter().flat_map(|c| c.to_le_bytes()).collect(),
        _ => {
            log::warn!("clear of unsupported render target format {:?}", format);
            Vec::new()
        }
    }
}

/// Write the requested planes of one depth-stencil texel in place, leaving
/// the other plane's bits as they were.
fn write_depth_stencil(format: PixelFormat, texel: &mut [u8], depth: Option<f32>, stencil: Option<u8>) {
    match format {
        PixelFormat::D16Unorm => {
            if let Some(depth) = depth {
                texel[..2].copy_from_slice(&unorm16(depth).to_le_bytes());
            }
        }
        PixelFormat::D24UnormS8Uint => {
            let mut packed = u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
            if let Some(depth) = depth {
                let d = (depth.clamp(0.0, 1.0) * 16_777_215.0 + 0.5) as u32;
                packed = (packed & 0xff00_0000) | (d & 0x00ff_ffff);
            }
            if let Some(stencil) = stencil {
                packed = (packed & 0x00ff_ffff) | ((stencil as u32) << 24);
            }
            texel[..4].copy_from_slice(&packed.to_le_bytes());
        }
        PixelFormat::D32Float => {
            if let Some(depth) = depth {
                texel[..4].copy_from_slice(&depth.to_le_bytes());
            }
        }
        PixelFormat::D32FloatS8Uint => {
            if let Some(depth) = depth {
                texel[..4].copy_from_slice(&depth.to_le_bytes());
            }
            if let Some(stencil) = stencil {
                texel[4] = stencil;
            }
        }
        _ => log::warn!("clear of unsupported depth format {:?}", format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_signal_and_wait() {
        let fence = RawFence::new();
        assert_eq!(fence.completed_value(), 0);
        fence.signal(3);
        fence.wait(3);
        assert_eq!(fence.completed_value(), 3);
    }

    #[test]
    fn test_color_encoding() {
        assert_eq!(
            encode_color(PixelFormat::Rgba8Unorm, [1.0, 0.0, 0.5, 1.0]),
            vec![255, 0, 128, 255]
        );
        assert_eq!(
            encode_color(PixelFormat::Bgra8Unorm, [1.0, 0.0, 0.0, 1.0]),
            vec![0, 0, 255, 255]
        );
        assert_eq!(
            encode_color(PixelFormat::R32Float, [0.25, 0.0, 0.0, 0.0]),
            0.25f32.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn test_half_encoding() {
        assert_eq!(f32_to_f16(0.0), 0x0000);
        assert_eq!(f32_to_f16(1.0), 0x3c00);
        assert_eq!(f32_to_f16(-2.0), 0xc000);
    }

    #[test]
    fn test_depth_stencil_writes_are_plane_selective() {
        let mut d32 = [0u8; 4];
        write_depth_stencil(PixelFormat::D32Float, &mut d32, Some(1.0), None);
        assert_eq!(d32, 1.0f32.to_le_bytes());

        let mut packed = 0u32.to_le_bytes();
        write_depth_stencil(PixelFormat::D24UnormS8Uint, &mut packed, Some(1.0), Some(0xab));
        assert_eq!(u32::from_le_bytes(packed), 0xab_ff_ff_ff);

        // Depth-only keeps the stencil byte; stencil-only keeps the depth bits.
        write_depth_stencil(PixelFormat::D24UnormS8Uint, &mut packed, Some(0.0), None);
        assert_eq!(u32::from_le_bytes(packed), 0xab_00_00_00);
        write_depth_stencil(PixelFormat::D24UnormS8Uint, &mut packed, None, Some(0x12));
        assert_eq!(u32::from_le_bytes(packed), 0x12_00_00_00);
    }
}
