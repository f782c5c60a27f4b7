pub mod buffer;
pub mod diffusion;
pub mod filtering;
pub mod flip_3d;
pub mod grid_sort;
pub mod kernel;
pub mod params;
pub mod prefix_scan;
pub mod radix_sort;
pub mod readback;
pub mod shaders;
pub mod smoke_3d;
pub mod texture;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Global flag indicating GPU device was lost
static GPU_DEVICE_LOST: AtomicBool = AtomicBool::new(false);

/// Check if the GPU device has been lost
pub fn is_device_lost() -> bool {
    GPU_DEVICE_LOST.load(Ordering::SeqCst)
}

/// Reset the device lost flag (call after recreating device)
pub fn reset_device_lost() {
    GPU_DEVICE_LOST.store(false, Ordering::SeqCst);
}

fn mark_device_lost() {
    GPU_DEVICE_LOST.store(true, Ordering::SeqCst);
}

/// GPU error type for device setup, allocation and readback
#[derive(Debug)]
pub enum GpuError {
    NoAdapter,
    RequestDevice(wgpu::RequestDeviceError),
    DeviceLost,
    BufferMapFailed(wgpu::BufferAsyncError),
    ChannelDisconnected,
    OutOfMemory { label: String, bytes: u64 },
    BufferTooLarge { label: String, bytes: u64, limit: u64 },
    NotInitialized,
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found"),
            GpuError::RequestDevice(e) => write!(f, "Device request failed: {}", e),
            GpuError::DeviceLost => write!(f, "GPU device lost"),
            GpuError::BufferMapFailed(e) => write!(f, "Buffer map failed: {:?}", e),
            GpuError::ChannelDisconnected => write!(f, "Channel disconnected"),
            GpuError::OutOfMemory { label, bytes } => {
                write!(f, "Out of device memory allocating {} ({} bytes)", label, bytes)
            }
            GpuError::BufferTooLarge { label, bytes, limit } => write!(
                f,
                "{} needs {} bytes, above the device binding limit of {}",
                label, bytes, limit
            ),
            GpuError::NotInitialized => write!(f, "Simulation is not initialized"),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::RequestDevice(e) => Some(e),
            _ => None,
        }
    }
}

/// Wait for a buffer map operation to complete, returning Result instead of panicking.
/// Use this instead of `rx.recv().unwrap().unwrap()`.
pub fn await_buffer_map(
    rx: std::sync::mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
) -> Result<(), GpuError> {
    if is_device_lost() {
        return Err(GpuError::DeviceLost);
    }
    match rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            log::error!("Buffer map failed: {:?}", e);
            Err(GpuError::BufferMapFailed(e))
        }
        Err(_) => {
            log::error!("Buffer map channel disconnected - possible device lost");
            mark_device_lost();
            Err(GpuError::ChannelDisconnected)
        }
    }
}

async fn request_adapter(instance: &wgpu::Instance, force_fallback_adapter: bool) -> Option<wgpu::Adapter> {
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter,
        })
        .await
}

/// Headless compute context: device and queue shared by every solver.
///
/// Cloning is cheap; all clones drive the same queue, so work submitted
/// through any of them executes in submission order.
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    pub async fn new_headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = match request_adapter(&instance, false).await {
            Some(adapter) => adapter,
            None => {
                // CPU rasterizers (lavapipe, WARP) still run every kernel.
                log::warn!("No hardware GPU adapter; trying the software fallback");
                request_adapter(&instance, true)
                    .await
                    .ok_or(GpuError::NoAdapter)?
            }
        };

        let adapter_info = adapter.get_info();
        log::info!("Using GPU: {:?}", adapter_info);

        // The largest scan tier runs 512 threads per group; ask for it when
        // the adapter has it and fall back to smaller tiers otherwise.
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_compute_invocations_per_workgroup: adapter_limits
                .max_compute_invocations_per_workgroup
                .min(512),
            max_compute_workgroup_size_x: adapter_limits.max_compute_workgroup_size_x.min(512),
            ..wgpu::Limits::default()
        }
        .using_resolution(adapter_limits);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Fluid Compute Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(GpuError::RequestDevice)?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("GPU uncaptured error: {:?}", error);
            if matches!(error, wgpu::Error::OutOfMemory { .. }) {
                mark_device_lost();
            }
        }));

        // Reset device lost flag for fresh device
        reset_device_lost();

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
        })
    }

    /// Blocking variant of [`GpuContext::new_headless`] for tests and tools.
    pub fn new_headless_blocking() -> Result<Self, GpuError> {
        pollster::block_on(Self::new_headless())
    }

    /// Largest workgroup this device accepts along x.
    pub fn max_workgroup_threads(&self) -> u32 {
        let limits = self.device.limits();
        limits
            .max_compute_invocations_per_workgroup
            .min(limits.max_compute_workgroup_size_x)
    }

    /// Fail fast once the device has reported itself lost.
    pub fn check_device(&self) -> Result<(), GpuError> {
        if is_device_lost() {
            return Err(GpuError::DeviceLost);
        }
        Ok(())
    }

    /// Encode one command with a fresh encoder and submit it immediately.
    pub(crate) fn submit_with(&self, label: &str, encode: impl FnOnce(&mut wgpu::CommandEncoder)) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        encode(&mut encoder);
        self.queue.submit(Some(encoder.finish()));
    }
}
