//! Blocking GPU buffer readback.
//!
//! Every readback is a synchronization point: the host waits until the
//! queue has finished all work submitted so far. Solvers only read back on
//! cold paths (diagnostics, optional scan totals, tests).

use std::sync::mpsc;

use bytemuck::Pod;

use super::{await_buffer_map, GpuContext, GpuError};

/// A mappable buffer that GPU data is copied into before the host reads it.
struct StagingBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

impl StagingBuffer {
    fn new(device: &wgpu::Device, label: &str, size: u64) -> Self {
        Self {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            size,
        }
    }

    fn copy_from(&self, ctx: &GpuContext, src: &wgpu::Buffer, offset: u64) {
        ctx.submit_with("Readback Copy", |encoder| {
            encoder.copy_buffer_to_buffer(src, offset, &self.buffer, 0, self.size)
        });
    }

    fn map_blocking(&self, ctx: &GpuContext) -> Result<(), GpuError> {
        let (tx, rx) = mpsc::channel();
        self.buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        ctx.device.poll(wgpu::Maintain::Wait);
        await_buffer_map(rx)
    }

    fn read<T: Pod>(&self) -> Vec<T> {
        let data = self.buffer.slice(..).get_mapped_range();
        let values = bytemuck::cast_slice::<u8, T>(&data).to_vec();
        drop(data);
        self.buffer.unmap();
        values
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

/// Copy `size` bytes of `src` starting at `offset` back to the host.
pub(crate) fn read_buffer<T: Pod>(
    ctx: &GpuContext,
    src: &wgpu::Buffer,
    offset: u64,
    size: u64,
) -> Result<Vec<T>, GpuError> {
    ctx.check_device()?;
    debug_assert!(offset % wgpu::COPY_BUFFER_ALIGNMENT == 0 && size % wgpu::COPY_BUFFER_ALIGNMENT == 0);
    let staging = StagingBuffer::new(&ctx.device, "Readback Staging", size);
    staging.copy_from(ctx, src, offset);
    staging.map_blocking(ctx)?;
    Ok(staging.read())
}
