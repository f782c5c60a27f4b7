//! Typed GPU buffers.
//!
//! [`DeviceBuffer`] wraps a storage buffer of `T` with an explicit
//! lifecycle: it starts uninitialized, `init` (re)allocates it, `release`
//! frees it. Reallocation always drops the old allocation before creating
//! the new one so peak memory never holds both.

use std::marker::PhantomData;

use bytemuck::Pod;

use super::{readback, GpuContext, GpuError};

/// Create a buffer inside an out-of-memory error scope.
pub(crate) fn create_checked(
    ctx: &GpuContext,
    label: &str,
    size: u64,
    usage: wgpu::BufferUsages,
) -> Result<wgpu::Buffer, GpuError> {
    let limit = ctx.device.limits().max_storage_buffer_binding_size as u64;
    if usage.contains(wgpu::BufferUsages::STORAGE) && size > limit {
        return Err(GpuError::BufferTooLarge {
            label: label.to_string(),
            bytes: size,
            limit,
        });
    }
    ctx.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    });
    if let Some(error) = pollster::block_on(ctx.device.pop_error_scope()) {
        log::error!("Allocating {} ({} bytes) failed: {}", label, size, error);
        buffer.destroy();
        return Err(GpuError::OutOfMemory {
            label: label.to_string(),
            bytes: size,
        });
    }
    Ok(buffer)
}

/// GPU-resident array of `T`.
pub struct DeviceBuffer<T: Pod> {
    label: String,
    buffer: Option<wgpu::Buffer>,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> DeviceBuffer<T> {
    /// Create an uninitialized buffer handle; nothing is allocated yet.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            buffer: None,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Create and allocate `len` elements.
    pub fn with_len(ctx: &GpuContext, label: impl Into<String>, len: usize) -> Result<Self, GpuError> {
        let mut buffer = Self::new(label);
        buffer.init(ctx, len)?;
        Ok(buffer)
    }

    /// Create and fill from `data`.
    pub fn from_slice(ctx: &GpuContext, label: impl Into<String>, data: &[T]) -> Result<Self, GpuError> {
        let buffer = Self::with_len(ctx, label, data.len())?;
        buffer.write(ctx, data);
        Ok(buffer)
    }

    pub const fn stride() -> usize {
        std::mem::size_of::<T>()
    }

    /// (Re)allocate `len` zeroed elements, releasing any previous allocation first.
    pub fn init(&mut self, ctx: &GpuContext, len: usize) -> Result<(), GpuError> {
        assert!(len > 0, "{}: device buffers hold at least one element", self.label);
        assert!(
            Self::stride() > 0 && Self::stride() % 4 == 0,
            "{}: element stride {} is not a whole number of words",
            self.label,
            Self::stride()
        );
        self.release();
        let bytes = (len * Self::stride()) as u64;
        let buffer = create_checked(
            ctx,
            &self.label,
            bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        )?;
        log::debug!("{}: allocated {} x {} bytes", self.label, len, Self::stride());
        self.buffer = Some(buffer);
        self.len = len;
        Ok(())
    }

    /// Reallocate only when the element count differs. Returns whether it did.
    pub fn check_size_changed(&mut self, ctx: &GpuContext, len: usize) -> Result<bool, GpuError> {
        if self.is_initialized() && self.len == len {
            return Ok(false);
        }
        self.init(ctx, len)?;
        Ok(true)
    }

    /// Reallocate only when fewer than `len` elements are available.
    pub fn ensure_capacity(&mut self, ctx: &GpuContext, len: usize) -> Result<bool, GpuError> {
        if self.is_initialized() && self.len >= len {
            return Ok(false);
        }
        self.init(ctx, len)?;
        Ok(true)
    }

    pub fn release(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy();
        }
        self.len = 0;
    }

    pub fn is_initialized(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_bytes(&self) -> u64 {
        (self.len * Self::stride()) as u64
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Underlying wgpu buffer.
    ///
    /// # Panics
    /// Panics if the buffer has not been initialized.
    pub fn raw(&self) -> &wgpu::Buffer {
        match &self.buffer {
            Some(buffer) => buffer,
            None => panic!("{}: used before init", self.label),
        }
    }

    /// Upload exactly `len()` elements.
    pub fn write(&self, ctx: &GpuContext, data: &[T]) {
        assert_eq!(
            data.len(),
            self.len,
            "{}: write of {} elements into a buffer of {}",
            self.label,
            data.len(),
            self.len
        );
        ctx.queue.write_buffer(self.raw(), 0, bytemuck::cast_slice(data));
    }

    /// Upload `data` starting at element `offset`.
    pub fn write_at(&self, ctx: &GpuContext, offset: usize, data: &[T]) {
        assert!(
            offset + data.len() <= self.len,
            "{}: write of {}..{} past length {}",
            self.label,
            offset,
            offset + data.len(),
            self.len
        );
        if data.is_empty() {
            return;
        }
        ctx.queue.write_buffer(
            self.raw(),
            (offset * Self::stride()) as u64,
            bytemuck::cast_slice(data),
        );
    }

    /// Blocking readback of the whole buffer. Stalls until the queue drains;
    /// meant for diagnostics and tests, not the per-frame path.
    pub fn read(&self, ctx: &GpuContext) -> Result<Vec<T>, GpuError> {
        self.read_range(ctx, 0, self.len)
    }

    /// Blocking readback of `count` elements starting at `start`.
    pub fn read_range(&self, ctx: &GpuContext, start: usize, count: usize) -> Result<Vec<T>, GpuError> {
        assert!(
            start + count <= self.len,
            "{}: read of {}..{} past length {}",
            self.label,
            start,
            start + count,
            self.len
        );
        if count == 0 {
            return Ok(Vec::new());
        }
        readback::read_buffer(
            ctx,
            self.raw(),
            (start * Self::stride()) as u64,
            (count * Self::stride()) as u64,
        )
    }

    /// Zero every element.
    pub fn clear(&self, ctx: &GpuContext) {
        ctx.submit_with(&self.label, |encoder| encoder.clear_buffer(self.raw(), 0, None));
    }

    /// Copy all of `src` into this buffer; lengths must match.
    pub fn copy_from(&self, ctx: &GpuContext, src: &DeviceBuffer<T>) {
        assert_eq!(
            src.len, self.len,
            "copy from {} ({}) into {} ({})",
            src.label, src.len, self.label, self.len
        );
        ctx.submit_with(&self.label, |encoder| {
            encoder.copy_buffer_to_buffer(src.raw(), 0, self.raw(), 0, self.size_bytes())
        });
    }
}

/// Read/write pair of equally sized buffers with O(1) role swapping.
pub struct DoubleBuffer<T: Pod> {
    read: DeviceBuffer<T>,
    write: DeviceBuffer<T>,
}

impl<T: Pod> DoubleBuffer<T> {
    pub fn new(label: &str) -> Self {
        Self {
            read: DeviceBuffer::new(format!("{} A", label)),
            write: DeviceBuffer::new(format!("{} B", label)),
        }
    }

    pub fn init(&mut self, ctx: &GpuContext, len: usize) -> Result<(), GpuError> {
        self.release();
        self.read.init(ctx, len)?;
        self.write.init(ctx, len)
    }

    pub fn check_size_changed(&mut self, ctx: &GpuContext, len: usize) -> Result<bool, GpuError> {
        if self.read.is_initialized() && self.write.is_initialized() && self.len() == len {
            return Ok(false);
        }
        self.init(ctx, len)?;
        Ok(true)
    }

    /// Exchange the read and write roles without touching the data.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }

    pub fn read(&self) -> &DeviceBuffer<T> {
        &self.read
    }

    pub fn write(&self) -> &DeviceBuffer<T> {
        &self.write
    }

    /// Copy the read buffer's contents into the write buffer.
    pub fn copy_read_to_write(&self, ctx: &GpuContext) {
        self.write.copy_from(ctx, &self.read);
    }

    pub fn len(&self) -> usize {
        self.read.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty()
    }

    pub fn release(&mut self) {
        self.read.release();
        self.write.release();
    }
}

/// Small uniform block of parameters, rewritten before the dispatches that read it.
pub struct UniformBuffer<T: Pod> {
    buffer: wgpu::Buffer,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    pub fn new(ctx: &GpuContext, label: &str) -> Self {
        let size = std::mem::size_of::<T>() as u64;
        assert!(size % 16 == 0, "{}: uniform size {} is not 16-byte aligned", label, size);
        Self {
            buffer: ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            _marker: PhantomData,
        }
    }

    pub fn write(&self, ctx: &GpuContext, value: &T) {
        ctx.queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(value));
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}
