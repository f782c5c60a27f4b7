//! 3D storage texture written by compute kernels and sampled by renderers.

use glam::UVec3;

use super::buffer::create_checked;
use super::{readback, GpuContext, GpuError};

/// Single-channel `r32float` volume.
pub struct StorageTexture3D {
    label: String,
    texture: Option<(wgpu::Texture, wgpu::TextureView)>,
    size: UVec3,
}

impl StorageTexture3D {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            texture: None,
            size: UVec3::ZERO,
        }
    }

    /// (Re)allocate a `size` volume, releasing the previous one first.
    pub fn init(&mut self, ctx: &GpuContext, size: UVec3) -> Result<(), GpuError> {
        assert!(size.min_element() > 0, "{}: empty texture {:?}", self.label, size);
        self.release();
        let bytes = 4 * size.x as u64 * size.y as u64 * size.z as u64;
        ctx.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&self.label),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: size.z,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        if let Some(error) = pollster::block_on(ctx.device.pop_error_scope()) {
            log::error!("Allocating {} ({} bytes) failed: {}", self.label, bytes, error);
            texture.destroy();
            return Err(GpuError::OutOfMemory {
                label: self.label.clone(),
                bytes,
            });
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("{}: allocated {:?} volume", self.label, size);
        self.texture = Some((texture, view));
        self.size = size;
        Ok(())
    }

    pub fn check_size_changed(&mut self, ctx: &GpuContext, size: UVec3) -> Result<bool, GpuError> {
        if self.is_initialized() && self.size == size {
            return Ok(false);
        }
        self.init(ctx, size)?;
        Ok(true)
    }

    pub fn release(&mut self) {
        if let Some((texture, _)) = self.texture.take() {
            texture.destroy();
        }
        self.size = UVec3::ZERO;
    }

    pub fn is_initialized(&self) -> bool {
        self.texture.is_some()
    }

    pub fn size(&self) -> UVec3 {
        self.size
    }

    pub fn raw(&self) -> &wgpu::Texture {
        match &self.texture {
            Some((texture, _)) => texture,
            None => panic!("{}: used before init", self.label),
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        match &self.texture {
            Some((_, view)) => view,
            None => panic!("{}: used before init", self.label),
        }
    }

    /// Blocking readback in `x + size.x * (y + size.y * z)` order.
    pub fn read(&self, ctx: &GpuContext) -> Result<Vec<f32>, GpuError> {
        let row_bytes = 4 * self.size.x;
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let rows = self.size.y * self.size.z;
        let size = padded_row as u64 * rows as u64;
        let staging = create_checked(
            ctx,
            &format!("{} Copy", self.label),
            size,
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        )?;
        ctx.submit_with(&self.label, |encoder| {
            encoder.copy_texture_to_buffer(
                wgpu::ImageCopyTexture {
                    texture: self.raw(),
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::ImageCopyBuffer {
                    buffer: &staging,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row),
                        rows_per_image: Some(self.size.y),
                    },
                },
                wgpu::Extent3d {
                    width: self.size.x,
                    height: self.size.y,
                    depth_or_array_layers: self.size.z,
                },
            );
        });
        let padded: Vec<f32> = readback::read_buffer(ctx, &staging, 0, size)?;
        staging.destroy();

        let stride = (padded_row / 4) as usize;
        let width = self.size.x as usize;
        Ok(padded
            .chunks(stride)
            .flat_map(|row| row[..width].iter().copied())
            .collect())
    }
}
