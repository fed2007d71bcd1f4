//! Ownership of the GPU-resident copies of a volume and its lookup table.
//!
//! A new volume is only uploaded after the previous texture has been
//! destroyed, and [`GpuResources::release`] tears down everything at once.

use wgpu::util::DeviceExt;

use crate::error::RenderError;
use crate::gpu_context::GpuContext;
use crate::transfer_function::LookupTable;
use crate::volume::{Dimensions, VolumeData};

pub struct VolumeTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub dimensions: Dimensions,
    /// The texture-size cap this upload was made for.
    pub max_texture_size: u32,
}

pub struct LutBuffer {
    pub buffer: wgpu::Buffer,
    pub entries: usize,
}

pub struct GpuResources {
    context: GpuContext,
    volume: Option<VolumeTexture>,
    lut: Option<LutBuffer>,
}

impl GpuResources {
    pub fn new(context: GpuContext) -> Self {
        Self {
            context,
            volume: None,
            lut: None,
        }
    }

    pub fn volume(&self) -> Option<&VolumeTexture> {
        self.volume.as_ref()
    }

    pub fn lut(&self) -> Option<&LutBuffer> {
        self.lut.as_ref()
    }

    /// Upload normalised intensities as an `R32Float` 3D texture, shrinking the
    /// volume first so no side exceeds `max_texture_size` or the device limit.
    pub async fn upload_volume(
        &mut self,
        volume: &VolumeData,
        max_texture_size: u32,
    ) -> Result<(), RenderError> {
        self.release_volume();

        let cap = max_texture_size.min(self.context.max_texture_dimension_3d()).max(1);
        let fitted = volume.resampled_to_fit(cap as usize);
        let dimensions = fitted.dimensions();
        let (width, height, depth) = (
            dimensions.width as u32,
            dimensions.height as u32,
            dimensions.depth as u32,
        );

        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };

        let texture = self
            .context
            .checked(|device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("Volume 3D Texture"),
                    size: texture_size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D3,
                    format: wgpu::TextureFormat::R32Float,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                })
            })
            .await
            .map_err(RenderError::TextureAllocation)?;

        let samples = fitted.normalized_samples();
        self.context.queue.write_texture(
            wgpu::TexelCopyTextureInfoBase {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&samples),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(std::mem::size_of::<f32>() as u32 * width),
                rows_per_image: Some(height),
            },
            texture_size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::info!(
            "Uploaded volume texture {width}x{height}x{depth} (source {}x{}x{})",
            volume.dimensions().width,
            volume.dimensions().height,
            volume.dimensions().depth
        );

        self.volume = Some(VolumeTexture {
            texture,
            view,
            dimensions,
            max_texture_size,
        });
        Ok(())
    }

    pub fn upload_lut(&mut self, lut: &LookupTable) {
        if let Some(old) = self.lut.take() {
            old.buffer.destroy();
        }
        let buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Transfer Function LUT"),
                contents: bytemuck::cast_slice(&lut.to_rgba_f32()),
                usage: wgpu::BufferUsages::STORAGE,
            });
        log::debug!("Uploaded transfer function LUT with {} entries", lut.len());
        self.lut = Some(LutBuffer {
            buffer,
            entries: lut.len(),
        });
    }

    fn release_volume(&mut self) {
        if let Some(volume) = self.volume.take() {
            volume.texture.destroy();
            log::debug!("Released volume texture");
        }
    }

    /// Destroy every GPU resource this manager owns.
    pub fn release(&mut self) {
        self.release_volume();
        if let Some(lut) = self.lut.take() {
            lut.buffer.destroy();
        }
    }

    pub fn memory_usage(&self) -> u64 {
        let volume = self.volume.as_ref().map_or(0, |v| {
            v.dimensions.voxel_count() as u64 * std::mem::size_of::<f32>() as u64
        });
        let lut = self
            .lut
            .as_ref()
            .map_or(0, |l| (l.entries * 4 * std::mem::size_of::<f32>()) as u64);
        volume + lut
    }
}

impl Drop for GpuResources {
    fn drop(&mut self) {
        self.release();
    }
}
