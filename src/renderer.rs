use std::sync::Arc;

use image::RgbaImage;
use web_time::Instant;

use crate::camera::Camera;
use crate::enums::Processor;
use crate::gpu_context::GpuContext;
use crate::gpu_renderer::GpuVolumeRenderer;
use crate::lod::{LOD_LEVELS, LodLevel};
use crate::params::RenderingParameters;
use crate::raycast::RayCaster;
use crate::telemetry::{IssueClass, RenderingStats};
use crate::transfer_function::{LUT_RESOLUTION, LookupTable, TransferFunction};
use crate::volume::VolumeData;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RendererStatus {
    Ready,
    /// A GPU resource could not be created; frames are skipped.
    Unavailable { reason: String },
}

pub struct RenderOutput {
    pub image: RgbaImage,
    pub stats: RenderingStats,
}

enum Backend {
    Cpu,
    Gpu(Box<GpuVolumeRenderer>),
}

/// Volume renderer facade. Holds the current volume, transfer function,
/// camera and parameters; each [`VolumeRenderer::render`] call produces one
/// frame from whatever state was set before it.
pub struct VolumeRenderer {
    backend: Backend,
    status: RendererStatus,
    volume: Option<Arc<VolumeData>>,
    transfer_function: Arc<TransferFunction>,
    lut: LookupTable,
    params: RenderingParameters,
    camera: Camera,
    lod_level: LodLevel,
    volume_dirty: bool,
    lut_dirty: bool,
    frame_counter: u64,
    last_stats: RenderingStats,
}

impl VolumeRenderer {
    fn with_backend(backend: Backend, status: RendererStatus) -> Self {
        let transfer_function = Arc::new(TransferFunction::default());
        let lut = LookupTable::build(&transfer_function, LUT_RESOLUTION);
        Self {
            backend,
            status,
            volume: None,
            transfer_function,
            lut,
            params: RenderingParameters::default(),
            camera: Camera::default(),
            lod_level: LOD_LEVELS[3],
            volume_dirty: false,
            lut_dirty: true,
            frame_counter: 0,
            last_stats: RenderingStats::default(),
        }
    }

    /// A renderer that ray casts on the CPU.
    pub fn new() -> Self {
        Self::with_backend(Backend::Cpu, RendererStatus::Ready)
    }

    /// A renderer backed by a wgpu compute pipeline. Pipeline creation
    /// failures leave the renderer unavailable instead of returning an error.
    pub async fn with_gpu(context: GpuContext) -> Self {
        match GpuVolumeRenderer::new(context).await {
            Ok(gpu) => Self::with_backend(Backend::Gpu(Box::new(gpu)), RendererStatus::Ready),
            Err(error) => {
                let mut renderer = Self::with_backend(
                    Backend::Cpu,
                    RendererStatus::Unavailable {
                        reason: error.to_string(),
                    },
                );
                renderer
                    .last_stats
                    .record(IssueClass::Resource, format!("GPU renderer unavailable: {error}"));
                renderer
            }
        }
    }

    pub fn processor(&self) -> Processor {
        match self.backend {
            Backend::Cpu => Processor::CPU,
            Backend::Gpu(_) => Processor::GPU,
        }
    }

    pub fn status(&self) -> &RendererStatus {
        &self.status
    }

    pub fn is_available(&self) -> bool {
        self.status == RendererStatus::Ready
    }

    pub fn volume(&self) -> Option<&Arc<VolumeData>> {
        self.volume.as_ref()
    }

    /// Replace the active volume. The previous GPU upload is released
    /// immediately; the new one happens at the start of the next frame.
    pub fn set_volume(&mut self, volume: Arc<VolumeData>) {
        self.release_gpu();
        log::info!(
            "Volume set: {:?}, {:?}",
            volume.dimensions(),
            volume.data_type()
        );
        self.volume = Some(volume);
        self.volume_dirty = true;
        self.lut_dirty = true;
    }

    pub fn clear_volume(&mut self) {
        self.release_gpu();
        self.volume = None;
        self.volume_dirty = false;
    }

    pub fn transfer_function(&self) -> &Arc<TransferFunction> {
        &self.transfer_function
    }

    pub fn lookup_table(&self) -> &LookupTable {
        &self.lut
    }

    /// Swap the transfer function, rebuilding the lookup table when the
    /// reference changed.
    pub fn set_transfer_function(&mut self, transfer_function: Arc<TransferFunction>) {
        if Arc::ptr_eq(&self.transfer_function, &transfer_function) {
            return;
        }
        self.lut = LookupTable::build(&transfer_function, LUT_RESOLUTION);
        self.transfer_function = transfer_function;
        self.lut_dirty = true;
        log::debug!("Transfer function changed, LUT rebuilt");
    }

    pub fn parameters(&self) -> &RenderingParameters {
        &self.params
    }

    pub fn set_parameters(&mut self, params: RenderingParameters) {
        self.params = params.sanitized();
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    pub fn lod_level(&self) -> &LodLevel {
        &self.lod_level
    }

    /// Take step size, step budget and texture cap from a level of detail.
    pub fn apply_lod(&mut self, level: &LodLevel) {
        if level.max_texture_size != self.lod_level.max_texture_size && self.volume.is_some() {
            self.volume_dirty = true;
        }
        self.params.apply_lod(level);
        self.lod_level = *level;
    }

    pub fn stats(&self) -> &RenderingStats {
        &self.last_stats
    }

    pub fn memory_usage(&self) -> u64 {
        let volume = self.volume.as_ref().map_or(0, |v| v.byte_size() as u64);
        let gpu = match &self.backend {
            Backend::Gpu(gpu) => gpu.memory_usage(),
            Backend::Cpu => 0,
        };
        volume + gpu + (self.lut.len() * 4 * std::mem::size_of::<f32>()) as u64
    }

    /// Release every GPU resource the renderer owns.
    pub fn release_gpu(&mut self) {
        if let Backend::Gpu(gpu) = &mut self.backend {
            gpu.release();
            self.volume_dirty = self.volume.is_some();
            self.lut_dirty = true;
        }
    }

    fn mark_unavailable(&mut self, stats: &mut RenderingStats, reason: String) {
        stats.record(IssueClass::Resource, reason.clone());
        self.status = RendererStatus::Unavailable { reason };
    }

    /// Render one frame. Returns `None` when there is no volume or the
    /// renderer is unavailable; the reason is kept in [`Self::stats`].
    pub async fn render(&mut self, width: u32, height: u32) -> Option<RenderOutput> {
        let started = Instant::now();
        let mut stats = RenderingStats {
            lod_level: self.lod_level.level,
            ..RenderingStats::default()
        };

        if let RendererStatus::Unavailable { reason } = &self.status {
            stats.record(IssueClass::Resource, format!("renderer unavailable: {reason}"));
            self.last_stats = stats;
            return None;
        }
        let volume = self.volume.clone()?;

        if width == 0 || height == 0 {
            stats.record(IssueClass::DataShape, "zero-sized output requested");
            self.last_stats = stats;
            return None;
        }

        self.frame_counter = self.frame_counter.wrapping_add(1);
        let seed = self.frame_counter;

        let image = match &mut self.backend {
            Backend::Cpu => {
                let frame = RayCaster::new(&volume, &self.lut, &self.params).render(
                    &self.camera,
                    width,
                    height,
                    seed,
                );
                stats.rays_cast = frame.stats.rays_cast;
                stats.samples_processed = frame.stats.samples_processed;
                stats.rays_terminated_early = frame.stats.rays_terminated_early;
                stats.issues.extend(frame.stats.issues);
                frame.image
            }
            Backend::Gpu(gpu) => {
                if self.volume_dirty {
                    if let Err(error) = gpu
                        .upload_volume(&volume, self.lod_level.max_texture_size)
                        .await
                    {
                        self.mark_unavailable(&mut stats, error.to_string());
                        self.last_stats = stats;
                        return None;
                    }
                    self.volume_dirty = false;
                }
                if self.lut_dirty {
                    gpu.upload_lut(&self.lut);
                    self.lut_dirty = false;
                }

                let Some(matrices) = self.camera.matrices(width as f32 / height as f32) else {
                    stats.record(IssueClass::DataShape, "degenerate camera, frame left blank");
                    self.last_stats = stats;
                    return Some(RenderOutput {
                        image: RgbaImage::new(width, height),
                        stats: self.last_stats.clone(),
                    });
                };

                match gpu
                    .render(&matrices, &self.params, width, height, seed as u32)
                    .await
                {
                    Ok(frame) => {
                        stats.rays_cast = width as u64 * height as u64;
                        stats.samples_processed = frame.samples_processed;
                        stats.rays_terminated_early = frame.rays_terminated_early;
                        frame.image
                    }
                    Err(error) => {
                        self.mark_unavailable(&mut stats, error.to_string());
                        self.last_stats = stats;
                        return None;
                    }
                }
            }
        };

        stats.frame_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        stats.memory_usage_bytes = self.memory_usage();
        self.last_stats = stats.clone();
        Some(RenderOutput { image, stats })
    }
}

impl Default for VolumeRenderer {
    fn default() -> Self {
        Self::new()
    }
}
