use std::borrow::Cow;

use image::{ImageBuffer, RgbaImage};
use nalgebra::Vector3;
use wgpu::{PollType, util::DeviceExt};

use crate::camera::CameraMatrices;
use crate::enums::Interpolation;
use crate::error::RenderError;
use crate::gpu_context::GpuContext;
use crate::gpu_resources::GpuResources;
use crate::params::RenderingParameters;
use crate::raycast::pixel_count;
use crate::transfer_function::LookupTable;
use crate::volume::VolumeData;

const WORKGROUP_SIZE: u32 = 8;

const FLAG_SHADING: u32 = 1;
const FLAG_JITTER: u32 = 2;
const FLAG_EARLY_TERMINATION: u32 = 4;
const FLAG_NEAREST: u32 = 8;

/// Layout must match `Uniforms` in `shaders/raycast.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    inv_view_proj: [[f32; 4]; 4],
    box_scale: [f32; 4],
    light: [f32; 4],
    volume_dims: [u32; 4],
    output: [u32; 4],
    march: [f32; 4],
}

pub struct GpuFrame {
    pub image: RgbaImage,
    pub samples_processed: u64,
    pub rays_terminated_early: u64,
}

/// Compute-shader ray caster. Owns its pipeline and, through
/// [`GpuResources`], the uploaded volume and lookup table.
pub struct GpuVolumeRenderer {
    context: GpuContext,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    resources: GpuResources,
    box_scale: Vector3<f32>,
}

impl GpuVolumeRenderer {
    pub async fn new(context: GpuContext) -> Result<Self, RenderError> {
        let (pipeline, bind_group_layout) = context
            .checked(Self::create_pipeline)
            .await
            .map_err(RenderError::Pipeline)?;

        let mut resources = GpuResources::new(context.clone());
        resources.upload_lut(&LookupTable::default());

        Ok(Self {
            context,
            pipeline,
            bind_group_layout,
            resources,
            box_scale: Vector3::repeat(1.0),
        })
    }

    fn create_pipeline(device: &wgpu::Device) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Volume Ray Cast Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/raycast.wgsl"))),
        });

        let storage = |read_only| wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        };
        let entry = |binding, ty| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Volume Ray Cast Bind Group Layout"),
            entries: &[
                // Normalised volume, read with textureLoad
                entry(
                    0,
                    wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                ),
                // Transfer function LUT
                entry(1, storage(true)),
                // Packed RGBA output
                entry(2, storage(false)),
                // Uniforms
                entry(
                    3,
                    wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                ),
                // Sample and early-termination counters
                entry(4, storage(false)),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Volume Ray Cast Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Volume Ray Cast Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        (pipeline, bind_group_layout)
    }

    pub fn resources(&self) -> &GpuResources {
        &self.resources
    }

    pub async fn upload_volume(
        &mut self,
        volume: &VolumeData,
        max_texture_size: u32,
    ) -> Result<(), RenderError> {
        self.resources.upload_volume(volume, max_texture_size).await?;
        self.box_scale = volume.physical_extent();
        Ok(())
    }

    pub fn upload_lut(&mut self, lut: &LookupTable) {
        self.resources.upload_lut(lut);
    }

    /// Drop the uploaded volume and lookup table.
    pub fn release(&mut self) {
        self.resources.release();
    }

    pub fn memory_usage(&self) -> u64 {
        self.resources.memory_usage()
    }

    pub async fn render(
        &self,
        matrices: &CameraMatrices,
        params: &RenderingParameters,
        width: u32,
        height: u32,
        seed: u32,
    ) -> Result<GpuFrame, RenderError> {
        let volume = self.resources.volume().ok_or(RenderError::MissingVolume)?;
        let lut = self.resources.lut().ok_or(RenderError::MissingVolume)?;
        let params = params.sanitized();

        let mut flags = 0;
        if params.enable_shading {
            flags |= FLAG_SHADING;
        }
        if params.enable_jittering {
            flags |= FLAG_JITTER;
        }
        if params.enable_early_ray_termination {
            flags |= FLAG_EARLY_TERMINATION;
        }
        if params.interpolation == Interpolation::Nearest {
            flags |= FLAG_NEAREST;
        }

        let uniforms = Uniforms {
            inv_view_proj: matrices.inverse_view_projection.into(),
            box_scale: [self.box_scale.x, self.box_scale.y, self.box_scale.z, 0.0],
            light: [params.ambient, params.diffuse, params.specular, params.shininess],
            volume_dims: [
                volume.dimensions.width as u32,
                volume.dimensions.height as u32,
                volume.dimensions.depth as u32,
                seed,
            ],
            output: [width, height, params.max_steps, flags],
            march: [params.step_size, params.gradient_threshold, 0.0, 0.0],
        };

        let device = &self.context.device;
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Ray Cast Uniform Buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let counter_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Ray Cast Counter Buffer"),
            contents: bytemuck::cast_slice(&[0u32; 2]),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        });

        let pixel_count = pixel_count(width, height);
        let output_size = pixel_count * std::mem::size_of::<u32>() as u64;
        let counter_size = 2 * std::mem::size_of::<u32>() as u64;
        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ray Cast Output Buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ray Cast Staging Buffer"),
            size: output_size + counter_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volume Ray Cast Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&volume.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lut.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: counter_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Volume Ray Cast Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Volume Ray Cast Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(
                width.div_ceil(WORKGROUP_SIZE),
                height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging_buffer, 0, output_size);
        encoder.copy_buffer_to_buffer(&counter_buffer, 0, &staging_buffer, output_size, counter_size);
        self.context.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.context
            .device
            .poll(PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| RenderError::Poll(e.to_string()))?;
        receiver.await.map_err(|_| RenderError::ReadbackCancelled)??;

        let data = buffer_slice.get_mapped_range();
        let words: &[u32] = bytemuck::cast_slice(&data);
        let (pixels, counters) = words.split_at(pixel_count as usize);
        let pixel_data: Vec<u8> = pixels.iter().flat_map(|word| word.to_le_bytes()).collect();
        let samples_processed = counters.first().copied().unwrap_or(0) as u64;
        let rays_terminated_early = counters.get(1).copied().unwrap_or(0) as u64;

        drop(data);
        staging_buffer.unmap();

        let image = ImageBuffer::from_raw(width, height, pixel_data)
            .ok_or_else(|| RenderError::Poll("frame size mismatch".to_string()))?;
        Ok(GpuFrame {
            image,
            samples_processed,
            rays_terminated_early,
        })
    }
}
