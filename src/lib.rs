//! # DICOM volume rendering library
//!
//! This crate renders and reslices decoded DICOM volumes. It picks up where a
//! DICOM decoder leaves off: the caller hands over a voxel buffer with its
//! dimensions and spacing as a [`VolumeData`], and the crate provides
//!  - direct volume rendering by front-to-back ray casting, either on the CPU
//!    with rayon or in a wgpu compute shader
//!  - planar multiplanar reconstruction (MPR) along the axial, sagittal and
//!    coronal axes or any oblique plane, with a linked crosshair
//!  - curved MPR along an operator-drawn path
//!  - an adaptive level-of-detail controller that trades step size, texture
//!    size and output resolution for frame rate
//!
//! Every consumer reads voxels through the same [`Sampler`], so a voxel looks
//! the same in the 3D view as in any reslice. Nearest and trilinear
//! interpolation are supported; [`Interpolation::Cubic`] is currently
//! evaluated as trilinear.
//!
//! Voxel coordinates are normalised to `[0, 1]` on every axis. The volume is
//! placed in world space centred on the origin, scaled by its physical extent
//! so that the longest side is 1.
//!
//! # Examples
//!
//! ## Rendering a volume and an axial slice
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use dicom_volume_render::{Dimensions, VolumeData, VolumeRenderer, MprReconstructor, Orientation};
//! # use dicom_volume_render::transfer_function::{Preset, TransferFunction};
//! let voxels: Vec<u16> = vec![0; 256 * 256 * 128];
//! let volume = VolumeData::from_vec(Dimensions::new(256, 256, 128), voxels, (0.7, 0.7, 1.5))
//!     .expect("buffer should match dimensions");
//!
//! let slice = MprReconstructor::default().canonical_slice(&volume, Orientation::Axial, 0.5);
//! slice.image.save("axial.png").expect("should have saved slice");
//!
//! let mut renderer = VolumeRenderer::new();
//! renderer.set_volume(Arc::new(volume));
//! renderer.set_transfer_function(Arc::new(TransferFunction::preset(Preset::CtBone)));
//! let frame = futures::executor::block_on(renderer.render(512, 512))
//!     .expect("should have rendered a frame");
//! frame.image.save("volume.png").expect("should have saved frame");
//! ```
//!
//! ## Driving the render loop
//!
//! [`Viewer`] owns a renderer, the reconstructors and a [`LodController`],
//! and renders whenever its [`FrameScheduler`] fires. Level-of-detail changes
//! from [`Viewer::lod_tick`] take effect at the start of the next frame.

pub mod camera;
pub mod curved_mpr;
pub mod enums;
pub mod error;
pub mod gpu_context;
pub mod gpu_renderer;
pub mod gpu_resources;
pub mod lod;
pub mod mpr;
pub mod params;
pub mod raycast;
pub mod renderer;
pub mod sampler;
pub mod scheduler;
pub mod telemetry;
pub mod transfer_function;
pub mod viewer;
pub mod volume;

pub use camera::Camera;
pub use curved_mpr::{CurvedMprOptions, CurvedMprReconstructor, CurvedPath};
pub use enums::{DataType, Interpolation, Orientation, Processor, QualityLevel};
pub use error::{RenderError, VolumeError};
pub use gpu_context::GpuContext;
pub use lod::{LOD_LEVELS, LodConfig, LodController, LodLevel};
pub use mpr::{Crosshair, MprOptions, MprPlane, MprReconstructor, WindowLevel};
pub use params::RenderingParameters;
pub use renderer::{RenderOutput, RendererStatus, VolumeRenderer};
pub use sampler::Sampler;
pub use scheduler::{FrameScheduler, ManualScheduler, RenderLoop};
pub use telemetry::{IssueClass, RenderIssue, RenderingStats};
pub use transfer_function::{LookupTable, TransferFunction};
pub use viewer::Viewer;
pub use volume::{Dimensions, VolumeData};
