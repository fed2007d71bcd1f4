//! Planar multiplanar reconstruction.
//!
//! A plane is given by a normal, an approximate up vector and an offset along
//! the normal. Each output pixel maps to a point in normalised volume space
//! and is sampled through the shared [`Sampler`].

use image::{ImageBuffer, Rgba, RgbaImage};
use nalgebra::Vector3;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::enums::{Interpolation, Orientation};
use crate::sampler::Sampler;
use crate::telemetry::{IssueClass, RenderIssue};
use crate::volume::VolumeData;

const DEGENERATE_EPSILON: f32 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MprPlane {
    pub normal: Vector3<f32>,
    /// Need not be orthogonal to `normal`.
    pub up: Vector3<f32>,
    /// Offset along the normal in `[0, 1]`; 0.5 passes through the centre.
    pub position: f32,
    /// Overlay colour, not used for sampling.
    pub color: [f32; 3],
}

impl MprPlane {
    pub fn canonical(orientation: Orientation, position: f32) -> Self {
        match orientation {
            Orientation::Axial => Self {
                normal: Vector3::z(),
                up: Vector3::y(),
                position,
                color: [0.2, 0.6, 1.0],
            },
            Orientation::Sagittal => Self {
                normal: Vector3::x(),
                up: Vector3::y(),
                position,
                color: [1.0, 0.3, 0.3],
            },
            Orientation::Coronal => Self {
                normal: Vector3::y(),
                up: Vector3::z(),
                position,
                color: [0.3, 1.0, 0.4],
            },
        }
    }

    /// Axial, sagittal and coronal planes through the volume centre.
    pub fn default_set() -> [MprPlane; 3] {
        Orientation::ALL.map(|orientation| Self::canonical(orientation, 0.5))
    }
}

/// Orthonormal frame of a plane in normalised volume space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneBasis {
    pub normal: Vector3<f32>,
    pub right: Vector3<f32>,
    pub up: Vector3<f32>,
    pub center: Vector3<f32>,
}

impl PlaneBasis {
    /// Re-orthogonalise the plane's vectors. `None` when the normal is zero
    /// or parallel to `up`.
    pub fn try_new(plane: &MprPlane) -> Option<Self> {
        let normal = plane.normal.try_normalize(DEGENERATE_EPSILON)?;
        let right = plane.up.cross(&normal).try_normalize(DEGENERATE_EPSILON)?;
        Some(Self::from_frame(normal, right, plane.position))
    }

    /// Like [`Self::try_new`] but substitutes a usable normal or up vector.
    pub fn new(plane: &MprPlane) -> Self {
        if let Some(basis) = Self::try_new(plane) {
            return basis;
        }
        let normal = plane
            .normal
            .try_normalize(DEGENERATE_EPSILON)
            .unwrap_or_else(Vector3::z);
        let fallback_up = least_aligned_axis(&normal);
        let right = fallback_up.cross(&normal).normalize();
        Self::from_frame(normal, right, plane.position)
    }

    fn from_frame(normal: Vector3<f32>, right: Vector3<f32>, position: f32) -> Self {
        let up = normal.cross(&right).normalize();
        let position = if position.is_finite() {
            position.clamp(0.0, 1.0)
        } else {
            0.5
        };
        Self {
            normal,
            right,
            up,
            center: Vector3::repeat(0.5) + normal * (position - 0.5),
        }
    }

    /// Point for plane-local coordinates, each in `[-0.5, 0.5]` across the
    /// output image.
    #[inline]
    pub fn point(&self, u: f32, v: f32) -> Vector3<f32> {
        self.center + self.right * u + self.up * v
    }

    /// Plane-local coordinates of a point projected onto the plane.
    pub fn project(&self, point: &Vector3<f32>) -> (f32, f32) {
        let offset = point - self.center;
        (offset.dot(&self.right), offset.dot(&self.up))
    }
}

fn least_aligned_axis(normal: &Vector3<f32>) -> Vector3<f32> {
    let a = normal.abs();
    if a.x <= a.y && a.x <= a.z {
        Vector3::x()
    } else if a.y <= a.z {
        Vector3::y()
    } else {
        Vector3::z()
    }
}

/// Display window in raw intensity units.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WindowLevel {
    pub center: f32,
    pub width: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MprOptions {
    pub interpolation: Interpolation,
    /// Write black where the plane leaves the volume instead of the clamped
    /// boundary value.
    pub clip_outside: bool,
    /// Overrides the volume's min/max normalisation.
    pub window: Option<WindowLevel>,
}

pub struct MprImage {
    pub image: RgbaImage,
    pub issues: Vec<RenderIssue>,
}

/// Grey level for a raw sample.
#[inline]
pub(crate) fn to_gray(volume: &VolumeData, value: f32, window: Option<WindowLevel>) -> u8 {
    let normalized = match window {
        Some(WindowLevel { center, width }) if width > f32::EPSILON => {
            ((value - (center - width / 2.0)) / width).clamp(0.0, 1.0)
        }
        _ => volume.normalize(value),
    };
    (normalized * 255.0).round() as u8
}

#[inline]
pub(crate) fn inside_unit_cube(point: &Vector3<f32>) -> bool {
    point.iter().all(|c| (0.0..=1.0).contains(c))
}

#[derive(Clone, Debug, Default)]
pub struct MprReconstructor {
    pub options: MprOptions,
}

impl MprReconstructor {
    pub fn new(options: MprOptions) -> Self {
        Self { options }
    }

    /// Sample an oblique plane into a `width` x `height` grey RGBA image. A
    /// missing volume yields black.
    pub fn reconstruct(
        &self,
        volume: Option<&VolumeData>,
        plane: &MprPlane,
        width: u32,
        height: u32,
    ) -> MprImage {
        let mut issues = Vec::new();
        let basis = PlaneBasis::try_new(plane).unwrap_or_else(|| {
            issues.push(RenderIssue::new(
                IssueClass::DataShape,
                format!(
                    "degenerate MPR plane (normal {:?}, up {:?}), using fallback axes",
                    plane.normal, plane.up
                ),
            ));
            PlaneBasis::new(plane)
        });

        let Some(volume) = volume else {
            return MprImage {
                image: ImageBuffer::from_pixel(width, height, Rgba([0, 0, 0, 255])),
                issues,
            };
        };
        if volume.max_value() - volume.min_value() <= f32::EPSILON && self.options.window.is_none() {
            issues.push(RenderIssue::new(
                IssueClass::Numeric,
                "volume has an empty value range, MPR output is black",
            ));
        }

        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map_iter(move |y| {
                let v = y as f32 / height as f32 - 0.5;
                (0..width).flat_map(move |x| {
                    let u = x as f32 / width as f32 - 0.5;
                    let point = basis.point(u, v);
                    let gray = self.gray_at(volume, &point);
                    [gray, gray, gray, 255]
                })
            })
            .collect();

        let image = ImageBuffer::from_raw(width, height, pixel_data)
            .unwrap_or_else(|| ImageBuffer::new(width, height));
        MprImage { image, issues }
    }

    #[inline]
    pub(crate) fn gray_at(&self, volume: &VolumeData, point: &Vector3<f32>) -> u8 {
        if self.options.clip_outside && !inside_unit_cube(point) {
            return 0;
        }
        let value = Sampler::sample_at(volume, point, self.options.interpolation);
        to_gray(volume, value, self.options.window)
    }

    /// Output size that keeps physical proportions for a canonical plane,
    /// (width, height).
    pub fn canonical_dimensions(volume: &VolumeData, orientation: Orientation) -> (u32, u32) {
        let (depth, height, width) = volume.isotropic_dimensions();
        match orientation {
            Orientation::Axial => (width, height),
            Orientation::Sagittal => (depth, height),
            Orientation::Coronal => (width, depth),
        }
    }

    /// Axial, sagittal or coronal slice at `position` along the plane normal.
    pub fn canonical_slice(
        &self,
        volume: &VolumeData,
        orientation: Orientation,
        position: f32,
    ) -> MprImage {
        let (width, height) = Self::canonical_dimensions(volume, orientation);
        self.reconstruct(
            Some(volume),
            &MprPlane::canonical(orientation, position),
            width,
            height,
        )
    }
}

/// Shared 3D cursor linking several planes.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Crosshair {
    pub position: Vector3<f32>,
}

impl Default for Crosshair {
    fn default() -> Self {
        Self {
            position: Vector3::repeat(0.5),
        }
    }
}

impl Crosshair {
    /// Crosshair under a pixel of a `width` x `height` view of `plane`.
    pub fn from_pixel(plane: &MprPlane, x: f32, y: f32, width: u32, height: u32) -> Self {
        let basis = PlaneBasis::new(plane);
        let u = x / width.max(1) as f32 - 0.5;
        let v = y / height.max(1) as f32 - 0.5;
        Self {
            position: basis.point(u, v),
        }
    }

    /// Pixel of a `width` x `height` view of `plane` under the crosshair.
    pub fn to_pixel(&self, plane: &MprPlane, width: u32, height: u32) -> (f32, f32) {
        let basis = PlaneBasis::new(plane);
        let (u, v) = basis.project(&self.position);
        ((u + 0.5) * width as f32, (v + 0.5) * height as f32)
    }

    /// Plane offset that makes `plane` pass through the crosshair.
    pub fn plane_position(&self, plane: &MprPlane) -> f32 {
        let normal = PlaneBasis::new(plane).normal;
        (normal.dot(&(self.position - Vector3::repeat(0.5))) + 0.5).clamp(0.0, 1.0)
    }

    /// Move every plane so it passes through the crosshair.
    pub fn sync_planes(&self, planes: &mut [MprPlane]) {
        for plane in planes {
            plane.position = self.plane_position(plane);
        }
    }
}
