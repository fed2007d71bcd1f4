//! Curved multiplanar reconstruction along an operator-drawn path.
//!
//! The path is optionally densified with a Catmull-Rom spline and smoothed,
//! then resampled to `resolution` points spaced evenly by arc length. Each
//! output column is one path point; each row steps along the binormal across
//! the slab thickness.

use image::{ImageBuffer, Rgba, RgbaImage};
use nalgebra::Vector3;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::enums::Interpolation;
use crate::mpr::{WindowLevel, to_gray};
use crate::sampler::Sampler;
use crate::telemetry::{IssueClass, RenderIssue};
use crate::volume::VolumeData;

const LENGTH_EPSILON: f32 = 1e-6;
/// Above this |tangent . Z| the frame is built against X instead.
const PARALLEL_THRESHOLD: f32 = 0.9;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurvedPath {
    points: Vec<Vector3<f32>>,
    /// Slab thickness in normalised volume units.
    pub thickness: f32,
    /// Number of samples along the path, i.e. the output width.
    pub resolution: usize,
}

impl Default for CurvedPath {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            thickness: 0.1,
            resolution: 256,
        }
    }
}

impl CurvedPath {
    pub fn new(points: Vec<Vector3<f32>>, thickness: f32, resolution: usize) -> Self {
        Self {
            points,
            thickness,
            resolution,
        }
    }

    pub fn points(&self) -> &[Vector3<f32>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push_point(&mut self, point: Vector3<f32>) {
        self.points.push(point);
    }

    /// Insert before `index`; an index past the end appends.
    pub fn insert_point(&mut self, index: usize, point: Vector3<f32>) {
        let index = index.min(self.points.len());
        self.points.insert(index, point);
    }

    pub fn remove_point(&mut self, index: usize) -> Option<Vector3<f32>> {
        (index < self.points.len()).then(|| self.points.remove(index))
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Sum of the straight segment lengths between control points.
    pub fn path_length(&self) -> f32 {
        polyline_length(&self.points)
    }
}

pub fn polyline_length(points: &[Vector3<f32>]) -> f32 {
    points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
}

/// `count` points spaced evenly by arc length along the polyline. Empty when
/// there are fewer than two points or the polyline has no length.
pub fn resample_uniform(points: &[Vector3<f32>], count: usize) -> Vec<Vector3<f32>> {
    if points.len() < 2 || count == 0 {
        return Vec::new();
    }

    let mut cumulative = Vec::with_capacity(points.len());
    cumulative.push(0.0f32);
    for w in points.windows(2) {
        let last = cumulative[cumulative.len() - 1];
        cumulative.push(last + (w[1] - w[0]).norm());
    }
    let total = cumulative[cumulative.len() - 1];
    if total <= LENGTH_EPSILON {
        return Vec::new();
    }
    if count == 1 {
        return vec![points[0]];
    }

    let last_segment = points.len() - 1;
    (0..count)
        .map(|i| {
            let target = total * i as f32 / (count - 1) as f32;
            let segment = cumulative
                .partition_point(|&d| d < target)
                .clamp(1, last_segment);
            let start = cumulative[segment - 1];
            let length = cumulative[segment] - start;
            let t = if length > LENGTH_EPSILON {
                ((target - start) / length).clamp(0.0, 1.0)
            } else {
                0.0
            };
            points[segment - 1].lerp(&points[segment], t)
        })
        .collect()
}

/// Moving average with a half-window of `factor * n / 5` points. The first
/// and last points are kept in place.
pub fn smooth(points: &[Vector3<f32>], factor: f32) -> Vec<Vector3<f32>> {
    let n = points.len();
    let factor = if factor.is_finite() { factor.clamp(0.0, 1.0) } else { 0.0 };
    let half = (factor * n as f32 / 5.0).round() as usize;
    if n < 3 || half == 0 {
        return points.to_vec();
    }

    (0..n)
        .map(|i| {
            if i == 0 || i == n - 1 {
                return points[i];
            }
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(n - 1);
            let sum: Vector3<f32> = points[lo..=hi].iter().sum();
            sum / (hi - lo + 1) as f32
        })
        .collect()
}

/// Uniform Catmull-Rom spline through every control point, with
/// `samples_per_segment` points per segment. End segments repeat their
/// endpoint as the outer control point.
pub fn catmull_rom(points: &[Vector3<f32>], samples_per_segment: usize) -> Vec<Vector3<f32>> {
    let n = points.len();
    if n < 2 || samples_per_segment <= 1 {
        return points.to_vec();
    }

    let mut curve = Vec::with_capacity((n - 1) * samples_per_segment + 1);
    for i in 0..n - 1 {
        let p0 = points[i.saturating_sub(1)];
        let p1 = points[i];
        let p2 = points[i + 1];
        let p3 = points[(i + 2).min(n - 1)];
        for s in 0..samples_per_segment {
            let t = s as f32 / samples_per_segment as f32;
            let t2 = t * t;
            let t3 = t2 * t;
            let point = (p1 * 2.0
                + (p2 - p0) * t
                + (p0 * 2.0 - p1 * 5.0 + p2 * 4.0 - p3) * t2
                + (p1 * 3.0 - p0 - p2 * 3.0 + p3) * t3)
                * 0.5;
            curve.push(point);
        }
    }
    curve.push(points[n - 1]);
    curve
}

/// Local frame at one path sample.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathFrame {
    pub point: Vector3<f32>,
    pub tangent: Vector3<f32>,
    pub normal: Vector3<f32>,
    pub binormal: Vector3<f32>,
}

/// Tangent, normal and binormal at every point. Tangents use central
/// differences with one-sided differences at the ends; a repeated point
/// inherits the previous tangent.
pub fn compute_frames(points: &[Vector3<f32>]) -> Vec<PathFrame> {
    let n = points.len();
    let mut frames = Vec::with_capacity(n);
    let mut previous_tangent = Vector3::x();

    for i in 0..n {
        let difference = match (i.checked_sub(1), (i + 1 < n).then_some(i + 1)) {
            (Some(prev), Some(next)) => points[next] - points[prev],
            (None, Some(next)) => points[next] - points[i],
            (Some(prev), None) => points[i] - points[prev],
            (None, None) => Vector3::zeros(),
        };
        let tangent = difference
            .try_normalize(LENGTH_EPSILON)
            .unwrap_or(previous_tangent);
        previous_tangent = tangent;

        let reference = if tangent.dot(&Vector3::z()).abs() > PARALLEL_THRESHOLD {
            Vector3::x()
        } else {
            Vector3::z()
        };
        let normal = tangent.cross(&reference).normalize();
        let binormal = tangent.cross(&normal);

        frames.push(PathFrame {
            point: points[i],
            tangent,
            normal,
            binormal,
        });
    }
    frames
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurvedMprOptions {
    /// 0 disables smoothing, 1 averages over the widest window.
    pub smoothing_factor: f32,
    /// Catmull-Rom samples per control segment; 0 or 1 keeps the polyline.
    pub spline_samples_per_segment: usize,
    /// Rows across the slab, i.e. the output height.
    pub thickness_samples: u32,
    pub interpolation: Interpolation,
    pub window: Option<WindowLevel>,
}

impl Default for CurvedMprOptions {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.0,
            spline_samples_per_segment: 0,
            thickness_samples: 32,
            interpolation: Interpolation::Trilinear,
            window: None,
        }
    }
}

pub struct CurvedReconstruction {
    pub image: RgbaImage,
    pub path_length: f32,
    /// Frames at every output column, for overlays.
    pub frames: Vec<PathFrame>,
    pub issues: Vec<RenderIssue>,
}

#[derive(Clone, Debug, Default)]
pub struct CurvedMprReconstructor {
    pub options: CurvedMprOptions,
}

impl CurvedMprReconstructor {
    pub fn new(options: CurvedMprOptions) -> Self {
        Self { options }
    }

    /// The processed path: spline, smoothing, then arc-length resampling.
    pub fn sample_path(&self, path: &CurvedPath) -> Vec<Vector3<f32>> {
        let mut points = path.points().to_vec();
        if self.options.spline_samples_per_segment > 1 {
            points = catmull_rom(&points, self.options.spline_samples_per_segment);
        }
        if self.options.smoothing_factor > 0.0 {
            points = smooth(&points, self.options.smoothing_factor);
        }
        resample_uniform(&points, path.resolution)
    }

    pub fn reconstruct(&self, volume: Option<&VolumeData>, path: &CurvedPath) -> CurvedReconstruction {
        let mut issues = Vec::new();
        let path_length = path.path_length();
        let height = self.options.thickness_samples.max(1);

        if path.len() < 2 {
            issues.push(RenderIssue::new(
                IssueClass::DataShape,
                format!("curved path needs at least 2 points, got {}", path.len()),
            ));
        } else if path_length <= LENGTH_EPSILON {
            issues.push(RenderIssue::new(
                IssueClass::Numeric,
                "curved path has zero length",
            ));
        }

        let frames = compute_frames(&self.sample_path(path));
        if frames.is_empty() {
            return CurvedReconstruction {
                image: RgbaImage::new(0, height),
                path_length,
                frames,
                issues,
            };
        }

        let width = frames.len() as u32;
        let Some(volume) = volume else {
            return CurvedReconstruction {
                image: ImageBuffer::from_pixel(width, height, Rgba([0, 0, 0, 255])),
                path_length,
                frames,
                issues,
            };
        };

        let thickness = if path.thickness.is_finite() {
            path.thickness.max(0.0)
        } else {
            0.0
        };
        let offset = |y: u32| {
            if height <= 1 {
                0.0
            } else {
                thickness * (y as f32 / (height - 1) as f32 - 0.5)
            }
        };

        let options = self.options;
        let frames_ref = &frames;
        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map_iter(move |y| {
                let offset = offset(y);
                frames_ref.iter().flat_map(move |frame| {
                    let point = frame.point + frame.binormal * offset;
                    let value = Sampler::sample_at(volume, &point, options.interpolation);
                    let gray = to_gray(volume, value, options.window);
                    [gray, gray, gray, 255]
                })
            })
            .collect();

        let image = ImageBuffer::from_raw(width, height, pixel_data)
            .unwrap_or_else(|| ImageBuffer::new(width, height));
        CurvedReconstruction {
            image,
            path_length,
            frames,
            issues,
        }
    }
}
