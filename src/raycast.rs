//! CPU front-to-back ray caster.
//!
//! This is the reference implementation of the compositing model; the WGSL
//! compute shader in `shaders/raycast.wgsl` mirrors it step for step. The
//! volume occupies a box centred on the world origin whose size is
//! [`VolumeData::physical_extent`], and rays are marched in normalised volume
//! coordinates where that box is the unit cube.

use image::{ImageBuffer, Rgba, RgbaImage};
use nalgebra::Vector3;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;

use crate::camera::{Camera, CameraMatrices};
use crate::params::RenderingParameters;
use crate::sampler::Sampler;
use crate::telemetry::{IssueClass, RenderingStats};
use crate::transfer_function::LookupTable;
use crate::volume::VolumeData;

/// Accumulated alpha above which a ray stops when early termination is on.
pub const EARLY_TERMINATION_ALPHA: f32 = 0.95;
/// Normalised intensities below this are skipped before the table lookup.
pub const INTENSITY_EPSILON: f32 = 0.001;

/// Result of marching one ray.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RaySample {
    /// Colour composited over black, plus accumulated alpha.
    pub rgba: [f32; 4],
    pub samples: u32,
    pub terminated_early: bool,
}

impl RaySample {
    fn to_pixel(self) -> [u8; 4] {
        self.rgba.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

/// Number of pixels in a `width` x `height` frame, widened before multiplying.
pub(crate) fn pixel_count(width: u32, height: u32) -> u64 {
    u64::from(width) * u64::from(height)
}

pub struct RayCastFrame {
    pub image: RgbaImage,
    pub stats: RenderingStats,
}

#[derive(Default)]
struct RowCounters {
    rays: u64,
    samples: u64,
    terminated: u64,
}

pub struct RayCaster<'a> {
    volume: &'a VolumeData,
    lut: &'a LookupTable,
    params: RenderingParameters,
    box_scale: Vector3<f32>,
}

impl<'a> RayCaster<'a> {
    pub fn new(volume: &'a VolumeData, lut: &'a LookupTable, params: &RenderingParameters) -> Self {
        Self {
            volume,
            lut,
            params: params.sanitized(),
            box_scale: volume.physical_extent(),
        }
    }

    /// Render a full frame. `seed` drives jittering so a frame is reproducible.
    pub fn render(&self, camera: &Camera, width: u32, height: u32, seed: u64) -> RayCastFrame {
        let mut stats = RenderingStats::default();
        let background = || ImageBuffer::from_pixel(width, height, Rgba([0, 0, 0, 0]));

        if width == 0 || height == 0 {
            stats.record(IssueClass::DataShape, "zero-sized output requested");
            return RayCastFrame {
                image: background(),
                stats,
            };
        }

        let Some(matrices) = camera.matrices(width as f32 / height as f32) else {
            stats.record(IssueClass::DataShape, "degenerate camera, frame left blank");
            return RayCastFrame {
                image: background(),
                stats,
            };
        };

        let rows: Vec<(Vec<u8>, RowCounters)> = (0..height)
            .into_par_iter()
            .map(|y| self.render_row(&matrices, y, width, height, seed))
            .collect();

        let mut pixel_data = Vec::with_capacity(pixel_count(width, height) as usize * 4);
        for (row, counters) in rows {
            pixel_data.extend_from_slice(&row);
            stats.rays_cast += counters.rays;
            stats.samples_processed += counters.samples;
            stats.rays_terminated_early += counters.terminated;
        }

        let image = ImageBuffer::from_raw(width, height, pixel_data).unwrap_or_else(background);
        RayCastFrame { image, stats }
    }

    fn render_row(
        &self,
        matrices: &CameraMatrices,
        y: u32,
        width: u32,
        height: u32,
        seed: u64,
    ) -> (Vec<u8>, RowCounters) {
        let mut rng = SmallRng::seed_from_u64(seed ^ (y as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut row = Vec::with_capacity(width as usize * 4);
        let mut counters = RowCounters::default();

        let ndc_y = 1.0 - (y as f32 + 0.5) / height as f32 * 2.0;
        for x in 0..width {
            let ndc_x = (x as f32 + 0.5) / width as f32 * 2.0 - 1.0;
            let (near, far) = matrices.unproject(ndc_x, ndc_y);
            let origin = self.to_volume_space(&near.coords);
            let direction = self.to_volume_space(&far.coords) - origin;

            let jitter = if self.params.enable_jittering {
                rng.r#gen::<f32>()
            } else {
                0.0
            };
            let sample = self.cast_ray(&origin, &direction, jitter);

            counters.rays += 1;
            counters.samples += sample.samples as u64;
            counters.terminated += sample.terminated_early as u64;
            row.extend_from_slice(&sample.to_pixel());
        }
        (row, counters)
    }

    /// World position to normalised volume coordinates.
    fn to_volume_space(&self, world: &Vector3<f32>) -> Vector3<f32> {
        world.component_div(&self.box_scale) + Vector3::repeat(0.5)
    }

    /// March one ray given in normalised volume coordinates. `jitter` in
    /// `[0, 1)` offsets the first sample by that fraction of a step.
    pub fn cast_ray(&self, origin: &Vector3<f32>, direction: &Vector3<f32>, jitter: f32) -> RaySample {
        let mut result = RaySample::default();
        let length = direction.norm();
        if length.is_nan() || length <= f32::EPSILON {
            return result;
        }
        let direction = direction / length;

        let Some((t_enter, t_exit)) = intersect_unit_cube(origin, &direction) else {
            return result;
        };

        let step = self.params.step_size;
        let mut t = t_enter.max(0.0) + jitter * step;
        let mut color = Vector3::<f32>::zeros();
        let mut alpha = 0.0f32;
        let mut steps = 0;

        while steps < self.params.max_steps && t <= t_exit {
            let position = origin + direction * t;
            t += step;
            steps += 1;
            result.samples += 1;

            let value = self.volume.normalize(Sampler::sample_at(
                self.volume,
                &position,
                self.params.interpolation,
            ));
            if value < INTENSITY_EPSILON {
                continue;
            }
            let [r, g, b, a] = self.lut.lookup(value);
            if a <= 0.0 {
                continue;
            }

            let mut rgb = Vector3::new(r, g, b);
            if self.params.enable_shading {
                rgb = self.shade(&position, rgb, &direction);
            }

            let weight = a * (1.0 - alpha);
            color += rgb * weight;
            alpha += weight;

            if self.params.enable_early_ray_termination && alpha > EARLY_TERMINATION_ALPHA {
                result.terminated_early = true;
                break;
            }
        }

        result.rgba = [color.x, color.y, color.z, alpha];
        result
    }

    /// Two-sided Blinn-Phong with a head light. Samples whose gradient is
    /// weaker than the threshold keep their table colour.
    fn shade(&self, position: &Vector3<f32>, rgb: Vector3<f32>, direction: &Vector3<f32>) -> Vector3<f32> {
        let gradient = Sampler::gradient(self.volume, position, self.params.interpolation);
        let magnitude = gradient.norm();
        if magnitude.is_nan() || magnitude <= f32::EPSILON || magnitude < self.params.gradient_threshold {
            return rgb;
        }

        let light = -direction;
        let mut normal = -gradient / magnitude;
        if normal.dot(&light) < 0.0 {
            normal = -normal;
        }
        let n_dot_l = normal.dot(&light).max(0.0);
        // Light and eye coincide, so the half vector is the light direction.
        let specular = n_dot_l.powf(self.params.shininess) * self.params.specular;

        let lit = rgb * (self.params.ambient + self.params.diffuse * n_dot_l)
            + Vector3::repeat(specular);
        lit.map(|c| c.clamp(0.0, 1.0))
    }
}

/// Entry and exit distances of a ray through `[0, 1]^3`, or `None` when it
/// misses or the cube lies entirely behind the origin.
pub fn intersect_unit_cube(origin: &Vector3<f32>, direction: &Vector3<f32>) -> Option<(f32, f32)> {
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;

    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        if d.abs() <= f32::EPSILON {
            if !(0.0..=1.0).contains(&o) {
                return None;
            }
            continue;
        }
        let t0 = (0.0 - o) / d;
        let t1 = (1.0 - o) / d;
        t_enter = t_enter.max(t0.min(t1));
        t_exit = t_exit.min(t0.max(t1));
    }

    (t_exit >= t_enter && t_exit >= 0.0).then_some((t_enter, t_exit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer_function::TransferFunction;
    use crate::volume::Dimensions;
    use approx::assert_abs_diff_eq;

    fn constant_volume(value: f32) -> VolumeData {
        VolumeData::from_fn(Dimensions::new(8, 8, 8), (1.0, 1.0, 1.0), |_, _, _| value)
            .unwrap()
            .with_range(0.0, 1.0)
            .unwrap()
    }

    fn unshaded() -> RenderingParameters {
        RenderingParameters {
            enable_shading: false,
            enable_jittering: false,
            ..RenderingParameters::default()
        }
    }

    #[test]
    fn pixel_count_does_not_wrap_for_large_viewports() {
        assert_eq!(pixel_count(70_000, 70_000), 4_900_000_000);
        assert_eq!(pixel_count(u32::MAX, 2), 2 * u32::MAX as u64);
        assert_eq!(pixel_count(0, 1024), 0);
    }

    #[test]
    fn cube_intersection() {
        let hit = intersect_unit_cube(&Vector3::new(0.5, 0.5, -1.0), &Vector3::z()).unwrap();
        assert_abs_diff_eq!(hit.0, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(hit.1, 2.0, epsilon = 1e-6);
        assert!(intersect_unit_cube(&Vector3::new(2.0, 0.5, -1.0), &Vector3::z()).is_none());
        assert!(intersect_unit_cube(&Vector3::new(0.5, 0.5, 2.0), &Vector3::z()).is_none());
    }

    #[test]
    fn transparent_transfer_function_gives_transparent_ray() {
        let volume = constant_volume(0.8);
        let lut = LookupTable::build(
            &TransferFunction::new(
                vec![crate::transfer_function::OpacityPoint { value: 0.0, alpha: 0.0 }],
                vec![],
            ),
            256,
        );
        let caster = RayCaster::new(&volume, &lut, &unshaded());
        let sample = caster.cast_ray(&Vector3::new(0.5, 0.5, -1.0), &Vector3::z(), 0.0);
        assert_eq!(sample.rgba, [0.0; 4]);
        assert!(sample.samples > 0);
    }

    #[test]
    fn opaque_volume_terminates_early() {
        let volume = constant_volume(1.0);
        let lut = LookupTable::default();
        let caster = RayCaster::new(&volume, &lut, &unshaded());
        let sample = caster.cast_ray(&Vector3::new(0.5, 0.5, -1.0), &Vector3::z(), 0.0);
        assert!(sample.terminated_early);
        assert!(sample.rgba[3] > EARLY_TERMINATION_ALPHA);
        assert_eq!(sample.samples, 1);
    }

    #[test]
    fn early_termination_can_be_disabled() {
        let volume = constant_volume(1.0);
        let lut = LookupTable::default();
        let params = RenderingParameters {
            enable_early_ray_termination: false,
            step_size: 0.25,
            ..unshaded()
        };
        let caster = RayCaster::new(&volume, &lut, &params);
        let sample = caster.cast_ray(&Vector3::new(0.5, 0.5, -1.0), &Vector3::z(), 0.0);
        assert!(!sample.terminated_early);
        assert_eq!(sample.samples, 5);
    }

    #[test]
    fn front_to_back_compositing() {
        // Grayscale preset at 0.5 gives rgb 0.5 and alpha 0.5 per sample.
        let volume = constant_volume(0.5);
        let lut = LookupTable::build(&TransferFunction::default(), 257);
        let params = RenderingParameters {
            step_size: 0.6,
            ..unshaded()
        };
        let caster = RayCaster::new(&volume, &lut, &params);
        let sample = caster.cast_ray(&Vector3::new(0.5, 0.5, -1.0), &Vector3::z(), 0.0);
        assert_eq!(sample.samples, 2);
        assert_abs_diff_eq!(sample.rgba[3], 0.75, epsilon = 1e-5);
        assert_abs_diff_eq!(sample.rgba[0], 0.375, epsilon = 1e-5);
    }

    #[test]
    fn rays_missing_the_volume_render_background() {
        let volume = constant_volume(1.0);
        let lut = LookupTable::default();
        let caster = RayCaster::new(&volume, &lut, &unshaded());
        let camera = Camera {
            target: nalgebra::Point3::new(50.0, 0.0, 0.0),
            position: nalgebra::Point3::new(50.0, 0.0, 2.5),
            ..Camera::default()
        };
        let frame = caster.render(&camera, 8, 8, 0);
        assert!(frame.image.pixels().all(|p| p.0 == [0, 0, 0, 0]));
        assert_eq!(frame.stats.rays_cast, 64);
    }

    #[test]
    fn degenerate_camera_is_recorded() {
        let volume = constant_volume(1.0);
        let lut = LookupTable::default();
        let caster = RayCaster::new(&volume, &lut, &unshaded());
        let camera = Camera {
            fov: 0.0,
            ..Camera::default()
        };
        let frame = caster.render(&camera, 4, 4, 0);
        assert!(frame.stats.has_issue(IssueClass::DataShape));
        assert_eq!(frame.stats.rays_cast, 0);
    }
}
