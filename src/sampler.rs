use nalgebra::Vector3;

use crate::enums::Interpolation;
use crate::volume::VolumeData;

/// The one voxel sampler shared by the ray caster, planar MPR and curved MPR.
///
/// Coordinates are normalised to `[0, 1]` per axis, where 0 and 1 address the
/// centres of the first and last voxel. Positions outside the cube are clamped
/// to the boundary value.
pub struct Sampler;

impl Sampler {
    /// Sample an optional volume. A missing volume yields 0.
    pub fn sample(
        volume: Option<&VolumeData>,
        x: f32,
        y: f32,
        z: f32,
        mode: Interpolation,
    ) -> f32 {
        match volume {
            Some(volume) => Self::sample_at(volume, &Vector3::new(x, y, z), mode),
            None => 0.0,
        }
    }

    #[inline]
    pub fn sample_at(volume: &VolumeData, position: &Vector3<f32>, mode: Interpolation) -> f32 {
        match mode {
            Interpolation::Nearest => Self::nearest(volume, position),
            Interpolation::Trilinear => Self::trilinear(volume, position),
            // Stand-in until a 64-tap kernel is approved.
            Interpolation::Cubic => Self::trilinear(volume, position),
        }
    }

    /// Continuous voxel coordinate for a normalised position on one axis.
    #[inline]
    fn grid_coordinate(normalized: f32, dim: usize) -> f32 {
        let normalized = if normalized.is_nan() {
            0.0
        } else {
            normalized.clamp(0.0, 1.0)
        };
        normalized * (dim - 1) as f32
    }

    #[inline]
    fn nearest(volume: &VolumeData, position: &Vector3<f32>) -> f32 {
        let dims = volume.dimensions();
        let index = |normalized: f32, dim: usize| {
            let f = Self::grid_coordinate(normalized, dim);
            ((f + 0.5).floor() as usize).min(dim - 1)
        };
        volume.voxel(
            index(position.x, dims.width),
            index(position.y, dims.height),
            index(position.z, dims.depth),
        )
    }

    #[inline]
    fn trilinear(volume: &VolumeData, position: &Vector3<f32>) -> f32 {
        let dims = volume.dimensions();

        let split = |normalized: f32, dim: usize| {
            let f = Self::grid_coordinate(normalized, dim);
            let i0 = (f.floor() as usize).min(dim - 1);
            let i1 = (i0 + 1).min(dim - 1);
            (i0, i1, f - i0 as f32)
        };
        let (x0, x1, dx) = split(position.x, dims.width);
        let (y0, y1, dy) = split(position.y, dims.height);
        let (z0, z1, dz) = split(position.z, dims.depth);

        // a + (b - a) * t keeps constant neighbourhoods exact.
        let lerp = |a: f32, b: f32, t: f32| (b - a).mul_add(t, a);

        let c00 = lerp(volume.voxel(x0, y0, z0), volume.voxel(x1, y0, z0), dx);
        let c10 = lerp(volume.voxel(x0, y1, z0), volume.voxel(x1, y1, z0), dx);
        let c01 = lerp(volume.voxel(x0, y0, z1), volume.voxel(x1, y0, z1), dx);
        let c11 = lerp(volume.voxel(x0, y1, z1), volume.voxel(x1, y1, z1), dx);

        let c0 = lerp(c00, c10, dy);
        let c1 = lerp(c01, c11, dy);

        lerp(c0, c1, dz)
    }

    /// Central-difference gradient of the normalised intensity, one voxel
    /// step per axis.
    pub fn gradient(volume: &VolumeData, position: &Vector3<f32>, mode: Interpolation) -> Vector3<f32> {
        let dims = volume.dimensions();
        let step = |dim: usize| 1.0 / (dim.max(2) - 1) as f32;
        let h = Vector3::new(step(dims.width), step(dims.height), step(dims.depth));

        let sample = |offset: Vector3<f32>| volume.normalize(Self::sample_at(volume, &(position + offset), mode));

        Vector3::new(
            sample(Vector3::new(h.x, 0.0, 0.0)) - sample(Vector3::new(-h.x, 0.0, 0.0)),
            sample(Vector3::new(0.0, h.y, 0.0)) - sample(Vector3::new(0.0, -h.y, 0.0)),
            sample(Vector3::new(0.0, 0.0, h.z)) - sample(Vector3::new(0.0, 0.0, -h.z)),
        )
        .component_div(&(h * 2.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Dimensions;
    use approx::assert_abs_diff_eq;

    fn ramp() -> VolumeData {
        VolumeData::from_fn(Dimensions::new(5, 4, 3), (1.0, 1.0, 1.0), |x, y, z| {
            (x + 10 * y + 100 * z) as f32
        })
        .unwrap()
    }

    #[test]
    fn missing_volume_samples_zero() {
        for mode in [Interpolation::Nearest, Interpolation::Trilinear, Interpolation::Cubic] {
            assert_eq!(Sampler::sample(None, 0.5, 0.5, 0.5, mode), 0.0);
        }
    }

    #[test]
    fn trilinear_hits_grid_points_exactly() {
        let volume = ramp();
        for (x, y, z) in [(0, 0, 0), (4, 3, 2), (2, 1, 1), (3, 2, 0)] {
            let value = Sampler::sample(
                Some(&volume),
                x as f32 / 4.0,
                y as f32 / 3.0,
                z as f32 / 2.0,
                Interpolation::Trilinear,
            );
            assert_abs_diff_eq!(value, volume.voxel(x, y, z), epsilon = 1e-3);
        }
    }

    #[test]
    fn trilinear_blends_between_neighbours() {
        let volume = ramp();
        let value = Sampler::sample(Some(&volume), 0.125, 0.0, 0.0, Interpolation::Trilinear);
        assert_abs_diff_eq!(value, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn out_of_range_positions_return_boundary_values() {
        let volume = ramp();
        let below = Sampler::sample(Some(&volume), -3.0, -1.0, -0.5, Interpolation::Trilinear);
        let above = Sampler::sample(Some(&volume), 4.0, 2.0, 9.0, Interpolation::Nearest);
        assert_eq!(below, volume.voxel(0, 0, 0));
        assert_eq!(above, volume.voxel(4, 3, 2));
    }

    #[test]
    fn nearest_rounds_to_closest_voxel() {
        let volume = ramp();
        let value = Sampler::sample(Some(&volume), 0.3, 0.0, 0.0, Interpolation::Nearest);
        assert_eq!(value, 1.0);
    }

    #[test]
    fn gradient_of_x_ramp_points_along_x() {
        let volume =
            VolumeData::from_fn(Dimensions::new(9, 9, 9), (1.0, 1.0, 1.0), |x, _, _| x as f32)
                .unwrap();
        let gradient = Sampler::gradient(&volume, &Vector3::repeat(0.5), Interpolation::Trilinear);
        assert_abs_diff_eq!(gradient.x, 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(gradient.y, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(gradient.z, 0.0, epsilon = 1e-6);
    }
}
