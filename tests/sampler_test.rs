use approx::assert_relative_eq;
use dicom_volume_render::{
    Dimensions, Interpolation, MprOptions, MprPlane, MprReconstructor, Sampler, VolumeData,
    transfer_function::{ColorPoint, LookupTable, OpacityPoint, TransferFunction},
};
use nalgebra::Vector3;
use rand::{Rng, SeedableRng, rngs::SmallRng};

const MODES: [Interpolation; 3] = [
    Interpolation::Nearest,
    Interpolation::Trilinear,
    Interpolation::Cubic,
];

fn ramp(width: usize, height: usize, depth: usize) -> VolumeData {
    VolumeData::from_fn(
        Dimensions::new(width, height, depth),
        (1.0, 1.0, 1.0),
        |x, y, z| (x + 10 * y + 100 * z) as f32,
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Constant volumes
// ---------------------------------------------------------------------------

#[test]
fn constant_volume_samples_constant_everywhere() {
    let k = 42.5;
    let volume =
        VolumeData::from_fn(Dimensions::new(5, 4, 3), (1.0, 1.0, 1.0), |_, _, _| k).unwrap();
    let mut rng = SmallRng::seed_from_u64(7);

    for mode in MODES {
        for corner in 0..8 {
            let c = |bit: u32| ((corner >> bit) & 1) as f32;
            assert_eq!(Sampler::sample(Some(&volume), c(0), c(1), c(2), mode), k);
        }
        for _ in 0..200 {
            let (x, y, z) = (rng.r#gen(), rng.r#gen(), rng.r#gen());
            assert_eq!(Sampler::sample(Some(&volume), x, y, z, mode), k);
        }
    }
}

// ---------------------------------------------------------------------------
// Grid points
// ---------------------------------------------------------------------------

/// Trilinear at a voxel centre returns the voxel with no blending.
#[test]
fn trilinear_is_exact_on_grid_points() {
    let volume = ramp(5, 3, 9);
    for z in 0..9 {
        for y in 0..3 {
            for x in 0..5 {
                let value = Sampler::sample(
                    Some(&volume),
                    x as f32 / 4.0,
                    y as f32 / 2.0,
                    z as f32 / 8.0,
                    Interpolation::Trilinear,
                );
                assert_relative_eq!(value, volume.voxel(x, y, z), epsilon = 1e-3);
            }
        }
    }
}

#[test]
fn missing_volume_samples_zero() {
    for mode in MODES {
        assert_eq!(Sampler::sample(None, 0.5, 0.5, 0.5, mode), 0.0);
    }
}

#[test]
fn cubic_matches_trilinear() {
    let volume = ramp(6, 6, 6);
    let position = Vector3::new(0.33, 0.71, 0.12);
    assert_eq!(
        Sampler::sample_at(&volume, &position, Interpolation::Cubic),
        Sampler::sample_at(&volume, &position, Interpolation::Trilinear)
    );
}

// ---------------------------------------------------------------------------
// One sampler for every consumer
// ---------------------------------------------------------------------------

/// Every MPR pixel is the shared sampler's value at the mapped position.
#[test]
fn mpr_pixels_come_from_shared_sampler() {
    let volume = ramp(7, 7, 7);
    let plane = MprPlane {
        normal: Vector3::new(0.3, 0.2, 1.0),
        up: Vector3::new(0.1, 1.0, 0.0),
        position: 0.4,
        color: [1.0; 3],
    };
    let basis = dicom_volume_render::mpr::PlaneBasis::new(&plane);

    for mode in MODES {
        let reconstructor = MprReconstructor::new(MprOptions {
            interpolation: mode,
            ..MprOptions::default()
        });
        let result = reconstructor.reconstruct(Some(&volume), &plane, 16, 12);
        for (x, y, pixel) in result.image.enumerate_pixels() {
            let point = basis.point(x as f32 / 16.0 - 0.5, y as f32 / 12.0 - 0.5);
            let value = volume.normalize(Sampler::sample_at(&volume, &point, mode));
            let expected = (value * 255.0).round() as u8;
            assert_eq!(pixel.0, [expected, expected, expected, 255]);
        }
    }
}

// ---------------------------------------------------------------------------
// Lookup table
// ---------------------------------------------------------------------------

#[test]
fn lookup_table_hits_control_points_exactly() {
    let tf = TransferFunction::new(
        vec![
            OpacityPoint { value: 0.0, alpha: 0.0 },
            OpacityPoint { value: 0.6, alpha: 0.35 },
            OpacityPoint { value: 1.0, alpha: 0.9 },
        ],
        vec![
            ColorPoint { value: 0.0, r: 0.0, g: 0.0, b: 0.0 },
            ColorPoint { value: 0.6, r: 0.8, g: 0.4, b: 0.2 },
            ColorPoint { value: 1.0, r: 1.0, g: 1.0, b: 1.0 },
        ],
    );
    // 0.6 lands on entry 6 of an 11-entry table.
    let lut = LookupTable::build(&tf, 11);
    let [r, g, b, a] = lut.entries()[6];
    assert_relative_eq!(r, 0.8, epsilon = 1e-5);
    assert_relative_eq!(g, 0.4, epsilon = 1e-5);
    assert_relative_eq!(b, 0.2, epsilon = 1e-5);
    assert_relative_eq!(a, 0.35, epsilon = 1e-5);
    assert_eq!(lut.lookup(0.6), lut.entries()[6]);
}
