use approx::assert_abs_diff_eq;
use dicom_volume_render::{
    CurvedMprOptions, CurvedMprReconstructor, CurvedPath, Dimensions, IssueClass, VolumeData,
    curved_mpr::{compute_frames, resample_uniform},
};
use nalgebra::Vector3;

fn volume() -> VolumeData {
    VolumeData::from_fn(Dimensions::new(16, 16, 16), (1.0, 1.0, 1.0), |x, y, z| {
        (x * y + z) as f32
    })
    .unwrap()
}

#[test]
fn straight_path_resamples_to_endpoints_and_midpoint() {
    let p0 = Vector3::new(0.2, 0.1, 0.9);
    let p1 = Vector3::new(0.6, 0.7, 0.3);
    let points = resample_uniform(&[p0, p1], 3);
    assert_eq!(points.len(), 3);
    assert_abs_diff_eq!(points[0], p0, epsilon = 1e-6);
    assert_abs_diff_eq!(points[1], (p0 + p1) / 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(points[2], p1, epsilon = 1e-6);
}

#[test]
fn zero_length_path_yields_empty_output() {
    let path = CurvedPath::new(vec![Vector3::new(0.4, 0.4, 0.4); 5], 0.2, 128);
    let result = CurvedMprReconstructor::default().reconstruct(Some(&volume()), &path);
    assert_eq!(result.path_length, 0.0);
    assert!(result.image.width() <= 1);
    assert!(result.frames.is_empty());
    assert!(result.issues.iter().any(|i| i.class == IssueClass::Numeric));
}

#[test]
fn single_point_path_yields_empty_output() {
    let path = CurvedPath::new(vec![Vector3::repeat(0.5)], 0.2, 128);
    let result = CurvedMprReconstructor::default().reconstruct(Some(&volume()), &path);
    assert_eq!(result.image.width(), 0);
    assert!(result.issues.iter().any(|i| i.class == IssueClass::DataShape));
}

#[test]
fn output_is_resolution_by_thickness_samples() {
    let path = CurvedPath::new(
        vec![
            Vector3::new(0.1, 0.2, 0.5),
            Vector3::new(0.5, 0.8, 0.5),
            Vector3::new(0.9, 0.3, 0.5),
        ],
        0.1,
        40,
    );
    let reconstructor = CurvedMprReconstructor::new(CurvedMprOptions {
        smoothing_factor: 0.5,
        spline_samples_per_segment: 8,
        thickness_samples: 12,
        ..CurvedMprOptions::default()
    });
    let result = reconstructor.reconstruct(Some(&volume()), &path);
    assert_eq!(result.image.dimensions(), (40, 12));
    assert_eq!(result.frames.len(), 40);
    assert!(result.issues.is_empty());
}

#[test]
fn missing_volume_renders_black_columns() {
    let path = CurvedPath::new(vec![Vector3::zeros(), Vector3::repeat(1.0)], 0.1, 10);
    let result = CurvedMprReconstructor::default().reconstruct(None, &path);
    assert_eq!(result.image.width(), 10);
    assert!(result.image.pixels().all(|p| p.0 == [0, 0, 0, 255]));
}

/// A path running along Z switches its reference axis to X.
#[test]
fn frames_stay_defined_along_z() {
    let points = [Vector3::new(0.5, 0.5, 0.1), Vector3::new(0.5, 0.5, 0.9)];
    for frame in compute_frames(&points) {
        assert!(frame.normal.iter().all(|c| c.is_finite()));
        assert_abs_diff_eq!(frame.normal.norm(), 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(frame.binormal.dot(&frame.tangent), 0.0, epsilon = 1e-5);
    }
}
