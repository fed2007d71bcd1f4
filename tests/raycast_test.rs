use std::sync::Arc;

use dicom_volume_render::{
    Camera, Dimensions, IssueClass, RenderingParameters, VolumeData, VolumeRenderer,
    raycast::RayCaster,
    transfer_function::{LookupTable, Preset, TransferFunction},
};
use futures::executor::block_on;

fn sphere(radius: f32) -> VolumeData {
    VolumeData::from_fn(Dimensions::new(24, 24, 24), (1.0, 1.0, 1.0), |x, y, z| {
        let c = 11.5;
        let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2) + (z as f32 - c).powi(2)).sqrt();
        if d < radius { 1000.0 } else { 0.0 }
    })
    .unwrap()
}

#[test]
fn same_seed_renders_same_frame() {
    let volume = sphere(9.0);
    let lut = LookupTable::build(&TransferFunction::preset(Preset::CtSoftTissue), 256);
    let caster = RayCaster::new(&volume, &lut, &RenderingParameters::default());
    let a = caster.render(&Camera::default(), 24, 24, 99);
    let b = caster.render(&Camera::default(), 24, 24, 99);
    assert_eq!(a.image, b.image);
    assert_eq!(a.stats.samples_processed, b.stats.samples_processed);
}

#[test]
fn early_termination_saves_samples() {
    let volume = sphere(9.0);
    let lut = LookupTable::default();
    let base = RenderingParameters {
        enable_jittering: false,
        ..RenderingParameters::default()
    };
    let with = RayCaster::new(&volume, &lut, &base).render(&Camera::default(), 16, 16, 0);
    let without = RayCaster::new(
        &volume,
        &lut,
        &RenderingParameters {
            enable_early_ray_termination: false,
            ..base
        },
    )
    .render(&Camera::default(), 16, 16, 0);

    assert!(with.stats.rays_terminated_early > 0);
    assert_eq!(without.stats.rays_terminated_early, 0);
    assert!(with.stats.samples_processed < without.stats.samples_processed);
}

#[test]
fn shading_keeps_opacity() {
    let volume = sphere(9.0);
    let lut = LookupTable::default();
    let plain = RenderingParameters {
        enable_jittering: false,
        enable_shading: false,
        ..RenderingParameters::default()
    };
    let shaded = RenderingParameters {
        enable_shading: true,
        ..plain
    };
    let a = RayCaster::new(&volume, &lut, &plain).render(&Camera::default(), 16, 16, 0);
    let b = RayCaster::new(&volume, &lut, &shaded).render(&Camera::default(), 16, 16, 0);
    for (pa, pb) in a.image.pixels().zip(b.image.pixels()) {
        assert_eq!(pa.0[3], pb.0[3]);
    }
}

#[test]
fn renderer_reports_frame_statistics() {
    let mut renderer = VolumeRenderer::new();
    renderer.set_volume(Arc::new(sphere(9.0)));
    let output = block_on(renderer.render(20, 10)).unwrap();
    assert_eq!(output.image.dimensions(), (20, 10));
    assert_eq!(output.stats.rays_cast, 200);
    assert!(output.stats.frame_time_ms >= 0.0);
    assert!(output.stats.memory_usage_bytes > 0);
    assert_eq!(output.stats.lod_level, 3);
    assert_eq!(renderer.stats(), &output.stats);
}

#[test]
fn zero_sized_frame_is_skipped_and_recorded() {
    let mut renderer = VolumeRenderer::new();
    renderer.set_volume(Arc::new(sphere(4.0)));
    assert!(block_on(renderer.render(0, 10)).is_none());
    assert!(renderer.stats().has_issue(IssueClass::DataShape));
}

#[test]
fn orbiting_camera_still_sees_the_sphere() {
    let mut renderer = VolumeRenderer::new();
    renderer.set_volume(Arc::new(sphere(9.0)));
    renderer.set_camera(Camera::default().orbited(1.2, 0.4));
    let output = block_on(renderer.render(17, 17)).unwrap();
    assert!(output.image.get_pixel(8, 8).0[3] > 200);
}
