use std::sync::Arc;

use dicom_volume_render::{
    CurvedMprReconstructor, CurvedPath, Dimensions, GpuContext, LodConfig, ManualScheduler,
    MprReconstructor, Orientation, Viewer, VolumeData, VolumeRenderer,
    transfer_function::{Preset, TransferFunction},
};
use nalgebra::Vector3;
use web_time::Instant;

/// Head-like phantom: a soft-tissue ellipsoid with a bone shell and two
/// dense inclusions.
fn phantom() -> VolumeData {
    let dimensions = Dimensions::new(128, 128, 96);
    VolumeData::from_fn(dimensions, (1.0, 1.0, 1.4), |x, y, z| {
        let p = Vector3::new(
            x as f32 / 127.0 - 0.5,
            y as f32 / 127.0 - 0.5,
            z as f32 / 95.0 - 0.5,
        );
        let r = (p.x * p.x / 0.16 + p.y * p.y / 0.2 + p.z * p.z / 0.16).sqrt();
        let inclusion = |c: Vector3<f32>, radius: f32| (p - c).norm() < radius;
        if inclusion(Vector3::new(0.1, 0.05, 0.0), 0.06)
            || inclusion(Vector3::new(-0.12, -0.08, 0.1), 0.04)
        {
            1800.0
        } else if r < 0.85 {
            1040.0
        } else if r < 1.0 {
            1900.0
        } else {
            0.0
        }
    })
    .expect("phantom dimensions are valid")
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let volume = Arc::new(phantom());
    let transfer_function = Arc::new(TransferFunction::preset(Preset::CtBone));

    let mut cpu = VolumeRenderer::new();
    cpu.set_volume(volume.clone());
    cpu.set_transfer_function(transfer_function.clone());
    cpu.set_camera(cpu.camera().orbited(0.6, 0.3));
    if let Some(frame) = cpu.render(256, 256).await {
        log::info!("CPU frame in {:.1} ms", frame.stats.frame_time_ms);
        frame.image.save("volume_cpu.png").expect("should have saved CPU frame");
    }

    match GpuContext::request().await {
        Ok(context) => {
            let mut gpu = VolumeRenderer::with_gpu(context).await;
            gpu.set_volume(volume.clone());
            gpu.set_transfer_function(transfer_function);
            gpu.set_camera(gpu.camera().orbited(0.6, 0.3));
            match gpu.render(256, 256).await {
                Some(frame) => {
                    log::info!("GPU frame in {:.1} ms", frame.stats.frame_time_ms);
                    frame.image.save("volume_gpu.png").expect("should have saved GPU frame");
                }
                None => log::warn!("GPU renderer produced no frame: {:?}", gpu.status()),
            }
        }
        Err(error) => log::warn!("Skipping GPU rendering: {error}"),
    }

    // A few frames through the render loop, letting the LOD controller react.
    let mut viewer = Viewer::new(VolumeRenderer::new(), ManualScheduler::new(), LodConfig::default());
    viewer.set_viewport(128, 128);
    viewer.start();
    viewer.load_volume(volume.clone());
    for _ in 0..4 {
        let Some(request) = viewer.render_loop_mut().scheduler_mut().next_due() else {
            break;
        };
        if let Some(frame) = viewer.on_frame(request).await {
            log::info!(
                "Loop frame at LOD {} in {:.1} ms",
                frame.stats.lod_level,
                frame.stats.frame_time_ms
            );
        }
        viewer.lod_tick(Instant::now());
    }
    viewer.stop();
    log::info!("LOD metrics: {:?}", viewer.lod().metrics());

    let mpr = MprReconstructor::default();
    for orientation in Orientation::ALL {
        let slice = mpr.canonical_slice(&volume, orientation, 0.5);
        slice
            .image
            .save(format!("mpr_{orientation:?}.png").to_lowercase())
            .expect("should have saved slice");
    }

    let path = CurvedPath::new(
        vec![
            Vector3::new(0.2, 0.3, 0.5),
            Vector3::new(0.45, 0.6, 0.5),
            Vector3::new(0.7, 0.45, 0.55),
            Vector3::new(0.85, 0.7, 0.5),
        ],
        0.3,
        256,
    );
    let curved = CurvedMprReconstructor::default().reconstruct(Some(volume.as_ref()), &path);
    log::info!("Curved path length {:.3}", curved.path_length);
    curved
        .image
        .save("mpr_curved.png")
        .expect("should have saved curved slice");
}
