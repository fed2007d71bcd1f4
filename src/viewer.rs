//! Ties the renderer, the reconstructors and the LOD controller to a render
//! loop.
//!
//! LOD decisions made between frames are staged and applied at the start of
//! the next frame, so a frame never mixes two levels.

use std::sync::Arc;

use nalgebra::Vector3;
use web_time::Instant;

use crate::curved_mpr::{CurvedMprReconstructor, CurvedPath, CurvedReconstruction};
use crate::enums::Orientation;
use crate::lod::{LodConfig, LodController, LodLevel};
use crate::mpr::{Crosshair, MprImage, MprPlane, MprReconstructor};
use crate::renderer::{RenderOutput, VolumeRenderer};
use crate::scheduler::{FrameRequest, FrameScheduler, RenderLoop};
use crate::telemetry::RenderingStats;
use crate::volume::VolumeData;

pub struct Viewer<S> {
    renderer: VolumeRenderer,
    mpr: MprReconstructor,
    curved: CurvedMprReconstructor,
    lod: LodController,
    render_loop: RenderLoop<S>,
    planes: [MprPlane; 3],
    crosshair: Crosshair,
    viewport: (u32, u32),
    zoom: f32,
    pending_lod: Option<LodLevel>,
    stats: RenderingStats,
}

impl<S: FrameScheduler> Viewer<S> {
    pub fn new(mut renderer: VolumeRenderer, scheduler: S, lod_config: LodConfig) -> Self {
        let lod = LodController::new(lod_config);
        renderer.apply_lod(lod.current_level());
        Self {
            renderer,
            mpr: MprReconstructor::default(),
            curved: CurvedMprReconstructor::default(),
            lod,
            render_loop: RenderLoop::new(scheduler),
            planes: MprPlane::default_set(),
            crosshair: Crosshair::default(),
            viewport: (512, 512),
            zoom: 1.0,
            pending_lod: None,
            stats: RenderingStats::default(),
        }
    }

    pub fn renderer(&self) -> &VolumeRenderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut VolumeRenderer {
        &mut self.renderer
    }

    pub fn lod(&self) -> &LodController {
        &self.lod
    }

    pub fn lod_mut(&mut self) -> &mut LodController {
        &mut self.lod
    }

    pub fn render_loop(&self) -> &RenderLoop<S> {
        &self.render_loop
    }

    pub fn render_loop_mut(&mut self) -> &mut RenderLoop<S> {
        &mut self.render_loop
    }

    pub fn mpr_mut(&mut self) -> &mut MprReconstructor {
        &mut self.mpr
    }

    pub fn curved_mut(&mut self) -> &mut CurvedMprReconstructor {
        &mut self.curved
    }

    pub fn pending_lod(&self) -> Option<&LodLevel> {
        self.pending_lod.as_ref()
    }

    /// Telemetry of the last frame, plus any issues raised by reslices since.
    pub fn stats(&self) -> &RenderingStats {
        &self.stats
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    pub fn start(&mut self) {
        self.render_loop.start();
    }

    pub fn stop(&mut self) {
        self.render_loop.stop();
    }

    /// Swap the active volume. The loop is stopped while the old GPU
    /// resources are released and restarted afterwards if it was running.
    pub fn load_volume(&mut self, volume: Arc<VolumeData>) {
        let was_running = self.render_loop.is_running();
        self.render_loop.stop();
        let voxels = volume.voxel_count();
        self.renderer.set_volume(volume);
        self.crosshair = Crosshair::default();
        self.crosshair.sync_planes(&mut self.planes);
        self.lod.select_for_view(self.zoom, voxels);
        if was_running {
            self.render_loop.start();
        }
    }

    /// Retarget the level of detail. The current level follows on later
    /// [`Self::lod_tick`] passes.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom;
        if let Some(voxels) = self.renderer.volume().map(|v| v.voxel_count()) {
            self.lod.select_for_view(zoom, voxels);
        }
    }

    /// Periodic LOD pass. A changed level is staged for the next frame.
    pub fn lod_tick(&mut self, now: Instant) -> Option<usize> {
        let level = *self.lod.adapt(now)?;
        self.pending_lod = Some(level);
        Some(level.level)
    }

    /// Handle a fired frame. `None` for stale requests, a stopped loop, or
    /// when the renderer produced nothing.
    pub async fn on_frame(&mut self, request: FrameRequest) -> Option<RenderOutput> {
        if !self.render_loop.begin_frame(request) {
            return None;
        }
        if let Some(level) = self.pending_lod.take() {
            self.renderer.apply_lod(&level);
        }

        let (width, height) = self.viewport;
        let output = self.renderer.render(width, height).await;
        if let Some(output) = &output {
            self.lod.record_frame(output.stats.frame_time_ms);
            self.lod.record_memory(output.stats.memory_usage_bytes);
        }
        self.stats = self.renderer.stats().clone();

        self.render_loop.end_frame();
        output
    }

    pub fn crosshair(&self) -> &Crosshair {
        &self.crosshair
    }

    pub fn plane(&self, orientation: Orientation) -> &MprPlane {
        &self.planes[Self::plane_index(orientation)]
    }

    pub fn set_plane(&mut self, orientation: Orientation, plane: MprPlane) {
        self.planes[Self::plane_index(orientation)] = plane;
    }

    fn plane_index(orientation: Orientation) -> usize {
        match orientation {
            Orientation::Axial => 0,
            Orientation::Sagittal => 1,
            Orientation::Coronal => 2,
        }
    }

    /// Move the crosshair to a click in one plane's view and bring the other
    /// planes through it.
    pub fn click(&mut self, orientation: Orientation, x: f32, y: f32, width: u32, height: u32) {
        self.crosshair = Crosshair::from_pixel(self.plane(orientation), x, y, width, height);
        self.crosshair.sync_planes(&mut self.planes);
    }

    pub fn set_crosshair(&mut self, position: Vector3<f32>) {
        self.crosshair = Crosshair { position };
        self.crosshair.sync_planes(&mut self.planes);
    }

    /// Reconstruct one of the linked planes at a resolution capped by the
    /// current level of detail. Issues are also added to [`Self::stats`].
    pub fn reconstruct_plane(
        &mut self,
        orientation: Orientation,
        width: u32,
        height: u32,
    ) -> MprImage {
        let (width, height) = self.lod.current_level().clamp_resolution(width, height);
        let slice = self.mpr.reconstruct(
            self.renderer.volume().map(|v| v.as_ref()),
            self.plane(orientation),
            width,
            height,
        );
        self.stats.issues.extend(slice.issues.iter().cloned());
        slice
    }

    pub fn reconstruct_curved(&mut self, path: &CurvedPath) -> CurvedReconstruction {
        let mut path = path.clone();
        if path.resolution > 0 {
            let level = self.lod.current_level();
            path.resolution = level
                .clamp_resolution(path.resolution.min(u32::MAX as usize) as u32, 1)
                .0 as usize;
        }
        let curved = self
            .curved
            .reconstruct(self.renderer.volume().map(|v| v.as_ref()), &path);
        self.stats.issues.extend(curved.issues.iter().cloned());
        curved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::scheduler::ManualScheduler;
    use crate::telemetry::IssueClass;
    use crate::volume::Dimensions;
    use approx::assert_abs_diff_eq;
    use futures::executor::block_on;

    fn viewer() -> Viewer<ManualScheduler> {
        let mut viewer = Viewer::new(
            VolumeRenderer::new(),
            ManualScheduler::new(),
            LodConfig::default(),
        );
        viewer.set_viewport(8, 8);
        viewer
    }

    fn cube() -> Arc<VolumeData> {
        Arc::new(
            VolumeData::from_fn(Dimensions::new(8, 8, 8), (1.0, 1.0, 1.0), |x, y, z| {
                (x + y + z) as f32
            })
            .unwrap(),
        )
    }

    fn fire(viewer: &mut Viewer<ManualScheduler>) -> Option<RenderOutput> {
        let request = viewer.render_loop_mut().scheduler_mut().next_due()?;
        block_on(viewer.on_frame(request))
    }

    fn running_with_cube() -> Viewer<ManualScheduler> {
        let mut viewer = viewer();
        viewer.start();
        viewer.load_volume(cube());
        viewer
    }

    #[test]
    fn load_volume_keeps_loop_running_and_frames_resubmit() {
        let mut viewer = running_with_cube();
        assert!(viewer.render_loop().is_running());
        assert_eq!(viewer.render_loop().scheduler().pending(), 1);
        assert!(fire(&mut viewer).is_some());
        assert!(fire(&mut viewer).is_some());
        assert_eq!(viewer.render_loop().frames_rendered(), 2);
        assert_eq!(viewer.lod().metrics().current_lod, 3);
    }

    #[test]
    fn load_volume_leaves_a_stopped_loop_stopped() {
        let mut viewer = running_with_cube();
        viewer.stop();
        viewer.load_volume(cube());
        assert!(!viewer.render_loop().is_running());
        assert_eq!(viewer.render_loop().scheduler().pending(), 0);
        assert!(viewer.renderer().volume().is_some());
    }

    #[test]
    fn stopped_loop_renders_nothing() {
        let mut viewer = running_with_cube();
        let request = viewer.render_loop_mut().scheduler_mut().next_due().unwrap();
        viewer.stop();
        assert!(block_on(viewer.on_frame(request)).is_none());
    }

    #[test]
    fn staged_lod_applies_on_next_frame() {
        let mut viewer = running_with_cube();
        for _ in 0..10 {
            viewer.lod_mut().record_frame(200.0);
        }
        assert_eq!(viewer.lod_tick(Instant::now()), Some(2));
        assert_eq!(viewer.renderer().lod_level().level, 3);

        let output = fire(&mut viewer).unwrap();
        assert_eq!(viewer.renderer().lod_level().level, 2);
        assert_eq!(output.stats.lod_level, 2);
        assert!(viewer.pending_lod().is_none());
    }

    #[test]
    fn zooming_within_an_interval_changes_lod_at_most_once() {
        let mut viewer = running_with_cube();
        viewer.lod_mut().set_lod(2);
        for _ in 0..60 {
            viewer.lod_mut().record_frame(100.0);
        }
        let start = Instant::now();
        assert_eq!(viewer.lod_tick(start), Some(1));

        for zoom in [1.0, 0.1, 8.0, 0.5] {
            viewer.set_zoom(zoom);
            assert_eq!(viewer.lod().current_lod(), 1);
        }
        assert_eq!(viewer.lod_tick(start + Duration::from_millis(500)), None);
        assert_eq!(viewer.lod().current_lod(), 1);
        assert_eq!(viewer.pending_lod().map(|l| l.level), Some(1));

        // Poor frame rate still wins once the interval has passed.
        assert_eq!(viewer.lod_tick(start + Duration::from_secs(1)), Some(0));
    }

    #[test]
    fn click_syncs_planes() {
        let mut viewer = viewer();
        viewer.click(Orientation::Axial, 25.0, 75.0, 100, 100);
        assert_abs_diff_eq!(viewer.crosshair().position.x, 0.25, epsilon = 1e-5);
        assert_abs_diff_eq!(viewer.crosshair().position.y, 0.75, epsilon = 1e-5);
        assert_abs_diff_eq!(viewer.plane(Orientation::Sagittal).position, 0.25, epsilon = 1e-5);
        assert_abs_diff_eq!(viewer.plane(Orientation::Coronal).position, 0.75, epsilon = 1e-5);
        assert_abs_diff_eq!(viewer.plane(Orientation::Axial).position, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn plane_resolution_follows_lod() {
        let mut viewer = running_with_cube();
        viewer.lod_mut().set_lod(0);
        let slice = viewer.reconstruct_plane(Orientation::Axial, 200, 100);
        assert_eq!(slice.image.dimensions(), (50, 25));
    }

    #[test]
    fn zero_resolution_path_stays_empty() {
        let mut viewer = running_with_cube();
        let path = CurvedPath::new(
            vec![Vector3::new(0.1, 0.5, 0.5), Vector3::new(0.9, 0.5, 0.5)],
            0.1,
            0,
        );
        let curved = viewer.reconstruct_curved(&path);
        assert_eq!(curved.image.width(), 0);
    }

    #[test]
    fn reslice_issues_reach_viewer_stats() {
        let mut viewer = running_with_cube();
        fire(&mut viewer).unwrap();
        assert!(!viewer.stats().has_issue(IssueClass::DataShape));

        let degenerate = CurvedPath::new(vec![Vector3::new(0.5, 0.5, 0.5)], 0.1, 16);
        viewer.reconstruct_curved(&degenerate);
        assert!(viewer.stats().has_issue(IssueClass::DataShape));

        // The next frame starts a fresh record.
        fire(&mut viewer).unwrap();
        assert!(!viewer.stats().has_issue(IssueClass::DataShape));
    }
}
