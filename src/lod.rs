//! Adaptive level of detail.
//!
//! [`LodController`] watches frame times and memory use and walks a fixed
//! table of [`LodLevel`]s one step at a time:
//!
//!  - [`LodController::select_for_view`] sets the target level implied by
//!    zoom, dataset size and the current performance score.
//!  - [`LodController::adapt`] is the periodic pass and the only automatic
//!    change to the current level. It moves at most one level per adaptation
//!    interval, and memory pressure above 90% of the budget always wins over
//!    the frame-rate score.
//!
//! A level set with [`LodController::set_lod`] survives only while adaptation
//! is disabled; otherwise the next automatic decision replaces it.

use std::collections::VecDeque;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::enums::QualityLevel;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LodLevel {
    pub level: usize,
    pub scale: f32,
    pub quality: QualityLevel,
    pub max_texture_size: u32,
    pub compression_ratio: f32,
}

pub const LOD_LEVELS: [LodLevel; 5] = [
    LodLevel {
        level: 0,
        scale: 0.25,
        quality: QualityLevel::UltraLow,
        max_texture_size: 128,
        compression_ratio: 8.0,
    },
    LodLevel {
        level: 1,
        scale: 0.5,
        quality: QualityLevel::Low,
        max_texture_size: 256,
        compression_ratio: 4.0,
    },
    LodLevel {
        level: 2,
        scale: 0.75,
        quality: QualityLevel::Medium,
        max_texture_size: 512,
        compression_ratio: 2.0,
    },
    LodLevel {
        level: 3,
        scale: 1.0,
        quality: QualityLevel::High,
        max_texture_size: 1024,
        compression_ratio: 1.0,
    },
    LodLevel {
        level: 4,
        scale: 1.0,
        quality: QualityLevel::UltraHigh,
        max_texture_size: 2048,
        compression_ratio: 1.0,
    },
];

impl LodLevel {
    /// Ray step in normalised volume units.
    pub fn step_size(&self) -> f32 {
        match self.quality {
            QualityLevel::UltraLow => 1.0 / 64.0,
            QualityLevel::Low => 1.0 / 128.0,
            QualityLevel::Medium => 1.0 / 256.0,
            QualityLevel::High => 1.0 / 512.0,
            QualityLevel::UltraHigh => 1.0 / 1024.0,
        }
    }

    /// Enough steps to cross the unit cube diagonal.
    pub fn max_steps(&self) -> u32 {
        (3.0f32.sqrt() / self.step_size()).ceil() as u32
    }

    /// Scale an output resolution by this level, capped at the texture limit.
    pub fn clamp_resolution(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = |n: u32| ((n as f32 * self.scale).round() as u32).max(1);
        let (w, h) = (scale(width), scale(height));
        let longest = w.max(h);
        if longest <= self.max_texture_size {
            return (w, h);
        }
        let shrink = self.max_texture_size as f32 / longest as f32;
        (
            ((w as f32 * shrink).round() as u32).max(1),
            ((h as f32 * shrink).round() as u32).max(1),
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LodConfig {
    pub enable_adaptive_lod: bool,
    pub target_fps: f64,
    pub adaptation_interval: Duration,
    /// Frame and memory samples kept for the rolling averages.
    pub window_size: usize,
    pub memory_budget_bytes: u64,
    /// Fraction of the budget above which the level is forced down.
    pub memory_pressure_ratio: f64,
    pub excellent_score: f64,
    pub good_score: f64,
    pub acceptable_score: f64,
    /// Ascending zoom thresholds; zoom below `zoom_thresholds[i]` gives base
    /// level `i`, anything above the last gives the top level.
    pub zoom_thresholds: [f32; 4],
    pub large_dataset_voxels: usize,
    pub huge_dataset_voxels: usize,
    pub initial_lod: usize,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            enable_adaptive_lod: true,
            target_fps: 60.0,
            adaptation_interval: Duration::from_secs(1),
            window_size: 60,
            memory_budget_bytes: 512 * 1024 * 1024,
            memory_pressure_ratio: 0.9,
            excellent_score: 0.9,
            good_score: 0.7,
            acceptable_score: 0.5,
            zoom_thresholds: [0.25, 0.5, 1.0, 2.0],
            large_dataset_voxels: 256 * 256 * 256,
            huge_dataset_voxels: 512 * 512 * 256,
            initial_lod: 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LodMetrics {
    pub fps: f64,
    pub frame_time_ms: f64,
    pub memory_usage_bytes: u64,
    pub performance_score: f64,
    pub current_lod: usize,
    pub target_lod: usize,
}

pub struct LodController {
    config: LodConfig,
    levels: &'static [LodLevel],
    current_lod: usize,
    target_lod: usize,
    frame_times_ms: VecDeque<f64>,
    memory_samples: VecDeque<u64>,
    last_adaptation: Option<Instant>,
}

impl LodController {
    pub fn new(config: LodConfig) -> Self {
        let levels: &'static [LodLevel] = &LOD_LEVELS;
        let current_lod = config.initial_lod.min(levels.len() - 1);
        Self {
            config,
            levels,
            current_lod,
            target_lod: current_lod,
            frame_times_ms: VecDeque::new(),
            memory_samples: VecDeque::new(),
            last_adaptation: None,
        }
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    pub fn set_adaptive(&mut self, enabled: bool) {
        self.config.enable_adaptive_lod = enabled;
    }

    pub fn levels(&self) -> &[LodLevel] {
        self.levels
    }

    pub fn current_lod(&self) -> usize {
        self.current_lod
    }

    pub fn current_level(&self) -> &LodLevel {
        &self.levels[self.current_lod]
    }

    /// Manually pick a level. Sticks only while adaptation is disabled.
    pub fn set_lod(&mut self, level: usize) -> &LodLevel {
        let level = level.min(self.levels.len() - 1);
        if level != self.current_lod {
            log::info!("LOD manually set {} -> {}", self.current_lod, level);
        }
        self.current_lod = level;
        self.target_lod = level;
        &self.levels[level]
    }

    pub fn record_frame(&mut self, render_time_ms: f64) {
        if !render_time_ms.is_finite() || render_time_ms < 0.0 {
            return;
        }
        Self::push_bounded(&mut self.frame_times_ms, render_time_ms, self.config.window_size);
    }

    pub fn record_memory(&mut self, bytes: u64) {
        Self::push_bounded(&mut self.memory_samples, bytes, self.config.window_size);
    }

    fn push_bounded<T>(window: &mut VecDeque<T>, value: T, capacity: usize) {
        window.push_back(value);
        while window.len() > capacity.max(1) {
            window.pop_front();
        }
    }

    pub fn average_frame_time_ms(&self) -> Option<f64> {
        if self.frame_times_ms.is_empty() {
            return None;
        }
        Some(self.frame_times_ms.iter().sum::<f64>() / self.frame_times_ms.len() as f64)
    }

    pub fn average_fps(&self) -> Option<f64> {
        let frame_time = self.average_frame_time_ms()?;
        if frame_time <= f64::EPSILON {
            return Some(f64::INFINITY);
        }
        Some(1000.0 / frame_time)
    }

    pub fn average_memory(&self) -> Option<u64> {
        if self.memory_samples.is_empty() {
            return None;
        }
        Some(self.memory_samples.iter().sum::<u64>() / self.memory_samples.len() as u64)
    }

    /// Rolling FPS over target FPS, clamped to `[0, 1]`. `None` until a frame
    /// has been recorded.
    pub fn performance_score(&self) -> Option<f64> {
        let fps = self.average_fps()?;
        if self.config.target_fps <= 0.0 {
            return Some(1.0);
        }
        Some((fps / self.config.target_fps).clamp(0.0, 1.0))
    }

    fn performance_adjustment(&self) -> isize {
        match self.performance_score() {
            Some(score) if score < self.config.acceptable_score => -1,
            Some(score) if score > self.config.excellent_score => 1,
            _ => 0,
        }
    }

    fn base_lod_for_zoom(&self, zoom: f32) -> usize {
        self.config
            .zoom_thresholds
            .iter()
            .position(|&threshold| zoom < threshold)
            .unwrap_or(self.config.zoom_thresholds.len())
    }

    fn dataset_adjustment(&self, voxel_count: usize) -> isize {
        if voxel_count > self.config.huge_dataset_voxels {
            -2
        } else if voxel_count > self.config.large_dataset_voxels {
            -1
        } else {
            0
        }
    }

    /// Level implied by zoom, dataset size and the current score.
    pub fn optimal_lod(&self, zoom: f32, voxel_count: usize) -> usize {
        let base = self.base_lod_for_zoom(zoom) as isize;
        let lod = base + self.dataset_adjustment(voxel_count) + self.performance_adjustment();
        lod.clamp(0, self.levels.len() as isize - 1) as usize
    }

    /// Retarget after a zoom or dataset change. Only the target moves; the
    /// current level follows one step per [`Self::adapt`] pass.
    pub fn select_for_view(&mut self, zoom: f32, voxel_count: usize) -> usize {
        let target = self.optimal_lod(zoom, voxel_count);
        if target != self.target_lod {
            log::debug!(
                "LOD target for zoom {zoom:.2} and {voxel_count} voxels: {} -> {}",
                self.target_lod,
                target
            );
        }
        self.target_lod = target;
        target
    }

    /// Periodic pass. Moves at most one level and at most once per
    /// adaptation interval; returns the new level when it changed.
    ///
    /// Memory pressure drops a level, then the frame-rate score decides. With
    /// a "good" score the level walks toward the view target.
    pub fn adapt(&mut self, now: Instant) -> Option<&LodLevel> {
        if !self.config.enable_adaptive_lod {
            return None;
        }
        if let Some(last) = self.last_adaptation {
            if now.saturating_duration_since(last) < self.config.adaptation_interval {
                return None;
            }
        }
        self.last_adaptation = Some(now);

        let memory_limit =
            self.config.memory_budget_bytes as f64 * self.config.memory_pressure_ratio;
        let under_memory_pressure = self
            .average_memory()
            .is_some_and(|memory| memory as f64 > memory_limit);

        let performance = self.performance_adjustment();
        let step = if under_memory_pressure {
            -1
        } else if performance != 0 {
            performance
        } else {
            (self.target_lod as isize - self.current_lod as isize).signum()
        };

        let next = (self.current_lod as isize + step).clamp(0, self.levels.len() as isize - 1)
            as usize;
        if next == self.current_lod {
            return None;
        }

        log::info!(
            "LOD adapted {} -> {} (score {:?}, memory pressure {}, target {})",
            self.current_lod,
            next,
            self.performance_score(),
            under_memory_pressure,
            self.target_lod
        );
        if under_memory_pressure || performance != 0 {
            self.target_lod = next;
        }
        self.current_lod = next;
        Some(&self.levels[next])
    }

    pub fn metrics(&self) -> LodMetrics {
        LodMetrics {
            fps: self.average_fps().unwrap_or(0.0),
            frame_time_ms: self.average_frame_time_ms().unwrap_or(0.0),
            memory_usage_bytes: self.average_memory().unwrap_or(0),
            performance_score: self.performance_score().unwrap_or(0.0),
            current_lod: self.current_lod,
            target_lod: self.target_lod,
        }
    }
}

impl Default for LodController {
    fn default() -> Self {
        Self::new(LodConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_with_frames(frame_ms: f64) -> LodController {
        let mut lod = LodController::default();
        for _ in 0..30 {
            lod.record_frame(frame_ms);
        }
        lod
    }

    #[test]
    fn levels_ascend_in_quality() {
        for pair in LOD_LEVELS.windows(2) {
            assert!(pair[0].quality < pair[1].quality);
            assert!(pair[0].max_texture_size < pair[1].max_texture_size);
            assert!(pair[0].step_size() > pair[1].step_size());
        }
        assert!(LOD_LEVELS.iter().all(|l| l.scale > 0.0 && l.scale <= 1.0));
    }

    #[test]
    fn window_is_bounded() {
        let mut lod = LodController::default();
        for i in 0..200 {
            lod.record_frame(i as f64);
        }
        assert_eq!(lod.frame_times_ms.len(), 60);
    }

    #[test]
    fn score_is_clamped() {
        let fast = controller_with_frames(1.0);
        let slow = controller_with_frames(1000.0);
        assert_eq!(fast.performance_score(), Some(1.0));
        assert!(slow.performance_score().unwrap() < 0.1);
    }

    #[test]
    fn zoom_sets_base_level() {
        let lod = LodController::default();
        assert_eq!(lod.optimal_lod(0.1, 1000), 0);
        assert_eq!(lod.optimal_lod(0.75, 1000), 2);
        assert_eq!(lod.optimal_lod(1.0, 1000), 3);
        assert_eq!(lod.optimal_lod(8.0, 1000), 4);
    }

    #[test]
    fn large_datasets_bias_down() {
        let lod = LodController::default();
        assert_eq!(lod.optimal_lod(1.0, 300 * 300 * 300), 2);
        assert_eq!(lod.optimal_lod(1.0, 1024 * 1024 * 256), 1);
    }

    #[test]
    fn adaptation_respects_interval() {
        let mut lod = controller_with_frames(100.0);
        let start = Instant::now();
        assert!(lod.adapt(start).is_some());
        assert!(lod.adapt(start + Duration::from_millis(500)).is_none());
        assert!(lod.adapt(start + Duration::from_millis(1000)).is_some());
        assert_eq!(lod.current_lod(), 1);
    }

    #[test]
    fn adaptation_disabled_keeps_manual_choice() {
        let mut lod = controller_with_frames(100.0);
        lod.set_adaptive(false);
        lod.set_lod(4);
        assert!(lod.adapt(Instant::now()).is_none());
        assert_eq!(lod.current_lod(), 4);
    }

    #[test]
    fn view_target_is_reached_one_step_per_interval() {
        let mut lod = controller_with_frames(25.0);
        let start = Instant::now();
        assert_eq!(lod.select_for_view(0.1, 1000), 0);
        assert_eq!(lod.current_lod(), 3);

        let mut walked = Vec::new();
        for tick in 0..5 {
            if let Some(level) = lod.adapt(start + Duration::from_secs(tick)) {
                walked.push(level.level);
            }
        }
        assert_eq!(walked, vec![2, 1, 0]);
    }
}
