#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::enums::{Interpolation, QualityLevel};
use crate::lod::LodLevel;

/// Ray-march and lighting settings. Updated between frames by the UI and by
/// the LOD controller.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RenderingParameters {
    /// Ray increment in normalised volume units.
    pub step_size: f32,
    pub max_steps: u32,
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
    pub shininess: f32,
    /// Gradient magnitude below which a sample is left unshaded.
    pub gradient_threshold: f32,
    pub enable_shading: bool,
    pub enable_jittering: bool,
    pub enable_early_ray_termination: bool,
    pub interpolation: Interpolation,
    pub quality_level: QualityLevel,
}

impl Default for RenderingParameters {
    fn default() -> Self {
        Self {
            step_size: 1.0 / 512.0,
            max_steps: 887,
            ambient: 0.3,
            diffuse: 0.7,
            specular: 0.2,
            shininess: 32.0,
            gradient_threshold: 0.01,
            enable_shading: true,
            enable_jittering: true,
            enable_early_ray_termination: true,
            interpolation: Interpolation::Trilinear,
            quality_level: QualityLevel::High,
        }
    }
}

impl RenderingParameters {
    /// Copy with every field forced into its legal range.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let unit = |v: f32, fallback: f32| {
            if v.is_finite() {
                v.clamp(0.0, 1.0)
            } else {
                fallback
            }
        };
        Self {
            step_size: if self.step_size.is_finite() && self.step_size > 0.0 {
                self.step_size
            } else {
                defaults.step_size
            },
            max_steps: self.max_steps.max(1),
            ambient: unit(self.ambient, defaults.ambient),
            diffuse: unit(self.diffuse, defaults.diffuse),
            specular: unit(self.specular, defaults.specular),
            shininess: if self.shininess.is_finite() {
                self.shininess.max(1.0)
            } else {
                defaults.shininess
            },
            gradient_threshold: if self.gradient_threshold.is_finite() {
                self.gradient_threshold.max(0.0)
            } else {
                defaults.gradient_threshold
            },
            ..*self
        }
    }

    /// Take step size, step budget and quality from a level of detail.
    pub fn apply_lod(&mut self, level: &LodLevel) {
        self.step_size = level.step_size();
        self.max_steps = level.max_steps();
        self.quality_level = level.quality;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lod::LOD_LEVELS;

    #[test]
    fn sanitize_clamps_out_of_range_fields() {
        let params = RenderingParameters {
            step_size: 0.0,
            max_steps: 0,
            ambient: 1.5,
            diffuse: -0.2,
            specular: f32::NAN,
            shininess: 0.2,
            gradient_threshold: -1.0,
            ..RenderingParameters::default()
        }
        .sanitized();
        assert!(params.step_size > 0.0);
        assert_eq!(params.max_steps, 1);
        assert_eq!(params.ambient, 1.0);
        assert_eq!(params.diffuse, 0.0);
        assert_eq!(params.specular, RenderingParameters::default().specular);
        assert_eq!(params.shininess, 1.0);
        assert_eq!(params.gradient_threshold, 0.0);
    }

    #[test]
    fn coarser_levels_take_larger_steps() {
        let mut coarse = RenderingParameters::default();
        let mut fine = RenderingParameters::default();
        coarse.apply_lod(&LOD_LEVELS[0]);
        fine.apply_lod(&LOD_LEVELS[4]);
        assert!(coarse.step_size > fine.step_size);
        assert!(coarse.max_steps < fine.max_steps);
        assert_eq!(coarse.quality_level, QualityLevel::UltraLow);
    }
}
