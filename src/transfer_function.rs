//! Piecewise-linear transfer functions and their lookup tables.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default number of lookup table entries.
pub const LUT_RESOLUTION: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OpacityPoint {
    pub value: f32,
    pub alpha: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColorPoint {
    pub value: f32,
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

/// Named starting points for the transfer function editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Preset {
    Grayscale,
    CtBone,
    CtSoftTissue,
    CtLung,
    MrDefault,
}

/// Maps normalised intensity to colour and opacity. Opacity and colour keep
/// separate control points.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransferFunction {
    opacity: Vec<OpacityPoint>,
    color: Vec<ColorPoint>,
}

impl TransferFunction {
    /// Control points are sorted by value and clamped into `[0, 1]`.
    pub fn new(mut opacity: Vec<OpacityPoint>, mut color: Vec<ColorPoint>) -> Self {
        for point in &mut opacity {
            point.value = point.value.clamp(0.0, 1.0);
            point.alpha = point.alpha.clamp(0.0, 1.0);
        }
        for point in &mut color {
            point.value = point.value.clamp(0.0, 1.0);
            point.r = point.r.clamp(0.0, 1.0);
            point.g = point.g.clamp(0.0, 1.0);
            point.b = point.b.clamp(0.0, 1.0);
        }
        opacity.sort_by(|a, b| a.value.total_cmp(&b.value));
        color.sort_by(|a, b| a.value.total_cmp(&b.value));
        Self { opacity, color }
    }

    pub fn preset(preset: Preset) -> Self {
        let o = |value, alpha| OpacityPoint { value, alpha };
        let c = |value, r, g, b| ColorPoint { value, r, g, b };
        match preset {
            Preset::Grayscale => Self::new(
                vec![o(0.0, 0.0), o(1.0, 1.0)],
                vec![c(0.0, 0.0, 0.0, 0.0), c(1.0, 1.0, 1.0, 1.0)],
            ),
            Preset::CtBone => Self::new(
                vec![o(0.0, 0.0), o(0.4, 0.0), o(0.55, 0.3), o(0.75, 0.8), o(1.0, 1.0)],
                vec![
                    c(0.0, 0.0, 0.0, 0.0),
                    c(0.4, 0.55, 0.25, 0.15),
                    c(0.6, 0.9, 0.82, 0.65),
                    c(1.0, 1.0, 1.0, 0.95),
                ],
            ),
            Preset::CtSoftTissue => Self::new(
                vec![o(0.0, 0.0), o(0.2, 0.0), o(0.35, 0.15), o(0.5, 0.4), o(1.0, 0.6)],
                vec![
                    c(0.0, 0.0, 0.0, 0.0),
                    c(0.25, 0.62, 0.36, 0.18),
                    c(0.45, 0.88, 0.6, 0.48),
                    c(1.0, 1.0, 0.94, 0.85),
                ],
            ),
            Preset::CtLung => Self::new(
                vec![o(0.0, 0.0), o(0.05, 0.0), o(0.15, 0.25), o(0.3, 0.05), o(1.0, 0.0)],
                vec![
                    c(0.0, 0.0, 0.0, 0.0),
                    c(0.1, 0.3, 0.5, 0.9),
                    c(0.25, 0.85, 0.85, 1.0),
                    c(1.0, 1.0, 1.0, 1.0),
                ],
            ),
            Preset::MrDefault => Self::new(
                vec![o(0.0, 0.0), o(0.1, 0.0), o(0.5, 0.35), o(1.0, 0.8)],
                vec![
                    c(0.0, 0.0, 0.0, 0.0),
                    c(0.3, 0.5, 0.3, 0.2),
                    c(0.7, 0.95, 0.85, 0.7),
                    c(1.0, 1.0, 1.0, 1.0),
                ],
            ),
        }
    }

    pub fn opacity_points(&self) -> &[OpacityPoint] {
        &self.opacity
    }

    pub fn color_points(&self) -> &[ColorPoint] {
        &self.color
    }

    /// Colour and opacity at `value`, holding the end points outside the
    /// covered range.
    pub fn evaluate(&self, value: f32) -> [f32; 4] {
        let alpha = interpolate(&self.opacity, value, |p| p.value, |p| [p.alpha])
            .map_or(0.0, |[a]| a);
        let [r, g, b] = interpolate(&self.color, value, |p| p.value, |p| [p.r, p.g, p.b])
            .unwrap_or([0.0; 3]);
        [r, g, b, alpha]
    }
}

impl Default for TransferFunction {
    fn default() -> Self {
        Self::preset(Preset::Grayscale)
    }
}

fn interpolate<P, const N: usize>(
    points: &[P],
    value: f32,
    key: impl Fn(&P) -> f32,
    channels: impl Fn(&P) -> [f32; N],
) -> Option<[f32; N]> {
    let first = points.first()?;
    let last = points.last()?;
    if value <= key(first) {
        return Some(channels(first));
    }
    if value >= key(last) {
        return Some(channels(last));
    }

    // First point strictly above `value`; the bracket is the one before it.
    let upper = points.partition_point(|p| key(p) <= value);
    let (lo, hi) = (&points[upper - 1], &points[upper]);
    let span = key(hi) - key(lo);
    if span <= f32::EPSILON {
        return Some(channels(hi));
    }

    let t = (value - key(lo)) / span;
    let (a, b) = (channels(lo), channels(hi));
    Some(std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t))
}

/// A transfer function sampled at evenly spaced intensities in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct LookupTable {
    entries: Vec<[f32; 4]>,
}

impl LookupTable {
    pub fn build(tf: &TransferFunction, resolution: usize) -> Self {
        let resolution = resolution.max(1);
        let entries = (0..resolution)
            .map(|i| {
                let value = if resolution == 1 {
                    0.0
                } else {
                    i as f32 / (resolution - 1) as f32
                };
                tf.evaluate(value)
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[[f32; 4]] {
        &self.entries
    }

    /// Entry closest to a normalised intensity.
    #[inline]
    pub fn lookup(&self, value: f32) -> [f32; 4] {
        let last = self.entries.len() - 1;
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        let index = ((value * last as f32 + 0.5).floor() as usize).min(last);
        self.entries[index]
    }

    /// Flattened RGBA floats for a GPU storage buffer.
    pub fn to_rgba_f32(&self) -> Vec<f32> {
        self.entries.iter().flatten().copied().collect()
    }
}

impl Default for LookupTable {
    fn default() -> Self {
        Self::build(&TransferFunction::default(), LUT_RESOLUTION)
    }
}
