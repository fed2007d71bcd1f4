#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The three canonical medical axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Sagittal,
        Orientation::Coronal,
    ];
}

/// Voxel interpolation mode used by the shared sampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Interpolation {
    Nearest,
    #[default]
    Trilinear,
    /// Currently evaluated as trilinear. Call sites stay the same once a
    /// 64-tap kernel replaces it.
    Cubic,
}

/// Where the volume rendering work runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Processor {
    #[default]
    CPU,
    GPU,
}

/// Element type of the decoded sample buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataType {
    Uint8,
    Uint16,
    Float32,
}

impl DataType {
    pub fn size_of(self) -> usize {
        match self {
            DataType::Uint8 => 1,
            DataType::Uint16 => 2,
            DataType::Float32 => 4,
        }
    }
}

/// Discrete rendering quality, lowest first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum QualityLevel {
    UltraLow,
    Low,
    Medium,
    #[default]
    High,
    UltraHigh,
}
