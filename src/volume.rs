use std::borrow::Cow;

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, Zip};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::enums::{DataType, Interpolation};
use crate::error::VolumeError;
use crate::sampler::Sampler;

/// Voxel counts along each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Dimensions {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub fn largest(&self) -> usize {
        self.width.max(self.height).max(self.depth)
    }

    /// ndarray shape, (depth, height, width)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.depth, self.height, self.width)
    }
}

/// Scalar element types a decoded buffer may hold.
pub trait Voxel: Copy + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    fn to_f32(self) -> f32;

    fn into_buffer(data: Array3<Self>) -> VoxelBuffer;
}

impl Voxel for u8 {
    const DATA_TYPE: DataType = DataType::Uint8;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn into_buffer(data: Array3<Self>) -> VoxelBuffer {
        VoxelBuffer::Uint8(data)
    }
}

impl Voxel for u16 {
    const DATA_TYPE: DataType = DataType::Uint16;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn into_buffer(data: Array3<Self>) -> VoxelBuffer {
        VoxelBuffer::Uint16(data)
    }
}

impl Voxel for f32 {
    const DATA_TYPE: DataType = DataType::Float32;

    fn to_f32(self) -> f32 {
        self
    }

    fn into_buffer(data: Array3<Self>) -> VoxelBuffer {
        VoxelBuffer::Float32(data)
    }
}

/// Raw samples indexed `[z, y, x]`.
#[derive(Clone, Debug)]
pub enum VoxelBuffer {
    Uint8(Array3<u8>),
    Uint16(Array3<u16>),
    Float32(Array3<f32>),
}

impl VoxelBuffer {
    fn dim(&self) -> (usize, usize, usize) {
        match self {
            VoxelBuffer::Uint8(data) => data.dim(),
            VoxelBuffer::Uint16(data) => data.dim(),
            VoxelBuffer::Float32(data) => data.dim(),
        }
    }

    #[inline]
    fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        match self {
            VoxelBuffer::Uint8(data) => data[[z, y, x]] as f32,
            VoxelBuffer::Uint16(data) => data[[z, y, x]] as f32,
            VoxelBuffer::Float32(data) => data[[z, y, x]],
        }
    }

    fn data_type(&self) -> DataType {
        match self {
            VoxelBuffer::Uint8(_) => DataType::Uint8,
            VoxelBuffer::Uint16(_) => DataType::Uint16,
            VoxelBuffer::Float32(_) => DataType::Float32,
        }
    }

    fn finite_range(&self) -> Option<(f32, f32)> {
        fn fold<T: Voxel>(data: &Array3<T>) -> Option<(f32, f32)> {
            data.iter()
                .map(|&v| v.to_f32())
                .filter(|v| v.is_finite())
                .fold(None, |range, v| match range {
                    None => Some((v, v)),
                    Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                })
        }
        match self {
            VoxelBuffer::Uint8(data) => fold(data),
            VoxelBuffer::Uint16(data) => fold(data),
            VoxelBuffer::Float32(data) => fold(data),
        }
    }
}

/// An immutable scalar field with its physical metadata.
///
/// Samples outside `[min_value, max_value]` are clamped on read, so a buffer
/// that disagrees with its declared range can never leak out-of-range values
/// into the transfer function or the MPR output.
#[derive(Clone, Debug)]
pub struct VolumeData {
    data: VoxelBuffer,
    dimensions: Dimensions,
    /// Millimetres per voxel along (x, y, z).
    pub spacing: (f32, f32, f32),
    pub origin: Vector3<f32>,
    /// Direction cosines, one column per volume axis.
    pub orientation: Matrix3<f32>,
    min_value: f32,
    max_value: f32,
}

impl VolumeData {
    /// Build a volume from a flat buffer in x-fastest order.
    pub fn from_vec<T: Voxel>(
        dimensions: Dimensions,
        samples: Vec<T>,
        spacing: (f32, f32, f32),
    ) -> Result<Self, VolumeError> {
        Self::validate_dimensions(dimensions)?;
        let expected = dimensions.voxel_count();
        if samples.len() != expected {
            return Err(VolumeError::BufferLengthMismatch {
                expected,
                actual: samples.len(),
            });
        }
        let actual = samples.len();
        let data = Array3::from_shape_vec(dimensions.shape(), samples)
            .map_err(|_| VolumeError::BufferLengthMismatch { expected, actual })?;
        Self::from_array(data, spacing)
    }

    /// Build a volume from an array indexed `[z, y, x]`.
    pub fn from_array<T: Voxel>(
        data: Array3<T>,
        spacing: (f32, f32, f32),
    ) -> Result<Self, VolumeError> {
        let (depth, height, width) = data.dim();
        let dimensions = Dimensions::new(width, height, depth);
        Self::validate_dimensions(dimensions)?;
        Self::validate_spacing(spacing)?;

        let data = T::into_buffer(data);
        let (min_value, max_value) = data.finite_range().unwrap_or((0.0, 0.0));

        Ok(Self {
            data,
            dimensions,
            spacing,
            origin: Vector3::zeros(),
            orientation: Matrix3::identity(),
            min_value,
            max_value,
        })
    }

    /// Fill a float volume by evaluating `f(x, y, z)` at every voxel index.
    pub fn from_fn(
        dimensions: Dimensions,
        spacing: (f32, f32, f32),
        f: impl Fn(usize, usize, usize) -> f32,
    ) -> Result<Self, VolumeError> {
        Self::validate_dimensions(dimensions)?;
        let data = Array3::from_shape_fn(dimensions.shape(), |(z, y, x)| f(x, y, z));
        Self::from_array(data, spacing)
    }

    /// Replace the normalisation range supplied by the decoder.
    pub fn with_range(mut self, min_value: f32, max_value: f32) -> Result<Self, VolumeError> {
        if !min_value.is_finite() || !max_value.is_finite() || min_value > max_value {
            return Err(VolumeError::InvalidRange {
                min: min_value,
                max: max_value,
            });
        }
        self.min_value = min_value;
        self.max_value = max_value;
        Ok(self)
    }

    pub fn with_geometry(mut self, origin: Vector3<f32>, orientation: Matrix3<f32>) -> Self {
        self.origin = origin;
        self.orientation = orientation;
        self
    }

    fn validate_dimensions(dimensions: Dimensions) -> Result<(), VolumeError> {
        if dimensions.width == 0 || dimensions.height == 0 || dimensions.depth == 0 {
            return Err(VolumeError::ZeroDimension((
                dimensions.width,
                dimensions.height,
                dimensions.depth,
            )));
        }
        Ok(())
    }

    fn validate_spacing(spacing: (f32, f32, f32)) -> Result<(), VolumeError> {
        let (x, y, z) = spacing;
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !(positive(x) && positive(y) && positive(z)) {
            return Err(VolumeError::InvalidSpacing(spacing));
        }
        Ok(())
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    pub fn data(&self) -> &VoxelBuffer {
        &self.data
    }

    pub fn min_value(&self) -> f32 {
        self.min_value
    }

    pub fn max_value(&self) -> f32 {
        self.max_value
    }

    pub fn voxel_count(&self) -> usize {
        self.dimensions.voxel_count()
    }

    pub fn byte_size(&self) -> usize {
        self.voxel_count() * self.data_type().size_of()
    }

    /// Raw sample at integer indices, clamped into the declared range.
    ///
    /// Indices must be in bounds; the sampler clamps them before calling.
    #[inline]
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> f32 {
        let value = self.data.get(x, y, z);
        if value.is_nan() {
            return self.min_value;
        }
        value.clamp(self.min_value, self.max_value)
    }

    /// Map a raw value into [0, 1] using the volume range. A flat volume maps
    /// everything to 0.
    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        let range = self.max_value - self.min_value;
        if range <= f32::EPSILON {
            return 0.0;
        }
        ((value - self.min_value) / range).clamp(0.0, 1.0)
    }

    /// Every voxel normalised into [0, 1], x fastest.
    pub fn normalized_samples(&self) -> Vec<f32> {
        let Dimensions {
            width,
            height,
            depth,
        } = self.dimensions;
        let mut samples = Vec::with_capacity(self.voxel_count());
        for z in 0..depth {
            for y in 0..height {
                for x in 0..width {
                    samples.push(self.normalize(self.voxel(x, y, z)));
                }
            }
        }
        samples
    }

    /// Physical size of the volume scaled so the longest side is 1.
    pub fn physical_extent(&self) -> Vector3<f32> {
        let (sx, sy, sz) = self.spacing;
        let extent = Vector3::new(
            self.dimensions.width as f32 * sx,
            self.dimensions.height as f32 * sy,
            self.dimensions.depth as f32 * sz,
        );
        let longest = extent.max();
        if longest <= 0.0 {
            return Vector3::repeat(1.0);
        }
        extent / longest
    }

    /// Voxel counts that give every axis the finest spacing, (depth, height,
    /// width).
    pub fn isotropic_dimensions(&self) -> (u32, u32, u32) {
        let (x_spacing, y_spacing, z_spacing) = self.spacing;
        let min_spacing = x_spacing.min(y_spacing).min(z_spacing);
        let inv_min_spacing = 1.0 / min_spacing;

        let new_x = (self.dimensions.width as f32 * x_spacing * inv_min_spacing) as u32;
        let new_y = (self.dimensions.height as f32 * y_spacing * inv_min_spacing) as u32;
        let new_z = (self.dimensions.depth as f32 * z_spacing * inv_min_spacing) as u32;

        (new_z.max(1), new_y.max(1), new_x.max(1))
    }

    /// Shrink the volume so no axis exceeds `max_dim` voxels.
    ///
    /// Resampling goes through [`Sampler`] so a down-sized upload sees the same
    /// interpolation as every other consumer.
    pub fn resampled_to_fit(&self, max_dim: usize) -> Cow<'_, VolumeData> {
        let max_dim = max_dim.max(1);
        let largest = self.dimensions.largest();
        if largest <= max_dim {
            return Cow::Borrowed(self);
        }

        let factor = max_dim as f32 / largest as f32;
        let shrink = |n: usize| ((n as f32 * factor).round() as usize).clamp(1, max_dim);
        let target = Dimensions::new(
            shrink(self.dimensions.width),
            shrink(self.dimensions.height),
            shrink(self.dimensions.depth),
        );

        let coordinate = |i: usize, n: usize| {
            if n <= 1 {
                0.5
            } else {
                i as f32 / (n - 1) as f32
            }
        };

        let mut data = Array3::<f32>::zeros(target.shape());
        Zip::indexed(&mut data).par_for_each(|(z, y, x), value| {
            let position = Vector3::new(
                coordinate(x, target.width),
                coordinate(y, target.height),
                coordinate(z, target.depth),
            );
            *value = Sampler::sample_at(self, &position, Interpolation::Trilinear);
        });

        let (sx, sy, sz) = self.spacing;
        let spacing = (
            sx * self.dimensions.width as f32 / target.width as f32,
            sy * self.dimensions.height as f32 / target.height as f32,
            sz * self.dimensions.depth as f32 / target.depth as f32,
        );

        Cow::Owned(Self {
            data: VoxelBuffer::Float32(data),
            dimensions: target,
            spacing,
            origin: self.origin,
            orientation: self.orientation,
            min_value: self.min_value,
            max_value: self.max_value,
        })
    }
}
