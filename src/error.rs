use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("Buffer holds {actual} samples but dimensions require {expected}")]
    BufferLengthMismatch { expected: usize, actual: usize },

    #[error("Volume dimensions must all be at least 1, got {0:?}")]
    ZeroDimension((usize, usize, usize)),

    #[error("Voxel spacing must be positive, got {0:?}")]
    InvalidSpacing((f32, f32, f32)),

    #[error("Value range [{min}, {max}] is not a finite ascending range")]
    InvalidRange { min: f32, max: f32 },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No GPU adapter available: {0}")]
    AdapterUnavailable(#[from] wgpu::RequestAdapterError),

    #[error("GPU device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("Shader or pipeline creation failed: {0}")]
    Pipeline(String),

    #[error("Texture allocation failed: {0}")]
    TextureAllocation(String),

    #[error("Reading back the frame failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("Waiting for the GPU failed: {0}")]
    Poll(String),

    #[error("The readback channel was closed before the frame was mapped")]
    ReadbackCancelled,

    #[error("No volume has been uploaded")]
    MissingVolume,
}
