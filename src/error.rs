use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error("Image stack is empty")]
    EmptyStack,

    #[error("Image stack has {images} images but {transforms} transforms")]
    StackLengthMismatch { images: usize, transforms: usize },

    #[error("Image {index} has no pixels")]
    EmptyImage { index: usize },

    #[error("Resolution must be positive, got {0}")]
    NonPositiveResolution(f64),

    #[error("Pixel scale must be positive, got ({x}, {y}, {z})")]
    NonPositiveScale { x: f64, y: f64, z: f64 },

    #[error("Invalid Gaussian kernel configuration: max variance {max_variance}, step {step}")]
    InvalidKernelConfig { max_variance: f64, step: f64 },

    #[error("Transformed images do not span a finite region")]
    NonFiniteGeometry,

    #[error("Volume of {x} x {y} x {z} voxels is too large")]
    VolumeTooLarge { x: f64, y: f64, z: f64 },

    #[error("Fixed kernel variance {variance} lies outside the kernel table range {min}..={max}")]
    FixedVarianceOutOfRange { variance: f64, min: f64, max: f64 },

    #[error("Hole filling radius must be at least 1")]
    InvalidHoleFillingRadius,

    #[error("Reconstruction was cancelled")]
    Cancelled,
}

impl ReconstructionError {
    /// Whether the error stems from the caller's input rather than from the
    /// run itself.
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, ReconstructionError::Cancelled)
    }
}
