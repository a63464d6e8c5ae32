//! # freehand-volume library
//!
//! This crate reconstructs a regular 3D scalar volume from a stack of tracked
//! 2D images, as produced by freehand ultrasound or any other scanner whose
//! frames carry their own 4x4 pose.
//!
//! Every source pixel is transformed into the shared frame and binned into a
//! voxel grid that covers all images. Voxels are filled with one of three
//! strategies:
//!  - Nearest neighbor
//!  - Fixed Gaussian splatting
//!  - Adaptive Gaussian splatting, where the kernel narrows at image edges
//!
//! Voxels that no pixel reached are patched afterwards by averaging a fixed
//! or a growing neighbourhood. Binning and hole filling run in parallel using
//! rayon unless [`Processor::Sequential`] is selected.
//!
//! # Examples
//!
//! ## Reconstructing a volume from DICOM frames
//!
//! Load all tracked frames from the dicom/ directory, reconstruct them with
//! adaptive Gaussian splatting and save the center slice and the volume.
//!
//! ```no_run
//! # use freehand_volume::{StackLoader, ReconstructionConfig, BinFilling, Orientation, reconstruct, write_meta_image};
//! let stack = StackLoader::load_from_directory("dicom")
//!     .expect("should have loaded files from directory");
//! let config = ReconstructionConfig::default()
//!     .with_bin_filling(BinFilling::AdaptiveGaussian)
//!     .with_resolution(2.0);
//! let reconstruction = reconstruct(&stack, &config).expect("should have reconstructed volume");
//! let volume = &reconstruction.volume;
//! volume
//!     .get_image_from_axis(volume.dim().0 / 2, Orientation::Axial)
//!     .expect("should have returned image at center of volume")
//!     .save("result.png")
//!     .expect("should have saved slice");
//! write_meta_image(volume, "volume").expect("should have written volume");
//! ```

pub mod binning;
pub mod bridge;
pub mod enums;
pub mod error;
pub mod geometry;
pub mod gradient;
pub mod hole_filling;
pub mod image_stack;
pub mod kernel;
pub mod meta_image;
pub mod reconstruction;
pub mod stack_loader;
pub mod volume;

pub use enums::{BinFilling, HoleFilling, Orientation, Processor};
pub use error::ReconstructionError;
pub use image_stack::{ImageStack, SourceImage};
pub use meta_image::write_meta_image;
pub use reconstruction::{
    Diagnostics, GaussianConfig, Reconstruction, ReconstructionConfig, Reconstructor, reconstruct,
};
pub use stack_loader::{StackLoader, StackLoaderError};
pub use volume::Volume;
