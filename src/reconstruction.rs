use crate::binning::{BinningEngine, BinningStats, Deposit};
use crate::enums::{BinFilling, HoleFilling, Processor};
use crate::error::ReconstructionError;
use crate::geometry::VolumeGeometry;
use crate::gradient::{AdaptiveVariance, GradientMap};
use crate::hole_filling::{HoleFiller, HoleFillingReport};
use crate::image_stack::ImageStack;
use crate::kernel::GaussianKernelTable;
use crate::volume::Volume;

use log::{debug, info};
use ndarray::Array3;
use rayon::prelude::*;
use std::sync::atomic::AtomicBool;
use web_time::Instant;

/// Range of kernel variances (squared voxel units) precomputed for the
/// Gaussian strategies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianConfig {
    pub max_variance: f64,
    pub step: f64,
}

impl Default for GaussianConfig {
    fn default() -> Self {
        Self {
            max_variance: 4.0,
            step: 0.25,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconstructionConfig {
    /// Voxel edge as a multiple of the pixel scale.
    pub resolution: f64,
    pub bin_filling: BinFilling,
    pub hole_filling: HoleFilling,
    pub gaussian: GaussianConfig,
    pub processor: Processor,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            bin_filling: BinFilling::default(),
            hole_filling: HoleFilling::default(),
            gaussian: GaussianConfig::default(),
            processor: Processor::default(),
        }
    }
}

impl ReconstructionConfig {
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_bin_filling(mut self, bin_filling: BinFilling) -> Self {
        self.bin_filling = bin_filling;
        self
    }

    pub fn with_hole_filling(mut self, hole_filling: HoleFilling) -> Self {
        self.hole_filling = hole_filling;
        self
    }

    pub fn with_gaussian(mut self, max_variance: f64, step: f64) -> Self {
        self.gaussian = GaussianConfig { max_variance, step };
        self
    }

    pub fn with_processor(mut self, processor: Processor) -> Self {
        self.processor = processor;
        self
    }

    /// Check every parameter without touching any image data.
    ///
    /// # Errors
    ///
    /// Returns the first invalid parameter found.
    pub fn validate(&self) -> Result<(), ReconstructionError> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(ReconstructionError::NonPositiveResolution(self.resolution));
        }
        HoleFiller::new(self.hole_filling)?;
        if self.bin_filling.needs_kernels() {
            let GaussianConfig { max_variance, step } = self.gaussian;
            let invalid = ReconstructionError::InvalidKernelConfig { max_variance, step };
            if !(step.is_finite() && step > 0.0 && max_variance.is_finite() && max_variance >= step) {
                return Err(invalid);
            }
            if let BinFilling::FixedGaussian { variance } = self.bin_filling {
                if !(variance.is_finite() && variance > 0.0) {
                    return Err(invalid);
                }
                if variance < step || variance > max_variance {
                    return Err(ReconstructionError::FixedVarianceOutOfRange {
                        variance,
                        min: step,
                        max: max_variance,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Diagnostics gathered alongside a finished volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub binning: BinningStats,
    pub hole_filling: HoleFillingReport,
}

/// Result of a reconstruction run.
#[derive(Clone, Debug)]
pub struct Reconstruction {
    pub volume: Volume,
    /// Accumulated weight per voxel before hole filling; zero marks voxels
    /// that no source pixel reached.
    pub weights: Array3<f32>,
    pub diagnostics: Diagnostics,
}

/// Reconstruct a volume from `stack`.
///
/// # Errors
///
/// Returns error if the configuration is invalid. Sparse data never fails
/// the run; see [`Diagnostics`].
pub fn reconstruct(
    stack: &ImageStack,
    config: &ReconstructionConfig,
) -> Result<Reconstruction, ReconstructionError> {
    Reconstructor::new(*config).run(stack)
}

/// Runs the reconstruction pipeline with a fixed configuration, optionally
/// observing a cancellation flag between source images.
pub struct Reconstructor<'a> {
    config: ReconstructionConfig,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Reconstructor<'a> {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn run(&self, stack: &ImageStack) -> Result<Reconstruction, ReconstructionError> {
        self.config.validate()?;
        let started = Instant::now();
        let config = &self.config;

        let geometry = VolumeGeometry::from_image_corners(stack, config.resolution)?;
        info!(
            "Reconstructing {} images ({} pixels) into {}x{}x{} voxels",
            stack.len(),
            stack.pixel_count(),
            geometry.size[0],
            geometry.size[1],
            geometry.size[2]
        );

        let table = if config.bin_filling.needs_kernels() {
            let GaussianConfig { max_variance, step } = config.gaussian;
            Some(GaussianKernelTable::new(max_variance, step)?)
        } else {
            None
        };

        let gradients: Vec<GradientMap> = match (config.bin_filling, config.processor) {
            (BinFilling::AdaptiveGaussian, Processor::Parallel) => stack
                .par_iter()
                .map(|image| GradientMap::compute(&image.pixels))
                .collect(),
            (BinFilling::AdaptiveGaussian, Processor::Sequential) => stack
                .iter()
                .map(|image| GradientMap::compute(&image.pixels))
                .collect(),
            _ => Vec::new(),
        };

        let deposit = match (config.bin_filling, &table) {
            (BinFilling::FixedGaussian { variance }, Some(table)) => {
                let kernel = table.nearest(variance);
                debug!(
                    "Fixed variance {variance} uses the kernel of variance {} (radius {})",
                    kernel.variance(),
                    kernel.radius()
                );
                Deposit::FixedGaussian(kernel)
            }
            (BinFilling::AdaptiveGaussian, Some(table)) => {
                let mapping = AdaptiveVariance::for_table(table, &gradients);
                debug!(
                    "Adaptive variance {}..={} over gradients up to {}",
                    mapping.min, mapping.max, mapping.gradient_ceiling
                );
                Deposit::AdaptiveGaussian {
                    table,
                    mapping,
                    gradients: &gradients,
                }
            }
            _ => Deposit::NearestNeighbor,
        };
        debug!("Prepared {:?} in {:?}", config.bin_filling, started.elapsed());

        let engine = BinningEngine::new(&geometry, deposit);
        let (accumulator, binning) = engine.bin_stack(stack, config.processor, self.cancel)?;
        info!(
            "Binned {} pixels ({} outside the volume) in {:?}",
            binning.deposited,
            binning.skipped,
            started.elapsed()
        );

        let mut data = accumulator.normalize();
        let empty = accumulator.empty_mask();
        let hole_filling = HoleFiller::new(config.hole_filling)?.fill(&mut data, &empty.view());
        info!(
            "Filled {} of {} empty voxels, reconstruction took {:?}",
            hole_filling.filled,
            hole_filling.empty_voxels,
            started.elapsed()
        );

        let (_, weights) = accumulator.into_parts();
        Ok(Reconstruction {
            volume: Volume::new(data, &geometry),
            weights,
            diagnostics: Diagnostics {
                binning,
                hole_filling,
            },
        })
    }
}
