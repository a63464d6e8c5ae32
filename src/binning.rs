//! Pixel-to-voxel bin filling.
//!
//! Every source pixel is transformed into the volume frame and deposited into
//! an [`Accumulator`], which keeps the weighted intensity sum and the total
//! weight per voxel. Parallel runs give every rayon worker its own
//! accumulator and merge them by addition at the end.

use crate::enums::Processor;
use crate::error::ReconstructionError;
use crate::geometry::VolumeGeometry;
use crate::gradient::{AdaptiveVariance, GradientMap};
use crate::image_stack::{ImageStack, SourceImage};
use crate::kernel::{GaussianKernel, GaussianKernelTable};

use ndarray::{Array2, Array3, Zip, s};
use rayon::prelude::*;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicBool, Ordering};

/// Running weighted sum and weight per voxel, both indexed `[z, y, x]`.
#[derive(Clone, Debug)]
pub struct Accumulator {
    sum: Array3<f32>,
    weight: Array3<f32>,
}

impl Accumulator {
    pub fn new(shape: (usize, usize, usize)) -> Self {
        Self {
            sum: Array3::zeros(shape),
            weight: Array3::zeros(shape),
        }
    }

    pub fn sum(&self) -> &Array3<f32> {
        &self.sum
    }

    pub fn weight(&self) -> &Array3<f32> {
        &self.weight
    }

    #[inline]
    pub fn deposit(&mut self, voxel: [usize; 3], value: f32, weight: f32) {
        self.sum[voxel] += value * weight;
        self.weight[voxel] += weight;
    }

    /// Spread `value` over the kernel's support centred on `voxel`. Kernel
    /// cells that fall outside the grid are dropped.
    pub fn splat(&mut self, voxel: [usize; 3], kernel: &GaussianKernel, value: f32) {
        let r = kernel.radius();
        let shape = self.sum.dim();
        let extent = [shape.0, shape.1, shape.2];
        let mut grid = [(0, 0); 3];
        let mut local = [0; 3];
        for axis in 0..3 {
            let lo = voxel[axis].saturating_sub(r);
            let hi = (voxel[axis] + r + 1).min(extent[axis]);
            grid[axis] = (lo, hi);
            local[axis] = lo + r - voxel[axis];
        }
        let [(z0, z1), (y0, y1), (x0, x1)] = grid;
        let [kz, ky, kx] = local;

        let weights = kernel
            .weights()
            .slice(s![kz..kz + (z1 - z0), ky..ky + (y1 - y0), kx..kx + (x1 - x0)]);
        Zip::from(self.sum.slice_mut(s![z0..z1, y0..y1, x0..x1]))
            .and(self.weight.slice_mut(s![z0..z1, y0..y1, x0..x1]))
            .and(&weights)
            .for_each(|sum, weight, &w| {
                *sum += value * w;
                *weight += w;
            });
    }

    /// Add another partial accumulation of the same shape into this one.
    pub fn merge(mut self, other: Self) -> Self {
        self.sum += &other.sum;
        self.weight += &other.weight;
        self
    }

    /// `sum / weight` for every voxel with weight, zero elsewhere.
    pub fn normalize(&self) -> Array3<f32> {
        Zip::from(&self.sum)
            .and(&self.weight)
            .par_map_collect(|&sum, &weight| if weight == 0.0 { 0.0 } else { sum / weight })
    }

    pub fn into_parts(self) -> (Array3<f32>, Array3<f32>) {
        (self.sum, self.weight)
    }

    /// Voxels that received no contribution.
    pub fn empty_mask(&self) -> Array3<bool> {
        self.weight.mapv(|weight| weight == 0.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BinningStats {
    /// Pixels that landed inside the grid.
    pub deposited: usize,
    /// Pixels that landed outside the grid and were ignored.
    pub skipped: usize,
}

impl Add for BinningStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            deposited: self.deposited + other.deposited,
            skipped: self.skipped + other.skipped,
        }
    }
}

impl AddAssign for BinningStats {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Per-pixel deposit rule, resolved from [`crate::enums::BinFilling`].
#[derive(Clone, Copy, Debug)]
pub enum Deposit<'a> {
    NearestNeighbor,
    FixedGaussian(&'a GaussianKernel),
    AdaptiveGaussian {
        table: &'a GaussianKernelTable,
        mapping: AdaptiveVariance,
        gradients: &'a [GradientMap],
    },
}

pub struct BinningEngine<'a> {
    geometry: &'a VolumeGeometry,
    deposit: Deposit<'a>,
}

impl<'a> BinningEngine<'a> {
    pub fn new(geometry: &'a VolumeGeometry, deposit: Deposit<'a>) -> Self {
        Self { geometry, deposit }
    }

    /// Kernel variance chosen for each pixel of image `index`, or `None` when
    /// the engine does not adapt its kernels.
    pub fn variance_map(&self, index: usize) -> Option<Array2<f64>> {
        match self.deposit {
            Deposit::AdaptiveGaussian {
                mapping, gradients, ..
            } => gradients.get(index).map(|map| mapping.variance_map(map)),
            _ => None,
        }
    }

    /// Deposit every pixel of one source image.
    pub fn bin_image(
        &self,
        accumulator: &mut Accumulator,
        index: usize,
        image: SourceImage<'_>,
    ) -> BinningStats {
        let variances = self.variance_map(index);
        let mut stats = BinningStats::default();

        for ((y, x), &pixel) in image.pixels.indexed_iter() {
            let Some(voxel) = self.geometry.voxel_index(&image.pixel_position(x, y)) else {
                stats.skipped += 1;
                continue;
            };
            let value = f32::from(pixel);
            match (self.deposit, &variances) {
                (Deposit::NearestNeighbor, _) => accumulator.deposit(voxel, value, 1.0),
                (Deposit::FixedGaussian(kernel), _) => accumulator.splat(voxel, kernel, value),
                (Deposit::AdaptiveGaussian { table, .. }, Some(variances)) => {
                    accumulator.splat(voxel, table.nearest(variances[[y, x]]), value);
                }
                (Deposit::AdaptiveGaussian { table, mapping, .. }, None) => {
                    accumulator.splat(voxel, table.nearest(mapping.max), value);
                }
            }
            stats.deposited += 1;
        }
        stats
    }

    /// Deposit the whole stack. `cancel` is checked before every image.
    ///
    /// # Errors
    ///
    /// Returns [`ReconstructionError::Cancelled`] once `cancel` is set.
    pub fn bin_stack(
        &self,
        stack: &ImageStack,
        processor: Processor,
        cancel: Option<&AtomicBool>,
    ) -> Result<(Accumulator, BinningStats), ReconstructionError> {
        let shape = self.geometry.shape();
        let check = || match cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(ReconstructionError::Cancelled),
            _ => Ok(()),
        };

        match processor {
            Processor::Sequential => {
                let mut accumulator = Accumulator::new(shape);
                let mut stats = BinningStats::default();
                for (index, image) in stack.iter().enumerate() {
                    check()?;
                    stats += self.bin_image(&mut accumulator, index, image);
                }
                Ok((accumulator, stats))
            }
            Processor::Parallel => stack
                .par_iter()
                .enumerate()
                .try_fold(
                    || (Accumulator::new(shape), BinningStats::default()),
                    |(mut accumulator, stats), (index, image)| {
                        check()?;
                        let image_stats = self.bin_image(&mut accumulator, index, image);
                        Ok::<_, ReconstructionError>((accumulator, stats + image_stats))
                    },
                )
                .try_reduce(
                    || (Accumulator::new(shape), BinningStats::default()),
                    |(a, a_stats), (b, b_stats)| Ok((a.merge(b), a_stats + b_stats)),
                ),
        }
    }
}
