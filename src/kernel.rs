use crate::error::ReconstructionError;

use log::debug;
use ndarray::Array3;

/// A discretized, normalized 3D Gaussian.
#[derive(Clone, Debug)]
pub struct GaussianKernel {
    variance: f64,
    radius: usize,
    weights: Array3<f32>,
}

impl GaussianKernel {
    /// Sample a Gaussian of the given variance (squared voxel units) on a cube
    /// of half-width `ceil(3 * sigma)`, scaled so the weights sum to 1.
    pub fn new(variance: f64) -> Self {
        let sigma = variance.sqrt();
        let radius = ((3.0 * sigma).ceil() as usize).max(1);
        let side = 2 * radius + 1;
        let r = radius as f64;
        let mut weights = Array3::from_shape_fn((side, side, side), |(z, y, x)| {
            let (dz, dy, dx) = (z as f64 - r, y as f64 - r, x as f64 - r);
            (-(dx * dx + dy * dy + dz * dz) / (2.0 * variance)).exp() as f32
        });
        let total = weights.sum();
        weights /= total;
        Self {
            variance,
            radius,
            weights,
        }
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Weights indexed `[dz + r, dy + r, dx + r]`.
    pub fn weights(&self) -> &Array3<f32> {
        &self.weights
    }

    /// Largest single weight, found at the centre.
    pub fn peak(&self) -> f32 {
        let r = self.radius;
        self.weights[[r, r, r]]
    }
}

/// Kernels for the variances `step, 2 * step, ..., max_variance`.
#[derive(Clone, Debug)]
pub struct GaussianKernelTable {
    step: f64,
    kernels: Vec<GaussianKernel>,
}

impl GaussianKernelTable {
    /// # Errors
    ///
    /// Returns error if `step` is not positive or `max_variance` is smaller
    /// than one step.
    pub fn new(max_variance: f64, step: f64) -> Result<Self, ReconstructionError> {
        let invalid = || ReconstructionError::InvalidKernelConfig { max_variance, step };
        if !(step.is_finite() && step > 0.0 && max_variance.is_finite()) {
            return Err(invalid());
        }
        let count = (max_variance / step + 1e-9).floor() as usize;
        if count == 0 {
            return Err(invalid());
        }

        let kernels: Vec<_> = (1..=count)
            .map(|i| GaussianKernel::new(i as f64 * step))
            .collect();
        debug!(
            "Built {} Gaussian kernels, variance {}..={}, largest radius {}",
            kernels.len(),
            step,
            count as f64 * step,
            kernels.last().map_or(0, GaussianKernel::radius)
        );

        Ok(Self { step, kernels })
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn min_variance(&self) -> f64 {
        self.step
    }

    pub fn max_variance(&self) -> f64 {
        self.kernels.len() as f64 * self.step
    }

    pub fn kernels(&self) -> &[GaussianKernel] {
        &self.kernels
    }

    /// The kernel whose variance is closest to `variance`, clamped to the
    /// table's range.
    #[inline]
    pub fn nearest(&self, variance: f64) -> &GaussianKernel {
        let slot = (variance / self.step).round() as isize - 1;
        let slot = slot.clamp(0, self.kernels.len() as isize - 1) as usize;
        &self.kernels[slot]
    }

    /// Largest single weight any kernel in the table can deposit.
    pub fn peak(&self) -> f32 {
        self.kernels
            .iter()
            .map(GaussianKernel::peak)
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn kernels_sum_to_one() {
        let table = GaussianKernelTable::new(4.0, 0.5).unwrap();
        assert_eq!(table.len(), 8);
        for kernel in table.kernels() {
            assert_abs_diff_eq!(kernel.weights().sum(), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn kernels_are_symmetric() {
        let kernel = GaussianKernel::new(1.5);
        let weights = kernel.weights();
        let side = weights.dim().0;
        for ((z, y, x), &w) in weights.indexed_iter() {
            assert_abs_diff_eq!(w, weights[[side - 1 - z, y, x]], epsilon = 1e-7);
            assert_abs_diff_eq!(w, weights[[z, side - 1 - y, x]], epsilon = 1e-7);
            assert_abs_diff_eq!(w, weights[[z, y, side - 1 - x]], epsilon = 1e-7);
            assert_abs_diff_eq!(w, weights[[x, z, y]], epsilon = 1e-7);
        }
    }

    #[test]
    fn radius_grows_with_variance() {
        let table = GaussianKernelTable::new(9.0, 1.0).unwrap();
        assert_eq!(table.nearest(1.0).radius(), 3);
        assert_eq!(table.nearest(9.0).radius(), 9);
        assert!(table.nearest(1.0).peak() > table.nearest(9.0).peak());
        assert_eq!(table.peak(), table.nearest(1.0).peak());
    }

    #[test]
    fn nearest_clamps_to_range() {
        let table = GaussianKernelTable::new(2.0, 0.5).unwrap();
        assert_eq!(table.nearest(0.0).variance(), 0.5);
        assert_eq!(table.nearest(1.1).variance(), 1.0);
        assert_eq!(table.nearest(1.3).variance(), 1.5);
        assert_eq!(table.nearest(50.0).variance(), 2.0);
        assert_eq!(table.max_variance(), 2.0);
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(GaussianKernelTable::new(1.0, 0.0).is_err());
        assert!(GaussianKernelTable::new(0.2, 0.5).is_err());
        assert!(GaussianKernelTable::new(f64::NAN, 0.5).is_err());
    }
}
