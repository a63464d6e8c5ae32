//! Per-image gradient magnitude and the gradient-to-variance mapping that
//! drives adaptive Gaussian binning.

use crate::bridge;
use crate::kernel::GaussianKernelTable;

use imageproc::gradients;
use ndarray::{Array2, ArrayView2};

/// Gradient magnitude of one source image, indexed `[y, x]`.
#[derive(Clone, Debug)]
pub struct GradientMap {
    magnitude: Array2<f32>,
}

impl GradientMap {
    /// 3x3 Sobel gradient magnitude with replicated borders.
    pub fn compute(image: &ArrayView2<'_, u8>) -> Self {
        let gray = bridge::array_to_gray_image(image);
        let gx = gradients::horizontal_sobel(&gray);
        let gy = gradients::vertical_sobel(&gray);
        Self {
            magnitude: bridge::gradient_magnitude(&gx, &gy),
        }
    }

    pub fn magnitude(&self) -> &Array2<f32> {
        &self.magnitude
    }

    pub fn dim(&self) -> (usize, usize) {
        self.magnitude.dim()
    }

    pub fn max(&self) -> f32 {
        self.magnitude.iter().copied().fold(0.0, f32::max)
    }
}

/// Linear, monotonically decreasing map from gradient magnitude to kernel
/// variance: `gradient_ceiling` and above map to `min`, zero maps to `max`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdaptiveVariance {
    pub min: f64,
    pub max: f64,
    pub gradient_ceiling: f32,
}

impl AdaptiveVariance {
    /// Span the whole kernel table, with the ceiling set to the strongest
    /// gradient found in any of `maps`.
    pub fn for_table<'a>(
        table: &GaussianKernelTable,
        maps: impl IntoIterator<Item = &'a GradientMap>,
    ) -> Self {
        Self {
            min: table.min_variance(),
            max: table.max_variance(),
            gradient_ceiling: maps.into_iter().map(GradientMap::max).fold(0.0, f32::max),
        }
    }

    #[inline]
    pub fn variance_for(&self, gradient: f32) -> f64 {
        if self.gradient_ceiling <= 0.0 {
            return self.max;
        }
        let t = f64::from((gradient / self.gradient_ceiling).clamp(0.0, 1.0));
        self.max - (self.max - self.min) * t
    }

    /// Variance chosen for every pixel of the image `gradient` was computed on.
    pub fn variance_map(&self, gradient: &GradientMap) -> Array2<f64> {
        gradient.magnitude.mapv(|g| self.variance_for(g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn step_edge(width: usize, height: usize, edge: usize) -> Array2<u8> {
        Array2::from_shape_fn((height, width), |(_, x)| if x < edge { 20 } else { 220 })
    }

    #[test]
    fn flat_image_has_zero_gradient() {
        let map = GradientMap::compute(&Array2::from_elem((5, 7), 90u8).view());
        assert_eq!(map.dim(), (5, 7));
        assert_eq!(map.max(), 0.0);
    }

    #[test]
    fn gradient_peaks_at_step_edge() {
        let image = step_edge(10, 6, 5);
        let map = GradientMap::compute(&image.view());
        let magnitude = map.magnitude();
        assert_relative_eq!(magnitude[[3, 4]], 800.0);
        assert_relative_eq!(magnitude[[3, 5]], 800.0);
        assert_eq!(magnitude[[3, 0]], 0.0);
        assert_eq!(magnitude[[3, 9]], 0.0);
        assert!(magnitude.iter().all(|&g| g >= 0.0));
    }

    #[test]
    fn variance_decreases_with_gradient() {
        let mapping = AdaptiveVariance {
            min: 0.5,
            max: 4.0,
            gradient_ceiling: 100.0,
        };
        assert_relative_eq!(mapping.variance_for(0.0), 4.0);
        assert_relative_eq!(mapping.variance_for(50.0), 2.25);
        assert_relative_eq!(mapping.variance_for(100.0), 0.5);
        assert_relative_eq!(mapping.variance_for(1e6), 0.5);
        let samples: Vec<_> = (0..=10).map(|g| mapping.variance_for(g as f32 * 10.0)).collect();
        assert!(samples.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn flat_stack_uses_widest_kernel() {
        let table = GaussianKernelTable::new(3.0, 1.0).unwrap();
        let map = GradientMap::compute(&Array2::from_elem((3, 3), 7u8).view());
        let mapping = AdaptiveVariance::for_table(&table, [&map]);
        assert_eq!(mapping.gradient_ceiling, 0.0);
        assert!(mapping.variance_map(&map).iter().all(|&v| v == 3.0));
    }

    #[test]
    fn edge_pixels_get_tighter_kernels() {
        let table = GaussianKernelTable::new(4.0, 0.5).unwrap();
        let map = GradientMap::compute(&step_edge(12, 4, 6).view());
        let variances = AdaptiveVariance::for_table(&table, [&map]).variance_map(&map);
        assert_relative_eq!(variances[[2, 5]], 0.5);
        assert_relative_eq!(variances[[2, 0]], 4.0);
        assert!(variances[[2, 6]] < variances[[2, 11]]);
    }
}
