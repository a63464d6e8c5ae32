use crate::error::ReconstructionError;
use crate::image_stack::ImageStack;

use log::{debug, warn};
use nalgebra::{Point3, Vector3};

/// Placement and sampling of the output grid in the shared frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeGeometry {
    /// Per-axis minimum of the bounded points.
    pub origin: Point3<f64>,
    /// Per-axis maximum of the bounded points.
    pub extent: Point3<f64>,
    /// Voxel count per axis (x, y, z).
    pub size: [usize; 3],
    /// Physical voxel edge per axis, `scale * resolution`.
    pub spacing: Vector3<f64>,
    pub resolution: f64,
}

impl VolumeGeometry {
    /// Bound the transformed corners of every image.
    ///
    /// # Errors
    ///
    /// Returns error if `resolution` is not a positive finite number.
    pub fn from_image_corners(
        stack: &ImageStack,
        resolution: f64,
    ) -> Result<Self, ReconstructionError> {
        let points = stack.iter().flat_map(|image| image.corners());
        Self::bounding(stack, points, resolution)
    }

    /// Bound the transformed centre of every pixel, as used by point-cloud
    /// reconstructions.
    pub fn from_pixel_centers(
        stack: &ImageStack,
        resolution: f64,
    ) -> Result<Self, ReconstructionError> {
        let points = stack.iter().flat_map(|image| {
            let (height, width) = image.dim();
            (0..height).flat_map(move |y| (0..width).map(move |x| image.pixel_position(x, y)))
        });
        Self::bounding(stack, points, resolution)
    }

    fn bounding(
        stack: &ImageStack,
        points: impl Iterator<Item = Point3<f64>>,
        resolution: f64,
    ) -> Result<Self, ReconstructionError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(ReconstructionError::NonPositiveResolution(resolution));
        }
        if stack.is_empty() {
            return Err(ReconstructionError::EmptyStack);
        }

        let (sx, sy) = stack.scale();
        if stack.elevation_scale().is_none() && sx != sy {
            warn!(
                "No elevation scale set, sizing z with the y pixel scale {sy} although x uses {sx}"
            );
        }

        let mut origin = Point3::from([f64::INFINITY; 3]);
        let mut extent = Point3::from([f64::NEG_INFINITY; 3]);
        for point in points {
            origin = origin.inf(&point);
            extent = extent.sup(&point);
        }

        let spacing = stack.voxel_scale() * resolution;
        let span = extent - origin;
        if !span.iter().all(|s| s.is_finite()) {
            return Err(ReconstructionError::NonFiniteGeometry);
        }
        let size = voxel_counts(&span.component_div(&spacing))?;

        debug!(
            "Volume origin {:?}, final {:?}, size {:?}, spacing {:?}",
            origin.coords.as_slice(),
            extent.coords.as_slice(),
            size,
            spacing.as_slice()
        );

        Ok(Self {
            origin,
            extent,
            size,
            spacing,
            resolution,
        })
    }

    /// Grid shape in `[z, y, x]` order, matching [`ndarray::Array3`] indexing.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.size[2], self.size[1], self.size[0])
    }

    pub fn voxel_count(&self) -> usize {
        self.size.iter().product()
    }

    /// Fractional voxel coordinate (x, y, z) of a point.
    #[inline]
    pub fn continuous_index(&self, point: &Point3<f64>) -> Vector3<f64> {
        (*point - self.origin).component_div(&self.spacing)
    }

    /// Voxel `[z, y, x]` containing `point`, or `None` if the point lies
    /// outside the grid.
    #[inline]
    pub fn voxel_index(&self, point: &Point3<f64>) -> Option<[usize; 3]> {
        let index = self.continuous_index(point);
        let mut voxel = [0usize; 3];
        for axis in 0..3 {
            let i = index[axis].floor();
            if !(i >= 0.0 && i < self.size[axis] as f64) {
                return None;
            }
            voxel[2 - axis] = i as usize;
        }
        Some(voxel)
    }
}

/// Voxel count per axis, at least one, for a span measured in voxels. The
/// total must fit an `f32` allocation.
fn voxel_counts(span: &Vector3<f64>) -> Result<[usize; 3], ReconstructionError> {
    let counts = span.map(|s| s.ceil().max(1.0));
    let too_large = ReconstructionError::VolumeTooLarge {
        x: counts.x,
        y: counts.y,
        z: counts.z,
    };
    let limit = isize::MAX as usize / std::mem::size_of::<f32>();
    if counts.iter().any(|&c| !c.is_finite() || c > limit as f64) {
        return Err(too_large);
    }

    let size = [0, 1, 2].map(|axis| counts[axis] as usize);
    size.iter()
        .try_fold(1usize, |total, &n| total.checked_mul(n))
        .filter(|&total| total <= limit)
        .map(|_| size)
        .ok_or(too_large)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix4;
    use ndarray::Array2;

    fn translated_stack(offsets: &[Vector3<f64>], size: (usize, usize)) -> ImageStack {
        ImageStack::new(
            offsets.iter().map(|_| Array2::zeros(size)).collect(),
            offsets.iter().map(Matrix4::new_translation).collect(),
            (1.0, 1.0),
        )
        .unwrap()
    }

    #[test]
    fn single_image_gets_one_slice() {
        let stack = translated_stack(&[Vector3::zeros()], (4, 4));
        let geometry = VolumeGeometry::from_image_corners(&stack, 1.0).unwrap();
        assert_eq!(geometry.size, [4, 4, 1]);
        assert_eq!(geometry.shape(), (1, 4, 4));
        assert_relative_eq!(geometry.origin, Point3::origin());
    }

    #[test]
    fn covers_all_images() {
        let stack = translated_stack(
            &[Vector3::new(-2.0, 1.0, 0.0), Vector3::new(3.0, 0.0, 4.0)],
            (4, 4),
        );
        let geometry = VolumeGeometry::from_image_corners(&stack, 1.0).unwrap();
        assert_relative_eq!(geometry.origin, Point3::new(-2.0, 0.0, 0.0));
        assert_relative_eq!(geometry.extent, Point3::new(7.0, 5.0, 4.0));
        assert_eq!(geometry.size, [9, 5, 4]);
    }

    #[test]
    fn coarser_resolution_shrinks_volume() {
        let stack = translated_stack(&[Vector3::zeros(), Vector3::new(0.0, 0.0, 9.0)], (10, 10));
        let fine = VolumeGeometry::from_image_corners(&stack, 1.0).unwrap();
        let coarse = VolumeGeometry::from_image_corners(&stack, 3.0).unwrap();
        assert_eq!(fine.size, [10, 10, 9]);
        assert_eq!(coarse.size, [4, 4, 3]);
    }

    #[test]
    fn repeated_computation_is_identical() {
        let stack = translated_stack(&[Vector3::new(0.3, 0.1, 0.7)], (5, 3));
        let first = VolumeGeometry::from_image_corners(&stack, 2.0).unwrap();
        let second = VolumeGeometry::from_image_corners(&stack, 2.0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn pixel_centers_bound_is_tighter_than_corners() {
        let stack = translated_stack(&[Vector3::zeros()], (4, 6));
        let geometry = VolumeGeometry::from_pixel_centers(&stack, 1.0).unwrap();
        assert_relative_eq!(geometry.extent, Point3::new(5.0, 3.0, 0.0));
        assert_eq!(geometry.size, [5, 3, 1]);
    }

    #[test]
    fn rejects_non_positive_resolution() {
        let stack = translated_stack(&[Vector3::zeros()], (2, 2));
        assert!(matches!(
            VolumeGeometry::from_image_corners(&stack, 0.0),
            Err(ReconstructionError::NonPositiveResolution(_))
        ));
        assert!(VolumeGeometry::from_image_corners(&stack, f64::NAN).is_err());
    }

    #[test]
    fn far_apart_images_are_too_large() {
        let stack = translated_stack(&[Vector3::zeros(), Vector3::new(1e300, 0.0, 0.0)], (2, 2));
        let err = VolumeGeometry::from_image_corners(&stack, 1.0).unwrap_err();
        assert!(matches!(err, ReconstructionError::VolumeTooLarge { .. }));
        assert!(err.is_invalid_input());

        // Each axis fits on its own, the product does not.
        let stack = translated_stack(&[Vector3::zeros(), Vector3::new(1e7, 1e7, 1e7)], (2, 2));
        assert!(matches!(
            VolumeGeometry::from_image_corners(&stack, 1.0),
            Err(ReconstructionError::VolumeTooLarge { .. })
        ));
    }

    #[test]
    fn non_finite_transforms_are_rejected() {
        let stack = translated_stack(&[Vector3::zeros(), Vector3::new(f64::INFINITY, 0.0, 0.0)], (2, 2));
        assert!(matches!(
            VolumeGeometry::from_image_corners(&stack, 1.0),
            Err(ReconstructionError::NonFiniteGeometry)
        ));
    }

    #[test]
    fn voxel_index_rejects_points_outside() {
        let stack = translated_stack(&[Vector3::zeros()], (4, 4));
        let geometry = VolumeGeometry::from_image_corners(&stack, 1.0).unwrap();
        assert_eq!(geometry.voxel_index(&Point3::new(3.5, 0.2, 0.0)), Some([0, 0, 3]));
        assert_eq!(geometry.voxel_index(&Point3::new(4.0, 0.0, 0.0)), None);
        assert_eq!(geometry.voxel_index(&Point3::new(-0.01, 0.0, 0.0)), None);
    }
}
