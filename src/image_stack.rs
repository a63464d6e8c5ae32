use crate::bridge;
use crate::error::ReconstructionError;

use image::GrayImage;
use nalgebra::{Matrix4, Point3, Vector3, Vector4};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

/// A single tracked 2D frame, borrowed from an [`ImageStack`].
#[derive(Clone, Copy, Debug)]
pub struct SourceImage<'a> {
    pub pixels: ArrayView2<'a, u8>,
    pub transform: &'a Matrix4<f64>,
    pub scale: (f64, f64),
}

impl SourceImage<'_> {
    /// Get the dimensions of the image (height, width)
    pub fn dim(&self) -> (usize, usize) {
        self.pixels.dim()
    }

    /// Position of pixel `(x, y)` in the shared frame.
    #[inline]
    pub fn pixel_position(&self, x: usize, y: usize) -> Point3<f64> {
        self.local_to_world(x as f64 * self.scale.0, y as f64 * self.scale.1)
    }

    #[inline]
    pub(crate) fn local_to_world(&self, u: f64, v: f64) -> Point3<f64> {
        let p = self.transform * Vector4::new(u, v, 0.0, 1.0);
        Point3::new(p.x, p.y, p.z)
    }

    /// The four image corners `(0,0), (W,0), (0,H), (W,H)` in the shared frame.
    pub fn corners(&self) -> [Point3<f64>; 4] {
        let (height, width) = self.dim();
        let w = width as f64 * self.scale.0;
        let h = height as f64 * self.scale.1;
        [
            self.local_to_world(0.0, 0.0),
            self.local_to_world(w, 0.0),
            self.local_to_world(0.0, h),
            self.local_to_world(w, h),
        ]
    }
}

/// Images and their transforms, aligned one to one by index.
#[derive(Clone, Debug)]
pub struct ImageStack {
    images: Vec<Array2<u8>>,
    transforms: Vec<Matrix4<f64>>,
    scale: (f64, f64),
    elevation_scale: Option<f64>,
}

impl ImageStack {
    /// Build a stack from row-major images (`[y, x]`), one transform per image
    /// and the physical pixel scale `(sx, sy)` shared by every image.
    ///
    /// # Errors
    ///
    /// Returns error if the stack is empty, the lengths differ, an image has
    /// no pixels or the scale is not positive.
    pub fn new(
        images: Vec<Array2<u8>>,
        transforms: Vec<Matrix4<f64>>,
        scale: (f64, f64),
    ) -> Result<Self, ReconstructionError> {
        if images.is_empty() {
            return Err(ReconstructionError::EmptyStack);
        }
        if images.len() != transforms.len() {
            return Err(ReconstructionError::StackLengthMismatch {
                images: images.len(),
                transforms: transforms.len(),
            });
        }
        if let Some(index) = images.iter().position(|image| image.is_empty()) {
            return Err(ReconstructionError::EmptyImage { index });
        }
        let stack = Self {
            images,
            transforms,
            scale,
            elevation_scale: None,
        };
        stack.validate_scale()?;
        Ok(stack)
    }

    /// Build a stack from [`GrayImage`]s.
    pub fn from_gray_images(
        images: &[GrayImage],
        transforms: Vec<Matrix4<f64>>,
        scale: (f64, f64),
    ) -> Result<Self, ReconstructionError> {
        let images = images.iter().map(bridge::gray_image_to_array).collect();
        Self::new(images, transforms, scale)
    }

    /// Set the voxel scale along the volume's z axis. Without it the y pixel
    /// scale is used.
    pub fn with_elevation_scale(mut self, scale: f64) -> Result<Self, ReconstructionError> {
        self.elevation_scale = Some(scale);
        self.validate_scale()?;
        Ok(self)
    }

    fn validate_scale(&self) -> Result<(), ReconstructionError> {
        let scale = self.voxel_scale();
        if scale.iter().all(|s| s.is_finite() && *s > 0.0) {
            Ok(())
        } else {
            Err(ReconstructionError::NonPositiveScale {
                x: scale.x,
                y: scale.y,
                z: scale.z,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn scale(&self) -> (f64, f64) {
        self.scale
    }

    pub fn elevation_scale(&self) -> Option<f64> {
        self.elevation_scale
    }

    /// Per-axis scale of one voxel before the resolution multiplier.
    pub fn voxel_scale(&self) -> Vector3<f64> {
        let (sx, sy) = self.scale;
        Vector3::new(sx, sy, self.elevation_scale.unwrap_or(sy))
    }

    pub fn get(&self, index: usize) -> Option<SourceImage<'_>> {
        Some(SourceImage {
            pixels: self.images.get(index)?.view(),
            transform: self.transforms.get(index)?,
            scale: self.scale,
        })
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = SourceImage<'_>> + '_ {
        self.images
            .iter()
            .zip(&self.transforms)
            .map(|(image, transform)| SourceImage {
                pixels: image.view(),
                transform,
                scale: self.scale,
            })
    }

    pub fn par_iter(&self) -> impl IndexedParallelIterator<Item = SourceImage<'_>> + '_ {
        let scale = self.scale;
        self.images
            .par_iter()
            .zip(self.transforms.par_iter())
            .map(move |(image, transform)| SourceImage {
                pixels: image.view(),
                transform,
                scale,
            })
    }

    /// Total number of source pixels in the stack.
    pub fn pixel_count(&self) -> usize {
        self.images.iter().map(Array2::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_mismatched_lengths() {
        let err = ImageStack::new(
            vec![Array2::zeros((2, 2)), Array2::zeros((2, 2))],
            vec![Matrix4::identity()],
            (1.0, 1.0),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ReconstructionError::StackLengthMismatch {
                images: 2,
                transforms: 1
            }
        ));
    }

    #[test]
    fn rejects_empty_stack_and_bad_scale() {
        assert!(matches!(
            ImageStack::new(vec![], vec![], (1.0, 1.0)),
            Err(ReconstructionError::EmptyStack)
        ));
        assert!(matches!(
            ImageStack::new(vec![Array2::zeros((1, 1))], vec![Matrix4::identity()], (0.0, 1.0)),
            Err(ReconstructionError::NonPositiveScale { .. })
        ));
        let stack =
            ImageStack::new(vec![Array2::zeros((1, 1))], vec![Matrix4::identity()], (1.0, 1.0))
                .unwrap();
        assert!(stack.with_elevation_scale(-1.0).is_err());
    }

    #[test]
    fn corners_follow_transform() {
        let transform = Matrix4::new_translation(&Vector3::new(10.0, 0.0, 5.0));
        let stack = ImageStack::new(vec![Array2::zeros((3, 4))], vec![transform], (0.5, 2.0))
            .unwrap();
        let image = stack.get(0).unwrap();
        let corners = image.corners();
        assert_relative_eq!(corners[0], Point3::new(10.0, 0.0, 5.0));
        assert_relative_eq!(corners[3], Point3::new(12.0, 6.0, 5.0));
        assert_relative_eq!(image.pixel_position(1, 1), Point3::new(10.5, 2.0, 5.0));
    }

    #[test]
    fn elevation_scale_defaults_to_row_scale() {
        let stack = ImageStack::new(vec![Array2::zeros((1, 1))], vec![Matrix4::identity()], (0.3, 0.7))
            .unwrap();
        assert_relative_eq!(stack.voxel_scale(), Vector3::new(0.3, 0.7, 0.7));
        let stack = stack.with_elevation_scale(0.2).unwrap();
        assert_relative_eq!(stack.voxel_scale().z, 0.2);
    }
}
