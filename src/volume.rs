use crate::bridge;
use crate::enums::Orientation;
use crate::geometry::VolumeGeometry;

use image::GrayImage;
use nalgebra::{Point3, Vector3};
use ndarray::{Array3, ArrayView2, s};

/// A reconstructed scalar volume placed in the shared frame.
#[derive(Clone, Debug)]
pub struct Volume {
    pub data: Array3<f32>,
    pub origin: Point3<f64>,
    pub spacing: Vector3<f64>,
    pub resolution: f64,
}

impl Volume {
    pub fn new(data: Array3<f32>, geometry: &VolumeGeometry) -> Self {
        Self {
            data,
            origin: geometry.origin,
            spacing: geometry.spacing,
            resolution: geometry.resolution,
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    /// Position of the first voxel's corner in the shared frame.
    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    /// Physical voxel edge per axis (x, y, z).
    pub fn spacing(&self) -> Vector3<f64> {
        self.spacing
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Centre of voxel `[z, y, x]` in the shared frame.
    pub fn voxel_center(&self, z: usize, y: usize, x: usize) -> Point3<f64> {
        let offset = Vector3::new(x as f64 + 0.5, y as f64 + 0.5, z as f64 + 0.5);
        self.origin + offset.component_mul(&self.spacing)
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let slice = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(slice)
    }

    /// 8-bit image of a slice, with values rounded and clamped to `[0, 255]`.
    pub fn get_image_from_axis(&self, index: usize, orientation: Orientation) -> Option<GrayImage> {
        let slice = self.get_slice_from_axis(index, orientation)?;
        Some(bridge::array_to_gray_image(&bridge::to_u8(&slice).view()))
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let (depth, height, width) = self.dim();
        let max_index = match orientation {
            Orientation::Axial => depth,
            Orientation::Coronal => height,
            Orientation::Sagittal => width,
        };
        index < max_index
    }
}
