use crate::error::ReconstructionError;
use crate::image_stack::ImageStack;

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use log::{debug, warn};
use nalgebra::{Matrix4, Vector3};
use ndarray::{Array2, s};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Pixel spacing differs between images")]
    InconsistentSpacing,

    #[error("Missing pixel spacing information")]
    MissingSpacing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error(transparent)]
    Stack(#[from] ReconstructionError),
}

/// One decoded frame with its pose, read from a single DICOM object.
#[derive(Debug)]
struct TrackedFrame {
    pixels: Array2<u8>,
    transform: Matrix4<f64>,
    spacing: Option<(f64, f64)>,
}

impl TrackedFrame {
    /// First frame of `object` as 8 bits using its first VOI LUT, or `None`
    /// without decodable pixel data or without position and orientation.
    fn read(object: &FileDicomObject<InMemDicomObject>) -> Option<Self> {
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        let pixels = object
            .decode_pixel_data()
            .ok()?
            .to_ndarray_with_options::<u8>(&options)
            .ok()?
            .slice_move(s![0, .., .., 0]);
        let transform = pose(
            &multi_float(object, tags::IMAGE_POSITION_PATIENT)?,
            &multi_float(object, tags::IMAGE_ORIENTATION_PATIENT)?,
        )?;
        // Pixel Spacing lists the row spacing first.
        let spacing = multi_float(object, tags::PIXEL_SPACING).and_then(|spacing| {
            match spacing.as_slice() {
                [row_spacing, column_spacing, ..] => Some((*column_spacing, *row_spacing)),
                _ => None,
            }
        });
        Some(Self {
            pixels,
            transform,
            spacing,
        })
    }
}

fn multi_float(object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<Vec<f64>> {
    object.element(tag).ok()?.to_multi_float64().ok()
}

/// Matrix whose columns are the row direction, the column direction, their
/// normal and the position of the first pixel.
fn pose(position: &[f64], orientation: &[f64]) -> Option<Matrix4<f64>> {
    let ([px, py, pz, ..], [rx, ry, rz, cx, cy, cz, ..]) = (position, orientation) else {
        return None;
    };
    let row = Vector3::new(*rx, *ry, *rz);
    let column = Vector3::new(*cx, *cy, *cz);
    let normal = row.cross(&column);
    #[rustfmt::skip]
    let transform = Matrix4::new(
        row.x, column.x, normal.x, *px,
        row.y, column.y, normal.y, *py,
        row.z, column.z, normal.z, *pz,
        0.0, 0.0, 0.0, 1.0,
    );
    Some(transform)
}

fn same_spacing(a: (f64, f64), b: (f64, f64)) -> bool {
    (a.0 - b.0).abs() <= 1e-6 * a.0.abs() && (a.1 - b.1).abs() <= 1e-6 * a.1.abs()
}

/// Frames gathered in acquisition order, all sharing one pixel spacing.
#[derive(Default)]
struct FrameCollector {
    images: Vec<Array2<u8>>,
    transforms: Vec<Matrix4<f64>>,
    spacing: Option<(f64, f64)>,
}

impl FrameCollector {
    fn push(&mut self, index: usize, frame: Option<TrackedFrame>) -> Result<(), StackLoaderError> {
        let Some(frame) = frame else {
            warn!("Skipping DICOM object {index} without pixel data or geometry");
            return Ok(());
        };
        let spacing = frame.spacing.ok_or(StackLoaderError::MissingSpacing)?;
        match self.spacing {
            None => self.spacing = Some(spacing),
            Some(first) if !same_spacing(first, spacing) => {
                return Err(StackLoaderError::InconsistentSpacing);
            }
            Some(_) => {}
        }
        self.images.push(frame.pixels);
        self.transforms.push(frame.transform);
        Ok(())
    }

    fn finish(self) -> Result<ImageStack, StackLoaderError> {
        let scale = self.spacing.ok_or(StackLoaderError::NoValidImages)?;
        debug!("Loaded {} tracked images with scale {:?}", self.images.len(), scale);
        Ok(ImageStack::new(self.images, self.transforms, scale)?)
    }
}

/// Builds an [`ImageStack`] from tracked DICOM frames. Each frame's transform
/// comes from its Image Position (Patient) and Image Orientation (Patient).
///
/// Objects without decodable pixel data or without position and orientation
/// are skipped. Only the first frame of each object is used.
pub struct StackLoader;

impl StackLoader {
    /// Load a stack from DICOM objects
    ///
    /// # Errors
    ///
    /// Returns error if no valid images are found or the pixel spacing is
    /// missing or differs between images.
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Result<ImageStack, StackLoaderError> {
        let mut frames = FrameCollector::default();
        for (index, object) in dicom_objects.iter().enumerate() {
            frames.push(index, TrackedFrame::read(object))?;
        }
        frames.finish()
    }

    /// Load a stack from file paths. Each file is decoded and released before
    /// the next one is opened.
    pub fn load_from_file_paths(paths: &[impl AsRef<Path>]) -> Result<ImageStack, StackLoaderError> {
        let mut frames = FrameCollector::default();
        for (index, path) in paths.iter().enumerate() {
            let object = open_file(path.as_ref())?;
            frames.push(index, TrackedFrame::read(&object))?;
        }
        frames.finish()
    }

    /// Load a stack from the .dcm files of a directory, in file name order
    pub fn load_from_directory(path: impl AsRef<Path>) -> Result<ImageStack, StackLoaderError> {
        let paths = dicom_files(path.as_ref())?;
        if paths.is_empty() {
            return Err(StackLoaderError::NoValidImages);
        }
        Self::load_from_file_paths(&paths)
    }
}

fn dicom_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
        })
        .collect();
    paths.sort();
    Ok(paths)
}
