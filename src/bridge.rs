//! Conversions between the 8-bit `ndarray` grids used for source images, the
//! [`GrayImage`]s consumed by the gradient filter and the floating-point grids
//! the reconstruction works on.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use ndarray::{Array2, ArrayView2};

/// Widen an 8-bit grid to `f32`. Every value is represented exactly.
pub fn to_float(image: &ArrayView2<'_, u8>) -> Array2<f32> {
    image.mapv(f32::from)
}

/// Narrow a floating-point grid to 8 bits, rounding to nearest and clamping
/// to `[0, 255]`. NaN maps to 0.
pub fn to_u8(image: &ArrayView2<'_, f32>) -> Array2<u8> {
    image.mapv(narrow)
}

#[inline]
pub(crate) fn narrow(value: f32) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 255.0) as u8
    }
}

/// Copy a [`GrayImage`] into a `[y, x]` array.
pub fn gray_image_to_array(image: &GrayImage) -> Array2<u8> {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        image.get_pixel(x as u32, y as u32).0[0]
    })
}

/// Copy a `[y, x]` array into a [`GrayImage`].
pub fn array_to_gray_image(image: &ArrayView2<'_, u8>) -> GrayImage {
    let (height, width) = image.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([image[[y as usize, x as usize]]])
    })
}

/// Combine the signed horizontal and vertical responses of a filter into a
/// `[y, x]` magnitude grid, clamped at zero.
pub fn gradient_magnitude(gx: &Image<Luma<i16>>, gy: &Image<Luma<i16>>) -> Array2<f32> {
    let (width, height) = gx.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        let (x, y) = (x as u32, y as u32);
        let gx = f32::from(gx.get_pixel(x, y).0[0]);
        let gy = f32::from(gy.get_pixel(x, y).0[0]);
        gx.hypot(gy).max(0.0)
    })
}
