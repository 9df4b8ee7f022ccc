pub mod catalog;
mod normalize;

pub use catalog::{scan, Workspace};
pub use normalize::{normalize, to_rgba};

use image::{GrayImage, Luma, RgbaImage};
use ndarray::Array2;

/// Collapse an RGBA image to ITU-R 601-2 luma, `L = 0.299 R + 0.587 G +
/// 0.114 B`, rounded in 16-bit fixed point. Alpha is ignored.
pub fn grayscale(image: &RgbaImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let [r, g, b, _] = image.get_pixel(x, y).0;
        let luma = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
        Luma([luma as u8])
    })
}

/// Copy a grayscale image into an (H, W) float array.
pub fn gray_to_array(gray: &GrayImage) -> Array2<f32> {
    let (width, height) = gray.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        gray.get_pixel(x as u32, y as u32)[0] as f32
    })
}

/// Load an image and return it as the (H, W) intensity array used by the
/// feature extractor.
pub fn load_intensity<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Array2<f32>> {
    let rgba = normalize(path)?;
    Ok(gray_to_array(&grayscale(&rgba)))
}
