use crate::error::{Result, SegmarkError};
use image::{DynamicImage, GrayImage, Luma, RgbaImage};
use std::path::Path;

/// Load an image from disk and canonicalize it to 8-bit RGBA.
pub fn normalize<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
    let path = path.as_ref();

    let decoded = image::open(path).map_err(|source| SegmarkError::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(
        "Loaded {} with color type {:?}",
        path.display(),
        decoded.color()
    );

    Ok(to_rgba(decoded))
}

/// Canonicalize a decoded image to 8-bit RGBA.
///
/// RGBA input is passed through untouched. 16-bit grayscale is scaled down by
/// integer division by 256 before expansion; every other layout falls back to
/// the decoder's own RGBA conversion.
pub fn to_rgba(image: DynamicImage) -> RgbaImage {
    match image {
        DynamicImage::ImageRgba8(rgba) => rgba,
        DynamicImage::ImageLuma16(wide) => {
            let (width, height) = wide.dimensions();
            let narrow = GrayImage::from_fn(width, height, |x, y| {
                Luma([(wide.get_pixel(x, y)[0] / 256) as u8])
            });
            DynamicImage::ImageLuma8(narrow).to_rgba8()
        }
        other => {
            if !matches!(
                other,
                DynamicImage::ImageRgb8(_)
                    | DynamicImage::ImageLuma8(_)
                    | DynamicImage::ImageLumaA8(_)
            ) {
                tracing::debug!("Forcing {:?} to RGBA", other.color());
            }
            other.to_rgba8()
        }
    }
}
