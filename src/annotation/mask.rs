use super::npy;
use super::palette::Palette;
use crate::error::{Result, SegmarkError};
use image::RgbaImage;
use ndarray::Array2;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Per-pixel label IDs for one image, indexed `[[y, x]]`. 0 means unlabeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    labels: Array2<u8>,
}

impl Mask {
    pub fn blank(height: usize, width: usize) -> Self {
        Self {
            labels: Array2::zeros((height, width)),
        }
    }

    pub fn from_array(labels: Array2<u8>) -> Self {
        Self { labels }
    }

    /// A blank mask with the dimensions of `image`.
    pub fn blank_for(image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::blank(height as usize, width as usize)
    }

    /// (height, width)
    pub fn dim(&self) -> (usize, usize) {
        self.labels.dim()
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.labels.get((y, x)).copied().unwrap_or(0)
    }

    pub fn as_array(&self) -> &Array2<u8> {
        &self.labels
    }

    pub fn as_array_mut(&mut self) -> &mut Array2<u8> {
        &mut self.labels
    }

    pub fn into_array(self) -> Array2<u8> {
        self.labels
    }

    /// True when no pixel carries a label.
    pub fn is_empty(&self) -> bool {
        self.labels.iter().all(|&v| v == 0)
    }

    /// Distinct nonzero labels present in the mask.
    pub fn label_ids(&self) -> BTreeSet<u8> {
        self.labels.iter().copied().filter(|&v| v != 0).collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        npy::write(path, &self.labels)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_array(npy::read(path)?))
    }
}

/// Paint every labeled pixel of `mask` onto a copy of `base` with its palette
/// color. Alpha and unlabeled pixels are kept from `base`.
pub fn overlay(base: &RgbaImage, mask: &Mask, palette: &Palette) -> RgbaImage {
    let mut out = base.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let label = mask.get(x as usize, y as usize);
        if let Some([r, g, b]) = palette.color(label) {
            pixel.0[0] = r;
            pixel.0[1] = g;
            pixel.0[2] = b;
        }
    }
    out
}

/// The `output/masks` directory of a workspace: one `<stem>_mask.npy` per
/// image.
#[derive(Debug, Clone)]
pub struct MaskStore {
    dir: PathBuf,
}

impl MaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, image_path: &Path) -> PathBuf {
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.dir.join(format!("{}_mask.npy", stem))
    }

    /// Load the stored mask for `image_path`, or a blank one of `shape`
    /// (height, width) if none exists yet.
    pub fn load_or_create(&self, image_path: &Path, shape: (usize, usize)) -> Result<Mask> {
        let path = self.path_for(image_path);
        if !path.exists() {
            return Ok(Mask::blank(shape.0, shape.1));
        }

        tracing::debug!("Loading existing mask {}", path.display());
        let mask = Mask::load(&path)?;
        if mask.dim() != shape {
            return Err(SegmarkError::MaskDimensions {
                path,
                expected: shape,
                found: mask.dim(),
            });
        }
        Ok(mask)
    }

    /// Write the mask for `image_path`, creating the directory if needed.
    pub fn save(&self, image_path: &Path, mask: &Mask) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| SegmarkError::io(&self.dir, e))?;
        let path = self.path_for(image_path);
        mask.save(&path)?;
        Ok(path)
    }

    /// Remove a mask file. Missing files are not an error.
    pub fn delete(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!("Deleted mask file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SegmarkError::io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use ndarray::array;

    fn base() -> RgbaImage {
        RgbaImage::from_fn(3, 2, |x, y| Rgba([x as u8, y as u8, 9, 128]))
    }

    #[test]
    fn test_is_empty() {
        let mut mask = Mask::blank(2, 3);
        assert!(mask.is_empty());
        mask.as_array_mut()[[1, 2]] = 4;
        assert!(!mask.is_empty());
        assert_eq!(mask.label_ids().into_iter().collect::<Vec<_>>(), [4]);
    }

    #[test]
    fn test_overlay_colors_rgb_only() {
        let mask = Mask::from_array(array![[0, 1, 0], [3, 0, 9]]);
        let out = overlay(&base(), &mask, &Palette::default());

        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 9, 128]);
        assert_eq!(out.get_pixel(1, 0).0, [0, 0, 255, 128]);
        assert_eq!(out.get_pixel(0, 1).0, [255, 0, 0, 128]);
        // no palette entry for 9
        assert_eq!(out.get_pixel(2, 1).0, [2, 1, 9, 128]);
    }

    #[test]
    fn test_overlay_again_leaves_unlabeled_pixels_alone() {
        let mask = Mask::from_array(array![[0, 2, 0], [0, 0, 1]]);
        let palette = Palette::default();
        let once = overlay(&base(), &mask, &palette);
        let twice = overlay(&once, &mask, &palette);
        assert_eq!(once, twice);
        assert_eq!(twice.get_pixel(0, 0), base().get_pixel(0, 0));
    }

    #[test]
    fn test_store_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = MaskStore::new(dir.path().join("output").join("masks"));
        let image_path = dir.path().join("img_3.png");

        let blank = store.load_or_create(&image_path, (2, 3)).unwrap();
        assert!(blank.is_empty());
        assert_eq!(blank.dim(), (2, 3));

        let mask = Mask::from_array(array![[0, 1, 2], [2, 1, 0]]);
        let saved = store.save(&image_path, &mask).unwrap();
        assert!(saved.ends_with("output/masks/img_3_mask.npy"));
        assert_eq!(store.load_or_create(&image_path, (2, 3)).unwrap(), mask);

        assert!(matches!(
            store.load_or_create(&image_path, (3, 3)),
            Err(SegmarkError::MaskDimensions { .. })
        ));

        MaskStore::delete(&saved).unwrap();
        assert!(!saved.exists());
        MaskStore::delete(&saved).unwrap();
    }
}
