use super::mask::{overlay, Mask};
use super::palette::Palette;
use crate::error::{Result, SegmarkError};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use std::path::PathBuf;

pub const DEFAULT_BRUSH_SIZE: u32 = 5;
const MAX_BRUSH_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrushMode {
    #[default]
    Off,
    Paint,
    Erase,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brush {
    pub mode: BrushMode,
    size: u32,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            mode: BrushMode::Off,
            size: DEFAULT_BRUSH_SIZE,
        }
    }
}

impl Brush {
    /// Switch painting on, or off again if it already is.
    pub fn toggle_paint(&mut self) {
        self.mode = match self.mode {
            BrushMode::Paint => BrushMode::Off,
            _ => BrushMode::Paint,
        };
    }

    /// Switch erasing on, or off again if it already is.
    pub fn toggle_erase(&mut self) {
        self.mode = match self.mode {
            BrushMode::Erase => BrushMode::Off,
            _ => BrushMode::Erase,
        };
    }

    pub fn set_size(&mut self, size: u32) {
        self.size = size.clamp(1, MAX_BRUSH_SIZE);
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Disk radius in pixels: half the brush size.
    pub fn radius(&self) -> u32 {
        self.size / 2
    }
}

/// The image being edited: the untouched base, the colored overlay shown to
/// the user, and the label mask.
///
/// `base` never changes while the image is open so erasing can restore the
/// original pixels under the brush.
#[derive(Debug, Clone)]
pub struct EditingImage {
    pub path: PathBuf,
    base: RgbaImage,
    overlay: RgbaImage,
    mask: Mask,
}

impl EditingImage {
    /// Fails with [`SegmarkError::MaskDimensions`] unless `mask` is `(h, w)` of `base`.
    pub fn new(path: PathBuf, base: RgbaImage, mask: Mask, palette: &Palette) -> Result<Self> {
        let expected = (base.height() as usize, base.width() as usize);
        if mask.dim() != expected {
            return Err(SegmarkError::MaskDimensions {
                path,
                expected,
                found: mask.dim(),
            });
        }
        let overlay = overlay(&base, &mask, palette);
        Ok(Self {
            path,
            base,
            overlay,
            mask,
        })
    }

    pub fn base(&self) -> &RgbaImage {
        &self.base
    }

    pub fn overlay(&self) -> &RgbaImage {
        &self.overlay
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Fill a disk of `label` into the mask and of its color into the overlay.
    pub fn paint(&mut self, x: i32, y: i32, radius: u32, label: u8, palette: &Palette) {
        let stencil = self.stencil(x, y, radius);
        let color = palette.color(label);
        for (px, py, hit) in stencil.enumerate_pixels() {
            if hit[0] == 0 {
                continue;
            }
            self.mask.as_array_mut()[[py as usize, px as usize]] = label;
            if let Some([r, g, b]) = color {
                *self.overlay.get_pixel_mut(px, py) = Rgba([r, g, b, 255]);
            }
        }
    }

    /// Clear a disk in the mask and put the base pixels back in the overlay.
    pub fn erase(&mut self, x: i32, y: i32, radius: u32) {
        let stencil = self.stencil(x, y, radius);
        for (px, py, hit) in stencil.enumerate_pixels() {
            if hit[0] == 0 {
                continue;
            }
            self.mask.as_array_mut()[[py as usize, px as usize]] = 0;
            *self.overlay.get_pixel_mut(px, py) = *self.base.get_pixel(px, py);
        }
    }

    /// Apply one brush event at (x, y) according to the brush mode.
    pub fn stroke(&mut self, brush: &Brush, label: Option<u8>, x: i32, y: i32, palette: &Palette) {
        match (brush.mode, label) {
            (BrushMode::Paint, Some(label)) => self.paint(x, y, brush.radius(), label, palette),
            (BrushMode::Paint, None) => tracing::warn!("Paint stroke ignored, no label is active"),
            (BrushMode::Erase, _) => self.erase(x, y, brush.radius()),
            (BrushMode::Off, _) => {}
        }
    }

    fn stencil(&self, x: i32, y: i32, radius: u32) -> GrayImage {
        let (width, height) = self.base.dimensions();
        let mut stencil = GrayImage::new(width, height);
        draw_filled_circle_mut(&mut stencil, (x, y), radius as i32, Luma([255u8]));
        stencil
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editing(width: u32, height: u32) -> EditingImage {
        let base = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 50, 255]));
        let mask = Mask::blank_for(&base);
        EditingImage::new(PathBuf::from("img_1.png"), base, mask, &Palette::default()).unwrap()
    }

    #[test]
    fn test_brush_modes_toggle() {
        let mut brush = Brush::default();
        brush.toggle_paint();
        assert_eq!(brush.mode, BrushMode::Paint);
        brush.toggle_erase();
        assert_eq!(brush.mode, BrushMode::Erase);
        brush.toggle_erase();
        assert_eq!(brush.mode, BrushMode::Off);

        brush.set_size(0);
        assert_eq!(brush.size(), 1);
        brush.set_size(7);
        assert_eq!(brush.radius(), 3);
    }

    #[test]
    fn test_paint_small_disk() {
        let mut img = editing(4, 4);
        img.paint(2, 2, 1, 1, &Palette::default());

        let mask = img.mask();
        assert!(!mask.is_empty());
        assert_eq!(mask.get(2, 2), 1);
        for y in 0..4 {
            for x in 0..4 {
                if mask.get(x, y) != 0 {
                    assert!(x.abs_diff(2) <= 1 && y.abs_diff(2) <= 1);
                    assert_eq!(img.overlay().get_pixel(x as u32, y as u32).0, [0, 0, 255, 255]);
                }
            }
        }
        assert_eq!(mask.get(0, 0), 0);
        assert_eq!(img.overlay().get_pixel(0, 0), img.base().get_pixel(0, 0));
    }

    #[test]
    fn test_erase_restores_base_pixels() {
        let mut img = editing(8, 8);
        let palette = Palette::default();
        img.paint(4, 4, 3, 2, &palette);
        img.erase(4, 4, 3);

        assert!(img.mask().is_empty());
        assert_eq!(img.overlay(), img.base());
    }

    #[test]
    fn test_stroke_follows_mode() {
        let mut img = editing(6, 6);
        let palette = Palette::default();
        let mut brush = Brush::default();
        brush.set_size(2);

        img.stroke(&brush, Some(1), 3, 3, &palette);
        assert!(img.mask().is_empty());

        brush.toggle_paint();
        img.stroke(&brush, None, 3, 3, &palette);
        assert!(img.mask().is_empty());
        img.stroke(&brush, Some(3), 3, 3, &palette);
        assert_eq!(img.mask().get(3, 3), 3);

        brush.toggle_erase();
        img.stroke(&brush, Some(3), 3, 3, &palette);
        assert!(img.mask().is_empty());
    }

    #[test]
    fn test_disk_at_edge_is_clipped() {
        let mut img = editing(4, 4);
        img.paint(0, 0, 2, 1, &Palette::default());
        assert_eq!(img.mask().get(0, 0), 1);
        assert_eq!(img.mask().get(3, 3), 0);
    }

    #[test]
    fn test_mask_must_match_base() {
        let base = RgbaImage::new(4, 3);
        let transposed = Mask::blank(4, 3);
        let err = EditingImage::new(PathBuf::from("img_1.png"), base, transposed, &Palette::default())
            .unwrap_err();
        assert!(matches!(
            err,
            SegmarkError::MaskDimensions {
                expected: (3, 4),
                found: (4, 3),
                ..
            }
        ));
    }
}
