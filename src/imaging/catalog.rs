use crate::error::{Result, SegmarkError};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// File extensions picked up when scanning a working directory.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// A working directory and the images found in it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workspace {
    pub root: PathBuf,
    pub images: Vec<PathBuf>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, images: Vec<PathBuf>) -> Self {
        Self {
            root: root.into(),
            images,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn masks_dir(&self) -> PathBuf {
        self.output_dir().join("masks")
    }

    pub fn prediction_dir(&self) -> PathBuf {
        self.output_dir().join("prediction")
    }

    /// Where the manifest is written when no explicit path is given.
    pub fn default_manifest_path(&self) -> PathBuf {
        self.output_dir().join("training_set.json")
    }
}

/// List the images in `dir` (non-recursive), sorted by their numeric suffix.
pub fn scan<P: AsRef<Path>>(dir: P) -> Result<Workspace> {
    let root = dir.as_ref();
    let entries = std::fs::read_dir(root).map_err(|e| SegmarkError::io(root, e))?;

    let mut images = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| SegmarkError::io(root, e))?.path();
        if path.is_file() && has_image_extension(&path) {
            images.push(path);
        }
    }

    images.sort_by(|a, b| compare_names(a, b));
    tracing::info!("Images have been loaded: {} files found", images.len());

    Ok(Workspace::new(root, images))
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// The integer in the second `_`-separated field of a file name, up to its
/// first `.`.
///
/// `img_12.png` gives 12 and `scan_3_raw.png` gives 3; `plain.png` and
/// `img_a.png` give `None`.
pub fn numeric_suffix(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let field = name.split('_').nth(1)?;
    field.split('.').next()?.parse().ok()
}

fn compare_names(a: &Path, b: &Path) -> Ordering {
    match (numeric_suffix(a), numeric_suffix(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
