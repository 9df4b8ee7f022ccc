use crate::error::{Result, SegmarkError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Session state on disk: enough to rebuild the training registry and the
/// label and feature selections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub filepath: PathBuf,
    #[serde(default)]
    pub images: Vec<PathBuf>,
    #[serde(rename = "training images", default)]
    pub training_images: Vec<PathBuf>,
    #[serde(rename = "training masks", default)]
    pub training_masks: Vec<PathBuf>,
    #[serde(default)]
    pub labels: Vec<u8>,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Manifest {
    /// Write the manifest as pretty-printed JSON, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SegmarkError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SegmarkError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|e| SegmarkError::io(path, e))?;
        tracing::info!("Training set saved to {}", path.display());
        Ok(())
    }

    /// Read a manifest. Relative paths are resolved against `filepath`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SegmarkError::io(path, e))?;
        let mut manifest: Manifest =
            serde_json::from_str(&text).map_err(|source| SegmarkError::Manifest {
                path: path.to_path_buf(),
                source,
            })?;
        manifest.resolve_paths();
        tracing::info!("Loading training set from {}", path.display());
        Ok(manifest)
    }

    fn resolve_paths(&mut self) {
        let root = self.filepath.clone();
        let lists = [
            &mut self.images,
            &mut self.training_images,
            &mut self.training_masks,
        ];
        for list in lists {
            for path in list.iter_mut() {
                if path.is_relative() {
                    *path = root.join(&*path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_keys() {
        let manifest = Manifest {
            filepath: PathBuf::from("/data"),
            images: vec![PathBuf::from("/data/img_1.png")],
            training_images: vec![PathBuf::from("/data/img_1.png")],
            training_masks: vec![PathBuf::from("/data/output/masks/img_1_mask.npy")],
            labels: vec![1, 2],
            features: vec!["Sobel".to_string(), "r_ctr".to_string()],
        };
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["training images"][0], "/data/img_1.png");
        assert_eq!(value["training masks"][0], "/data/output/masks/img_1_mask.npy");
        assert_eq!(value["labels"], serde_json::json!([1, 2]));
        assert_eq!(value["features"][1], "r_ctr");
    }

    #[test]
    fn test_load_resolves_relative_paths_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.json");
        let json = serde_json::json!({
            "filepath": dir.path(),
            "images": ["img_1.png"],
            "training images": ["img_1.png"],
            "training masks": ["output/masks/img_1_mask.npy"],
            "labels": [1],
        });
        std::fs::write(&path, json.to_string()).unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.images, [dir.path().join("img_1.png")]);
        assert_eq!(
            manifest.training_masks,
            [dir.path().join("output/masks/img_1_mask.npy")]
        );
        assert!(manifest.features.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("training_set.json");
        let manifest = Manifest {
            filepath: dir.path().to_path_buf(),
            labels: vec![1, 2, 3],
            features: vec!["Gaussian σ=3".to_string()],
            ..Manifest::default()
        };
        manifest.save(&path).unwrap();
        assert_eq!(Manifest::load(&path).unwrap(), manifest);
    }

    #[test]
    fn test_bad_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Manifest::load(&path), Err(SegmarkError::Manifest { .. })));
    }
}
