use super::manifest::Manifest;
use super::mask::{Mask, MaskStore};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// What `on_leave_image` did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryChange {
    Added,
    Updated,
    Removed,
    Unchanged,
}

/// The (image, mask) pairs used for training, kept as two index-aligned lists.
///
/// A pair is listed exactly when its mask file exists and has at least one
/// labeled pixel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingRegistry {
    images: Vec<PathBuf>,
    masks: Vec<PathBuf>,
}

impl TrainingRegistry {
    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn masks(&self) -> &[PathBuf] {
        &self.masks
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn contains(&self, image_path: &Path) -> bool {
        self.position(image_path).is_some()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.images
            .iter()
            .map(PathBuf::as_path)
            .zip(self.masks.iter().map(PathBuf::as_path))
    }

    /// Save-on-navigate-away: call once when the user leaves an image.
    ///
    /// A labeled mask is written and its pair registered; a blank mask has its
    /// file deleted and its pair dropped.
    pub fn on_leave_image(
        &mut self,
        image_path: &Path,
        mask: &Mask,
        store: &MaskStore,
    ) -> Result<RegistryChange> {
        if mask.is_empty() {
            MaskStore::delete(&store.path_for(image_path))?;
            return Ok(match self.position(image_path) {
                Some(index) => {
                    self.images.remove(index);
                    self.masks.remove(index);
                    tracing::info!("Dropped {} from the training set", image_path.display());
                    RegistryChange::Removed
                }
                None => RegistryChange::Unchanged,
            });
        }

        let mask_path = store.save(image_path, mask)?;
        match self.position(image_path) {
            Some(index) => {
                self.masks[index] = mask_path;
                Ok(RegistryChange::Updated)
            }
            None => {
                tracing::info!("Added {} to the training set", image_path.display());
                self.images.push(image_path.to_path_buf());
                self.masks.push(mask_path);
                Ok(RegistryChange::Added)
            }
        }
    }

    /// Drop a pair on explicit request and delete its mask file.
    ///
    /// Returns false when the image was not registered.
    pub fn remove(&mut self, image_path: &Path) -> Result<bool> {
        let Some(index) = self.position(image_path) else {
            return Ok(false);
        };
        tracing::info!(
            "Removing {} and {}",
            image_path.display(),
            self.masks[index].display()
        );
        MaskStore::delete(&self.masks[index])?;
        self.masks.remove(index);
        self.images.remove(index);
        Ok(true)
    }

    /// Rebuild the registry from a manifest's parallel lists.
    ///
    /// Lists of unequal length are cut to the shorter one, and pairs whose
    /// mask file is missing, unreadable or blank are skipped.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        if manifest.training_images.len() != manifest.training_masks.len() {
            tracing::warn!(
                "Manifest lists {} training images but {} masks",
                manifest.training_images.len(),
                manifest.training_masks.len()
            );
        }

        let mut registry = Self::default();
        for (image, mask_path) in manifest
            .training_images
            .iter()
            .zip(&manifest.training_masks)
        {
            match Mask::load(mask_path) {
                Ok(mask) if !mask.is_empty() => {
                    registry.images.push(image.clone());
                    registry.masks.push(mask_path.clone());
                }
                Ok(_) => tracing::warn!("Skipping blank mask {}", mask_path.display()),
                Err(e) => tracing::warn!("Skipping training pair: {}", e),
            }
        }
        registry
    }

    fn position(&self, image_path: &Path) -> Option<usize> {
        self.images.iter().position(|p| p == image_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegmarkError;
    use ndarray::array;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: MaskStore,
        root: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        Fixture {
            store: MaskStore::new(root.join("output").join("masks")),
            root,
            _dir: dir,
        }
    }

    fn labeled() -> Mask {
        Mask::from_array(array![[0, 1], [2, 0]])
    }

    fn assert_invariant(registry: &TrainingRegistry) {
        assert_eq!(registry.images().len(), registry.masks().len());
        for mask in registry.masks() {
            assert!(!Mask::load(mask).unwrap().is_empty());
        }
    }

    #[test]
    fn test_leave_labeled_image_registers_once() {
        let fx = fixture();
        let image = fx.root.join("img_1.png");
        let mut registry = TrainingRegistry::default();

        let change = registry.on_leave_image(&image, &labeled(), &fx.store).unwrap();
        assert_eq!(change, RegistryChange::Added);
        let change = registry.on_leave_image(&image, &labeled(), &fx.store).unwrap();
        assert_eq!(change, RegistryChange::Updated);

        assert_eq!(registry.len(), 1);
        assert!(fx.store.path_for(&image).exists());
        assert_invariant(&registry);
    }

    #[test]
    fn test_leave_blank_image_unregisters_and_deletes() {
        let fx = fixture();
        let image = fx.root.join("img_1.png");
        let mut registry = TrainingRegistry::default();
        registry.on_leave_image(&image, &labeled(), &fx.store).unwrap();

        let change = registry
            .on_leave_image(&image, &Mask::blank(2, 2), &fx.store)
            .unwrap();
        assert_eq!(change, RegistryChange::Removed);
        assert!(registry.is_empty());
        assert!(!fx.store.path_for(&image).exists());

        let change = registry
            .on_leave_image(&image, &Mask::blank(2, 2), &fx.store)
            .unwrap();
        assert_eq!(change, RegistryChange::Unchanged);
    }

    #[test]
    fn test_remove_keeps_lists_aligned() {
        let fx = fixture();
        let mut registry = TrainingRegistry::default();
        let images: Vec<_> = (1..=3).map(|i| fx.root.join(format!("img_{}.png", i))).collect();
        for image in &images {
            registry.on_leave_image(image, &labeled(), &fx.store).unwrap();
        }

        assert!(registry.remove(&images[1]).unwrap());
        assert!(!registry.remove(&images[1]).unwrap());
        assert!(!fx.store.path_for(&images[1]).exists());

        let pairs: Vec<_> = registry.entries().map(|(i, m)| (i.to_path_buf(), m.to_path_buf())).collect();
        assert_eq!(pairs[0], (images[0].clone(), fx.store.path_for(&images[0])));
        assert_eq!(pairs[1], (images[2].clone(), fx.store.path_for(&images[2])));
        assert_invariant(&registry);
    }

    #[test]
    fn test_from_manifest_skips_invalid_pairs() {
        let fx = fixture();
        let good = fx.root.join("img_1.png");
        let blank = fx.root.join("img_2.png");
        let good_mask = fx.store.save(&good, &labeled()).unwrap();
        let blank_mask = fx.store.save(&blank, &Mask::blank(2, 2)).unwrap();

        let manifest = Manifest {
            filepath: fx.root.clone(),
            training_images: vec![good.clone(), blank, fx.root.join("img_3.png")],
            training_masks: vec![good_mask.clone(), blank_mask, fx.root.join("missing.npy")],
            ..Manifest::default()
        };

        let registry = TrainingRegistry::from_manifest(&manifest);
        assert_eq!(registry.images(), [good]);
        assert_eq!(registry.masks(), [good_mask]);
    }

    #[test]
    fn test_failed_delete_keeps_the_pair() {
        let fx = fixture();
        let mut registry = TrainingRegistry::default();
        let image = fx.root.join("img_1.png");
        registry.on_leave_image(&image, &labeled(), &fx.store).unwrap();

        // a directory where the mask file was cannot be removed as a file
        let mask_path = fx.store.path_for(&image);
        std::fs::remove_file(&mask_path).unwrap();
        std::fs::create_dir(&mask_path).unwrap();

        assert!(matches!(
            registry.remove(&image),
            Err(SegmarkError::Persistence { .. })
        ));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&image));
        assert_eq!(registry.masks(), [mask_path]);
    }
}
