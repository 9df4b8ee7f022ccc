//! Application state for one annotation session.
//!
//! A [`Session`] owns everything the editing surface reads and writes: the
//! workspace, the image being edited, labels, brush, selected features, the
//! training registry and the current model. Front ends hold a `Session` and
//! call its methods; nothing else keeps a copy of this state.

use crate::annotation::{
    overlay, Brush, BrushMode, EditingImage, LabelSet, Manifest, Mask, MaskStore, Palette,
    RegistryChange, TrainingRegistry,
};
use crate::error::{Result, SegmarkError};
use crate::imaging::{gray_to_array, grayscale, normalize, scan, Workspace};
use crate::output::{self, BatchSelection, BatchSummary, PredictionWriter, ProgressSink};
use crate::segmentation::{
    predict, train, RandomForest, TrainConfig, TrainingReport, DEFAULT_FEATURES,
};
use image::RgbaImage;
use std::path::{Path, PathBuf};

pub struct Session {
    workspace: Workspace,
    store: MaskStore,
    palette: Palette,
    labels: LabelSet,
    brush: Brush,
    features: Vec<String>,
    registry: TrainingRegistry,
    train_config: TrainConfig,
    index: usize,
    current: Option<EditingImage>,
    model: Option<RandomForest>,
    manifest_path: Option<PathBuf>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let workspace = Workspace::default();
        Self {
            store: MaskStore::new(workspace.masks_dir()),
            workspace,
            palette: Palette::default(),
            labels: LabelSet::default(),
            brush: Brush::default(),
            features: DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect(),
            registry: TrainingRegistry::default(),
            train_config: TrainConfig::default(),
            index: 0,
            current: None,
            model: None,
            manifest_path: None,
        }
    }

    /// Start a fresh session on the images of `dir` and open the first one.
    ///
    /// Returns the number of images found.
    pub fn open_directory<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize> {
        let workspace = scan(dir)?;
        self.switch_to(workspace, TrainingRegistry::default(), LabelSet::default())?;
        self.manifest_path = None;
        Ok(self.workspace.images.len())
    }

    /// Restore a session from a manifest file and open its first image.
    pub fn load_manifest<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let manifest = Manifest::load(path)?;

        let workspace = if manifest.images.is_empty() {
            scan(&manifest.filepath)?
        } else {
            Workspace::new(&manifest.filepath, manifest.images.clone())
        };
        self.switch_to(
            workspace,
            TrainingRegistry::from_manifest(&manifest),
            LabelSet::from_ids(manifest.labels.clone()),
        )?;
        if !manifest.features.is_empty() {
            self.features = manifest.features.clone();
        }
        self.manifest_path = Some(path.to_path_buf());

        tracing::info!(
            "{} training images restored from {}",
            self.registry.len(),
            path.display()
        );
        Ok(())
    }

    /// Snapshot of the session as a manifest document.
    pub fn to_manifest(&self) -> Manifest {
        Manifest {
            filepath: self.workspace.root.clone(),
            images: self.workspace.images.clone(),
            training_images: self.registry.images().to_vec(),
            training_masks: self.registry.masks().to_vec(),
            labels: self.labels.ids().to_vec(),
            features: self.features.clone(),
        }
    }

    /// Flush the current image and write the manifest.
    ///
    /// Without an explicit `path` the last manifest location is reused, or
    /// the workspace default if there is none.
    pub fn save_manifest(&mut self, path: Option<&Path>) -> Result<PathBuf> {
        self.flush()?;
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => self.manifest_target(),
        };
        self.to_manifest().save(&path)?;
        self.manifest_path = Some(path.clone());
        Ok(path)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> &mut LabelSet {
        &mut self.labels
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn brush_mut(&mut self) -> &mut Brush {
        &mut self.brush
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Replace the selected feature names. A model trained on another
    /// selection is kept; predicting with it reports the mismatch.
    pub fn set_features(&mut self, features: Vec<String>) {
        self.features = features;
    }

    pub fn registry(&self) -> &TrainingRegistry {
        &self.registry
    }

    pub fn train_config_mut(&mut self) -> &mut TrainConfig {
        &mut self.train_config
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&EditingImage> {
        self.current.as_ref()
    }

    pub fn model(&self) -> Option<&RandomForest> {
        self.model.as_ref()
    }

    pub fn set_model(&mut self, model: RandomForest) {
        self.model = Some(model);
    }

    pub fn next(&mut self) -> Result<()> {
        let last = self.last_index()?;
        self.load_index((self.index + 1).min(last))
    }

    pub fn previous(&mut self) -> Result<()> {
        self.last_index()?;
        self.load_index(self.index.saturating_sub(1))
    }

    pub fn goto(&mut self, index: usize) -> Result<()> {
        let len = self.workspace.images.len();
        if index >= len {
            return Err(SegmarkError::IndexOutOfRange { index, len });
        }
        self.load_index(index)
    }

    /// Apply the brush at (x, y) on the current image.
    pub fn stroke(&mut self, x: i32, y: i32) -> Result<()> {
        let active = self.labels.active();
        if self.brush.mode == BrushMode::Paint && active.is_none() {
            return Err(SegmarkError::NoActiveLabel);
        }
        let current = self.current.as_mut().ok_or(SegmarkError::NoImageLoaded)?;
        current.stroke(&self.brush, active, x, y, &self.palette);
        Ok(())
    }

    /// Apply the leave-image policy to the current image without moving.
    pub fn flush(&mut self) -> Result<RegistryChange> {
        match &self.current {
            Some(current) => {
                self.registry
                    .on_leave_image(&current.path, current.mask(), &self.store)
            }
            None => Ok(RegistryChange::Unchanged),
        }
    }

    /// Drop an image from the training set, delete its mask and re-save the
    /// manifest.
    pub fn remove_training_image(&mut self, image_path: &Path) -> Result<bool> {
        if !self.registry.remove(image_path)? {
            return Ok(false);
        }

        if let Some(current) = self.current.as_mut() {
            if current.path == image_path {
                let base = current.base().clone();
                let mask = Mask::blank_for(&base);
                *current = EditingImage::new(image_path.to_path_buf(), base, mask, &self.palette)?;
            }
        }

        let path = self.manifest_target();
        self.to_manifest().save(&path)?;
        self.manifest_path = Some(path);
        Ok(true)
    }

    /// Train a forest on the registered pairs with the selected features.
    ///
    /// On failure the previous model, if any, is kept.
    pub fn train(&mut self) -> Result<TrainingReport> {
        self.flush()?;
        let trained = train(
            self.registry.images(),
            self.registry.masks(),
            &self.features,
            &self.train_config,
        )?;
        self.model = Some(trained.model);
        Ok(trained.report)
    }

    /// Predict the current image with the selected features. Returns the
    /// label map and its colored render.
    pub fn predict_current(&self) -> Result<(Mask, RgbaImage)> {
        let model = self.model.as_ref().ok_or(SegmarkError::NoModel)?;
        let current = self.current.as_ref().ok_or(SegmarkError::NoImageLoaded)?;

        let intensity = gray_to_array(&grayscale(current.base()));
        let prediction = predict(model, &intensity, &self.features)?;
        let render = overlay(current.base(), &prediction, &self.palette);
        Ok((prediction, render))
    }

    /// All workspace images, each included.
    pub fn batch_selection(&self) -> BatchSelection {
        BatchSelection::new(&self.workspace.images)
    }

    /// Predict every selected image into the workspace prediction directory.
    pub fn run_batch(
        &self,
        selection: &BatchSelection,
        sink: &mut dyn ProgressSink,
    ) -> Result<BatchSummary> {
        let model = self.model.as_ref().ok_or(SegmarkError::NoModel)?;
        let writer = PredictionWriter::new(self.workspace.prediction_dir())?;
        Ok(output::run_batch(
            model,
            &selection.selected(),
            &self.palette,
            &writer,
            sink,
        ))
    }

    /// Replace the workspace and open its first image. The session is left
    /// untouched when that image cannot be opened.
    fn switch_to(
        &mut self,
        workspace: Workspace,
        registry: TrainingRegistry,
        labels: LabelSet,
    ) -> Result<()> {
        let store = MaskStore::new(workspace.masks_dir());
        let current = match workspace.images.first() {
            Some(first) => Some(open_image(first, &store, &self.palette)?),
            None => {
                tracing::warn!("No images found in {}", workspace.root.display());
                None
            }
        };

        self.store = store;
        self.workspace = workspace;
        self.registry = registry;
        self.labels = labels;
        self.index = 0;
        self.current = current;
        Ok(())
    }

    fn last_index(&self) -> Result<usize> {
        self.workspace
            .images
            .len()
            .checked_sub(1)
            .ok_or(SegmarkError::NoImageLoaded)
    }

    fn manifest_target(&self) -> PathBuf {
        self.manifest_path
            .clone()
            .unwrap_or_else(|| self.workspace.default_manifest_path())
    }

    fn load_index(&mut self, index: usize) -> Result<()> {
        self.flush()?;

        let path = &self.workspace.images[index];
        let _span = tracing::debug_span!("load_image", index).entered();
        let editing = open_image(path, &self.store, &self.palette)?;

        tracing::info!("Image {} of {}: {}", index + 1, self.workspace.images.len(), path.display());
        self.current = Some(editing);
        self.index = index;
        Ok(())
    }
}

fn open_image(path: &Path, store: &MaskStore, palette: &Palette) -> Result<EditingImage> {
    let base = normalize(path)?;
    let (width, height) = base.dimensions();
    let mask = store.load_or_create(path, (height as usize, width as usize))?;
    EditingImage::new(path.to_path_buf(), base, mask, palette)
}
