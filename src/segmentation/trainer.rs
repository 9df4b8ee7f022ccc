use super::features::extract;
use super::forest::{ForestParams, RandomForest};
use super::types::PixelClassifier;
use crate::annotation::Mask;
use crate::error::{Result, SegmarkError};
use crate::imaging::load_intensity;
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::PathBuf;

/// Configuration for a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub n_trees: usize,
    /// Share of labeled pixels held out for the accuracy report
    pub test_fraction: f64,
    pub split_seed: u64,
    pub forest_seed: u64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            n_trees: 10,
            test_fraction: 0.4,
            split_seed: 20,
            forest_seed: 42,
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

impl TrainConfig {
    fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: None,
            seed: self.forest_seed,
        }
    }
}

/// Informational accuracy figures from a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub train_samples: usize,
    pub test_samples: usize,
    pub train_accuracy: f64,
    /// `None` when the held-out partition is empty
    pub test_accuracy: Option<f64>,
    /// Requested feature names that were not recognized
    pub skipped_features: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: RandomForest,
    pub report: TrainingReport,
}

/// Train on registered (image, mask) file pairs.
pub fn train<S: AsRef<str>>(
    images: &[PathBuf],
    masks: &[PathBuf],
    feature_names: &[S],
    config: &TrainConfig,
) -> Result<TrainedModel> {
    if images.is_empty() {
        return Err(SegmarkError::Training("the training set is empty".to_string()));
    }
    if images.len() != masks.len() {
        return Err(SegmarkError::Training(format!(
            "{} training images but {} masks",
            images.len(),
            masks.len()
        )));
    }

    let mut pairs = Vec::with_capacity(images.len());
    for (image_path, mask_path) in images.iter().zip(masks) {
        let intensity = load_intensity(image_path)?;
        let mask = Mask::load(mask_path)?;
        if mask.dim() != intensity.dim() {
            return Err(SegmarkError::MaskDimensions {
                path: mask_path.clone(),
                expected: intensity.dim(),
                found: mask.dim(),
            });
        }
        pairs.push((intensity, mask));
    }

    train_on_pairs(&pairs, feature_names, config)
}

/// Train on in-memory (intensity, mask) pairs.
///
/// The pairs are laid side by side into one composite image so a single
/// feature pass covers all of them; only pixels with a nonzero label are
/// used.
pub fn train_on_pairs<S: AsRef<str>>(
    pairs: &[(Array2<f32>, Mask)],
    feature_names: &[S],
    config: &TrainConfig,
) -> Result<TrainedModel> {
    let Some((first, _)) = pairs.first() else {
        return Err(SegmarkError::Training("the training set is empty".to_string()));
    };
    for (index, (img, mask)) in pairs.iter().enumerate() {
        if mask.dim() != img.dim() {
            return Err(SegmarkError::MaskDimensions {
                path: PathBuf::from(format!("training pair {}", index)),
                expected: img.dim(),
                found: mask.dim(),
            });
        }
    }
    let height = first.nrows();
    if let Some(index) = pairs.iter().position(|(img, _)| img.nrows() != height) {
        return Err(SegmarkError::Training(format!(
            "training image {} is {} pixels high, expected {}",
            index,
            pairs[index].0.nrows(),
            height
        )));
    }

    let image_views: Vec<ArrayView2<f32>> = pairs.iter().map(|(img, _)| img.view()).collect();
    let mask_views: Vec<ArrayView2<u8>> = pairs.iter().map(|(_, m)| m.as_array().view()).collect();
    let composite = concatenate(Axis(1), &image_views).map_err(|e| SegmarkError::Training(e.to_string()))?;
    let composite_mask = concatenate(Axis(1), &mask_views).map_err(|e| SegmarkError::Training(e.to_string()))?;

    tracing::info!(
        "Training on {} images, composite {}x{}",
        pairs.len(),
        composite.ncols(),
        composite.nrows()
    );

    let table = extract(&composite, feature_names);
    if table.n_cols() == 0 {
        return Err(SegmarkError::Training("no recognized features selected".to_string()));
    }

    let labels: Vec<u8> = composite_mask.iter().copied().collect();
    let labeled: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] != 0).collect();

    let mut classes: Vec<u8> = labeled.iter().map(|&i| labels[i]).collect();
    classes.sort_unstable();
    classes.dedup();
    if classes.len() < 2 {
        return Err(SegmarkError::Training(format!(
            "need at least two labeled classes, found {}",
            classes.len()
        )));
    }

    let (train_rows, test_rows) = split_rows(labeled, config.test_fraction, config.split_seed);
    if train_rows.is_empty() {
        return Err(SegmarkError::Training("no pixels left for the training partition".to_string()));
    }

    let x_train = table.values().select(Axis(0), &train_rows);
    let y_train: Vec<u8> = train_rows.iter().map(|&i| labels[i]).collect();
    let model = RandomForest::fit_with_classes(
        x_train.view(),
        &y_train,
        classes,
        table.column_names(),
        &config.forest_params(),
    )?;

    let train_accuracy = accuracy(&model, &x_train, &y_train)?;
    let test_accuracy = if test_rows.is_empty() {
        None
    } else {
        let x_test = table.values().select(Axis(0), &test_rows);
        let y_test: Vec<u8> = test_rows.iter().map(|&i| labels[i]).collect();
        Some(accuracy(&model, &x_test, &y_test)?)
    };

    tracing::info!("Accuracy on training data = {:.4}", train_accuracy);
    match test_accuracy {
        Some(acc) => tracing::info!("Accuracy on test data = {:.4}", acc),
        None => tracing::info!("No held-out pixels, test accuracy unavailable"),
    }

    Ok(TrainedModel {
        model,
        report: TrainingReport {
            train_samples: train_rows.len(),
            test_samples: test_rows.len(),
            train_accuracy,
            test_accuracy,
            skipped_features: table.skipped().to_vec(),
        },
    })
}

/// Shuffle with a fixed seed and hold out `ceil(n * test_fraction)` rows.
fn split_rows(mut rows: Vec<usize>, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);
    let n_test = ((rows.len() as f64) * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
    let train = rows.split_off(n_test.min(rows.len()));
    (train, rows)
}

fn accuracy(model: &RandomForest, x: &Array2<f32>, y: &[u8]) -> Result<f64> {
    let predicted = model.predict(x)?;
    let hits = predicted.iter().zip(y).filter(|(p, t)| p == t).count();
    Ok(hits as f64 / y.len().max(1) as f64)
}
