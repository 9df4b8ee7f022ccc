use super::ProgressSink;
use crate::annotation::{overlay, Mask, Palette};
use crate::error::{Result, SegmarkError};
use crate::imaging::{gray_to_array, grayscale, normalize};
use crate::segmentation::{predict_with_model_features, PixelClassifier};
use std::path::{Path, PathBuf};

/// Files written for one predicted image.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionFiles {
    pub image: PathBuf,
    pub labels: PathBuf,
    pub render: PathBuf,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub image: PathBuf,
    pub error: SegmarkError,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub written: Vec<PredictionFiles>,
    pub failures: Vec<BatchFailure>,
}

/// Writes `<stem>_pred.npy` and `<stem>_pred.png` into a prediction
/// directory.
pub struct PredictionWriter {
    dir: PathBuf,
}

impl PredictionWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| SegmarkError::io(dir, e))?;
        tracing::info!("Predictions will be saved in {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn paths_for(&self, image_path: &Path) -> (PathBuf, PathBuf) {
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        (
            self.dir.join(format!("{}_pred.npy", stem)),
            self.dir.join(format!("{}_pred.png", stem)),
        )
    }

    pub fn write(
        &self,
        image_path: &Path,
        prediction: &Mask,
        render: &image::RgbaImage,
    ) -> Result<PredictionFiles> {
        let (labels_path, render_path) = self.paths_for(image_path);
        prediction.save(&labels_path)?;
        render
            .save(&render_path)
            .map_err(|source| SegmarkError::ImageSave {
                path: render_path.clone(),
                source,
            })?;
        Ok(PredictionFiles {
            image: image_path.to_path_buf(),
            labels: labels_path,
            render: render_path,
        })
    }
}

/// Predict every image in `images` and write its label array and colored
/// render.
///
/// A failing image is logged and recorded in the summary; the batch carries
/// on with the next one. Progress is reported after every image.
pub fn run_batch<C>(
    model: &C,
    images: &[PathBuf],
    palette: &Palette,
    writer: &PredictionWriter,
    sink: &mut dyn ProgressSink,
) -> BatchSummary
where
    C: PixelClassifier + ?Sized,
{
    let total = images.len();
    let mut summary = BatchSummary::default();
    if total == 0 {
        tracing::warn!("No images selected for prediction");
        return summary;
    }

    for (index, image_path) in images.iter().enumerate() {
        let _span = tracing::debug_span!("batch_item", index).entered();
        tracing::info!(
            "Processing {} ({}/{})",
            image_path.display(),
            index + 1,
            total
        );

        match predict_one(model, image_path, palette, writer) {
            Ok(files) => {
                tracing::info!("Saved {} and {}", files.labels.display(), files.render.display());
                summary.written.push(files);
            }
            Err(error) => {
                tracing::warn!("Skipping {}: {}", image_path.display(), error);
                summary.failures.push(BatchFailure {
                    image: image_path.clone(),
                    error,
                });
            }
        }

        sink.report(index + 1, total);
    }

    tracing::info!(
        "Batch finished: {} written, {} failed",
        summary.written.len(),
        summary.failures.len()
    );
    summary
}

fn predict_one<C>(
    model: &C,
    image_path: &Path,
    palette: &Palette,
    writer: &PredictionWriter,
) -> Result<PredictionFiles>
where
    C: PixelClassifier + ?Sized,
{
    let rgba = normalize(image_path)?;
    let intensity = gray_to_array(&grayscale(&rgba));
    let prediction = predict_with_model_features(model, &intensity)?;
    let render = overlay(&rgba, &prediction, palette);
    writer.write(image_path, &prediction, &render)
}
