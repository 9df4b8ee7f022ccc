use super::features::extract;
use super::types::PixelClassifier;
use crate::annotation::Mask;
use crate::error::{Result, SegmarkError};
use ndarray::Array2;

/// Predict a label map for a single-channel (H, W) image.
///
/// `feature_names` must select the same columns, in the same order, the
/// model was trained on.
pub fn predict<C, S>(model: &C, image: &Array2<f32>, feature_names: &[S]) -> Result<Mask>
where
    C: PixelClassifier + ?Sized,
    S: AsRef<str>,
{
    let table = extract(image, feature_names);
    if table.n_cols() != model.n_features() {
        return Err(SegmarkError::ShapeMismatch {
            expected: model.n_features(),
            found: table.n_cols(),
        });
    }
    let names = table.column_names();
    if names != model.feature_names() {
        return Err(SegmarkError::FeatureMismatch {
            expected: model.feature_names().to_vec(),
            found: names,
        });
    }

    let labels = model.predict(table.values())?;
    let (height, width) = image.dim();
    let found = labels.len();
    let map = Array2::from_shape_vec((height, width), labels).map_err(|_| {
        SegmarkError::ShapeMismatch {
            expected: height * width,
            found,
        }
    })?;
    Ok(Mask::from_array(map))
}

/// Predict using the feature list stored on the model.
pub fn predict_with_model_features<C>(model: &C, image: &Array2<f32>) -> Result<Mask>
where
    C: PixelClassifier + ?Sized,
{
    predict(model, image, model.feature_names())
}
