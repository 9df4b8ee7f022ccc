use crate::error::Result;
use ndarray::Array2;

/// Trait for per-pixel classifiers
/// Keeps the predictor independent of the model family behind it
pub trait PixelClassifier {
    /// Predict one label per row of a (pixels, features) table
    ///
    /// # Errors
    /// * `ShapeMismatch` if the table's column count differs from `n_features`
    fn predict(&self, features: &Array2<f32>) -> Result<Vec<u8>>;

    /// Label IDs the classifier can emit, ascending
    fn classes(&self) -> &[u8];

    /// Feature names, in column order, the classifier was trained on
    fn feature_names(&self) -> &[String];

    fn n_features(&self) -> usize {
        self.feature_names().len()
    }
}

/// Share of the forest's impurity reduction attributed to one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureImportance {
    pub name: String,
    /// Mean across trees, normalized so all features sum to 1
    pub mean: f64,
    /// Spread across trees, on the same scale as `mean`
    pub std: f64,
}
