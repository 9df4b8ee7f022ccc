pub mod features;
mod filters;
mod forest;
mod predictor;
mod trainer;
pub mod types;

pub use features::{extract, Feature, FeatureTable, DEFAULT_FEATURES};
pub use forest::{ForestParams, RandomForest};
pub use predictor::{predict, predict_with_model_features};
pub use trainer::{train, train_on_pairs, TrainConfig, TrainedModel, TrainingReport};
pub use types::{FeatureImportance, PixelClassifier};
