use std::path::PathBuf;

/// Errors surfaced by the annotation-to-model pipeline.
///
/// Every variant is recovered at the operation boundary; nothing here should
/// take down an interactive session.
#[derive(Debug, thiserror::Error)]
pub enum SegmarkError {
    #[error("failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write image {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("training failed: {0}")]
    Training(String),

    #[error("feature table has {found} columns but the model expects {expected}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("model was trained on features {expected:?}, got {found:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("I/O error on {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unreadable mask array {path}: {reason}")]
    MaskFormat { path: PathBuf, reason: String },

    #[error("mask {path} is {found:?} (h, w) but its image is {expected:?}")]
    MaskDimensions {
        path: PathBuf,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("no image is loaded")]
    NoImageLoaded,

    #[error("no trained model, train one first")]
    NoModel,

    #[error("palette only has {0} colors")]
    LabelLimit(usize),

    #[error("no label is active")]
    NoActiveLabel,

    #[error("image index {index} out of range (0..{len})")]
    IndexOutOfRange { index: usize, len: usize },
}

impl SegmarkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SegmarkError>;
