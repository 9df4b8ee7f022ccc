//! Paint per-pixel labels over images, train a pixel classifier from the
//! painted examples and predict label maps for new images.

pub mod annotation;
mod error;
pub mod imaging;
pub mod output;
pub mod segmentation;
pub mod session;

pub use error::{Result, SegmarkError};
pub use session::Session;
