mod brush;
mod manifest;
mod mask;
pub mod npy;
mod palette;
mod registry;

pub use brush::{Brush, BrushMode, EditingImage, DEFAULT_BRUSH_SIZE};
pub use manifest::Manifest;
pub use mask::{overlay, Mask, MaskStore};
pub use palette::{LabelSet, Palette, DEFAULT_COLORS};
pub use registry::{RegistryChange, TrainingRegistry};
