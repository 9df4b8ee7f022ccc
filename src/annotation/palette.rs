use crate::error::{Result, SegmarkError};

/// Display colors for label IDs 1..=6, indexed by `id - 1`.
pub const DEFAULT_COLORS: [[u8; 3]; 6] = [
    [0, 0, 255],
    [76, 169, 65],
    [255, 0, 0],
    [255, 255, 0],
    [0, 255, 255],
    [255, 0, 255],
];

/// Fixed mapping from label ID to RGB display color.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: DEFAULT_COLORS.to_vec(),
        }
    }
}

impl Palette {
    pub fn new(colors: Vec<[u8; 3]>) -> Self {
        Self { colors }
    }

    /// Color for a label ID. Label 0 and IDs past the table have none.
    pub fn color(&self, label: u8) -> Option<[u8; 3]> {
        if label == 0 {
            return None;
        }
        self.colors.get(label as usize - 1).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// The ordered label IDs of a session and the one currently selected for
/// painting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSet {
    ids: Vec<u8>,
    active: Option<u8>,
}

impl LabelSet {
    pub fn from_ids(ids: Vec<u8>) -> Self {
        Self { ids, active: None }
    }

    pub fn ids(&self) -> &[u8] {
        &self.ids
    }

    /// Append the next label ID; there can be no more labels than colors.
    pub fn add(&mut self, palette: &Palette) -> Result<u8> {
        if self.ids.len() >= palette.len() {
            return Err(SegmarkError::LabelLimit(palette.len()));
        }
        let next = self.ids.last().map_or(1, |last| last + 1);
        self.ids.push(next);
        tracing::debug!("Added label {}", next);
        Ok(next)
    }

    pub fn remove_last(&mut self) -> Option<u8> {
        let removed = self.ids.pop();
        match removed {
            Some(id) => {
                if self.active == Some(id) {
                    self.active = None;
                }
            }
            None => tracing::warn!("No labels to remove, add a label to remove one"),
        }
        removed
    }

    /// Select `id` for painting. Returns false if the label does not exist.
    pub fn activate(&mut self, id: u8) -> bool {
        if self.ids.contains(&id) {
            self.active = Some(id);
            tracing::debug!("Activated label {}", id);
            true
        } else {
            false
        }
    }

    pub fn active(&self) -> Option<u8> {
        self.active
    }
}
