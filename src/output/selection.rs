use std::path::{Path, PathBuf};

/// Which workspace images a batch run should cover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSelection {
    entries: Vec<(PathBuf, bool)>,
}

impl BatchSelection {
    /// Every image starts out included.
    pub fn new(images: &[PathBuf]) -> Self {
        Self {
            entries: images.iter().map(|p| (p.clone(), true)).collect(),
        }
    }

    pub fn entries(&self) -> &[(PathBuf, bool)] {
        &self.entries
    }

    pub fn set(&mut self, image: &Path, included: bool) -> bool {
        match self.entries.iter_mut().find(|(p, _)| p == image) {
            Some(entry) => {
                entry.1 = included;
                true
            }
            None => false,
        }
    }

    pub fn select_all(&mut self) {
        self.entries.iter_mut().for_each(|e| e.1 = true);
    }

    pub fn deselect_all(&mut self) {
        self.entries.iter_mut().for_each(|e| e.1 = false);
    }

    /// Include images 0, 2, 4, ... and exclude the rest.
    pub fn select_every_second(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.1 = i % 2 == 0;
        }
    }

    pub fn selected(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|(_, included)| *included)
            .map(|(p, _)| p.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images() -> Vec<PathBuf> {
        (0..5).map(|i| PathBuf::from(format!("img_{}.png", i))).collect()
    }

    #[test]
    fn test_defaults_to_everything() {
        assert_eq!(BatchSelection::new(&images()).selected(), images());
    }

    #[test]
    fn test_every_second() {
        let mut selection = BatchSelection::new(&images());
        selection.select_every_second();
        let picked = selection.selected();
        assert_eq!(picked, [images()[0].clone(), images()[2].clone(), images()[4].clone()]);
    }

    #[test]
    fn test_toggles() {
        let mut selection = BatchSelection::new(&images());
        selection.deselect_all();
        assert!(selection.selected().is_empty());
        assert!(selection.set(Path::new("img_3.png"), true));
        assert!(!selection.set(Path::new("other.png"), true));
        assert_eq!(selection.selected(), [PathBuf::from("img_3.png")]);
        selection.select_all();
        assert_eq!(selection.selected().len(), 5);
    }
}
