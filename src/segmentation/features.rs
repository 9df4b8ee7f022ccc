use super::filters;
use ndarray::Array2;

/// Feature names selected when the user has not chosen any.
pub const DEFAULT_FEATURES: [&str; 9] = [
    "denoise",
    "Laplacian",
    "Canny Edge",
    "Sobel",
    "Scharr",
    "Prewitt",
    "Gaussian σ=3",
    "Gaussian σ=7",
    "Median size=3",
];

/// A per-pixel filter that can become one column of a [`FeatureTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Original,
    Denoise,
    Laplacian,
    CannyEdge,
    Sobel,
    Scharr,
    Prewitt,
    GaussianSigma3,
    GaussianSigma7,
    MedianSize3,
    RadialCenter,
}

type FilterFn = fn(&Array2<f32>) -> Array2<f32>;

impl Feature {
    pub const ALL: [Feature; 11] = [
        Feature::Original,
        Feature::Denoise,
        Feature::Laplacian,
        Feature::CannyEdge,
        Feature::Sobel,
        Feature::Scharr,
        Feature::Prewitt,
        Feature::GaussianSigma3,
        Feature::GaussianSigma7,
        Feature::MedianSize3,
        Feature::RadialCenter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::Original => "Original image",
            Feature::Denoise => "denoise",
            Feature::Laplacian => "Laplacian",
            Feature::CannyEdge => "Canny Edge",
            Feature::Sobel => "Sobel",
            Feature::Scharr => "Scharr",
            Feature::Prewitt => "Prewitt",
            Feature::GaussianSigma3 => "Gaussian σ=3",
            Feature::GaussianSigma7 => "Gaussian σ=7",
            Feature::MedianSize3 => "Median size=3",
            Feature::RadialCenter => "r_ctr",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn filter(self) -> FilterFn {
        match self {
            Feature::Original => |img: &Array2<f32>| img.clone(),
            Feature::Denoise => |img: &Array2<f32>| filters::non_local_means(img, 5.0, 7, 21),
            Feature::Laplacian => filters::laplacian,
            Feature::CannyEdge => |img: &Array2<f32>| filters::canny(img, 100.0, 200.0),
            Feature::Sobel => filters::sobel,
            Feature::Scharr => filters::scharr,
            Feature::Prewitt => filters::prewitt,
            Feature::GaussianSigma3 => |img: &Array2<f32>| filters::gaussian(img, 3.0),
            Feature::GaussianSigma7 => |img: &Array2<f32>| filters::gaussian(img, 7.0),
            Feature::MedianSize3 => filters::median3,
            Feature::RadialCenter => |img: &Array2<f32>| {
                let (h, w) = img.dim();
                filters::radial_distance(h, w)
            },
        }
    }

    /// Apply the filter; the result has the input's (H, W) shape.
    pub fn compute(self, image: &Array2<f32>) -> Array2<f32> {
        (self.filter())(image)
    }
}

/// One row per pixel (row index `y * W + x`), one column per feature in the
/// order the features were requested.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    columns: Vec<Feature>,
    values: Array2<f32>,
    skipped: Vec<String>,
}

impl FeatureTable {
    pub fn columns(&self) -> &[Feature] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|f| f.name().to_string()).collect()
    }

    /// (pixels, features)
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// Requested names that matched no known feature.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }
}

/// Resolve requested names to features, keeping first occurrences in order.
///
/// Returns the recognized features and the names that were not recognized.
pub fn resolve<S: AsRef<str>>(names: &[S]) -> (Vec<Feature>, Vec<String>) {
    let mut features = Vec::new();
    let mut skipped = Vec::new();
    for name in names {
        let name = name.as_ref();
        match Feature::from_name(name) {
            Some(feature) if !features.contains(&feature) => features.push(feature),
            Some(_) => tracing::debug!("Duplicate feature ignored: {}", name),
            None => {
                tracing::warn!("Unknown feature skipped: {}", name);
                skipped.push(name.to_string());
            }
        }
    }
    (features, skipped)
}

/// Build the feature table of a single-channel (H, W) image.
pub fn extract<S: AsRef<str>>(image: &Array2<f32>, names: &[S]) -> FeatureTable {
    let (height, width) = image.dim();
    let _span = tracing::debug_span!("extract_features", height, width).entered();

    let (columns, skipped) = resolve(names);
    let mut values = Array2::<f32>::zeros((height * width, columns.len()));

    for (j, feature) in columns.iter().enumerate() {
        let plane = feature.compute(image);
        values
            .column_mut(j)
            .iter_mut()
            .zip(plane.iter())
            .for_each(|(dst, &src)| *dst = src);
        tracing::debug!("Computed feature {}", feature.name());
    }

    FeatureTable {
        columns,
        values,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Array2<f32> {
        Array2::from_shape_fn((4, 6), |(y, x)| (y * 6 + x) as f32 * 7.0)
    }

    #[test]
    fn test_names_round_trip() {
        for feature in Feature::ALL {
            assert_eq!(Feature::from_name(feature.name()), Some(feature));
        }
        for name in DEFAULT_FEATURES {
            assert!(Feature::from_name(name).is_some(), "{}", name);
        }
        assert_eq!(Feature::from_name("gabor"), None);
    }

    #[test]
    fn test_every_feature_keeps_shape() {
        let img = image();
        for feature in Feature::ALL {
            assert_eq!(feature.compute(&img).dim(), (4, 6), "{}", feature.name());
        }
    }

    #[test]
    fn test_table_shape_and_column_order() {
        let table = extract(&image(), &["r_ctr", "bogus", "Original image", "Sobel"]);
        assert_eq!(table.n_rows(), 24);
        assert_eq!(table.n_cols(), 3);
        assert_eq!(
            table.columns(),
            [Feature::RadialCenter, Feature::Original, Feature::Sobel]
        );
        assert_eq!(table.skipped(), ["bogus".to_string()]);
    }

    #[test]
    fn test_rows_are_row_major() {
        let img = image();
        let table = extract(&img, &["Original image"]);
        assert_eq!(table.values()[[6 + 2, 0]], img[[1, 2]]);
        assert_eq!(table.values()[[23, 0]], img[[3, 5]]);
    }

    #[test]
    fn test_duplicates_collapse_to_first_occurrence() {
        let table = extract(&image(), &["Laplacian", "Sobel", "Laplacian"]);
        assert_eq!(table.column_names(), ["Laplacian", "Sobel"]);
    }

    #[test]
    fn test_no_recognized_features_gives_empty_columns() {
        let empty: [&str; 0] = [];
        let table = extract(&image(), &empty);
        assert_eq!(table.n_rows(), 24);
        assert_eq!(table.n_cols(), 0);
    }
}
