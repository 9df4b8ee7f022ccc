use super::types::{FeatureImportance, PixelClassifier};
use crate::error::{Result, SegmarkError};
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hyperparameters for [`RandomForest::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    /// `None` grows every tree until its leaves are pure
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features considered per split; `None` means `sqrt(n_features)`
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 10,
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        /// Class frequencies at the leaf, indexed like `RandomForest::classes`
        distribution: Vec<f32>,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
    /// Normalized impurity decrease per feature
    importances: Vec<f64>,
}

impl DecisionTree {
    fn leaf_for(&self, row: &[f32]) -> &[f32] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Bagged ensemble of Gini decision trees over pixel feature rows.
///
/// The forest remembers the feature names it was fitted on, so callers can
/// check the column binding before predicting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    feature_names: Vec<String>,
    classes: Vec<u8>,
    trees: Vec<DecisionTree>,
}

struct Builder<'a, 'p> {
    x: ArrayView2<'a, f32>,
    /// Class index of every row of `x`
    y: Vec<usize>,
    n_classes: usize,
    params: &'p ForestParams,
    max_features: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f32,
    score: f64,
}

impl Builder<'_, '_> {
    fn counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &r in rows {
            counts[self.y[r]] += 1;
        }
        counts
    }

    fn build_tree(&self, rng: &mut StdRng) -> DecisionTree {
        let n_rows = self.x.nrows();
        let n_features = self.x.ncols();
        let sample: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();

        let mut nodes = Vec::new();
        let mut importances = vec![0.0f64; n_features];
        // (node slot, rows, depth)
        let mut pending = vec![(0usize, sample, 0usize)];
        nodes.push(Node::Leaf {
            distribution: Vec::new(),
        });

        while let Some((slot, rows, depth)) = pending.pop() {
            let counts = self.counts(&rows);
            let n = rows.len() as f64;
            let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
            let too_deep = self.params.max_depth.is_some_and(|max| depth >= max);

            let split = if pure || too_deep || rows.len() < self.params.min_samples_split {
                None
            } else {
                self.best_split(&rows, rng)
            };

            let Some(split) = split else {
                nodes[slot] = Node::Leaf {
                    distribution: counts.iter().map(|&c| (c as f64 / n) as f32).collect(),
                };
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                .into_iter()
                .partition(|&r| self.x[[r, split.feature]] <= split.threshold);

            let parent_impurity = n - sum_sq_over_n(&counts);
            importances[split.feature] += parent_impurity - (n - split.score);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf {
                distribution: Vec::new(),
            });
            nodes.push(Node::Leaf {
                distribution: Vec::new(),
            });
            nodes[slot] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            pending.push((right, right_rows, depth + 1));
            pending.push((left, left_rows, depth + 1));
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        DecisionTree { nodes, importances }
    }

    /// Search a random subset of features for the split with the lowest
    /// weighted Gini impurity. Keeps looking past `max_features` until some
    /// feature actually separates the rows.
    fn best_split(&self, rows: &[usize], rng: &mut StdRng) -> Option<BestSplit> {
        let mut order: Vec<usize> = (0..self.x.ncols()).collect();
        order.shuffle(rng);

        let mut best: Option<BestSplit> = None;
        let mut pairs: Vec<(f32, usize)> = Vec::with_capacity(rows.len());

        for (visited, &feature) in order.iter().enumerate() {
            if visited >= self.max_features && best.is_some() {
                break;
            }

            pairs.clear();
            pairs.extend(rows.iter().map(|&r| (self.x[[r, feature]], self.y[r])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0usize; self.n_classes];
            let mut right = self.counts(rows);
            let total = pairs.len();

            for i in 0..total - 1 {
                let class = pairs[i].1;
                left[class] += 1;
                right[class] -= 1;

                let (value, next) = (pairs[i].0, pairs[i + 1].0);
                if value >= next {
                    continue;
                }

                // maximizing sum(c^2)/n over both sides minimizes weighted Gini
                let gain = sum_sq_over_n(&left) + sum_sq_over_n(&right);
                if best.as_ref().map_or(true, |b| gain > b.score) {
                    let mid = value + (next - value) / 2.0;
                    let threshold = if mid >= next { value } else { mid };
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        score: gain,
                    });
                }
            }
        }

        best
    }
}

fn sum_sq_over_n(counts: &[usize]) -> f64 {
    let n: usize = counts.iter().sum();
    if n == 0 {
        return 0.0;
    }
    counts.iter().map(|&c| (c * c) as f64).sum::<f64>() / n as f64
}

impl RandomForest {
    /// Fit a forest on rows of `x` labeled by `y`. The class space is the
    /// distinct values of `y`.
    pub fn fit(
        x: ArrayView2<f32>,
        y: &[u8],
        feature_names: Vec<String>,
        params: &ForestParams,
    ) -> Result<Self> {
        let mut classes: Vec<u8> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        Self::fit_with_classes(x, y, classes, feature_names, params)
    }

    /// Fit with an explicit, ascending class space. Every value of `y` must
    /// be in `classes`.
    pub fn fit_with_classes(
        x: ArrayView2<f32>,
        y: &[u8],
        classes: Vec<u8>,
        feature_names: Vec<String>,
        params: &ForestParams,
    ) -> Result<Self> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(SegmarkError::Training(format!(
                "need matching, non-empty samples: {} rows, {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if x.ncols() == 0 || x.ncols() != feature_names.len() {
            return Err(SegmarkError::ShapeMismatch {
                expected: feature_names.len(),
                found: x.ncols(),
            });
        }

        let y = y
            .iter()
            .map(|label| {
                classes.binary_search(label).map_err(|_| {
                    SegmarkError::Training(format!("label {} is not a known class", label))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let n_features = x.ncols();
        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .clamp(1, n_features);

        let _span = tracing::debug_span!("train_forest", rows = x.nrows(), n_features).entered();

        let builder = Builder {
            x,
            y,
            n_classes: classes.len(),
            params,
            max_features,
        };

        let mut rng = StdRng::seed_from_u64(params.seed);
        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.gen());
                builder.build_tree(&mut tree_rng)
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Fitted {} trees, {} nodes total",
            trees.len(),
            trees.iter().map(|t| t.nodes.len()).sum::<usize>()
        );

        Ok(Self {
            feature_names,
            classes,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Averaged class probabilities for one feature row.
    pub fn predict_proba_row(&self, row: &[f32]) -> Vec<f32> {
        let mut votes = vec![0.0f32; self.classes.len()];
        for tree in &self.trees {
            for (v, p) in votes.iter_mut().zip(tree.leaf_for(row)) {
                *v += p;
            }
        }
        let n = self.trees.len() as f32;
        votes.iter_mut().for_each(|v| *v /= n);
        votes
    }

    fn predict_row(&self, row: &[f32]) -> u8 {
        let votes = self.predict_proba_row(row);
        let mut best = 0;
        for (i, v) in votes.iter().enumerate() {
            if *v > votes[best] {
                best = i;
            }
        }
        self.classes[best]
    }

    /// Per-feature importance averaged over trees, with its spread.
    pub fn feature_importances(&self) -> Vec<FeatureImportance> {
        let n_trees = self.trees.len() as f64;
        let means: Vec<f64> = (0..self.feature_names.len())
            .map(|f| self.trees.iter().map(|t| t.importances[f]).sum::<f64>() / n_trees)
            .collect();
        let total: f64 = means.iter().sum();
        let scale = if total > 0.0 { total } else { 1.0 };

        self.feature_names
            .iter()
            .enumerate()
            .map(|(f, name)| {
                let variance = self
                    .trees
                    .iter()
                    .map(|t| (t.importances[f] - means[f]).powi(2))
                    .sum::<f64>()
                    / n_trees;
                FeatureImportance {
                    name: name.clone(),
                    mean: means[f] / scale,
                    std: variance.sqrt() / scale,
                }
            })
            .collect()
    }

    /// Serializes the forest to a pretty-printed JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SegmarkError::io(parent, e))?;
        }
        let file = std::fs::File::create(path).map_err(|e| SegmarkError::io(path, e))?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).map_err(|source| SegmarkError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Deserializes a forest from a JSON file previously written by `save_json`.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| SegmarkError::io(path, e))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|source| SegmarkError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl PixelClassifier for RandomForest {
    fn predict(&self, features: &Array2<f32>) -> Result<Vec<u8>> {
        if features.ncols() != self.feature_names.len() {
            return Err(SegmarkError::ShapeMismatch {
                expected: self.feature_names.len(),
                found: features.ncols(),
            });
        }
        let _span = tracing::debug_span!("predict", rows = features.nrows()).entered();

        let mut row = vec![0.0f32; features.ncols()];
        Ok(features
            .rows()
            .into_iter()
            .map(|r| {
                row.iter_mut().zip(r.iter()).for_each(|(d, &s)| *d = s);
                self.predict_row(&row)
            })
            .collect())
    }

    fn classes(&self) -> &[u8] {
        &self.classes
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    /// Two blobs separable on feature 0; feature 1 is noise.
    fn blobs() -> (Array2<f32>, Vec<u8>) {
        let mut x = Array2::zeros((40, 2));
        let mut y = Vec::new();
        for i in 0..40 {
            let class = if i < 20 { 1 } else { 3 };
            x[[i, 0]] = if class == 1 { i as f32 } else { 100.0 + i as f32 };
            x[[i, 1]] = ((i * 7) % 13) as f32;
            y.push(class);
        }
        (x, y)
    }

    #[test]
    fn test_separable_data_is_learned() {
        let (x, y) = blobs();
        let params = ForestParams {
            max_features: Some(2),
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(x.view(), &y, names(2), &params).unwrap();
        assert_eq!(forest.classes(), [1, 3]);
        assert_eq!(forest.n_trees(), 10);
        assert_eq!(forest.predict(&x).unwrap(), y);

        let samples = array![[5.0, 0.0], [130.0, 0.0]];
        assert_eq!(forest.predict(&samples).unwrap(), [1, 3]);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = blobs();
        let params = ForestParams::default();
        let a = RandomForest::fit(x.view(), &y, names(2), &params).unwrap();
        let b = RandomForest::fit(x.view(), &y, names(2), &params).unwrap();
        let samples = Array2::from_shape_fn((30, 2), |(i, j)| (i * 5 + j) as f32);
        assert_eq!(a.predict(&samples).unwrap(), b.predict(&samples).unwrap());
    }

    #[test]
    fn test_wrong_column_count_is_shape_mismatch() {
        let (x, y) = blobs();
        let forest = RandomForest::fit(x.view(), &y, names(2), &ForestParams::default()).unwrap();
        let err = forest.predict(&Array2::zeros((3, 5))).unwrap_err();
        assert!(matches!(
            err,
            SegmarkError::ShapeMismatch {
                expected: 2,
                found: 5
            }
        ));
    }

    #[test]
    fn test_importances_favor_informative_feature() {
        let (x, y) = blobs();
        let params = ForestParams {
            max_features: Some(2),
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(x.view(), &y, names(2), &params).unwrap();
        let importances = forest.feature_importances();
        let total: f64 = importances.iter().map(|i| i.mean).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(importances[0].mean > importances[1].mean);
    }

    #[test]
    fn test_single_class_forest_predicts_that_class() {
        let x = array![[1.0], [2.0], [3.0]];
        let forest = RandomForest::fit(x.view(), &[4, 4, 4], names(1), &ForestParams::default()).unwrap();
        assert_eq!(forest.predict(&x).unwrap(), [4, 4, 4]);
    }

    #[test]
    fn test_explicit_class_space_is_kept() {
        let x = array![[0.0], [1.0]];
        let forest = RandomForest::fit_with_classes(
            x.view(),
            &[1, 2],
            vec![1, 2, 5],
            names(1),
            &ForestParams::default(),
        )
        .unwrap();
        assert_eq!(forest.classes(), [1, 2, 5]);
        assert_eq!(forest.predict_proba_row(&[0.0]).len(), 3);
    }

    #[test]
    fn test_json_round_trip_predicts_the_same() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let (x, y) = blobs();
        let forest = RandomForest::fit(x.view(), &y, names(2), &ForestParams::default()).unwrap();
        forest.save_json(&path).unwrap();

        let loaded = RandomForest::load_json(&path).unwrap();
        assert_eq!(loaded.feature_names(), forest.feature_names());
        assert_eq!(loaded.predict(&x).unwrap(), forest.predict(&x).unwrap());
    }

    fn fit_small(x: ArrayView2<f32>, y: &[u8]) -> RandomForest {
        // params live only for this call while the view comes from the caller
        let params = ForestParams {
            n_trees: 3,
            ..ForestParams::default()
        };
        RandomForest::fit_with_classes(x, y, vec![1, 3], names(2), &params).unwrap()
    }

    #[test]
    fn test_params_may_be_shorter_lived_than_data() {
        let (x, y) = blobs();
        let forest = fit_small(x.view(), &y);
        assert_eq!(forest.n_trees(), 3);
        assert_eq!(forest.classes(), [1, 3]);
    }
}
