//! Bagged regression trees.
//!
//! Each tree is grown on a bootstrap sample of the training rows. Splits
//! minimize the summed squared error of the two children, considering every
//! feature at every node, until [`ForestParams::max_depth`] is reached, a node
//! holds fewer than [`ForestParams::min_samples_split`] rows, or no split
//! reduces the error. The forest predicts the mean of its trees.
//!
//! Bootstrap sampling uses a [`Pcg64`] generator seeded from
//! [`ForestParams::seed`] and the tree index, so a fit is reproducible.

use ndarray::ArrayView1;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::{Matrix, ModelFitError, Regressor, check_training_data};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    params: ForestParams,
    trees: Vec<Tree>,
    feature_count: usize,
}

impl RandomForestRegressor {
    #[must_use]
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: vec![],
            feature_count: 0,
        }
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, features: &Matrix, targets: &[f64]) -> Result<(), ModelFitError> {
        check_training_data(features, targets)?;
        let n = features.rows();
        let builder = TreeBuilder {
            features,
            targets,
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split.max(2),
        };
        self.trees = (0..self.params.trees.max(1))
            .map(|i| {
                let mut rng = Pcg64::seed_from_u64(self.params.seed.wrapping_add(i as u64));
                let sample = (0..n).map(|_| rng.random_range(0..n)).collect();
                builder.build(sample)
            })
            .collect();
        self.feature_count = features.cols();
        Ok(())
    }

    #[expect(clippy::cast_precision_loss)]
    fn predict(&self, features: &Matrix) -> Result<Vec<f64>, ModelFitError> {
        if self.trees.is_empty() {
            return Err(ModelFitError::NotFitted);
        }
        if features.cols() != self.feature_count {
            return Err(ModelFitError::FeatureCount {
                expected: self.feature_count,
                found: features.cols(),
            });
        }
        let count = self.trees.len() as f64;
        Ok(features
            .iter_rows()
            .map(|row| self.trees.iter().map(|t| t.predict(&row)).sum::<f64>() / count)
            .collect())
    }
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

impl Tree {
    fn predict(&self, row: &ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => index = if row[feature] <= threshold { left } else { right },
            }
        }
    }
}

struct TreeBuilder<'a> {
    features: &'a Matrix,
    targets: &'a [f64],
    max_depth: usize,
    min_samples_split: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// `sum_l² / n_l + sum_r² / n_r`; larger means lower squared error
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl TreeBuilder<'_> {
    fn build(&self, sample: Vec<usize>) -> Tree {
        let mut tree = Tree { nodes: vec![] };
        self.grow(&mut tree, sample, 0);
        tree
    }

    /// Appends the subtree for `rows` and returns its root index.
    #[expect(clippy::cast_precision_loss)]
    fn grow(&self, tree: &mut Tree, rows: Vec<usize>, depth: usize) -> usize {
        let index = tree.nodes.len();
        let sum = rows.iter().map(|&r| self.targets[r]).sum::<f64>();
        let mean = sum / rows.len() as f64;
        tree.nodes.push(Node::Leaf(mean));

        if depth >= self.max_depth || rows.len() < self.min_samples_split {
            return index;
        }
        let parent_gain = sum * sum / rows.len() as f64;
        let Some(split) = self.best_split(&rows) else {
            return index;
        };
        if split.gain <= parent_gain + parent_gain.abs() * 1e-12 {
            return index;
        }

        let left = self.grow(tree, split.left, depth + 1);
        let right = self.grow(tree, split.right, depth + 1);
        tree.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    #[expect(clippy::cast_precision_loss)]
    fn best_split(&self, rows: &[usize]) -> Option<SplitCandidate> {
        let total = rows.iter().map(|&r| self.targets[r]).sum::<f64>();
        let n = rows.len();
        let mut best: Option<(usize, usize, f64, Vec<usize>)> = None;

        for feature in 0..self.features.cols() {
            let mut sorted = rows.to_vec();
            sorted.sort_by(|&a, &b| {
                self.features
                    .get(a, feature)
                    .total_cmp(&self.features.get(b, feature))
            });
            let mut left_sum = 0.0;
            for k in 1..n {
                left_sum += self.targets[sorted[k - 1]];
                let prev = self.features.get(sorted[k - 1], feature);
                let next = self.features.get(sorted[k], feature);
                if prev >= next {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain =
                    left_sum * left_sum / k as f64 + right_sum * right_sum / (n - k) as f64;
                if best.as_ref().is_none_or(|(_, _, g, _)| gain > *g) {
                    best = Some((feature, k, gain, sorted.clone()));
                }
            }
        }

        best.map(|(feature, k, gain, mut sorted)| {
            let threshold = f64::midpoint(
                self.features.get(sorted[k - 1], feature),
                self.features.get(sorted[k], feature),
            );
            let right = sorted.split_off(k);
            SplitCandidate {
                feature,
                threshold,
                gain,
                left: sorted,
                right,
            }
        })
    }
}
