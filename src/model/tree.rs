//! CART regression tree with the squared-error criterion

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::{check_shapes, Model};
use crate::error::Result;

/// Gains at or below this are treated as no improvement
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict_row(&self, row: &ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split { feature, threshold, left, right } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegressionTree {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn at random at each node; `None` considers all of them
    pub max_features: Option<usize>,
    pub seed: u64,
    root: Option<Node>,
    /// Total squared-error reduction attributed to each feature
    impurity_decrease: Array1<f64>,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Best split found for one node
struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    pub fn new() -> Self {
        RegressionTree {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 0,
            root: None,
            impurity_decrease: Array1::zeros(0),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    /// Unnormalized squared-error reduction per feature
    pub fn impurity_decrease(&self) -> &Array1<f64> {
        &self.impurity_decrease
    }

    fn build(
        &self,
        x: &ArrayView2<'_, f64>,
        y: &ArrayView1<'_, f64>,
        indices: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
        decrease: &mut Array1<f64>,
    ) -> Node {
        let n = indices.len();
        let sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let sum_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
        let mean = sum / n as f64;
        let sse = sum_sq - sum * sum / n as f64;

        let stop = n < self.min_samples_split
            || n < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || sse <= MIN_GAIN;
        if stop {
            return Node::Leaf { value: mean };
        }

        let best = match self.find_split(x, y, &indices, sse, rng) {
            Some(best) => best,
            None => return Node::Leaf { value: mean },
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, best.feature]] <= best.threshold);
        decrease[best.feature] += best.gain;

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(x, y, left, depth + 1, rng, decrease)),
            right: Box::new(self.build(x, y, right, depth + 1, rng, decrease)),
        }
    }

    fn find_split(
        &self,
        x: &ArrayView2<'_, f64>,
        y: &ArrayView1<'_, f64>,
        indices: &[usize],
        parent_sse: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<Candidate> {
        let n_features = x.ncols();
        let features: Vec<usize> = match self.max_features {
            Some(m) if m < n_features => {
                let mut chosen = sample(rng, n_features, m).into_vec();
                chosen.sort_unstable();
                chosen
            }
            _ => (0..n_features).collect(),
        };

        let n = indices.len();
        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
        let mut best: Option<Candidate> = None;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature in features {
            pairs.clear();
            pairs.extend(indices.iter().map(|&i| (x[[i, feature]], y[i])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for split in 0..n - 1 {
                let (value, target) = pairs[split];
                left_sum += target;
                left_sq += target * target;

                let n_left = split + 1;
                let n_right = n - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }
                let next = pairs[split + 1].0;
                if value >= next {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = left_sq - left_sum * left_sum / n_left as f64;
                let right_sse = right_sq - right_sum * right_sum / n_right as f64;
                let gain = parent_sse - left_sse - right_sse;

                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mid = value + (next - value) / 2.0;
                    let threshold = if mid < next { mid } else { value };
                    best = Some(Candidate { feature, threshold, gain });
                }
            }
        }

        best
    }
}

impl Model for RegressionTree {
    fn fit(&mut self, x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> Result<()> {
        check_shapes(x, y)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut decrease = Array1::zeros(x.ncols());
        let root = self.build(x, y, (0..x.nrows()).collect(), 0, &mut rng, &mut decrease);

        self.root = Some(root);
        self.impurity_decrease = decrease;

        Ok(())
    }

    fn predict(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        match &self.root {
            Some(root) => x.outer_iter().map(|row| root.predict_row(&row)).collect(),
            None => Array1::zeros(x.nrows()),
        }
    }

    /// Impurity decrease, normalized to sum to one
    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.root.as_ref()?;
        Some(normalize(&self.impurity_decrease))
    }
}

/// Scale non-negative scores to sum to one; all-zero scores stay zero
pub(crate) fn normalize(scores: &Array1<f64>) -> Array1<f64> {
    let total = scores.sum();
    if total > 0.0 {
        scores / total
    } else {
        scores.clone()
    }
}
