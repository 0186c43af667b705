//! Least-squares gradient boosting of shallow regression trees

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::tree::{normalize, RegressionTree};
use super::{check_shapes, ensure_finite, Model};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct GradientBoosting {
    pub n_trees: usize,
    pub max_depth: usize,
    /// Shrinkage applied to each tree's contribution
    pub learning_rate: f64,
    /// Fraction of rows each tree is fitted on
    pub subsample: f64,
    pub min_samples_leaf: usize,
    pub seed: u64,
    initial: f64,
    trees: Vec<RegressionTree>,
    influence: Array1<f64>,
}

impl GradientBoosting {
    pub fn new(n_trees: usize, max_depth: usize, seed: u64) -> Self {
        GradientBoosting {
            n_trees,
            max_depth: max_depth.max(1),
            learning_rate: 0.1,
            subsample: 0.5,
            min_samples_leaf: 10,
            seed,
            initial: 0.0,
            trees: Vec::new(),
            influence: Array1::zeros(0),
        }
    }
}

impl Model for GradientBoosting {
    fn fit(&mut self, x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> Result<()> {
        check_shapes(x, y)?;
        let n = x.nrows();
        let bag = ((n as f64 * self.subsample).round() as usize).clamp(1, n);
        // a bag too small for two leaves would only ever grow stumps of one leaf
        let min_leaf = self.min_samples_leaf.min((bag / 2).max(1));

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.initial = y.mean().unwrap_or(0.0);
        self.trees = Vec::with_capacity(self.n_trees);
        self.influence = Array1::zeros(x.ncols());

        let mut fitted = Array1::from_elem(n, self.initial);

        for _ in 0..self.n_trees {
            let residual = y - &fitted;
            let mut rows = sample(&mut rng, n, bag).into_vec();
            rows.sort_unstable();

            let x_bag = x.select(Axis(0), &rows);
            let r_bag = residual.select(Axis(0), &rows);

            let mut tree = RegressionTree::new()
                .with_max_depth(self.max_depth)
                .with_min_samples_leaf(min_leaf)
                .with_seed(rng.gen());
            tree.fit(&x_bag.view(), &r_bag.view())?;

            fitted.scaled_add(self.learning_rate, &tree.predict(x));
            self.influence += tree.impurity_decrease();
            self.trees.push(tree);
        }

        ensure_finite("boosted predictions", fitted.iter())?;
        Ok(())
    }

    fn predict(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        let mut out = Array1::from_elem(x.nrows(), self.initial);
        for tree in &self.trees {
            out.scaled_add(self.learning_rate, &tree.predict(x));
        }
        out
    }

    /// Relative influence: summed squared-error reduction over all trees
    fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.trees.is_empty() {
            return None;
        }
        Some(normalize(&self.influence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::rmse;
    use ndarray::Array2;

    #[test]
    fn boosting_reduces_training_error() {
        let x = Array2::from_shape_fn((80, 2), |(i, j)| {
            if j == 0 {
                ((i * 3) % 17) as f64
            } else {
                (i / 17) as f64
            }
        });
        let y = x.column(0).mapv(|v| v * v / 10.0);

        let baseline = Array1::from_elem(80, y.mean().unwrap());
        let mut model = GradientBoosting::new(100, 2, 4);
        model.fit(&x.view(), &y.view()).unwrap();
        let pred = model.predict(&x.view());

        assert!(rmse(&pred.view(), &y.view()) < 0.5 * rmse(&baseline.view(), &y.view()));
        let importances = model.feature_importances().unwrap();
        assert!(importances[0] > 0.8, "{:?}", importances);
    }

    #[test]
    fn zero_trees_predicts_the_mean() {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(20, |i| i as f64);
        let mut model = GradientBoosting::new(0, 2, 1);
        model.fit(&x.view(), &y.view()).unwrap();
        assert!(model.predict(&x.view()).iter().all(|p| (p - 9.5).abs() < 1e-12));
        assert!(model.feature_importances().is_none());
    }
}
