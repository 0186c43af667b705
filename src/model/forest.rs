//! Random forest: bootstrap-aggregated regression trees

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::tree::{normalize, RegressionTree};
use super::{check_shapes, Model};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct RandomForest {
    pub n_trees: usize,
    /// Features sampled at each split
    pub mtry: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn new(n_trees: usize, mtry: usize, seed: u64) -> Self {
        RandomForest {
            n_trees,
            mtry: mtry.max(1),
            min_samples_leaf: 5,
            seed,
            trees: Vec::new(),
        }
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

impl Model for RandomForest {
    fn fit(&mut self, x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> Result<()> {
        check_shapes(x, y)?;
        if self.n_trees == 0 {
            return Err(PipelineError::Configuration(
                "random forest needs at least one tree".into(),
            ));
        }
        let n = x.nrows();

        // Seeds are drawn up front so the result does not depend on thread scheduling
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let tree_seeds: Vec<u64> = (0..self.n_trees).map(|_| rng.gen()).collect();

        let trees: Result<Vec<RegressionTree>> = tree_seeds
            .into_par_iter()
            .map(|tree_seed| {
                let mut tree_rng = ChaCha8Rng::seed_from_u64(tree_seed);
                let rows: Vec<usize> = (0..n).map(|_| tree_rng.gen_range(0..n)).collect();
                let x_boot = x.select(Axis(0), &rows);
                let y_boot = y.select(Axis(0), &rows);

                let mut tree = RegressionTree::new()
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(self.mtry)
                    .with_seed(tree_rng.gen());
                tree.fit(&x_boot.view(), &y_boot.view())?;
                Ok(tree)
            })
            .collect();

        self.trees = trees?;
        Ok(())
    }

    fn predict(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        if self.trees.is_empty() {
            return Array1::zeros(x.nrows());
        }
        let mut total = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            total += &tree.predict(x);
        }
        total / self.trees.len() as f64
    }

    /// Mean of the per-tree normalized impurity decreases
    fn feature_importances(&self) -> Option<Array1<f64>> {
        let first = self.trees.first()?;
        let mut total = Array1::<f64>::zeros(first.impurity_decrease().len());
        for tree in &self.trees {
            total += &normalize(tree.impurity_decrease());
        }
        Some(normalize(&total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 3), |(i, j)| match j {
            0 => (i / 13) as f64,
            1 => (i % 13) as f64,
            _ => ((i * 5) % 7) as f64,
        });
        let y = x.column(1).mapv(|v| if v > 6.0 { 5.0 } else { -5.0 });
        (x, y)
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = data();
        let mut a = RandomForest::new(15, 2, 9);
        let mut b = RandomForest::new(15, 2, 9);
        a.fit(&x.view(), &y.view()).unwrap();
        b.fit(&x.view(), &y.view()).unwrap();
        assert_eq!(a.predict(&x.view()), b.predict(&x.view()));
    }

    #[test]
    fn finds_the_informative_feature() {
        let (x, y) = data();
        let mut forest = RandomForest::new(30, 3, 1);
        forest.fit(&x.view(), &y.view()).unwrap();

        let importances = forest.feature_importances().unwrap();
        assert!(importances[1] > importances[0] && importances[1] > importances[2]);
        assert!((importances.sum() - 1.0).abs() < 1e-9);
        assert_eq!(forest.trees().len(), 30);
    }
}
