//! k-fold cross-validated grid search

use std::time::{Duration, Instant};

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::metrics::rmse;
use crate::model::{Hyperparams, ModelSpec};

/// Shuffled k-fold splitter
#[derive(Debug, Clone)]
pub struct KFold {
    n_splits: usize,
    seed: u64,
}

/// One train/validation split of the training rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

impl KFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        KFold { n_splits, seed }
    }

    /// Folds over `n_samples` rows; fold sizes differ by at most one
    pub fn split(&self, n_samples: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(PipelineError::Configuration(
                "cross-validation needs at least 2 folds".into(),
            ));
        }
        if n_samples < self.n_splits {
            return Err(PipelineError::Configuration(format!(
                "{} training rows cannot fill {} folds",
                n_samples, self.n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        indices.shuffle(&mut ChaCha8Rng::seed_from_u64(self.seed));

        let base = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;

        for fold_idx in 0..self.n_splits {
            let size = if fold_idx < remainder { base + 1 } else { base };
            let end = start + size;

            let mut validation = indices[start..end].to_vec();
            let mut train: Vec<usize> = indices[..start]
                .iter()
                .chain(indices[end..].iter())
                .copied()
                .collect();
            validation.sort_unstable();
            train.sort_unstable();

            folds.push(Fold { train, validation });
            start = end;
        }

        Ok(folds)
    }
}

/// Wall-clock guard for one family's training
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn start(budget: Option<Duration>) -> Self {
        Deadline {
            started: Instant::now(),
            budget,
        }
    }

    /// A blown budget is reported like any other failure to fit
    pub fn check(&self, during: &str) -> Result<()> {
        match self.budget {
            Some(budget) if self.started.elapsed() > budget => Err(PipelineError::Convergence(
                format!("exceeded wall-clock budget of {:?} during {}", budget, during),
            )),
            _ => Ok(()),
        }
    }
}

/// Mean validation RMSE of one grid point
#[derive(Debug, Clone, PartialEq)]
pub struct GridScore {
    pub params: Hyperparams,
    pub cv_rmse: f64,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub best: Hyperparams,
    pub best_rmse: f64,
    pub scores: Vec<GridScore>,
}

/// Mean RMSE of `params` over `folds`. Preprocessing is refitted on each
/// fold's training rows, and errors are measured on the original target scale.
pub fn cross_validate(
    spec: &ModelSpec,
    params: &Hyperparams,
    x: &ArrayView2<'_, f64>,
    y: &ArrayView1<'_, f64>,
    folds: &[Fold],
    seed: u64,
    deadline: &Deadline,
) -> Result<f64> {
    let mut total = 0.0;

    for fold in folds {
        let x_train = x.select(Axis(0), &fold.train);
        let y_train = y.select(Axis(0), &fold.train);
        let x_valid = x.select(Axis(0), &fold.validation);
        let y_valid = y.select(Axis(0), &fold.validation);

        let preprocessor = spec.preprocessing().fit(&x_train.view(), &y_train.view());
        let mut model = spec.build(params, seed);
        model.fit(
            &preprocessor.transform_features(&x_train.view()).view(),
            &preprocessor.transform_target(&y_train.view()).view(),
        )?;

        let raw = model.predict(&preprocessor.transform_features(&x_valid.view()).view());
        let predicted: Array1<f64> = preprocessor.inverse_target(&raw.view());
        if predicted.iter().any(|p| !p.is_finite()) {
            return Err(PipelineError::Convergence(format!(
                "non-finite validation predictions for {}",
                params
            )));
        }

        total += rmse(&predicted.view(), &y_valid.view());
        deadline.check("cross-validation")?;
    }

    Ok(total / folds.len() as f64)
}

/// Score every grid point and keep the lowest cross-validated RMSE; ties go
/// to the earlier grid point.
pub fn grid_search(
    spec: &ModelSpec,
    x: &ArrayView2<'_, f64>,
    y: &ArrayView1<'_, f64>,
    folds: &[Fold],
    seed: u64,
    deadline: &Deadline,
) -> Result<SearchResult> {
    let mut scores = Vec::with_capacity(spec.grid().len());
    let mut best: Option<(usize, f64)> = None;

    for (idx, params) in spec.grid().iter().enumerate() {
        let cv_rmse = cross_validate(spec, params, x, y, folds, seed, deadline)?;
        debug!(family = %spec.family(), %params, cv_rmse, "scored grid point");

        if best.map_or(true, |(_, b)| cv_rmse < b) {
            best = Some((idx, cv_rmse));
        }
        scores.push(GridScore {
            params: params.clone(),
            cv_rmse,
        });
    }

    let (best_idx, best_rmse) = best.ok_or_else(|| {
        PipelineError::Configuration(format!("{} has an empty search grid", spec.family()))
    })?;

    Ok(SearchResult {
        best: scores[best_idx].params.clone(),
        best_rmse,
        scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::model::Family;
    use ndarray::{Array1, Array2};

    #[test]
    fn folds_partition_the_rows() {
        let folds = KFold::new(5, 3).split(23).unwrap();
        assert_eq!(folds.len(), 5);

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.validation.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..23).collect::<Vec<_>>());

        for fold in &folds {
            assert!(fold.validation.len() == 4 || fold.validation.len() == 5);
            assert_eq!(fold.train.len() + fold.validation.len(), 23);
            assert!(fold.train.iter().all(|i| !fold.validation.contains(i)));
        }
    }

    #[test]
    fn folds_are_seeded() {
        assert_eq!(KFold::new(4, 8).split(20).unwrap(), KFold::new(4, 8).split(20).unwrap());
        assert_ne!(KFold::new(4, 8).split(20).unwrap(), KFold::new(4, 9).split(20).unwrap());
    }

    #[test]
    fn too_many_folds() {
        assert!(matches!(
            KFold::new(5, 0).split(4),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn exhausted_budget_is_a_convergence_failure() {
        let deadline = Deadline::start(Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(
            deadline.check("refit"),
            Err(PipelineError::Convergence(_))
        ));
        assert!(Deadline::start(None).check("refit").is_ok());
    }

    #[test]
    fn grid_search_prefers_the_true_depth() {
        // a wide gap between the two plateaus keeps every fold's threshold inside it
        let x = Array2::from_shape_fn((60, 1), |(i, _)| {
            if i < 30 {
                i as f64
            } else {
                i as f64 + 100.0
            }
        });
        let y = Array1::from_shape_fn(60, |i| if i < 30 { 1.0 } else { 5.0 });
        let spec = ModelSpec::new(Family::Tree, 1, &PipelineConfig::default());
        let folds = KFold::new(5, 1).split(60).unwrap();

        let result =
            grid_search(&spec, &x.view(), &y.view(), &folds, 1, &Deadline::start(None)).unwrap();
        assert_eq!(result.scores.len(), spec.grid().len());
        assert!(result.best_rmse < 1e-9);
        // every depth fits a single step perfectly, so the first grid point wins
        assert_eq!(&result.best, &spec.grid()[0]);
    }
}
