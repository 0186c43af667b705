//! Per-family training: cross-validated search, then a refit on all training rows

use std::fmt;

use ndarray::{Array1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::model::{Family, Hyperparams, Model, ModelSpec};
use crate::parsing::Dataset;
use crate::preprocessing::FittedPreprocessor;
use crate::search::{grid_search, Deadline, GridScore, KFold};

/// Where in a family's life a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CrossValidation,
    Refit,
    Evaluation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::CrossValidation => "cross-validation",
            Stage::Refit => "refit",
            Stage::Evaluation => "evaluation",
        })
    }
}

/// A family that could not produce a usable model
#[derive(Debug)]
pub struct TrainingFailure {
    pub family: Family,
    pub stage: Stage,
    pub error: PipelineError,
}

impl fmt::Display for TrainingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed during {}: {}", self.family, self.stage, self.error)
    }
}

/// The estimator chosen by cross-validation, refitted on the whole training subset
pub struct FittedModel {
    pub family: Family,
    pub params: Hyperparams,
    pub cv_rmse: f64,
    pub search: Vec<GridScore>,
    feature_names: Vec<String>,
    preprocessor: FittedPreprocessor,
    model: Box<dyn Model>,
}

impl fmt::Debug for FittedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FittedModel")
            .field("family", &self.family)
            .field("params", &self.params)
            .field("cv_rmse", &self.cv_rmse)
            .finish_non_exhaustive()
    }
}

impl FittedModel {
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Predictions on the original target scale for raw (unpreprocessed) features
    pub fn predict(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        let features = self.preprocessor.transform_features(x);
        let raw = self.model.predict(&features.view());
        self.preprocessor.inverse_target(&raw.view())
    }

    /// Features ranked by the family's native importance, highest first
    pub fn ranked_importances(&self) -> Option<Vec<(String, f64)>> {
        let scores = self.model.feature_importances()?;
        let mut ranked: Vec<(usize, f64)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        Some(
            ranked
                .into_iter()
                .map(|(idx, score)| (self.feature_names[idx].clone(), score))
                .collect(),
        )
    }
}

pub enum TrainingOutcome {
    Fitted(FittedModel),
    Failed(TrainingFailure),
}

/// Record a recoverable error as this family's failure; anything else halts the run
pub(crate) fn recover(
    family: Family,
    stage: Stage,
    error: PipelineError,
) -> Result<TrainingFailure> {
    if !error.is_recoverable() {
        return Err(error);
    }
    warn!(%family, %stage, %error, "model family failed");
    Ok(TrainingFailure {
        family,
        stage,
        error,
    })
}

/// The family's private random stream: same top-level seed, distinct stream per family
fn family_rng(seed: u64, family: Family) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(family.stream_id());
    rng
}

/// Search `spec`'s grid by k-fold cross-validation on `train`, then refit the
/// winning grid point on every training row.
pub fn train_family(
    spec: &ModelSpec,
    train: &Dataset,
    config: &PipelineConfig,
) -> Result<TrainingOutcome> {
    let family = spec.family();
    let mut rng = family_rng(config.seed, family);
    let fold_seed: u64 = rng.gen();
    let model_seed: u64 = rng.gen();

    let x = train.features();
    let y = train.target();
    let folds = KFold::new(config.folds, fold_seed).split(train.n_rows())?;
    let deadline = Deadline::start(config.time_budget);

    info!(%family, grid = spec.grid().len(), folds = folds.len(), "training family");

    let search = match grid_search(spec, &x, &y, &folds, model_seed, &deadline) {
        Ok(search) => search,
        Err(error) => {
            return recover(family, Stage::CrossValidation, error).map(TrainingOutcome::Failed)
        }
    };

    let preprocessor = spec.preprocessing().fit(&x, &y);
    let mut model = spec.build(&search.best, model_seed);
    let refit = model
        .fit(
            &preprocessor.transform_features(&x).view(),
            &preprocessor.transform_target(&y).view(),
        )
        .and_then(|_| deadline.check("refit"));
    if let Err(error) = refit {
        return recover(family, Stage::Refit, error).map(TrainingOutcome::Failed);
    }

    info!(%family, params = %search.best, cv_rmse = search.best_rmse, "selected hyperparameters");

    Ok(TrainingOutcome::Fitted(FittedModel {
        family,
        params: search.best,
        cv_rmse: search.best_rmse,
        search: search.scores,
        feature_names: train.feature_names().to_vec(),
        preprocessor,
        model,
    }))
}

/// Train every spec independently. With `config.parallel` the families run on
/// the rayon pool; the outcome is identical either way.
pub fn train_all(
    specs: &[ModelSpec],
    train: &Dataset,
    config: &PipelineConfig,
) -> Result<Vec<TrainingOutcome>> {
    if config.parallel {
        specs
            .par_iter()
            .map(|spec| train_family(spec, train, config))
            .collect()
    } else {
        specs
            .iter()
            .map(|spec| train_family(spec, train, config))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn dataset() -> Dataset {
        let data = Array2::from_shape_fn((40, 2), |(i, j)| ((i * (j + 2)) % 11) as f64);
        let target = data.column(0).mapv(|v| 2.0 * v + 1.0) + data.column(1);
        Dataset::new(vec!["a".into(), "b".into()], data, target).unwrap()
    }

    #[test]
    fn family_streams_differ() {
        let a: u64 = family_rng(7, Family::Linear).gen();
        let b: u64 = family_rng(7, Family::Tree).gen();
        let c: u64 = family_rng(7, Family::Linear).gen();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn linear_family_fits_exact_plane() {
        let ds = dataset();
        let config = PipelineConfig::default();
        let spec = ModelSpec::new(Family::Linear, ds.n_features(), &config);

        let fitted = match train_family(&spec, &ds, &config).unwrap() {
            TrainingOutcome::Fitted(fitted) => fitted,
            TrainingOutcome::Failed(failure) => panic!("{}", failure),
        };
        assert!(fitted.cv_rmse < 1e-8);

        let pred = fitted.predict(&ds.features());
        let err = (&pred - &ds.target()).mapv(f64::abs);
        assert!(err.iter().all(|e| *e < 1e-8));

        let ranked = fitted.ranked_importances().unwrap();
        assert_eq!(ranked[0].0, "a");
    }

    #[test]
    fn zero_width_net_fails_without_error() {
        let ds = dataset();
        let config = PipelineConfig::default().with_hidden_layers(vec![0, 3]);
        let spec = ModelSpec::new(Family::NeuralNet, ds.n_features(), &config);

        match train_family(&spec, &ds, &config).unwrap() {
            TrainingOutcome::Failed(failure) => {
                assert_eq!(failure.family, Family::NeuralNet);
                assert_eq!(failure.stage, Stage::CrossValidation);
            }
            TrainingOutcome::Fitted(_) => panic!("zero-width net should not fit"),
        }
    }

    /// Fits only on subsets smaller than the full 40-row training set
    struct FailsOnFullData;

    impl Model for FailsOnFullData {
        fn fit(
            &mut self,
            x: &ArrayView2<'_, f64>,
            _y: &ndarray::ArrayView1<'_, f64>,
        ) -> Result<()> {
            if x.nrows() == 40 {
                return Err(PipelineError::Convergence("singular on the full data".into()));
            }
            Ok(())
        }

        fn predict(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
            Array1::zeros(x.nrows())
        }
    }

    fn fails_on_full_data(_: &Hyperparams, _: u64) -> Box<dyn Model> {
        Box::new(FailsOnFullData)
    }

    #[test]
    fn refit_failure_is_reported_at_refit() {
        let ds = dataset();
        let config = PipelineConfig::default();
        let spec = ModelSpec::new(Family::Tree, ds.n_features(), &config)
            .with_estimator(fails_on_full_data);

        match train_family(&spec, &ds, &config).unwrap() {
            TrainingOutcome::Failed(failure) => {
                assert_eq!(failure.family, Family::Tree);
                assert_eq!(failure.stage, Stage::Refit);
                assert!(failure.to_string().contains("tree failed during refit"));
            }
            TrainingOutcome::Fitted(_) => panic!("refit should have failed"),
        }
    }

    #[test]
    fn fatal_errors_are_not_recovered() {
        let err =
            recover(Family::Tree, Stage::Refit, PipelineError::Data("bad".into())).unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }
}
