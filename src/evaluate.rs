//! Held-out scoring of a refitted model

use tracing::info;

use crate::error::{PipelineError, Result};
use crate::metrics::{mae, r2, rmse};
use crate::model::{Family, Hyperparams};
use crate::parsing::Dataset;
use crate::search::GridScore;
use crate::trainer::FittedModel;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureImportance {
    pub name: String,
    pub score: f64,
}

/// Test-subset performance of one family
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub family: Family,
    pub params: Hyperparams,
    pub cv_rmse: f64,
    /// Cross-validated RMSE of every grid point searched
    pub grid: Vec<GridScore>,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// Ranked highest first; `None` when the family has no native notion
    pub importances: Option<Vec<FeatureImportance>>,
}

/// Score `fitted` on `test` using the preprocessing statistics of the training rows
pub fn evaluate(fitted: &FittedModel, test: &Dataset) -> Result<Evaluation> {
    test.ensure_schema(fitted.feature_names())?;

    let predicted = fitted.predict(&test.features());
    if predicted.iter().any(|p| !p.is_finite()) {
        return Err(PipelineError::Convergence(format!(
            "{} produced non-finite test predictions",
            fitted.family
        )));
    }

    let actual = test.target();
    let evaluation = Evaluation {
        family: fitted.family,
        params: fitted.params.clone(),
        cv_rmse: fitted.cv_rmse,
        grid: fitted.search.clone(),
        rmse: rmse(&predicted.view(), &actual),
        mae: mae(&predicted.view(), &actual),
        r2: r2(&predicted.view(), &actual),
        importances: fitted.ranked_importances().map(|ranked| {
            ranked
                .into_iter()
                .map(|(name, score)| FeatureImportance { name, score })
                .collect()
        }),
    };

    info!(
        family = %evaluation.family,
        rmse = evaluation.rmse,
        mae = evaluation.mae,
        r2 = evaluation.r2,
        "evaluated on test subset"
    );
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::model::ModelSpec;
    use crate::trainer::{train_family, TrainingOutcome};
    use ndarray::{array, Array2};

    fn fitted_tree(train: &Dataset) -> FittedModel {
        let config = PipelineConfig {
            folds: 3,
            ..Default::default()
        };
        let spec = ModelSpec::new(Family::Tree, train.n_features(), &config);
        match train_family(&spec, train, &config).unwrap() {
            TrainingOutcome::Fitted(fitted) => fitted,
            TrainingOutcome::Failed(failure) => panic!("{}", failure),
        }
    }

    fn step_dataset(rows: usize) -> Dataset {
        let data = Array2::from_shape_fn((rows, 1), |(i, _)| i as f64);
        let target = data.column(0).mapv(|v| if v < rows as f64 / 2.0 { 0.0 } else { 10.0 });
        Dataset::new(vec!["x".into()], data, target).unwrap()
    }

    #[test]
    fn scores_held_out_rows() {
        let fitted = fitted_tree(&step_dataset(40));
        let test =
            Dataset::new(vec!["x".into()], array![[2.0], [35.0]], array![0.0, 10.0]).unwrap();

        let evaluation = evaluate(&fitted, &test).unwrap();
        assert_eq!(evaluation.family, Family::Tree);
        assert!(evaluation.rmse < 1e-9);
        assert!(evaluation.mae < 1e-9);
        assert_eq!(evaluation.importances.unwrap()[0].name, "x");
    }

    #[test]
    fn schema_mismatch_is_data_error() {
        let fitted = fitted_tree(&step_dataset(40));
        let test = Dataset::new(vec!["y".into()], array![[2.0]], array![0.0]).unwrap();
        assert!(matches!(evaluate(&fitted, &test), Err(PipelineError::Data(_))));
    }
}
