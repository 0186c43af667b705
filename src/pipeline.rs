//! Split, train, evaluate, select

use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::evaluate::evaluate;
use crate::model::ModelSpec;
use crate::parsing::Dataset;
use crate::report::{select, Report};
use crate::split::Split;
use crate::trainer::{recover, train_all, Stage, TrainingOutcome};

/// Everything one run produces
#[derive(Debug)]
pub struct PipelineRun {
    pub split: Split,
    pub report: Report,
}

/// Run the whole comparison on `dataset` with the families selected in `config`.
pub fn run(dataset: &Dataset, config: &PipelineConfig) -> Result<PipelineRun> {
    // grids read the hidden-layer widths, so they must be checked first
    config.validate()?;
    let specs: Vec<ModelSpec> = config
        .selected_families()
        .into_iter()
        .map(|family| ModelSpec::new(family, dataset.n_features(), config))
        .collect();
    run_specs(dataset, config, &specs)
}

/// Run the comparison over explicit model specs.
///
/// Every spec sees the same split. A family that fails to converge is
/// reported and skipped; any other error ends the run.
pub fn run_specs(
    dataset: &Dataset,
    config: &PipelineConfig,
    specs: &[ModelSpec],
) -> Result<PipelineRun> {
    config.validate()?;

    let split = Split::stratified(dataset, config.split_ratio, config.seed)?;
    let train = split.train_set(dataset);
    let test = split.test_set(dataset);
    if train.n_rows() < config.folds {
        return Err(PipelineError::Configuration(format!(
            "{} training rows cannot fill {} cross-validation folds",
            train.n_rows(),
            config.folds
        )));
    }

    info!(families = specs.len(), parallel = config.parallel, "training started");

    let mut evaluations = vec![];
    let mut failures = vec![];
    for outcome in train_all(specs, &train, config)? {
        match outcome {
            TrainingOutcome::Fitted(fitted) => match evaluate(&fitted, &test) {
                Ok(evaluation) => evaluations.push(evaluation),
                Err(error) => failures.push(recover(fitted.family, Stage::Evaluation, error)?),
            },
            TrainingOutcome::Failed(failure) => failures.push(failure),
        }
    }

    let report = select(evaluations, failures)?;
    Ok(PipelineRun { split, report })
}
