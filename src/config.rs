//! Run configuration shared by every stage

use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::model::neural_net::{ActivationFunction, InitMethod};
use crate::model::Family;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fraction of rows used for training
    pub split_ratio: f64,
    pub seed: u64,
    /// Cross-validation folds
    pub folds: usize,
    /// Widths of the neural net's two hidden layers
    pub hidden_layers: Vec<usize>,
    pub activation: ActivationFunction,
    pub initialization: InitMethod,
    pub epochs: usize,
    pub forest_trees: usize,
    pub families: Vec<Family>,
    /// Train families on the rayon pool instead of one after another
    pub parallel: bool,
    /// Per-family wall-clock budget; exceeding it counts as a convergence failure
    pub time_budget: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            split_ratio: 0.8,
            seed: 101,
            folds: 5,
            hidden_layers: vec![5, 3],
            activation: ActivationFunction::Sigmoid,
            initialization: InitMethod::Xavier,
            epochs: 500,
            forest_trees: 100,
            families: Family::ALL.to_vec(),
            parallel: false,
            time_budget: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_families(mut self, families: Vec<Family>) -> Self {
        self.families = families;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_hidden_layers(mut self, hidden_layers: Vec<usize>) -> Self {
        self.hidden_layers = hidden_layers;
        self
    }

    /// Reject settings that cannot describe a meaningful run.
    ///
    /// A hidden width of 0 passes: it only breaks the
    /// neural net, which then fails on its own without halting the others.
    pub fn validate(&self) -> Result<()> {
        if !(self.split_ratio > 0.0 && self.split_ratio < 1.0) {
            return Err(PipelineError::Configuration(format!(
                "split ratio {} is outside (0, 1)",
                self.split_ratio
            )));
        }
        if self.folds < 2 {
            return Err(PipelineError::Configuration(format!(
                "cross-validation needs at least 2 folds, got {}",
                self.folds
            )));
        }
        if self.hidden_layers.len() != 2 {
            return Err(PipelineError::Configuration(format!(
                "the neural net takes exactly two hidden-layer widths, got {:?}",
                self.hidden_layers
            )));
        }
        if self.forest_trees == 0 {
            return Err(PipelineError::Configuration(
                "random forest needs at least one tree".into(),
            ));
        }
        if self.epochs == 0 {
            return Err(PipelineError::Configuration(
                "neural net needs at least one epoch".into(),
            ));
        }
        if self.families.is_empty() {
            return Err(PipelineError::Configuration(
                "no algorithm family selected".into(),
            ));
        }
        Ok(())
    }

    /// Selected families in canonical order, without repeats
    pub fn selected_families(&self) -> Vec<Family> {
        let mut families = self.families.clone();
        families.sort();
        families.dedup();
        families
    }
}

/// Parse a hidden-layer list such as `5,3`
pub fn parse_hidden_layers(widths: &str) -> Result<Vec<usize>> {
    widths
        .split(',')
        .map(|part| {
            part.trim().parse::<usize>().map_err(|_| {
                PipelineError::Configuration(format!(
                    "malformed hidden-layer width '{}' in '{}'",
                    part.trim(),
                    widths
                ))
            })
        })
        .collect()
}
