//! The seven algorithm families, their search grids and preprocessing

use std::fmt;
use std::str::FromStr;

use super::boosting::GradientBoosting;
use super::elastic_net::ElasticNet;
use super::forest::RandomForest;
use super::linear::LinearRegression;
use super::neural_net::{ActivationFunction, InitMethod, NeuralNet};
use super::pls::PartialLeastSquares;
use super::tree::RegressionTree;
use super::Model;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::preprocessing::Preprocessing;

const NET_BATCH_SIZE: usize = 32;
/// Epoch-over-epoch loss improvement below which the net stops training
const NET_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Linear,
    ElasticNet,
    Pls,
    NeuralNet,
    Tree,
    RandomForest,
    GradientBoosting,
}

impl Family {
    /// Every family, in canonical order
    pub const ALL: [Family; 7] = [
        Family::Linear,
        Family::ElasticNet,
        Family::Pls,
        Family::NeuralNet,
        Family::Tree,
        Family::RandomForest,
        Family::GradientBoosting,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Family::Linear => "linear",
            Family::ElasticNet => "elastic-net",
            Family::Pls => "pls",
            Family::NeuralNet => "neural-net",
            Family::Tree => "tree",
            Family::RandomForest => "random-forest",
            Family::GradientBoosting => "gradient-boosting",
        }
    }

    /// Stable identity used to pick this family's random stream
    pub fn stream_id(&self) -> u64 {
        match self {
            Family::Linear => 1,
            Family::ElasticNet => 2,
            Family::Pls => 3,
            Family::NeuralNet => 4,
            Family::Tree => 5,
            Family::RandomForest => 6,
            Family::GradientBoosting => 7,
        }
    }

    pub fn preprocessing(&self) -> Preprocessing {
        match self {
            Family::NeuralNet => Preprocessing::MinMax,
            _ => Preprocessing::Standardize,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Family {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "glm" => Ok(Family::Linear),
            "elastic-net" | "elasticnet" | "glmnet" => Ok(Family::ElasticNet),
            "pls" => Ok(Family::Pls),
            "neural-net" | "neuralnet" | "nnet" => Ok(Family::NeuralNet),
            "tree" | "rpart" => Ok(Family::Tree),
            "random-forest" | "rf" => Ok(Family::RandomForest),
            "gradient-boosting" | "gbm" => Ok(Family::GradientBoosting),
            other => Err(PipelineError::Configuration(format!(
                "unknown algorithm family '{}'",
                other
            ))),
        }
    }
}

/// One point of a family's hyperparameter grid
#[derive(Debug, Clone, PartialEq)]
pub enum Hyperparams {
    Linear,
    ElasticNet { alpha: f64, lambda_ratio: f64 },
    Pls { components: usize },
    NeuralNet {
        hidden: [usize; 2],
        learning_rate: f64,
        epochs: usize,
        activation: ActivationFunction,
        init: InitMethod,
    },
    Tree { max_depth: usize, min_samples_leaf: usize },
    RandomForest { mtry: usize, trees: usize },
    GradientBoosting { max_depth: usize, trees: usize },
}

impl fmt::Display for Hyperparams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hyperparams::Linear => write!(f, "-"),
            Hyperparams::ElasticNet { alpha, lambda_ratio } => {
                write!(f, "alpha={} lambda_ratio={}", alpha, lambda_ratio)
            }
            Hyperparams::Pls { components } => write!(f, "components={}", components),
            Hyperparams::NeuralNet { hidden, learning_rate, epochs, activation, .. } => write!(
                f,
                "hidden={}x{} activation={:?} learning_rate={} epochs={}",
                hidden[0], hidden[1], activation, learning_rate, epochs
            ),
            Hyperparams::Tree { max_depth, min_samples_leaf } => {
                write!(f, "max_depth={} min_samples_leaf={}", max_depth, min_samples_leaf)
            }
            Hyperparams::RandomForest { mtry, trees } => write!(f, "mtry={} trees={}", mtry, trees),
            Hyperparams::GradientBoosting { max_depth, trees } => {
                write!(f, "max_depth={} trees={}", max_depth, trees)
            }
        }
    }
}

/// Constructor of a fresh, unfitted estimator for one grid point and seed
pub type Estimator = fn(&Hyperparams, u64) -> Box<dyn Model>;

/// A family together with its search grid, preprocessing and estimator; immutable once built
#[derive(Clone)]
pub struct ModelSpec {
    family: Family,
    grid: Vec<Hyperparams>,
    preprocessing: Preprocessing,
    estimator: Estimator,
}

impl fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSpec")
            .field("family", &self.family)
            .field("grid", &self.grid)
            .field("preprocessing", &self.preprocessing)
            .finish_non_exhaustive()
    }
}

impl ModelSpec {
    pub fn new(family: Family, n_features: usize, config: &PipelineConfig) -> ModelSpec {
        let p = n_features.max(1);
        let grid = match family {
            Family::Linear => vec![Hyperparams::Linear],
            Family::ElasticNet => {
                let mut grid = vec![];
                for alpha in [0.1, 0.55, 1.0] {
                    for lambda_ratio in [0.001, 0.01, 0.1] {
                        grid.push(Hyperparams::ElasticNet { alpha, lambda_ratio });
                    }
                }
                grid
            }
            Family::Pls => (1..=p.min(5))
                .map(|components| Hyperparams::Pls { components })
                .collect(),
            Family::NeuralNet => {
                let hidden = [config.hidden_layers[0], config.hidden_layers[1]];
                [0.05, 0.2]
                    .into_iter()
                    .map(|learning_rate| Hyperparams::NeuralNet {
                        hidden,
                        learning_rate,
                        epochs: config.epochs,
                        activation: config.activation,
                        init: config.initialization,
                    })
                    .collect()
            }
            Family::Tree => {
                let mut grid = vec![];
                for max_depth in [3, 5, 8] {
                    for min_samples_leaf in [2, 8] {
                        grid.push(Hyperparams::Tree { max_depth, min_samples_leaf });
                    }
                }
                grid
            }
            Family::RandomForest => {
                let mut mtrys = vec![
                    ((p as f64).sqrt().floor() as usize).max(1),
                    (p / 3).max(1),
                    p,
                ];
                mtrys.sort_unstable();
                mtrys.dedup();
                mtrys
                    .into_iter()
                    .map(|mtry| Hyperparams::RandomForest {
                        mtry,
                        trees: config.forest_trees,
                    })
                    .collect()
            }
            Family::GradientBoosting => {
                let mut grid = vec![];
                for max_depth in [1, 2, 3] {
                    for trees in [50, 100, 150] {
                        grid.push(Hyperparams::GradientBoosting { max_depth, trees });
                    }
                }
                grid
            }
        };

        ModelSpec {
            family,
            grid,
            preprocessing: family.preprocessing(),
            estimator: build_estimator,
        }
    }

    /// Replace the estimator constructor, keeping the family's grid and preprocessing
    pub fn with_estimator(mut self, estimator: Estimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn grid(&self) -> &[Hyperparams] {
        &self.grid
    }

    pub fn preprocessing(&self) -> Preprocessing {
        self.preprocessing
    }

    /// A fresh, unfitted estimator for one grid point
    pub fn build(&self, params: &Hyperparams, seed: u64) -> Box<dyn Model> {
        (self.estimator)(params, seed)
    }
}

/// The built-in estimator of every family
fn build_estimator(params: &Hyperparams, seed: u64) -> Box<dyn Model> {
    match params {
        Hyperparams::Linear => Box::new(LinearRegression::new()),
        Hyperparams::ElasticNet { alpha, lambda_ratio } => {
            Box::new(ElasticNet::new(*alpha, *lambda_ratio))
        }
        Hyperparams::Pls { components } => Box::new(PartialLeastSquares::new(*components)),
        Hyperparams::NeuralNet { hidden, learning_rate, epochs, activation, init } => {
            Box::new(NeuralNet::new(
                hidden.to_vec(),
                *epochs,
                NET_BATCH_SIZE,
                *learning_rate,
                *activation,
                *init,
                NET_TOLERANCE,
                seed,
            ))
        }
        Hyperparams::Tree { max_depth, min_samples_leaf } => Box::new(
            RegressionTree::new()
                .with_max_depth(*max_depth)
                .with_min_samples_leaf(*min_samples_leaf)
                .with_seed(seed),
        ),
        Hyperparams::RandomForest { mtry, trees } => {
            Box::new(RandomForest::new(*trees, *mtry, seed))
        }
        Hyperparams::GradientBoosting { max_depth, trees } => {
            Box::new(GradientBoosting::new(*trees, *max_depth, seed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("glm".parse::<Family>().unwrap(), Family::Linear);
        assert_eq!("Random-Forest".parse::<Family>().unwrap(), Family::RandomForest);
        assert_eq!("nnet".parse::<Family>().unwrap(), Family::NeuralNet);
        for family in Family::ALL {
            assert_eq!(family.name().parse::<Family>().unwrap(), family);
        }
    }

    #[test]
    fn unknown_family_is_configuration_error() {
        let err = "svm".parse::<Family>().unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn stream_ids_are_distinct() {
        let mut ids: Vec<u64> = Family::ALL.iter().map(|f| f.stream_id()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 7);
    }

    #[test]
    fn only_neural_net_uses_min_max() {
        for family in Family::ALL {
            let expected = if family == Family::NeuralNet {
                Preprocessing::MinMax
            } else {
                Preprocessing::Standardize
            };
            assert_eq!(family.preprocessing(), expected);
        }
    }

    #[test]
    fn grids_follow_feature_count() {
        let config = PipelineConfig::default();
        let pls = ModelSpec::new(Family::Pls, 3, &config);
        assert_eq!(pls.grid().len(), 3);

        let forest = ModelSpec::new(Family::RandomForest, 3, &config);
        assert_eq!(
            forest.grid(),
            &[
                Hyperparams::RandomForest { mtry: 1, trees: config.forest_trees },
                Hyperparams::RandomForest { mtry: 3, trees: config.forest_trees },
            ]
        );

        let net = ModelSpec::new(Family::NeuralNet, 3, &config);
        assert!(net
            .grid()
            .iter()
            .all(|hp| matches!(hp, Hyperparams::NeuralNet { hidden: [5, 3], .. })));
        assert_eq!(ModelSpec::new(Family::GradientBoosting, 3, &config).grid().len(), 9);
    }
}
