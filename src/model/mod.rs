use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::{PipelineError, Result};

pub mod boosting;
pub mod elastic_net;
pub mod family;
pub mod forest;
pub mod linalg;
pub mod linear;
pub mod neural_net;
pub mod pls;
pub mod tree;

pub use family::{Estimator, Family, Hyperparams, ModelSpec};

/// A regression estimator. Inputs are already preprocessed; the model only
/// ever sees the feature matrix and target it is handed.
pub trait Model: Send + Sync {
    /// Learn parameters from `x` (rows = observations) and `y`
    fn fit(&mut self, x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> Result<()>;

    /// Predict one value per row of `x`
    fn predict(&self, x: &ArrayView2<'_, f64>) -> Array1<f64>;

    /// Family-native importance of each input feature, if the family has one
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

/// Shape check shared by every `fit`
pub(crate) fn check_shapes(x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::Data(format!(
            "{} feature rows but {} targets",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 {
        return Err(PipelineError::Data("cannot fit on zero rows".into()));
    }
    Ok(())
}

/// Turn non-finite learned parameters into a convergence failure
pub(crate) fn ensure_finite<'a>(
    what: &str,
    values: impl IntoIterator<Item = &'a f64>,
) -> Result<()> {
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(PipelineError::Convergence(format!(
            "{} contain non-finite values",
            what
        )))
    }
}
