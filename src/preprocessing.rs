//! Feature and target scaling fitted on training rows only

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Spread below which a column is treated as constant
const MIN_SPREAD: f64 = 1e-12;

/// Which preprocessing a model family needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preprocessing {
    /// Centre each feature on its mean and divide by its standard deviation
    Standardize,
    /// Map each feature, and the target, onto [0, 1]
    MinMax,
}

/// Per-feature affine transform `(x - offset) / scale`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTransform {
    offset: Array1<f64>,
    scale: Array1<f64>,
}

impl FeatureTransform {
    pub fn apply(&self, x: &ArrayView2<'_, f64>) -> Array2<f64> {
        (x - &self.offset.view().insert_axis(Axis(0))) / &self.scale.view().insert_axis(Axis(0))
    }

    pub fn offset(&self) -> ArrayView1<'_, f64> {
        self.offset.view()
    }

    pub fn scale(&self) -> ArrayView1<'_, f64> {
        self.scale.view()
    }
}

/// Min-max scaling of the target, with its inverse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetScaling {
    min: f64,
    range: f64,
}

impl TargetScaling {
    pub fn apply(&self, y: &ArrayView1<'_, f64>) -> Array1<f64> {
        y.mapv(|v| (v - self.min) / self.range)
    }

    pub fn invert(&self, y: &ArrayView1<'_, f64>) -> Array1<f64> {
        y.mapv(|v| v * self.range + self.min)
    }
}

/// A preprocessing step whose statistics came from one particular set of training rows
#[derive(Debug, Clone, PartialEq)]
pub struct FittedPreprocessor {
    features: FeatureTransform,
    target: Option<TargetScaling>,
}

impl Preprocessing {
    /// Compute the transform's statistics from training rows
    pub fn fit(&self, x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> FittedPreprocessor {
        match self {
            Preprocessing::Standardize => {
                let offset = x
                    .mean_axis(Axis(0))
                    .unwrap_or_else(|| Array1::zeros(x.ncols()));
                let scale = x.std_axis(Axis(0), 0.0).mapv(guard_spread);
                FittedPreprocessor {
                    features: FeatureTransform { offset, scale },
                    target: None,
                }
            }
            Preprocessing::MinMax => {
                let min = x.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
                let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));
                let scale = (&max - &min).mapv(guard_spread);

                let y_min = y.fold(f64::INFINITY, |acc, &v| acc.min(v));
                let y_max = y.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));

                FittedPreprocessor {
                    features: FeatureTransform { offset: min, scale },
                    target: Some(TargetScaling {
                        min: y_min,
                        range: guard_spread(y_max - y_min),
                    }),
                }
            }
        }
    }
}

fn guard_spread(spread: f64) -> f64 {
    if spread.is_finite() && spread > MIN_SPREAD {
        spread
    } else {
        1.0
    }
}

impl FittedPreprocessor {
    pub fn transform_features(&self, x: &ArrayView2<'_, f64>) -> Array2<f64> {
        self.features.apply(x)
    }

    /// Target in the space the model is trained in
    pub fn transform_target(&self, y: &ArrayView1<'_, f64>) -> Array1<f64> {
        match &self.target {
            Some(scaling) => scaling.apply(y),
            None => y.to_owned(),
        }
    }

    /// Model output mapped back onto the original target scale
    pub fn inverse_target(&self, y: &ArrayView1<'_, f64>) -> Array1<f64> {
        match &self.target {
            Some(scaling) => scaling.invert(y),
            None => y.to_owned(),
        }
    }

    pub fn features(&self) -> &FeatureTransform {
        &self.features
    }

    pub fn scales_target(&self) -> bool {
        self.target.is_some()
    }
}
