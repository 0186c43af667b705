//! Gaussian generalized linear regression (ordinary least squares)

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use super::linalg::solve_normal_equations;
use super::{check_shapes, ensure_finite, Model};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Default)]
pub struct LinearRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Model for LinearRegression {
    fn fit(&mut self, x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> Result<()> {
        check_shapes(x, y)?;

        // Centring absorbs the intercept
        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let y_mean = y.mean().unwrap_or(0.0);
        let x_c = x - &x_mean.view().insert_axis(Axis(0));
        let y_c = y - y_mean;

        let xtx = x_c.t().dot(&x_c);
        let xty = x_c.t().dot(&y_c);
        let coefficients = solve_normal_equations(&xtx, &xty).ok_or_else(|| {
            PipelineError::Convergence("normal equations are singular".into())
        })?;
        ensure_finite("linear coefficients", coefficients.iter())?;

        self.intercept = y_mean - coefficients.dot(&x_mean);
        self.coefficients = Some(coefficients);

        Ok(())
    }

    fn predict(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        match &self.coefficients {
            Some(coefficients) => x.dot(coefficients) + self.intercept,
            None => Array1::from_elem(x.nrows(), self.intercept),
        }
    }

    /// Absolute coefficients; on standardized inputs these are standardized coefficients
    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.coefficients.as_ref().map(|c| c.mapv(f64::abs))
    }
}
