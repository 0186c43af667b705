//! Elastic-net penalized linear regression by cyclic coordinate descent

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use tracing::warn;

use super::{check_shapes, ensure_finite, Model};
use crate::error::Result;

/// Minimizes `(1/2n)|y - Xb|^2 + lambda * ((1 - alpha)/2 |b|^2 + alpha |b|_1)`
#[derive(Debug, Clone)]
pub struct ElasticNet {
    /// Penalty mix: 0 is ridge, 1 is lasso
    pub alpha: f64,
    /// Penalty strength as a fraction of the smallest lambda that zeroes every coefficient
    pub lambda_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    /// The absolute lambda used by the last fit
    pub lambda: f64,
}

impl ElasticNet {
    pub fn new(alpha: f64, lambda_ratio: f64) -> Self {
        ElasticNet {
            alpha: alpha.clamp(1e-3, 1.0),
            lambda_ratio,
            max_iter: 10_000,
            tol: 1e-7,
            coefficients: None,
            intercept: 0.0,
            lambda: 0.0,
        }
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

impl Model for ElasticNet {
    fn fit(&mut self, x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> Result<()> {
        check_shapes(x, y)?;
        let (n_samples, n_features) = x.dim();
        let n = n_samples as f64;

        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let y_mean = y.mean().unwrap_or(0.0);
        let x_c = x - &x_mean.view().insert_axis(Axis(0));
        let y_c = y - y_mean;

        let col_scale: Vec<f64> = x_c
            .axis_iter(Axis(1))
            .map(|col| col.dot(&col) / n)
            .collect();

        let lambda_max = x_c
            .t()
            .dot(&y_c)
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()))
            / (n * self.alpha);
        self.lambda = self.lambda_ratio * lambda_max;
        let l1 = self.lambda * self.alpha;
        let l2 = self.lambda * (1.0 - self.alpha);

        let mut beta = Array1::<f64>::zeros(n_features);
        let mut residual = y_c.clone();
        let mut converged = false;

        for _ in 0..self.max_iter {
            let mut max_change = 0.0f64;

            for j in 0..n_features {
                let denom = col_scale[j] + l2;
                if denom < 1e-15 {
                    continue;
                }
                let column = x_c.column(j);
                let rho = column.dot(&residual) / n + col_scale[j] * beta[j];
                let updated = soft_threshold(rho, l1) / denom;
                let delta = updated - beta[j];

                if delta != 0.0 {
                    residual.scaled_add(-delta, &column);
                    beta[j] = updated;
                    max_change = max_change.max(delta.abs() * col_scale[j].sqrt());
                }
            }

            if !max_change.is_finite() {
                break;
            }
            if max_change < self.tol {
                converged = true;
                break;
            }
        }

        ensure_finite("elastic-net coefficients", beta.iter())?;
        if !converged {
            warn!(
                alpha = self.alpha,
                lambda = self.lambda,
                max_iter = self.max_iter,
                "coordinate descent stopped at its iteration cap"
            );
        }

        self.intercept = y_mean - beta.dot(&x_mean);
        self.coefficients = Some(beta);

        Ok(())
    }

    fn predict(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        match &self.coefficients {
            Some(beta) => x.dot(beta) + self.intercept,
            None => Array1::from_elem(x.nrows(), self.intercept),
        }
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.coefficients.as_ref().map(|c| c.mapv(f64::abs))
    }
}
