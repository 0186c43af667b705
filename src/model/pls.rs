//! Partial least squares regression (single response, NIPALS)

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::linalg::gauss_solve;
use super::{check_shapes, ensure_finite, Model};
use crate::error::{PipelineError, Result};

/// Below this norm a score or weight vector carries no further signal
const EPS: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct PartialLeastSquares {
    pub n_components: usize,
    /// Regression coefficients in the original (preprocessed) feature space
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    /// Components actually extracted, at most `n_components`
    pub fitted_components: usize,
}

impl PartialLeastSquares {
    pub fn new(n_components: usize) -> Self {
        PartialLeastSquares {
            n_components,
            coefficients: None,
            intercept: 0.0,
            fitted_components: 0,
        }
    }
}

impl Model for PartialLeastSquares {
    fn fit(&mut self, x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> Result<()> {
        check_shapes(x, y)?;
        let n_features = x.ncols();
        let k = self.n_components.min(n_features);

        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let y_mean = y.mean().unwrap_or(0.0);
        let mut x_res = x - &x_mean.view().insert_axis(Axis(0));
        let mut y_res = y - y_mean;

        let mut weights: Vec<Array1<f64>> = Vec::with_capacity(k);
        let mut loadings: Vec<Array1<f64>> = Vec::with_capacity(k);
        let mut y_loadings: Vec<f64> = Vec::with_capacity(k);

        for _ in 0..k {
            let mut w = x_res.t().dot(&y_res);
            let norm = w.dot(&w).sqrt();
            if norm < EPS {
                break;
            }
            w /= norm;

            let t = x_res.dot(&w);
            let tt = t.dot(&t);
            if tt < EPS {
                break;
            }
            let p = x_res.t().dot(&t) / tt;
            let q = y_res.dot(&t) / tt;

            // deflate
            let t_col = t.view().insert_axis(Axis(1));
            let p_row = p.view().insert_axis(Axis(0));
            x_res = x_res - &t_col.dot(&p_row);
            y_res.scaled_add(-q, &t);

            weights.push(w);
            loadings.push(p);
            y_loadings.push(q);
        }

        let a = weights.len();
        let coefficients = if a == 0 {
            Array1::zeros(n_features)
        } else {
            let w_mat = Array2::from_shape_fn((n_features, a), |(i, j)| weights[j][i]);
            let p_mat = Array2::from_shape_fn((n_features, a), |(i, j)| loadings[j][i]);
            let ptw = p_mat.t().dot(&w_mat);
            let c = gauss_solve(&ptw, &Array1::from_vec(y_loadings)).ok_or_else(|| {
                PipelineError::Convergence("PLS loading matrix is singular".into())
            })?;
            w_mat.dot(&c)
        };
        ensure_finite("PLS coefficients", coefficients.iter())?;

        self.intercept = y_mean - coefficients.dot(&x_mean);
        self.coefficients = Some(coefficients);
        self.fitted_components = a;

        Ok(())
    }

    fn predict(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        match &self.coefficients {
            Some(b) => x.dot(b) + self.intercept,
            None => Array1::from_elem(x.nrows(), self.intercept),
        }
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.coefficients.as_ref().map(|c| c.mapv(f64::abs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::linear::LinearRegression;
    use ndarray::Array2;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((25, 3), |(i, j)| {
            (((i + 1) * (j + 2)) % 7) as f64 + 0.1 * i as f64
        });
        let y = x.dot(&ndarray::array![1.5, -2.0, 0.5]) + 4.0;
        (x, y)
    }

    #[test]
    fn full_rank_pls_equals_least_squares() {
        let (x, y) = data();
        let mut pls = PartialLeastSquares::new(3);
        pls.fit(&x.view(), &y.view()).unwrap();
        let mut ols = LinearRegression::new();
        ols.fit(&x.view(), &y.view()).unwrap();

        let a = pls.predict(&x.view());
        let b = ols.predict(&x.view());
        for (p, q) in a.iter().zip(b.iter()) {
            assert!((p - q).abs() < 1e-6, "{} vs {}", p, q);
        }
        assert_eq!(pls.fitted_components, 3);
    }

    #[test]
    fn one_component_is_a_single_direction() {
        let (x, y) = data();
        let mut pls = PartialLeastSquares::new(1);
        pls.fit(&x.view(), &y.view()).unwrap();

        // the coefficient vector is parallel to X^T y
        let x_c = &x - &x.mean_axis(Axis(0)).unwrap().insert_axis(Axis(0));
        let y_c = &y - y.mean().unwrap();
        let direction = x_c.t().dot(&y_c);
        let b = pls.coefficients.as_ref().unwrap();
        let cos = b.dot(&direction) / (b.dot(b).sqrt() * direction.dot(&direction).sqrt());
        assert!((cos.abs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_target_gives_zero_coefficients() {
        let (x, _) = data();
        let y = Array1::from_elem(x.nrows(), 2.0);
        let mut pls = PartialLeastSquares::new(2);
        pls.fit(&x.view(), &y.view()).unwrap();
        assert_eq!(pls.fitted_components, 0);
        assert!(pls.predict(&x.view()).iter().all(|p| (p - 2.0).abs() < 1e-12));
    }
}
