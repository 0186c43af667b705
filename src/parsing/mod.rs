use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{PipelineError, Result};

pub mod table;

/// A rectangular, fully numeric table: one row per county, a fixed ordered
/// feature schema and one target value per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    feature_names: Vec<String>,
    data: Array2<f64>,
    target: Array1<f64>,
}

impl Dataset {
    /// Build a dataset, rejecting shape mismatches and non-finite values
    pub fn new(feature_names: Vec<String>, data: Array2<f64>, target: Array1<f64>) -> Result<Self> {
        if feature_names.is_empty() {
            return Err(PipelineError::Data("dataset has no feature columns".into()));
        }
        if data.ncols() != feature_names.len() {
            return Err(PipelineError::Data(format!(
                "{} feature names but {} feature columns",
                feature_names.len(),
                data.ncols()
            )));
        }
        if data.nrows() != target.len() {
            return Err(PipelineError::Data(format!(
                "{} feature rows but {} target values",
                data.nrows(),
                target.len()
            )));
        }
        if let Some(((row, col), value)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(PipelineError::Data(format!(
                "non-finite value {} at row {}, feature '{}'",
                value, row, feature_names[col]
            )));
        }
        if let Some((row, value)) = target.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(PipelineError::Data(format!(
                "non-finite target {} at row {}",
                value, row
            )));
        }

        Ok(Dataset {
            feature_names,
            data,
            target,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn target(&self) -> ArrayView1<'_, f64> {
        self.target.view()
    }

    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    /// Rows at `indices`, in the given order, with the same schema
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            data: self.data.select(Axis(0), indices),
            target: self.target.select(Axis(0), indices),
        }
    }

    /// Check that this dataset carries exactly `expected` as its feature names, in order
    pub fn ensure_schema(&self, expected: &[String]) -> Result<()> {
        if self.feature_names != expected {
            return Err(PipelineError::Data(format!(
                "feature columns {:?} differ from the expected {:?}",
                self.feature_names, expected
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn rejects_shape_mismatch() {
        let err = Dataset::new(names(2), array![[1.0, 2.0]], array![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));

        let err = Dataset::new(names(3), array![[1.0, 2.0]], array![1.0]).unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }

    #[test]
    fn rejects_missing_values() {
        let err = Dataset::new(names(2), array![[1.0, f64::NAN]], array![1.0]).unwrap_err();
        assert!(err.to_string().contains("f2"));

        let err = Dataset::new(names(1), array![[1.0]], array![f64::INFINITY]).unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }

    #[test]
    fn subset_keeps_schema_and_order() {
        let ds = Dataset::new(
            names(2),
            array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]],
            array![0.1, 0.2, 0.3],
        )
        .unwrap();
        let sub = ds.subset(&[2, 0]);

        assert_eq!(sub.feature_names(), ds.feature_names());
        assert_eq!(sub.features(), array![[3.0, 30.0], [1.0, 10.0]]);
        assert_eq!(sub.target(), array![0.3, 0.1]);
        assert!(sub.ensure_schema(ds.feature_names()).is_ok());
        assert!(matches!(sub.ensure_schema(&names(3)), Err(PipelineError::Data(_))));
    }
}
