use super::Dataset;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Cell spellings the preparer uses for "no value"
const MISSING_MARKERS: [&str; 3] = ["", "NA", "NaN"];

/// Which columns of the table play which role
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub target_column: String,
    /// Identifier columns (county name, FIPS code...) that are not features
    pub id_columns: Vec<String>,
}

impl TableLayout {
    pub fn new(target_column: &str) -> Self {
        TableLayout {
            target_column: target_column.to_string(),
            id_columns: vec![],
        }
    }

    pub fn with_id_columns(mut self, id_columns: Vec<String>) -> Self {
        self.id_columns = id_columns;
        self
    }
}

/// Parse one cell. Missing markers and non-numeric text are contract
/// violations by the preparer, so both are data errors.
fn parse_cell(cell: &str, line: u64, column: &str) -> Result<f64> {
    let cell = cell.trim();
    if MISSING_MARKERS.contains(&cell) {
        return Err(PipelineError::Data(format!(
            "missing value on line {} in column '{}'",
            line, column
        )));
    }
    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(PipelineError::Data(format!(
            "non-numeric value '{}' on line {} in column '{}'",
            cell, line, column
        ))),
    }
}

/// Read a county table from any CSV source with a header row
pub fn parse_reader<R: Read>(reader: R, layout: &TableLayout) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();

    let target_idx = headers
        .iter()
        .position(|h| h == layout.target_column)
        .ok_or_else(|| {
            PipelineError::Data(format!(
                "target column '{}' not found in header",
                layout.target_column
            ))
        })?;
    for id in &layout.id_columns {
        if !headers.iter().any(|h| h == id) {
            return Err(PipelineError::Data(format!(
                "id column '{}' not found in header",
                id
            )));
        }
    }

    // (column index, name) of every feature, in file order
    let feature_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| *i != target_idx && !layout.id_columns.iter().any(|id| id == h))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut values = Vec::new();
    let mut target = Vec::new();

    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());

        for (idx, name) in &feature_columns {
            values.push(parse_cell(&record[*idx], line, name)?);
        }
        target.push(parse_cell(&record[target_idx], line, &layout.target_column)?);
    }

    let n_rows = target.len();
    let data = Array2::from_shape_vec((n_rows, feature_columns.len()), values)
        .map_err(|e| PipelineError::Data(e.to_string()))?;
    let names = feature_columns.into_iter().map(|(_, name)| name).collect();

    Dataset::new(names, data, Array1::from_vec(target))
}

/// Read the prepared county table at `path`
pub fn parse_dataset(path: impl AsRef<Path>, layout: &TableLayout) -> Result<Dataset> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let dataset = parse_reader(file, layout)?;

    info!(
        path = %path.display(),
        rows = dataset.n_rows(),
        features = dataset.n_features(),
        "loaded dataset"
    );

    Ok(dataset)
}
