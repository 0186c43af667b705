use std::fs;

use shortfall::parsing::table::{parse_dataset, TableLayout};
use shortfall::PipelineError;
use tempfile::tempdir;

fn write_table(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("counties.csv");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn loads_a_county_table() {
    let (_dir, path) = write_table(
        "fips,county,renters,income,shortfall\n\
         16001,Ada,0.31,61000,-120.5\n\
         16027,Canyon,0.28,52000,-80\n\
         16055,Kootenai,0.25,58000,-45.25\n",
    );
    let layout = TableLayout::new("shortfall")
        .with_id_columns(vec!["fips".into(), "county".into()]);

    let dataset = parse_dataset(&path, &layout).unwrap();
    assert_eq!(dataset.feature_names(), &["renters".to_string(), "income".to_string()]);
    assert_eq!(dataset.n_rows(), 3);
    assert_eq!(dataset.target()[2], -45.25);
    assert_eq!(dataset.features()[[1, 1]], 52000.0);
}

#[test]
fn missing_cell_names_line_and_column() {
    let (_dir, path) = write_table("a,b,shortfall\n1,2,3\n4,NA,6\n");
    let err = parse_dataset(&path, &TableLayout::new("shortfall")).unwrap_err();

    assert!(matches!(err, PipelineError::Data(_)));
    let message = err.to_string();
    assert!(message.contains("line 3"));
    assert!(message.contains("'b'"));
}

#[test]
fn text_in_a_feature_column_is_rejected() {
    let (_dir, path) = write_table("county,a,shortfall\nAda,1,3\nBoise,2,4\n");
    // county is not declared as an id column, so it must parse as a number
    let err = parse_dataset(&path, &TableLayout::new("shortfall")).unwrap_err();
    assert!(matches!(err, PipelineError::Data(_)));
}

#[test]
fn unknown_target_column() {
    let (_dir, path) = write_table("a,b\n1,2\n");
    let err = parse_dataset(&path, &TableLayout::new("shortfall")).unwrap_err();
    assert!(matches!(err, PipelineError::Data(_)));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let err =
        parse_dataset(dir.path().join("absent.csv"), &TableLayout::new("shortfall")).unwrap_err();
    assert!(matches!(err, PipelineError::Io(_)));
}
