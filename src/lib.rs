//! Compare seven regression families on a county-level housing shortfall
//! table and report which one predicts held-out counties best.

pub mod config;
pub mod error;
pub mod evaluate;
pub mod metrics;
pub mod model;
pub mod parsing;
pub mod pipeline;
pub mod preprocessing;
pub mod report;
pub mod search;
pub mod split;
pub mod trainer;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use parsing::Dataset;
pub use pipeline::{run, run_specs, PipelineRun};
pub use report::Report;
