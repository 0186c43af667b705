//! Error types for the shortfall pipeline

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Everything that can go wrong during a pipeline run.
///
/// Only [`PipelineError::Convergence`] is recovered (per model family); every
/// other variant means a broken precondition and halts the run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("convergence error: {0}")]
    Convergence(String),

    #[error("no viable model, every family failed:\n{0}")]
    NoViableModel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    /// Whether this error only invalidates a single model family
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::Convergence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_convergence_is_recoverable() {
        assert!(PipelineError::Convergence("nan".into()).is_recoverable());
        assert!(!PipelineError::Data("missing".into()).is_recoverable());
        assert!(!PipelineError::Configuration("ratio".into()).is_recoverable());
        assert!(!PipelineError::NoViableModel(String::new()).is_recoverable());
    }

    #[test]
    fn messages_name_the_kind() {
        let err = PipelineError::Configuration("split ratio 1.5 is outside (0, 1)".into());
        assert_eq!(
            err.to_string(),
            "configuration error: split ratio 1.5 is outside (0, 1)"
        );
    }
}
