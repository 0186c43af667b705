//! Ranking the evaluated families and rendering the outcome

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use json::{object, JsonValue};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::evaluate::Evaluation;
use crate::trainer::TrainingFailure;

/// Final comparison: successful families ranked by test RMSE, plus the failures
#[derive(Debug)]
pub struct Report {
    ranking: Vec<Evaluation>,
    failures: Vec<TrainingFailure>,
}

/// Rank by ascending test RMSE; equal errors fall back to canonical family order.
pub fn select(
    mut evaluations: Vec<Evaluation>,
    mut failures: Vec<TrainingFailure>,
) -> Result<Report> {
    failures.sort_by_key(|f| f.family);

    if evaluations.is_empty() {
        let listing = if failures.is_empty() {
            "  no family was trained".to_string()
        } else {
            failures
                .iter()
                .map(|f| format!("  {}", f))
                .collect::<Vec<_>>()
                .join("\n")
        };
        return Err(PipelineError::NoViableModel(listing));
    }

    evaluations.sort_by(|a, b| a.rmse.total_cmp(&b.rmse).then(a.family.cmp(&b.family)));
    info!(
        winner = %evaluations[0].family,
        rmse = evaluations[0].rmse,
        failed = failures.len(),
        "selected best model"
    );

    Ok(Report {
        ranking: evaluations,
        failures,
    })
}

impl Report {
    pub fn winner(&self) -> &Evaluation {
        &self.ranking[0]
    }

    pub fn ranking(&self) -> &[Evaluation] {
        &self.ranking
    }

    pub fn failures(&self) -> &[TrainingFailure] {
        &self.failures
    }

    pub fn to_json(&self) -> JsonValue {
        let mut ranking = Vec::with_capacity(self.ranking.len());
        for (idx, evaluation) in self.ranking.iter().enumerate() {
            let mut entry = object! {};
            entry["rank"] = (idx + 1).into();
            entry["family"] = evaluation.family.name().into();
            entry["params"] = evaluation.params.to_string().into();
            entry["cv_rmse"] = evaluation.cv_rmse.into();
            entry["grid"] = JsonValue::Array(
                evaluation
                    .grid
                    .iter()
                    .map(|score| {
                        let mut point = object! {};
                        point["params"] = score.params.to_string().into();
                        point["cv_rmse"] = score.cv_rmse.into();
                        point
                    })
                    .collect(),
            );
            entry["rmse"] = evaluation.rmse.into();
            entry["mae"] = evaluation.mae.into();
            entry["r2"] = evaluation.r2.into();
            entry["importances"] = match &evaluation.importances {
                Some(ranked) => JsonValue::Array(
                    ranked
                        .iter()
                        .map(|importance| {
                            let mut score = object! {};
                            score["feature"] = importance.name.as_str().into();
                            score["score"] = importance.score.into();
                            score
                        })
                        .collect(),
                ),
                None => JsonValue::Null,
            };
            ranking.push(entry);
        }

        let failures = JsonValue::Array(
            self.failures
                .iter()
                .map(|failure| {
                    let mut entry = object! {};
                    entry["family"] = failure.family.name().into();
                    entry["stage"] = failure.stage.to_string().into();
                    entry["error"] = failure.error.to_string().into();
                    entry
                })
                .collect(),
        );

        let mut data = object! {};
        data["winner"] = self.winner().family.name().into();
        data["ranking"] = JsonValue::Array(ranking);
        data["failures"] = failures;
        data
    }

    /// Write the JSON rendering to `path`
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path.as_ref())?;
        file.write_all(self.to_json().pretty(2).as_bytes())?;
        info!(path = %path.as_ref().display(), "wrote report");
        Ok(())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model ranking (test RMSE, lower is better)")?;
        writeln!(
            f,
            "{:>4}  {:<18} {:>12} {:>12} {:>12} {:>8}  params",
            "rank", "family", "test_rmse", "cv_rmse", "mae", "r2"
        )?;
        for (idx, e) in self.ranking.iter().enumerate() {
            writeln!(
                f,
                "{:>4}  {:<18} {:>12.4} {:>12.4} {:>12.4} {:>8.4}  {}",
                idx + 1,
                e.family.name(),
                e.rmse,
                e.cv_rmse,
                e.mae,
                e.r2,
                e.params
            )?;
        }

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failed families")?;
            for failure in &self.failures {
                writeln!(f, "  {}", failure)?;
            }
        }

        let winner = self.winner();
        writeln!(f)?;
        writeln!(f, "Winner: {} ({})", winner.family, winner.params)?;
        match &winner.importances {
            Some(ranked) => {
                writeln!(f, "Feature importances")?;
                for importance in ranked {
                    writeln!(f, "  {:<24} {:.4}", importance.name, importance.score)?;
                }
            }
            None => writeln!(f, "{} exposes no feature importances", winner.family)?,
        }
        Ok(())
    }
}
