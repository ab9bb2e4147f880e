//! Multi-cohort merge, quality filtering, normalization and scoring.
//!
//! [`run`] loads every configured cohort from disk and hands the merged
//! dataset to [`process`]. It runs the quality filter with sentinel
//! imputation ahead of the completeness pass, then coerces coded answers
//! and scores the knowledge questions.

pub mod filter;
pub mod merge;
pub mod normalize;
pub mod score;
pub mod summary;
pub mod types;

use std::path::Path;
use tracing::info;

use crate::config::AnalysisConfig;
use crate::error::Result;
use filter::QualityFilter;
use merge::CohortCounts;
use summary::AnalysisSummary;
use types::Dataset;

/// The cleaned, scored dataset and its summary.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub dataset: Dataset,
    pub summary: AnalysisSummary,
}

/// Loads every cohort listed in `config` from `data_dir` and processes it.
#[tracing::instrument(skip(data_dir, config), fields(data_dir = %data_dir.display(), cohorts = config.cohorts.len()))]
pub fn run(data_dir: &Path, config: &AnalysisConfig) -> Result<AnalysisOutcome> {
    let (dataset, cohorts) = merge::load_all(data_dir, config)?;
    process(dataset, cohorts, config)
}

/// Cleans and scores an already merged dataset.
pub fn process(
    mut dataset: Dataset,
    cohorts: Vec<CohortCounts>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutcome> {
    let key = config.answers()?;

    let mut imputed = 0;
    let dropped = QualityFilter::new(config).apply(&mut dataset, |dataset| {
        imputed = normalize::impute(dataset, config);
    });
    normalize::coerce_integers(&mut dataset, config)?;
    score::score(&mut dataset, &key)?;

    let summary = AnalysisSummary::build(
        &dataset,
        cohorts,
        dropped,
        imputed,
        &key,
        &config.identifier_field,
        &config.phase_field,
    );

    info!(
        dropped = dropped.total(),
        imputed,
        retained_rows = summary.retained_rows,
        retained_identifiers = summary.retained_identifiers,
        "Analysis dataset ready"
    );

    Ok(AnalysisOutcome { dataset, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{Phase, Record, Value};

    fn config() -> AnalysisConfig {
        AnalysisConfig::from_json(
            r#"{
                "cohorts": ["21sp"],
                "impute": [{ "select": { "prefix": "Q19_" }, "value": 0 }],
                "answer_key": [{ "question": "Q1", "answer": 3 }]
            }"#,
        )
        .unwrap()
    }

    fn row(id: &str, phase: Phase, q1: &str, q19: Option<&str>) -> Record {
        let mut row = Record::default();
        row.set("Identifier", Value::Text(id.into()));
        row.set("Progress", Value::Text("100".into()));
        row.set("prepost", Value::Text(phase.to_string()));
        row.set("Q1", Value::Text(q1.into()));
        if let Some(q19) = q19 {
            row.set("Q19_1", Value::Text(q19.into()));
        }
        row
    }

    #[test]
    fn test_imputed_answers_keep_rows_complete() {
        let mut dataset = Dataset::with_columns(
            ["Identifier", "Progress", "Q1", "Q19_1", "prepost"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        );
        dataset.rows = vec![
            row("21SP001", Phase::Pre, "2", None),
            row("21SP001", Phase::Post, "3", Some("4")),
            row("21SP002", Phase::Pre, "3", Some("1")),
        ];

        let outcome = process(dataset, Vec::new(), &config()).unwrap();

        assert_eq!(outcome.summary.dropped.incomplete, 0);
        assert_eq!(outcome.summary.dropped.unpaired, 1);
        assert_eq!(outcome.summary.imputed_cells, 1);

        let rows = &outcome.dataset.rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Q19_1"), Some(&Value::Integer(0)));
        assert_eq!(rows[0].get("Q1"), Some(&Value::Integer(0)));
        assert_eq!(rows[1].get("Q1"), Some(&Value::Integer(1)));
        assert_eq!(rows[1].get("Q19_1"), Some(&Value::Integer(4)));
    }
}
