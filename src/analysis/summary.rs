//! Run summary: counts per cohort and per filter pass, plus knowledge scores.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::filter::DropCounts;
use crate::analysis::merge::CohortCounts;
use crate::analysis::score::{AnswerKey, total};
use crate::analysis::types::{Dataset, Phase};

/// Knowledge-check totals for one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreStats {
    pub respondents: usize,
    pub mean: f64,
    pub stddev: f64,
}

/// Written as the `--summary` JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub generated_at: DateTime<Utc>,
    pub cohorts: Vec<CohortCounts>,
    pub dropped: DropCounts,
    pub imputed_cells: usize,
    pub retained_rows: usize,
    pub retained_identifiers: usize,
    pub knowledge_scores: BTreeMap<Phase, ScoreStats>,
}

impl AnalysisSummary {
    pub fn build(
        dataset: &Dataset,
        cohorts: Vec<CohortCounts>,
        dropped: DropCounts,
        imputed_cells: usize,
        key: &AnswerKey,
        identifier_field: &str,
        phase_field: &str,
    ) -> Self {
        let identifiers: BTreeSet<&str> = dataset
            .rows
            .iter()
            .filter_map(|r| r.text(identifier_field))
            .collect();

        let mut knowledge_scores = BTreeMap::new();
        if !key.is_empty() {
            for phase in [Phase::Pre, Phase::Post] {
                let totals: Vec<f64> = dataset
                    .rows
                    .iter()
                    .filter(|r| r.phase(phase_field) == Some(phase))
                    .map(|r| total(r, key) as f64)
                    .collect();
                let avg = mean(&totals);
                knowledge_scores.insert(
                    phase,
                    ScoreStats {
                        respondents: totals.len(),
                        mean: avg,
                        stddev: stddev(&totals, avg),
                    },
                );
            }
        }

        AnalysisSummary {
            generated_at: Utc::now(),
            cohorts,
            dropped,
            imputed_cells,
            retained_rows: dataset.rows.len(),
            retained_identifiers: identifiers.len(),
            knowledge_scores,
        }
    }
}

/// Arithmetic mean; 0.0 for no values.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around `mean`; 0.0 for no values.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
