//! Sentinel imputation and integer coercion of coded answers.

use tracing::debug;

use crate::analysis::filter::required_fields;
use crate::analysis::types::{Dataset, Phase, Value, parse_integer};
use crate::config::AnalysisConfig;
use crate::error::{PipelineError, Result};

/// Fills missing answers of the configured question families with their
/// sentinel, e.g. an unselected option becomes 0. Returns the cells filled.
pub fn impute(dataset: &mut Dataset, config: &AnalysisConfig) -> usize {
    let targets: Vec<(&str, i64)> = dataset
        .columns
        .iter()
        .filter(|c| config.is_question(c))
        .filter_map(|c| {
            config
                .impute
                .iter()
                .find(|rule| rule.select.matches(c))
                .map(|rule| (c.as_str(), rule.value))
        })
        .collect();

    let mut filled = 0;
    for row in &mut dataset.rows {
        for &(field, sentinel) in &targets {
            if !row.has(field) {
                row.set(field, Value::Integer(sentinel));
                filled += 1;
            }
        }
    }

    debug!(fields = targets.len(), filled, "Sentinel values imputed");
    filled
}

/// Converts each phase's required, single-choice answers to integers.
///
/// Multi-select questions stay text. Phases are handled separately because
/// each one requires a different set of questions.
///
/// # Errors
///
/// Returns [`PipelineError::NotNumeric`] for a present value that is not an
/// integral number.
pub fn coerce_integers(dataset: &mut Dataset, config: &AnalysisConfig) -> Result<usize> {
    let mut coerced = 0;

    for phase in [Phase::Pre, Phase::Post] {
        let fields: Vec<String> = required_fields(&dataset.columns, config, phase)
            .into_iter()
            .filter(|f| !config.multi_select.contains(f))
            .collect();

        for row in dataset
            .rows
            .iter_mut()
            .filter(|r| r.phase(&config.phase_field) == Some(phase))
        {
            for field in &fields {
                let n = match row.get(field) {
                    Some(Value::Text(text)) => {
                        parse_integer(text).ok_or_else(|| PipelineError::NotNumeric {
                            field: field.clone(),
                            value: text.clone(),
                        })?
                    }
                    _ => continue,
                };
                row.set(field, Value::Integer(n));
                coerced += 1;
            }
        }
    }

    debug!(coerced, "Coded answers coerced to integers");
    Ok(coerced)
}
