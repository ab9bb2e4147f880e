//! Answer-key scoring for knowledge-check questions.

use std::collections::BTreeMap;
use tracing::debug;

use crate::analysis::types::{Dataset, Record, Value};
use crate::config::AnswerEntry;
use crate::error::{PipelineError, Result};

/// Question id → the single correct coded answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerKey {
    answers: BTreeMap<String, i64>,
}

impl AnswerKey {
    /// Builds a key from configured entries.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if a question id appears twice.
    pub fn from_entries(entries: &[AnswerEntry]) -> Result<Self> {
        let mut answers = BTreeMap::new();
        for entry in entries {
            if answers.insert(entry.question.clone(), entry.answer).is_some() {
                return Err(PipelineError::Config(format!(
                    "answer key lists {} more than once",
                    entry.question
                )));
            }
        }
        Ok(Self { answers })
    }

    pub fn questions(&self) -> impl Iterator<Item = &str> {
        self.answers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.answers.iter().map(|(q, a)| (q.as_str(), *a))
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

/// 1 if `value` matches `answer`, else 0. A missing answer is incorrect.
pub fn grade(value: Option<&Value>, answer: i64) -> i64 {
    match value.and_then(Value::as_integer) {
        Some(given) if given == answer => 1,
        _ => 0,
    }
}

/// Replaces every keyed question's answer with its correctness score.
///
/// # Errors
///
/// Returns [`PipelineError::SchemaMismatch`] if a keyed question is not a
/// column of `dataset`.
pub fn score(dataset: &mut Dataset, key: &AnswerKey) -> Result<usize> {
    let missing: Vec<&str> = key.questions().filter(|q| !dataset.has_column(q)).collect();
    if !missing.is_empty() {
        return Err(PipelineError::schema_mismatch(missing));
    }

    for row in &mut dataset.rows {
        for (question, answer) in key.iter() {
            let scored = grade(row.get(question), answer);
            row.set(question, Value::Integer(scored));
        }
    }

    debug!(questions = key.len(), rows = dataset.rows.len(), "Answers scored");
    Ok(dataset.rows.len() * key.len())
}

/// Sum of the scored knowledge questions of one row.
pub fn total(row: &Record, key: &AnswerKey) -> i64 {
    key.questions()
        .filter_map(|q| row.get(q).and_then(Value::as_integer))
        .sum()
}
