//! Row-removal passes over the merged dataset.
//!
//! Each pass computes the set of row indices to drop and removes them; no
//! pass rewrites a value. Later passes see only the rows earlier passes kept,
//! so [`QualityFilter::apply`] runs them in a fixed order.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use crate::analysis::types::{Dataset, Phase, Value};
use crate::config::AnalysisConfig;

/// Rows removed by each pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub partial: usize,
    pub denylisted: usize,
    pub incomplete: usize,
    pub unpaired: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.partial + self.denylisted + self.incomplete + self.unpaired
    }
}

pub struct QualityFilter<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> QualityFilter<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Runs all four passes in order.
    ///
    /// `before_completeness` sees the dataset after the partial and denylist
    /// passes and may fill in values before completeness is judged.
    pub fn apply<F>(&self, dataset: &mut Dataset, before_completeness: F) -> DropCounts
    where
        F: FnOnce(&mut Dataset),
    {
        let partial = self.drop_partial(dataset);
        let denylisted = self.drop_denylisted(dataset);
        before_completeness(dataset);
        let counts = DropCounts {
            partial,
            denylisted,
            incomplete: self.drop_incomplete(dataset),
            unpaired: self.drop_unpaired(dataset),
        };
        info!(?counts, remaining = dataset.rows.len(), "Quality filter applied");
        counts
    }

    /// Drops partial submissions: progress missing or not 100.
    pub fn drop_partial(&self, dataset: &mut Dataset) -> usize {
        let field = self.config.progress_field.as_str();
        let partial = dataset.select(|row| {
            let progress = match row.get(field) {
                Some(Value::Integer(n)) => Some(*n as f64),
                Some(Value::Text(s)) => s.trim().parse::<f64>().ok(),
                None => None,
            };
            progress != Some(100.0)
        });
        let dropped = dataset.drop_rows(&partial);
        debug!(dropped, "Partial submissions removed");
        dropped
    }

    /// Drops rows holding a known-corrupt value.
    pub fn drop_denylisted(&self, dataset: &mut Dataset) -> usize {
        let denylist = &self.config.denylist;
        let corrupt = dataset.select(|row| {
            denylist
                .iter()
                .any(|entry| row.text(&entry.field) == Some(entry.value.as_str()))
        });
        let dropped = dataset.drop_rows(&corrupt);
        debug!(dropped, "Denylisted rows removed");
        dropped
    }

    /// Drops rows missing an answer to any question required in their phase.
    pub fn drop_incomplete(&self, dataset: &mut Dataset) -> usize {
        let phase_field = self.config.phase_field.as_str();
        let pre = required_fields(&dataset.columns, self.config, Phase::Pre);
        let post = required_fields(&dataset.columns, self.config, Phase::Post);

        let incomplete = dataset.select(|row| {
            let required = match row.phase(phase_field) {
                Some(Phase::Pre) => &pre,
                Some(Phase::Post) => &post,
                None => return false,
            };
            required.iter().any(|field| !row.has(field))
        });
        let dropped = dataset.drop_rows(&incomplete);
        debug!(dropped, "Incomplete submissions removed");
        dropped
    }

    /// Drops every row of an identifier lacking either a pre or a post row.
    pub fn drop_unpaired(&self, dataset: &mut Dataset) -> usize {
        let id_field = self.config.identifier_field.as_str();
        let phase_field = self.config.phase_field.as_str();

        let mut phases: HashMap<&str, BTreeSet<Phase>> = HashMap::new();
        for row in &dataset.rows {
            if let (Some(id), Some(phase)) = (row.text(id_field), row.phase(phase_field)) {
                phases.entry(id).or_default().insert(phase);
            }
        }

        let paired: BTreeSet<String> = phases
            .into_iter()
            .filter(|(_, seen)| seen.contains(&Phase::Pre) && seen.contains(&Phase::Post))
            .map(|(id, _)| id.to_string())
            .collect();

        let unpaired = dataset.select(|row| {
            row.text(id_field).is_none_or(|id| !paired.contains(id))
        });
        let dropped = dataset.drop_rows(&unpaired);
        debug!(dropped, "Unpaired submissions removed");
        dropped
    }
}

/// Questions that every `phase` row must answer.
///
/// Starts from all question columns and removes the configured non-required
/// questions and those asked only in the opposite phase. Exclusions match by
/// exact name or by base name, the part before the first `_`.
pub fn required_fields(columns: &[String], config: &AnalysisConfig, phase: Phase) -> Vec<String> {
    let other_phase_only = match phase {
        Phase::Pre => &config.post_only,
        Phase::Post => &config.pre_only,
    };

    columns
        .iter()
        .filter(|c| config.is_question(c))
        .filter(|c| {
            let base = c.split('_').next().unwrap_or(c.as_str());
            let listed = |list: &[String]| list.iter().any(|q| q == base);
            !listed(other_phase_only.as_slice())
                && !listed(config.non_required.as_slice())
                && !config.non_required.iter().any(|q| q == *c)
        })
        .cloned()
        .collect()
}
