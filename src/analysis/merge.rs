//! Cohort loading and the roster/response join.

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::analysis::types::{Dataset, Phase, Value};
use crate::config::{AnalysisConfig, CohortFiles};
use crate::error::{PipelineError, Result};
use crate::table::read_keyed;

/// The three tables making up one cohort.
#[derive(Debug, Clone)]
pub struct CohortTables {
    pub cohort: String,
    pub roster: Dataset,
    pub pre: Dataset,
    pub post: Dataset,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortCounts {
    pub cohort: String,
    pub roster_rows: usize,
    pub pre_rows: usize,
    pub post_rows: usize,
    /// Response rows dropped for lacking an identifier.
    pub missing_identifier: usize,
    /// Response rows with no roster entry.
    pub unmatched: usize,
}

/// Reads a cohort's roster, pre and post tables from `data_dir`.
pub fn load_cohort(
    data_dir: &Path,
    cohort: &str,
    config: &AnalysisConfig,
) -> Result<CohortTables> {
    let path = |template: &str| data_dir.join(CohortFiles::resolve(template, cohort));

    let roster = read_keyed(&path(&config.files.roster))?;
    let pre = read_keyed(&path(&config.files.pre))?;
    let post = read_keyed(&path(&config.files.post))?;

    debug!(
        cohort,
        roster = roster.rows.len(),
        pre = pre.rows.len(),
        post = post.rows.len(),
        "Cohort tables loaded"
    );

    Ok(CohortTables {
        cohort: cohort.to_string(),
        roster,
        pre,
        post,
    })
}

/// Loads and merges every configured cohort, in configuration order.
#[tracing::instrument(skip(data_dir, config), fields(data_dir = %data_dir.display()))]
pub fn load_all(data_dir: &Path, config: &AnalysisConfig) -> Result<(Dataset, Vec<CohortCounts>)> {
    let mut merged = Dataset::default();
    let mut counts = Vec::with_capacity(config.cohorts.len());

    for cohort in &config.cohorts {
        let tables = load_cohort(data_dir, cohort, config)?;
        let (dataset, cohort_counts) = merge_cohort(tables, config)?;
        merged.append(dataset);
        counts.push(cohort_counts);
    }

    info!(
        cohorts = counts.len(),
        rows = merged.rows.len(),
        columns = merged.columns.len(),
        "Cohorts merged"
    );
    Ok((merged, counts))
}

/// Tags and joins one cohort.
///
/// Pre rows precede post rows, each phase in file order. Every response row
/// survives the join; roster attributes are only attached where the
/// identifier matches, and roster rows without responses are discarded.
pub fn merge_cohort(
    tables: CohortTables,
    config: &AnalysisConfig,
) -> Result<(Dataset, CohortCounts)> {
    let id_field = config.identifier_field.as_str();
    let roster = index_roster(&tables.roster, config)?;

    let mut counts = CohortCounts {
        cohort: tables.cohort.clone(),
        roster_rows: roster.len(),
        ..Default::default()
    };

    let mut columns = vec![id_field.to_string()];
    columns.extend(config.roster_fields.iter().cloned());
    columns.push(config.cohort_field.clone());
    let mut merged = Dataset::with_columns(columns);

    for (phase, responses) in [(Phase::Pre, tables.pre), (Phase::Post, tables.post)] {
        if !responses.has_column(id_field) {
            return Err(PipelineError::schema_mismatch([id_field]));
        }

        for column in &responses.columns {
            merged.add_column(column);
        }
        merged.add_column(&config.phase_field);

        for mut row in responses.rows {
            let id = row.text(id_field).filter(|id| !id.trim().is_empty());
            let Some(id) = id.map(str::to_string) else {
                counts.missing_identifier += 1;
                continue;
            };

            match roster.get(id.as_str()) {
                Some(attributes) => {
                    for (field, value) in attributes {
                        row.set(field, value.clone());
                    }
                }
                None => counts.unmatched += 1,
            }

            row.set(&config.phase_field, Value::Text(phase.as_str().to_string()));
            merged.rows.push(row);

            match phase {
                Phase::Pre => counts.pre_rows += 1,
                Phase::Post => counts.post_rows += 1,
            }
        }
    }

    if counts.missing_identifier > 0 {
        warn!(
            cohort = %counts.cohort,
            dropped = counts.missing_identifier,
            "Response rows without identifier dropped"
        );
    }
    debug!(?counts, "Cohort merged");

    Ok((merged, counts))
}

/// Roster attributes per identifier, cohort tag included.
fn index_roster(
    roster: &Dataset,
    config: &AnalysisConfig,
) -> Result<HashMap<String, Vec<(String, Value)>>> {
    let id_field = config.identifier_field.as_str();

    let missing: Vec<&str> = std::iter::once(id_field)
        .chain(config.roster_fields.iter().map(String::as_str))
        .filter(|f| !roster.has_column(f))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::schema_mismatch(missing));
    }

    let mut index = HashMap::with_capacity(roster.rows.len());
    for (i, row) in roster.rows.iter().enumerate() {
        let Some(id) = row.text(id_field) else {
            continue;
        };

        let mut attributes: Vec<(String, Value)> = config
            .roster_fields
            .iter()
            .filter_map(|f| row.get(f).map(|v| (f.clone(), v.clone())))
            .collect();
        attributes.push((
            config.cohort_field.clone(),
            Value::Text(cohort_tag(id, config.cohort_prefix_len)),
        ));

        if index.insert(id.to_string(), attributes).is_some() {
            return Err(PipelineError::MalformedRow {
                line: i as u64 + 2,
                detail: format!("roster lists identifier {id} more than once"),
            });
        }
    }

    Ok(index)
}

/// The first `len` characters of `identifier`.
pub fn cohort_tag(identifier: &str, len: usize) -> String {
    identifier.chars().take(len).collect()
}
