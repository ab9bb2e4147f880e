//! Row extraction: projects raw export rows onto a [`ColumnPlan`].

use csv::{StringRecord, Writer};
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::config::SchemaRules;
use crate::error::{PipelineError, Result};
use crate::output::StagedFile;
use crate::schema::{ColumnPlan, map_header};
use crate::table::{line_of, raw_reader};

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ExtractReport {
    pub columns: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
}

/// Cleans the export at `input` into a new canonical table at `output`.
///
/// Rows are streamed into a staged file that only replaces `output` once the
/// whole input converted, so a malformed row leaves no partial table behind.
///
/// # Errors
///
/// [`PipelineError::AlreadyExists`] if `output` exists,
/// [`PipelineError::SchemaMismatch`] if the header lacks a required field,
/// [`PipelineError::MalformedRow`] if any data row is too short or holds a
/// non-numeric aggregated value.
#[tracing::instrument(skip(input, output, rules), fields(input = %input.display(), output = %output.display()))]
pub fn extract(input: &Path, output: &Path, rules: &SchemaRules) -> Result<ExtractReport> {
    let mut staged = StagedFile::create(output)?;
    let source = File::open(input)?;

    let report = {
        let mut writer = Writer::from_writer(staged.file());
        let report = extract_records(source, &mut writer, rules)?;
        writer.flush()?;
        report
    };

    staged.persist()?;
    info!(
        columns = report.columns,
        rows = report.rows_written,
        "Cleaned table written"
    );
    Ok(report)
}

/// Streams a raw table from `source` into `writer`, one row at a time.
pub fn extract_records<R: Read, W: Write>(
    source: R,
    writer: &mut Writer<W>,
    rules: &SchemaRules,
) -> Result<ExtractReport> {
    let mut rdr = raw_reader(source);
    let mut records = rdr.records();

    let header = match records.next() {
        Some(header) => header?,
        None => {
            return Err(PipelineError::MalformedRow {
                line: 1,
                detail: "missing header row".to_string(),
            });
        }
    };

    let plan = map_header(&header.iter().collect::<Vec<_>>(), rules)?;
    writer.write_record(&plan.header)?;

    for skipped in 0..rules.skip_rows {
        if records.next().transpose()?.is_none() {
            return Err(PipelineError::MalformedRow {
                line: skipped as u64 + 2,
                detail: format!(
                    "expected {} non-data rows after the header",
                    rules.skip_rows
                ),
            });
        }
    }

    let mut report = ExtractReport {
        columns: plan.header.len(),
        rows_skipped: rules.skip_rows,
        ..Default::default()
    };

    for result in records {
        let record = result?;
        writer.write_record(clean_row(&record, &plan)?)?;
        report.rows_written += 1;
    }

    debug!(?report, "Extraction finished");
    Ok(report)
}

/// Projects one raw row: kept values in plan order, then one total per group.
pub fn clean_row(record: &StringRecord, plan: &ColumnPlan) -> Result<Vec<String>> {
    if let Some(max) = plan.max_index() {
        if record.len() <= max {
            return Err(PipelineError::MalformedRow {
                line: line_of(record),
                detail: format!("{} values, column {} required", record.len(), max + 1),
            });
        }
    }

    let mut values: Vec<String> = plan.keep.iter().map(|&i| record[i].to_string()).collect();

    for (group, members) in &plan.groups {
        let mut cells = members
            .iter()
            .map(|&i| {
                points(&record[i]).ok_or_else(|| PipelineError::MalformedRow {
                    line: line_of(record),
                    detail: format!("non-numeric value {:?} in group {group}", &record[i]),
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        // Summed in sorted order so the total does not depend on column order.
        cells.sort_by(f64::total_cmp);
        values.push(format_total(cells.iter().sum()));
    }

    Ok(values)
}

fn points(cell: &str) -> Option<f64> {
    if cell.is_empty() {
        return Some(0.0);
    }
    cell.trim().parse().ok()
}

/// Renders a sum the way the exports' consumers expect floats: `7.0`, `2.5`.
pub fn format_total(total: f64) -> String {
    if total.is_finite() && total.fract() == 0.0 && total.abs() < 1e16 {
        format!("{total:.1}")
    } else {
        total.to_string()
    }
}
