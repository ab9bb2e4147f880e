//! CSV readers for raw exports and name-keyed response tables.

use csv::{Reader, ReaderBuilder, StringRecord};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::analysis::types::{Dataset, Record, Value};
use crate::error::{PipelineError, Result};

/// Wraps a raw export for positional, row-by-row reading.
///
/// The header is not consumed and rows may differ in width, so short rows
/// surface to the extractor instead of failing inside the CSV reader.
pub fn raw_reader<R: Read>(source: R) -> Reader<R> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source)
}

/// Reads a cleaned table into a [`Dataset`]. Empty cells load as missing.
pub fn read_keyed(path: &Path) -> Result<Dataset> {
    let file = File::open(path)?;
    read_keyed_from(file)
}

pub fn read_keyed_from<R: Read>(source: R) -> Result<Dataset> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut seen = HashSet::new();
    if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
        return Err(PipelineError::MalformedRow {
            line: 1,
            detail: format!("duplicate column {dup:?}"),
        });
    }

    let mut dataset = Dataset::with_columns(columns);
    for result in rdr.records() {
        let record = result?;
        let row = keyed_row(&dataset.columns, &record)?;
        dataset.rows.push(row);
    }

    Ok(dataset)
}

fn keyed_row(columns: &[String], record: &StringRecord) -> Result<Record> {
    if record.len() > columns.len() {
        return Err(PipelineError::MalformedRow {
            line: line_of(record),
            detail: format!("{} values for {} columns", record.len(), columns.len()),
        });
    }

    let mut row = Record::default();
    for (name, value) in columns.iter().zip(record.iter()) {
        if !value.is_empty() {
            row.set(name, Value::Text(value.to_string()));
        }
    }
    Ok(row)
}

/// 1-based line of `record` in its source, or 0 when unknown.
pub fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}
