//! Header mapping: turns a raw export header into a canonical column plan.

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::config::{PrefixRule, SchemaRules};
use crate::error::{PipelineError, Result};

/// How a single raw column is treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMapping {
    Rename(String),
    Keep(String),
    Group(String),
    Drop,
}

/// Result of mapping a header: what to keep, what to sum, and in which order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    /// Canonical names followed by the group names in sorted order.
    pub header: Vec<String>,
    /// Raw indices projected verbatim, aligned with the leading part of `header`.
    pub keep: Vec<usize>,
    pub groups: BTreeMap<String, Vec<usize>>,
    /// One entry per raw column.
    pub mappings: Vec<FieldMapping>,
}

impl ColumnPlan {
    /// Highest raw index any data row must provide.
    pub fn max_index(&self) -> Option<usize> {
        self.keep
            .iter()
            .chain(self.groups.values().flatten())
            .copied()
            .max()
    }
}

enum Claim {
    Column(String),
    Group(String),
    Unmatched,
}

impl PrefixRule {
    fn claim(&self, field: &str) -> Option<Claim> {
        match self {
            PrefixRule::Rename {
                prefix, targets, ..
            } => {
                if !field.starts_with(prefix.as_str()) {
                    return None;
                }
                let claim = targets
                    .iter()
                    .find(|t| field.starts_with(t.prefix.as_str()))
                    .map(|t| Claim::Column(t.name.clone()))
                    .unwrap_or(Claim::Unmatched);
                Some(claim)
            }
            PrefixRule::Group { prefix, group } => field
                .starts_with(prefix.as_str())
                .then(|| Claim::Group(group.clone())),
            PrefixRule::NumberedGroup { marker } => {
                let rest = field.strip_prefix(marker.as_str())?;
                let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
                if digits.is_empty() {
                    None
                } else {
                    Some(Claim::Group(format!("{marker}{digits}")))
                }
            }
            PrefixRule::KeepVerbatim {
                marker,
                except_suffix,
            } => {
                if !field.starts_with(marker.as_str()) {
                    return None;
                }
                match except_suffix {
                    Some(suffix) if field.ends_with(suffix.as_str()) => Some(Claim::Unmatched),
                    _ => Some(Claim::Column(field.to_string())),
                }
            }
        }
    }

    fn required_names(&self) -> Vec<&str> {
        match self {
            PrefixRule::Rename {
                targets,
                required: true,
                ..
            } => targets.iter().map(|t| t.name.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Maps `header` according to `rules`.
///
/// Exact renames are tried first, then the prefix rules in priority order;
/// anything unclaimed is dropped. The cleaned header lists exact renames, then
/// each prefix rule's columns, each class in raw column order, and finally
/// every aggregation group in sorted order.
///
/// # Errors
///
/// Returns [`PipelineError::SchemaMismatch`] naming every required canonical
/// field or declared group that did not end up in the plan, and
/// [`PipelineError::Config`] if a group shares its name with a kept column.
pub fn map_header<S: AsRef<str>>(header: &[S], rules: &SchemaRules) -> Result<ColumnPlan> {
    // Slot 0 holds exact renames, slot n + 1 holds prefix rule n.
    let mut classes: Vec<Vec<(String, usize)>> = vec![Vec::new(); rules.prefix_rules.len() + 1];
    let mut groups: BTreeMap<String, Vec<usize>> = rules
        .groups
        .iter()
        .map(|g| (g.clone(), Vec::new()))
        .collect();
    let mut mappings = Vec::with_capacity(header.len());

    for (i, field) in header.iter().enumerate() {
        let field = field.as_ref();

        if let Some(name) = rules.renames.get(field) {
            classes[0].push((name.clone(), i));
            mappings.push(FieldMapping::Rename(name.clone()));
            continue;
        }

        let claimed = rules
            .prefix_rules
            .iter()
            .enumerate()
            .find_map(|(slot, rule)| rule.claim(field).map(|claim| (slot, rule, claim)));

        let mapping = match claimed {
            Some((slot, rule, Claim::Column(name))) => {
                classes[slot + 1].push((name.clone(), i));
                if matches!(rule, PrefixRule::KeepVerbatim { .. }) {
                    FieldMapping::Keep(name)
                } else {
                    FieldMapping::Rename(name)
                }
            }
            Some((_, _, Claim::Group(group))) => {
                groups.entry(group.clone()).or_default().push(i);
                FieldMapping::Group(group)
            }
            Some((_, _, Claim::Unmatched)) | None => FieldMapping::Drop,
        };
        mappings.push(mapping);
    }

    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();
    let mut keep = Vec::new();

    for (name, index) in classes.into_iter().flatten() {
        if !seen.insert(name.clone()) {
            warn!(
                field = %header[index].as_ref(),
                canonical = %name,
                index,
                "Duplicate canonical column dropped"
            );
            mappings[index] = FieldMapping::Drop;
            continue;
        }
        cleaned.push(name);
        keep.push(index);
    }

    let mut missing: Vec<String> = rules
        .renames
        .values()
        .map(String::as_str)
        .chain(rules.prefix_rules.iter().flat_map(PrefixRule::required_names))
        .filter(|name| !seen.contains(*name))
        .map(str::to_string)
        .collect();
    missing.sort();
    missing.dedup();
    missing.extend(
        groups
            .iter()
            .filter(|(_, members)| members.is_empty())
            .map(|(group, _)| group.clone()),
    );

    if !missing.is_empty() {
        return Err(PipelineError::SchemaMismatch { missing });
    }

    let clashing: Vec<&str> = groups
        .keys()
        .map(String::as_str)
        .filter(|group| seen.contains(*group))
        .collect();
    if !clashing.is_empty() {
        return Err(PipelineError::Config(format!(
            "aggregation groups also used as column names: {}",
            clashing.join(", ")
        )));
    }

    cleaned.extend(groups.keys().cloned());

    debug!(
        raw_columns = header.len(),
        kept = keep.len(),
        groups = groups.len(),
        "Header mapped"
    );

    Ok(ColumnPlan {
        header: cleaned,
        keep,
        groups,
        mappings,
    })
}
