//! Rule sets and analysis settings.
//!
//! Both the cleaning rules ([`SchemaRules`]) and the merge/filter/score
//! settings ([`AnalysisConfig`]) are plain serde structs stored as JSON on
//! disk. The two cleaning pipelines also have built-in defaults matching the
//! survey-platform and gradebook export layouts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::analysis::score::AnswerKey;
use crate::error::{PipelineError, Result};

/// Header mapping rules for one source format.
///
/// ```json
/// {
///   "renames": { "StartDate": "Submission Start" },
///   "prefix_rules": [
///     { "kind": "numbered_group", "marker": "M" },
///     { "kind": "keep_verbatim", "marker": "Q", "except_suffix": "_TEXT" }
///   ],
///   "groups": ["M1"],
///   "skip_rows": 2
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRules {
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    /// Evaluated in list order; the first matching rule claims the column.
    #[serde(default)]
    pub prefix_rules: Vec<PrefixRule>,
    /// Aggregation groups that must receive at least one member column.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Non-data rows between the header and the first data row.
    pub skip_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrefixRule {
    /// Columns starting with `prefix` take the name of the first target whose
    /// own prefix also matches. No matching target drops the column.
    Rename {
        prefix: String,
        targets: Vec<RenameTarget>,
        #[serde(default = "default_true")]
        required: bool,
    },
    /// Columns starting with `prefix` are summed into `group`.
    Group { prefix: String, group: String },
    /// `marker` followed by digits, e.g. `M3Quiz`, is summed into `M3`.
    NumberedGroup { marker: String },
    /// Columns starting with `marker` are kept under their raw name.
    KeepVerbatim {
        marker: String,
        #[serde(default)]
        except_suffix: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameTarget {
    pub prefix: String,
    pub name: String,
}

fn default_true() -> bool {
    true
}

impl SchemaRules {
    /// Loads rules from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let rules: SchemaRules = serde_json::from_str(&content)?;
        Ok(rules)
    }

    /// Survey-platform export: two prompt/metadata rows follow the header.
    pub fn survey() -> Self {
        let renames = [
            ("StartDate", "Submission Start"),
            ("EndDate", "Submission End"),
            ("Progress", "Progress"),
            ("Finished", "Finished"),
            ("RecipientLastName", "Last Name"),
            ("RecipientFirstName", "First Name"),
            ("RecipientEmail", "Email"),
        ];

        SchemaRules {
            renames: pairs(&renames),
            prefix_rules: vec![PrefixRule::KeepVerbatim {
                marker: "Q".to_string(),
                except_suffix: Some("_TEXT".to_string()),
            }],
            groups: Vec::new(),
            skip_rows: 2,
        }
    }

    /// Gradebook export: a single points-possible row follows the header.
    pub fn gradebook() -> Self {
        let renames = [
            ("Student", "Full Name"),
            ("SIS Login ID", "GT Account"),
            ("Section", "Section"),
        ];

        let deliverables = (1..=5)
            .map(|i| RenameTarget {
                prefix: format!("Deliverable {i}"),
                name: format!("D{i}"),
            })
            .collect();

        let meetings = (1..=8)
            .map(|i| RenameTarget {
                prefix: format!("Group Meeting - Week {i} Attendance"),
                name: format!("GM{i}"),
            })
            .collect();

        let mut groups: Vec<String> = (1..=8).map(|i| format!("M{i}")).collect();
        groups.push("Workshops".to_string());

        SchemaRules {
            renames: pairs(&renames),
            prefix_rules: vec![
                PrefixRule::Rename {
                    prefix: "Deliverable".to_string(),
                    targets: deliverables,
                    required: true,
                },
                PrefixRule::Rename {
                    prefix: "Group Meeting".to_string(),
                    targets: meetings,
                    required: true,
                },
                PrefixRule::Group {
                    prefix: "Extract Workshop".to_string(),
                    group: "Workshops".to_string(),
                },
                PrefixRule::NumberedGroup {
                    marker: "M".to_string(),
                },
                single_rename("Pre-Course Assessment", "PreSurvey"),
                single_rename("Post-Course Assessment", "PostSurvey"),
            ],
            groups,
            skip_rows: 1,
        }
    }
}

fn pairs(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
        .collect()
}

fn single_rename(prefix: &str, name: &str) -> PrefixRule {
    PrefixRule::Rename {
        prefix: prefix.to_string(),
        targets: vec![RenameTarget {
            prefix: prefix.to_string(),
            name: name.to_string(),
        }],
        required: false,
    }
}

/// File name templates for one cohort; `{cohort}` is replaced by the cohort id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortFiles {
    pub roster: String,
    pub pre: String,
    pub post: String,
}

impl Default for CohortFiles {
    fn default() -> Self {
        CohortFiles {
            roster: "prepost_{cohort}_roster.csv".to_string(),
            pre: "prepost_{cohort}_predata.csv".to_string(),
            post: "prepost_{cohort}_postdata.csv".to_string(),
        }
    }
}

impl CohortFiles {
    pub fn resolve(template: &str, cohort: &str) -> String {
        template.replace("{cohort}", cohort)
    }
}

/// A known-corrupt value: rows holding exactly `value` in `field` are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenyEntry {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSelector {
    Exact(String),
    Prefix(String),
}

impl FieldSelector {
    pub fn matches(&self, field: &str) -> bool {
        match self {
            FieldSelector::Exact(name) => field == name,
            FieldSelector::Prefix(prefix) => field.starts_with(prefix.as_str()),
        }
    }
}

/// Sentinel written into a missing answer, e.g. "option not selected" → 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputeRule {
    pub select: FieldSelector,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question: String,
    pub answer: i64,
}

/// Settings for the merge, filter, normalize and score stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Cohort ids in analysis order.
    pub cohorts: Vec<String>,
    #[serde(default)]
    pub files: CohortFiles,
    #[serde(default = "default_identifier_field")]
    pub identifier_field: String,
    /// Roster attributes carried into the merged dataset, besides the identifier.
    #[serde(default = "default_roster_fields")]
    pub roster_fields: Vec<String>,
    #[serde(default = "default_cohort_field")]
    pub cohort_field: String,
    #[serde(default = "default_cohort_prefix_len")]
    pub cohort_prefix_len: usize,
    #[serde(default = "default_phase_field")]
    pub phase_field: String,
    #[serde(default = "default_progress_field")]
    pub progress_field: String,
    #[serde(default = "default_question_marker")]
    pub question_marker: String,
    #[serde(default)]
    pub denylist: Vec<DenyEntry>,
    /// Questions never required; matched by exact name or by base name.
    #[serde(default)]
    pub non_required: Vec<String>,
    #[serde(default)]
    pub pre_only: Vec<String>,
    #[serde(default)]
    pub post_only: Vec<String>,
    /// Free-form multi-select answers kept as text.
    #[serde(default)]
    pub multi_select: Vec<String>,
    #[serde(default)]
    pub impute: Vec<ImputeRule>,
    #[serde(default)]
    pub answer_key: Vec<AnswerEntry>,
}

fn default_identifier_field() -> String {
    "Identifier".to_string()
}

fn default_roster_fields() -> Vec<String> {
    ["Degree Type", "College", "Student Status", "Gender"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cohort_field() -> String {
    "Semester".to_string()
}

fn default_cohort_prefix_len() -> usize {
    4
}

fn default_phase_field() -> String {
    "prepost".to_string()
}

fn default_progress_field() -> String {
    "Progress".to_string()
}

fn default_question_marker() -> String {
    "Q".to_string()
}

impl AnalysisConfig {
    /// Loads and validates the configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cohorts.is_empty() {
            return Err(PipelineError::Config("no cohorts listed".to_string()));
        }
        if self.cohort_prefix_len == 0 {
            return Err(PipelineError::Config(
                "cohort_prefix_len must be at least 1".to_string(),
            ));
        }
        if self.question_marker.is_empty() {
            return Err(PipelineError::Config(
                "question_marker must not be empty".to_string(),
            ));
        }
        self.answers()?;
        Ok(())
    }

    /// Builds the answer key, rejecting duplicate question ids.
    pub fn answers(&self) -> Result<AnswerKey> {
        AnswerKey::from_entries(&self.answer_key)
    }

    pub fn is_question(&self, field: &str) -> bool {
        field.starts_with(self.question_marker.as_str())
    }
}
