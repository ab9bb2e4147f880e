use prepost_cleaner::analysis;
use prepost_cleaner::analysis::types::{Phase, Value};
use prepost_cleaner::config::{AnalysisConfig, SchemaRules};
use prepost_cleaner::error::PipelineError;
use prepost_cleaner::extract::extract;
use prepost_cleaner::output::write_dataset;
use std::fs;
use std::path::Path;

const SURVEY_EXPORT: &str = "\
StartDate,EndDate,Status,Progress,Finished,RecipientLastName,RecipientFirstName,RecipientEmail,Q1,Q2,Q2_TEXT,Q19_1
Start Date,End Date,Response Type,Progress,Finished,Last Name,First Name,Email,Pick one,Pick one,Other,Rate
{\"ImportId\":\"startDate\"},{\"ImportId\":\"endDate\"},{},{},{},{},{},{},{},{},{},{}
2024-01-01,2024-01-02,IP Address,100,True,Doe,Jane,jane@example.edu,3,2,,4
2024-01-03,2024-01-04,IP Address,55,False,Roe,Rick,rick@example.edu,1,,,
";

fn gradebook_export() -> String {
    let mut header = vec![
        "Student".to_string(),
        "ID".to_string(),
        "SIS Login ID".to_string(),
        "Section".to_string(),
    ];
    for i in 1..=5 {
        header.push(format!("Deliverable {i} (1234)"));
    }
    for i in 1..=8 {
        header.push(format!("Group Meeting - Week {i} Attendance (99)"));
        header.push(format!("M{i} Quiz (10)"));
        header.push(format!("M{i} Reflection (5)"));
    }
    header.push("Extract Workshop: Resumes (2)".to_string());

    let points: Vec<String> = header.iter().map(|_| "10".to_string()).collect();

    let mut row = vec![
        "Doe, Jane".to_string(),
        "42".to_string(),
        "jdoe3".to_string(),
        "A".to_string(),
    ];
    row.extend((1..=5).map(|i| i.to_string()));
    for i in 1..=8 {
        row.push("1".to_string());
        row.push(format!("{i}"));
        row.push(if i == 8 { String::new() } else { "0.5".to_string() });
    }
    row.push("2".to_string());

    [header, points, row]
        .iter()
        .map(|r| {
            r.iter()
                .map(|v| if v.contains(',') { format!("\"{v}\"") } else { v.clone() })
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

#[test]
fn test_clean_survey_export() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.csv");
    let output = dir.path().join("clean.csv");
    fs::write(&input, SURVEY_EXPORT).unwrap();

    let report = extract(&input, &output, &SchemaRules::survey()).unwrap();

    assert_eq!(report.rows_written, 2);
    let content = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines[0],
        "Submission Start,Submission End,Progress,Finished,Last Name,First Name,Email,Q1,Q2,Q19_1"
    );
    assert_eq!(lines[1], "2024-01-01,2024-01-02,100,True,Doe,Jane,jane@example.edu,3,2,4");
}

#[test]
fn test_clean_gradebook_export() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("gradebook.csv");
    let output = dir.path().join("clean.csv");
    fs::write(&input, gradebook_export()).unwrap();

    let report = extract(&input, &output, &SchemaRules::gradebook()).unwrap();
    assert_eq!(report.rows_written, 1);

    let mut rdr = csv::Reader::from_path(&output).unwrap();
    let header: Vec<String> = rdr.headers().unwrap().iter().map(str::to_string).collect();
    let row = rdr.records().next().unwrap().unwrap();
    let value = |name: &str| {
        let i = header.iter().position(|h| h == name).unwrap();
        row[i].to_string()
    };

    assert_eq!(header.last().map(String::as_str), Some("Workshops"));
    assert_eq!(value("Full Name"), "Doe, Jane");
    assert_eq!(value("D3"), "3");
    assert_eq!(value("M1"), "1.5");
    assert_eq!(value("M8"), "8.0");
    assert_eq!(value("Workshops"), "2.0");
}

#[test]
fn test_extract_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.csv");
    fs::write(&input, SURVEY_EXPORT).unwrap();

    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");
    extract(&input, &first, &SchemaRules::survey()).unwrap();
    extract(&input, &second, &SchemaRules::survey()).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_extract_refuses_existing_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.csv");
    let output = dir.path().join("clean.csv");
    fs::write(&input, SURVEY_EXPORT).unwrap();
    fs::write(&output, "previous run").unwrap();

    let result = extract(&input, &output, &SchemaRules::survey());

    assert!(matches!(result, Err(PipelineError::AlreadyExists { .. })));
    assert_eq!(fs::read_to_string(&output).unwrap(), "previous run");
}

#[test]
fn test_malformed_row_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.csv");
    let output = dir.path().join("clean.csv");
    let truncated = format!("{SURVEY_EXPORT}2024-02-01,2024-02-02,IP Address,100\n");
    fs::write(&input, truncated).unwrap();

    let result = extract(&input, &output, &SchemaRules::survey());

    assert!(matches!(
        result,
        Err(PipelineError::MalformedRow { line: 6, .. })
    ));
    assert!(!output.exists());
}

#[test]
fn test_schema_mismatch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.csv");
    let output = dir.path().join("clean.csv");
    fs::write(&input, "StartDate,Q1\nprompt,prompt\n{},{}\n2024-01-01,3\n").unwrap();

    let result = extract(&input, &output, &SchemaRules::survey());

    assert!(matches!(result, Err(PipelineError::SchemaMismatch { .. })));
    assert!(!output.exists());
}

fn write_cohort(dir: &Path, cohort: &str, roster: &[&str], pre: &[&str], post: &[&str]) {
    let roster_rows: String = roster
        .iter()
        .map(|id| format!("{id},MS,Computing,Domestic,F\n"))
        .collect();
    fs::write(
        dir.join(format!("prepost_{cohort}_roster.csv")),
        format!("Identifier,Degree Type,College,Student Status,Gender\n{roster_rows}"),
    )
    .unwrap();

    let responses = |ids: &[&str], extra: &str| -> String {
        ids.iter()
            .map(|id| format!("{id},100,3,{extra}\n"))
            .collect()
    };
    fs::write(
        dir.join(format!("prepost_{cohort}_predata.csv")),
        format!("Identifier,Progress,Q1,Q19_1\n{}", responses(pre, "")),
    )
    .unwrap();
    fs::write(
        dir.join(format!("prepost_{cohort}_postdata.csv")),
        format!("Identifier,Progress,Q1,Q26\n{}", responses(post, "5")),
    )
    .unwrap();
}

fn analysis_config() -> AnalysisConfig {
    AnalysisConfig::from_json(
        r#"{
            "cohorts": ["21sp", "21fa"],
            "post_only": ["Q26"],
            "impute": [{ "select": { "prefix": "Q19_" }, "value": 0 }],
            "answer_key": [{ "question": "Q1", "answer": 3 }]
        }"#,
    )
    .unwrap()
}

#[test]
fn test_merge_and_pair_cohorts() {
    let dir = tempfile::tempdir().unwrap();
    write_cohort(dir.path(), "21sp", &["21SP001"], &["21SP001", "21SP002"], &["21SP001"]);
    write_cohort(dir.path(), "21fa", &["21FA001"], &["21FA001"], &["21FA001"]);

    let config = analysis_config();
    let (merged, counts) = analysis::merge::load_all(dir.path(), &config).unwrap();

    assert_eq!(counts[0].pre_rows, 2);
    assert_eq!(counts[0].post_rows, 1);
    assert_eq!(merged.count_phase("prepost", Phase::Pre), 3);
    assert_eq!(merged.count_phase("prepost", Phase::Post), 2);

    let outcome = analysis::process(merged, counts, &config).unwrap();
    let ids: Vec<&str> = outcome
        .dataset
        .rows
        .iter()
        .map(|r| r.text("Identifier").unwrap())
        .collect();

    assert_eq!(ids, vec!["21SP001", "21SP001", "21FA001", "21FA001"]);
    assert_eq!(outcome.summary.dropped.unpaired, 1);
    assert!(
        outcome
            .dataset
            .rows
            .iter()
            .all(|r| r.get("Q1") == Some(&Value::Integer(1)))
    );
    assert_eq!(outcome.dataset.rows[2].text("Semester"), Some("21FA"));
}

#[test]
fn test_analysis_run_writes_dataset() {
    let dir = tempfile::tempdir().unwrap();
    write_cohort(dir.path(), "21sp", &["21SP001"], &["21SP001"], &["21SP001"]);
    write_cohort(dir.path(), "21fa", &[], &["21FA001"], &["21FA001"]);

    let outcome = analysis::run(dir.path(), &analysis_config()).unwrap();
    let output = dir.path().join("scored.csv");
    write_dataset(&output, &outcome.dataset).unwrap();

    let content = fs::read_to_string(&output).unwrap();
    let mut lines = content.lines();
    assert_eq!(
        lines.next(),
        Some("Identifier,Degree Type,College,Student Status,Gender,Semester,Progress,Q1,Q19_1,prepost,Q26")
    );
    assert_eq!(
        lines.next(),
        Some("21SP001,MS,Computing,Domestic,F,21SP,100,1,0,pre,")
    );
    assert_eq!(lines.nth(1), Some("21FA001,,,,,,100,1,0,pre,"));
}
