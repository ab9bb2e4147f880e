//! CLI entry point for the pre/post survey cleaner.
//!
//! Provides subcommands for cleaning gradebook and survey-platform exports
//! into canonical tables, and for merging, filtering and scoring cleaned
//! multi-cohort survey data.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prepost_cleaner::analysis;
use prepost_cleaner::config::{AnalysisConfig, SchemaRules};
use prepost_cleaner::extract::extract;
use prepost_cleaner::output::{ensure_absent, write_dataset, write_json};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "prepost_cleaner")]
#[command(about = "Clean course exports and score pre/post survey cohorts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a gradebook export into per-student totals
    CleanGradebook {
        /// Raw gradebook CSV
        input: PathBuf,

        /// Cleaned CSV to create (must not exist)
        output: PathBuf,

        /// JSON rule file replacing the built-in gradebook rules
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Clean a survey-platform export into canonical columns
    CleanSurvey {
        /// Raw survey CSV
        input: PathBuf,

        /// Cleaned CSV to create (must not exist)
        output: PathBuf,

        /// JSON rule file replacing the built-in survey rules
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Merge cleaned cohort tables, filter, score and write the result
    Analyze {
        /// JSON analysis configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Directory holding the per-cohort roster, pre and post tables
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Scored CSV to create (must not exist)
        output: PathBuf,

        /// Optional JSON summary to create alongside the CSV
        #[arg(long)]
        summary: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/prepost_cleaner.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("prepost_cleaner.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::CleanGradebook {
            input,
            output,
            rules,
        } => {
            let rules = load_rules(rules.as_deref(), SchemaRules::gradebook)?;
            extract(&input, &output, &rules)
                .with_context(|| format!("cleaning gradebook {}", input.display()))?;
        }
        Commands::CleanSurvey {
            input,
            output,
            rules,
        } => {
            let rules = load_rules(rules.as_deref(), SchemaRules::survey)?;
            extract(&input, &output, &rules)
                .with_context(|| format!("cleaning survey {}", input.display()))?;
        }
        Commands::Analyze {
            config,
            data_dir,
            output,
            summary,
        } => {
            let config = AnalysisConfig::load(&config)
                .with_context(|| format!("loading configuration {}", config.display()))?;

            // Fail before any work if either destination is taken.
            ensure_absent(&output)?;
            if let Some(summary_path) = &summary {
                ensure_absent(summary_path)?;
            }

            let outcome = analysis::run(&data_dir, &config)?;
            write_dataset(&output, &outcome.dataset)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(
                path = %output.display(),
                rows = outcome.dataset.rows.len(),
                "Scored dataset written"
            );

            if let Some(summary_path) = summary {
                write_json(&summary_path, &outcome.summary)
                    .with_context(|| format!("writing {}", summary_path.display()))?;
                info!(path = %summary_path.display(), "Summary written");
            }
        }
    }

    Ok(())
}

/// Uses the JSON rules at `path` if given, otherwise the built-in set.
fn load_rules(path: Option<&Path>, builtin: fn() -> SchemaRules) -> Result<SchemaRules> {
    match path {
        Some(path) => SchemaRules::load(path)
            .with_context(|| format!("loading rules {}", path.display())),
        None => Ok(builtin()),
    }
}
