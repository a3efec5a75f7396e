//! Validate command - check a single extracted document.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Args;
use tracing::info;

use super::{build_reconciler, emit, exit_status, format_validation, load_config, read_document, OutputFormat};

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Document JSON file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Date used as "today" for the future-date check (YYYY-MM-DD)
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    /// Exit with status 2 when the document has findings
    #[arg(long)]
    fail_on_invalid: bool,
}

pub async fn run(args: ValidateArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    let reconciler = build_reconciler(config, args.reference_date);

    let raw = read_document(&args.input)?;
    info!("Validating {} ({})", raw.id, raw.kind);

    let result = reconciler.validate_document(&raw)?;
    emit(&format_validation(&result, args.format)?, args.output.as_deref())?;

    Ok(exit_status(args.fail_on_invalid && !result.is_valid))
}
