//! Compare command - reconcile one Escritura with its Modelo 600 candidates.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Args;
use console::style;
use tracing::info;

use cotejo_core::OverallVerdict;

use super::{build_reconciler, emit, exit_status, format_report, load_config, read_document, OutputFormat};

/// Arguments for the compare command.
#[derive(Args)]
pub struct CompareArgs {
    /// Escritura JSON file
    #[arg(required = true)]
    escritura: PathBuf,

    /// Modelo 600 JSON files (every candidate for this deed)
    #[arg(required = true)]
    modelos: Vec<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Date used as "today" for the future-date check (YYYY-MM-DD)
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    /// Exit with status 2 unless the verdict is consistent
    #[arg(long)]
    fail_on_discrepancy: bool,
}

pub async fn run(args: CompareArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    let reconciler = build_reconciler(config, args.reference_date);

    let escritura = read_document(&args.escritura)?;
    let candidates = args
        .modelos
        .iter()
        .map(|path| read_document(path))
        .collect::<anyhow::Result<Vec<_>>>()?;

    info!(
        "Comparing {} against {} candidate(s)",
        escritura.id,
        candidates.len()
    );

    let report = reconciler.compare_documents(&escritura, &candidates)?;
    emit(&format_report(&report, args.format)?, args.output.as_deref())?;

    if report.low_confidence_match {
        eprintln!(
            "{} Selected Modelo 600 {} is a low-confidence match",
            style("⚠").yellow(),
            report.modelo_id
        );
    }

    let failed = args.fail_on_discrepancy && report.overall_verdict != OverallVerdict::Consistent;
    Ok(exit_status(failed))
}
