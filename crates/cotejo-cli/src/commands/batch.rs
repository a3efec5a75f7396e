//! Batch command - reconcile many case directories.
//!
//! A case directory holds `escritura.json` and one or more `modelo*.json`
//! files.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Args;
use console::style;
use futures_util::stream::{self, StreamExt};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use cotejo_core::{
    CachedReconciler, ComparisonReport, MemoryCache, OverallVerdict, RawDocument, Verdict,
};

use super::{build_reconciler, exit_status, format_report, load_config, read_document, OutputFormat};

const ESCRITURA_FILE: &str = "escritura.json";

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern matching case directories
    #[arg(required = true)]
    input: String,

    /// Output directory for per-case reports
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each report
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Date used as "today" for the future-date check (YYYY-MM-DD)
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    /// Exit with status 2 unless every case is consistent
    #[arg(long)]
    fail_on_discrepancy: bool,
}

/// Result of reconciling a single case.
struct CaseResult {
    case: PathBuf,
    report: Option<ComparisonReport>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let cases: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_dir() && p.join(ESCRITURA_FILE).is_file())
        .collect();

    if cases.is_empty() {
        anyhow::bail!("No case directories found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} cases to reconcile",
        style("ℹ").blue(),
        cases.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let progress = ProgressBar::new(cases.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} cases")?
            .progress_chars("=>-"),
    );

    let cache = MemoryCache::with_max_entries(config.cache.max_entries);
    let reconciler = Arc::new(CachedReconciler::new(
        build_reconciler(config, args.reference_date),
        cache,
    ));

    let mut pending = stream::iter(cases)
        .map(|case| {
            let reconciler = Arc::clone(&reconciler);
            run_case(case, move |case| reconcile_case(case, &reconciler))
        })
        .buffered(args.jobs.max(1));

    let mut results = Vec::new();
    while let Some((case, outcome, processing_time_ms)) = pending.next().await {
        match outcome {
            Ok(report) => results.push(CaseResult {
                case,
                report: Some(report),
                error: None,
                processing_time_ms,
            }),
            Err(e) => {
                let error_msg = format!("{:#}", e);
                if args.continue_on_error {
                    warn!("Failed to reconcile {}: {}", case.display(), error_msg);
                    results.push(CaseResult {
                        case,
                        report: None,
                        error: Some(error_msg),
                        processing_time_ms,
                    });
                } else {
                    error!("Failed to reconcile {}: {}", case.display(), error_msg);
                    anyhow::bail!("Reconciliation failed for {}: {}", case.display(), error_msg);
                }
            }
        }

        progress.inc(1);
    }

    progress.finish_with_message("Complete");

    if let Some(output_dir) = &args.output_dir {
        for result in &results {
            if let Some(report) = &result.report {
                let output_path =
                    output_dir.join(format!("{}.{}", case_name(&result.case), args.format.extension()));
                fs::write(&output_path, format_report(report, args.format)?)?;
                debug!("Wrote report to {}", output_path.display());
            }
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let count = |verdict: OverallVerdict| {
        results
            .iter()
            .filter(|r| r.report.as_ref().map(|r| r.overall_verdict) == Some(verdict))
            .count()
    };
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    println!();
    println!(
        "{} Reconciled {} cases in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} consistent, {} discrepant, {} incomplete, {} failed",
        style(count(OverallVerdict::Consistent)).green(),
        style(count(OverallVerdict::Discrepant)).red(),
        style(count(OverallVerdict::Incomplete)).yellow(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed cases:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.case.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let flagged = results.len() != count(OverallVerdict::Consistent);
    Ok(exit_status(args.fail_on_discrepancy && flagged))
}

/// Run one case on the blocking pool. A worker that panics or is cancelled
/// yields an error for its case, like any other failure.
async fn run_case<F>(case: PathBuf, job: F) -> (PathBuf, anyhow::Result<ComparisonReport>, u64)
where
    F: FnOnce(&Path) -> anyhow::Result<ComparisonReport> + Send + 'static,
{
    let case_start = Instant::now();
    let worker_case = case.clone();
    let outcome = tokio::task::spawn_blocking(move || job(&worker_case))
        .await
        .unwrap_or_else(|e| Err(anyhow::anyhow!("worker failed: {}", e)));
    (case, outcome, case_start.elapsed().as_millis() as u64)
}

fn reconcile_case(
    case: &Path,
    reconciler: &CachedReconciler<MemoryCache>,
) -> anyhow::Result<ComparisonReport> {
    let escritura = read_document(&case.join(ESCRITURA_FILE))?;
    let candidates = modelo_files(case)?
        .iter()
        .map(|path| read_document(path))
        .collect::<anyhow::Result<Vec<RawDocument>>>()?;

    if candidates.is_empty() {
        anyhow::bail!("no modelo*.json files in {}", case.display());
    }

    reconciler
        .compare_documents(&escritura, &candidates)
        .with_context(|| format!("Case {}", case.display()))
}

/// `modelo*.json` files of a case, sorted so candidate order is stable.
fn modelo_files(case: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(case)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name.starts_with("modelo") && name.ends_with(".json")
        })
        .collect();
    files.sort();
    Ok(files)
}

fn case_name(case: &Path) -> &str {
    case.file_name().and_then(|s| s.to_str()).unwrap_or("case")
}

fn write_summary(path: &Path, results: &[CaseResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "case",
        "status",
        "escritura_id",
        "modelo_id",
        "overall_verdict",
        "matches",
        "mismatches",
        "missing",
        "inconclusive",
        "low_confidence_match",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let case = case_name(&result.case);

        if let Some(report) = &result.report {
            let missing = report.count(Verdict::MissingInEscritura) + report.count(Verdict::MissingInModelo);
            wtr.write_record([
                case,
                "success",
                &report.escritura_id,
                &report.modelo_id,
                report.overall_verdict.as_str(),
                &report.count(Verdict::Match).to_string(),
                &report.count(Verdict::Mismatch).to_string(),
                &missing.to_string(),
                &report.count(Verdict::Inconclusive).to_string(),
                &report.low_confidence_match.to_string(),
                &result.processing_time_ms.to_string(),
                "",
            ])?;
        } else {
            wtr.write_record([
                case,
                "error",
                "",
                "",
                "",
                "",
                "",
                "",
                "",
                "",
                &result.processing_time_ms.to_string(),
                result.error.as_deref().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
