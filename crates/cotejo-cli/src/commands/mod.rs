//! Subcommands and the helpers they share.

pub mod batch;
pub mod compare;
pub mod config;
pub mod extract;
pub mod validate;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::NaiveDate;
use console::style;
use tracing::debug;

use cotejo_core::{
    ComparisonReport, CotejoConfig, OverallVerdict, RawDocument, Reconciler, ValidationResult,
};

/// Exit status for a completed run whose result should fail a pipeline.
pub const FINDINGS_EXIT: u8 = 2;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cotejo")
        .join("config.json")
}

/// Explicit `--config` file, else the per-user file, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<CotejoConfig> {
    if let Some(path) = config_path {
        return CotejoConfig::from_file(Path::new(path))
            .with_context(|| format!("Failed to load config from {}", path));
    }

    let user_path = default_config_path();
    if user_path.exists() {
        debug!("Using config at {}", user_path.display());
        return CotejoConfig::from_file(&user_path)
            .with_context(|| format!("Failed to load config from {}", user_path.display()));
    }

    Ok(CotejoConfig::default())
}

pub fn build_reconciler(config: CotejoConfig, reference_date: Option<NaiveDate>) -> Reconciler {
    let reconciler = Reconciler::new(config);
    match reference_date {
        Some(date) => reconciler.with_reference_date(date),
        None => reconciler,
    }
}

pub fn read_document(path: &Path) -> anyhow::Result<RawDocument> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Invalid document JSON in {}", path.display()))
}

/// Write to a file, or to stdout when no path is given.
pub fn emit(content: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            println!(
                "{} Output written to {}",
                style("✓").green(),
                path.display()
            );
        }
        None => println!("{}", content),
    }
    Ok(())
}

pub fn exit_status(failed: bool) -> ExitCode {
    if failed {
        ExitCode::from(FINDINGS_EXIT)
    } else {
        ExitCode::SUCCESS
    }
}

pub fn format_validation(result: &ValidationResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(vec![]);
            wtr.write_record(["field", "kind", "message"])?;
            for error in &result.field_errors {
                wtr.write_record([error.field.as_str(), error.kind.as_str(), &error.message])?;
            }
            Ok(String::from_utf8(wtr.into_inner()?)?)
        }
        OutputFormat::Text => Ok(validation_text(result)),
    }
}

fn validation_text(result: &ValidationResult) -> String {
    let record = &result.normalized_record;
    let mut output = String::new();

    output.push_str(&format!("Document: {} ({})\n", record.id(), record.kind()));
    if result.is_valid {
        output.push_str(&format!("Status: {}\n", style("valid").green()));
    } else {
        output.push_str(&format!(
            "Status: {} ({} findings)\n",
            style("invalid").red(),
            result.field_errors.len()
        ));
        for error in &result.field_errors {
            output.push_str(&format!("  - [{}] {}\n", error.kind.as_str(), error.message));
        }
    }

    output
}

pub fn format_report(report: &ComparisonReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(vec![]);
            wtr.write_record([
                "field_pair",
                "field_type",
                "escritura_value",
                "modelo_value",
                "similarity",
                "threshold",
                "verdict",
                "note",
            ])?;
            for row in &report.field_comparisons {
                wtr.write_record([
                    row.field_pair.as_str(),
                    row.field_type.as_str(),
                    row.escritura_value.as_deref().unwrap_or(""),
                    row.modelo_value.as_deref().unwrap_or(""),
                    &format!("{:.3}", row.similarity),
                    &format!("{:.2}", row.threshold),
                    row.verdict.as_str(),
                    row.note.as_deref().unwrap_or(""),
                ])?;
            }
            Ok(String::from_utf8(wtr.into_inner()?)?)
        }
        OutputFormat::Text => Ok(report_text(report)),
    }
}

fn report_text(report: &ComparisonReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("Escritura:  {}\n", report.escritura_id));
    output.push_str(&format!("Modelo 600: {}\n", report.modelo_id));
    if report.matched_modelos.len() > 1 {
        output.push_str(&format!("Co-filed:   {}\n", report.matched_modelos.join(", ")));
    }

    let verdict = report.overall_verdict.as_str().to_uppercase();
    let verdict = match report.overall_verdict {
        OverallVerdict::Consistent => style(verdict).green(),
        OverallVerdict::Discrepant => style(verdict).red(),
        OverallVerdict::Incomplete => style(verdict).yellow(),
    };
    output.push_str(&format!("Verdict:    {}\n\n", verdict));

    for row in &report.field_comparisons {
        output.push_str(&format!(
            "  {:<20} {:<21} {:>5.2}  {} | {}\n",
            row.field_pair,
            row.verdict.as_str(),
            row.similarity,
            row.escritura_value.as_deref().unwrap_or("-"),
            row.modelo_value.as_deref().unwrap_or("-"),
        ));
        if let Some(note) = &row.note {
            output.push_str(&format!("  {:<20} {}\n", "", note));
        }
    }

    if !report.notes.is_empty() {
        output.push_str("\nNotes:\n");
        for note in &report.notes {
            output.push_str(&format!("  - {}\n", note));
        }
    }

    if report.candidate_scores.len() > 1 {
        output.push_str("\nCandidates:\n");
        for candidate in &report.candidate_scores {
            output.push_str(&format!(
                "  {} {} ({:.2})\n",
                if candidate.selected { "*" } else { " " },
                candidate.modelo_id,
                candidate.reference_score
            ));
        }
    }

    output
}
