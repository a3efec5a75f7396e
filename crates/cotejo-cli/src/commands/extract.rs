//! Extract command - build a document record from OCR text.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Args;
use console::style;
use tracing::debug;

use cotejo_core::{extractor, DocumentKind, RawDocument};

use super::{emit, load_config, OutputFormat};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Document kind (escritura, modelo600)
    #[arg(short, long, value_parser = parse_kind)]
    kind: DocumentKind,

    /// Text file produced by OCR or PDF text extraction
    #[arg(required = true)]
    input: PathBuf,

    /// Document id (default: file stem)
    #[arg(long)]
    id: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Include warnings and timing in JSON output
    #[arg(long)]
    details: bool,

    /// Accept identifiers that fail their checksum (overrides extraction.validate_ids)
    #[arg(long)]
    no_id_validation: bool,

    /// Minimum confidence for accepting fields (overrides extraction.min_confidence)
    #[arg(long)]
    min_confidence: Option<f32>,
}

fn parse_kind(s: &str) -> Result<DocumentKind, String> {
    DocumentKind::parse(s).ok_or_else(|| format!("unknown document kind: {}", s))
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let mut settings = load_config(config_path)?.extraction;
    if args.no_id_validation {
        settings.validate_ids = false;
    }
    if let Some(min_confidence) = args.min_confidence {
        if !(0.0..=1.0).contains(&min_confidence) {
            anyhow::bail!("--min-confidence must be within [0, 1], got {}", min_confidence);
        }
        settings.min_confidence = min_confidence;
    }

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let id = args.id.clone().unwrap_or_else(|| {
        args.input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string()
    });

    let extractor = extractor(&settings);
    debug!(
        "Extracting with {} provider (min confidence {:.2})",
        extractor.name(),
        settings.min_confidence
    );
    let result = extractor.extract(args.kind, &id, &text)?;

    let output = match args.format {
        OutputFormat::Json if args.details => serde_json::to_string_pretty(&result)?,
        OutputFormat::Json => serde_json::to_string_pretty(&result.record)?,
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(vec![]);
            wtr.write_record(["field", "value", "confidence"])?;
            for (name, field) in result.record.fields() {
                wtr.write_record([
                    name.as_str(),
                    field.value.as_deref().unwrap_or(""),
                    &field.confidence.map(|c| format!("{:.2}", c)).unwrap_or_default(),
                ])?;
            }
            String::from_utf8(wtr.into_inner()?)?
        }
        OutputFormat::Text => {
            let raw = RawDocument::from(result.record.clone());
            let mut text = format!("{} {} ({})\n", raw.kind, raw.id, extractor.name());
            for (name, field) in &raw.fields {
                text.push_str(&format!(
                    "  {:<24} {}\n",
                    name,
                    field.value.as_deref().unwrap_or("-")
                ));
            }
            text
        }
    };

    emit(&output, args.output.as_deref())?;

    for warning in &result.warnings {
        eprintln!("{} {}", style("⚠").yellow(), warning);
    }

    Ok(ExitCode::SUCCESS)
}
