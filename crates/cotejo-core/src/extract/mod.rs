//! Field extraction from OCR text.
//!
//! Extraction providers turn the text of a scanned document into a
//! [`DocumentRecord`]. The rule-based provider ships with the crate; model
//! backed providers plug in behind the same [`RecordExtractor`] trait.

mod parser;

pub use parser::RuleBasedExtractor;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::config::{ExtractionConfig, ExtractionProvider};
use crate::models::document::{DocumentKind, DocumentRecord};

/// Result of extracting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Extracted record; every field carries a confidence.
    pub record: DocumentRecord,
    /// Text the record was extracted from.
    pub raw_text: String,
    /// Extraction warnings.
    pub warnings: Vec<String>,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Trait for extraction providers.
pub trait RecordExtractor {
    /// Short provider name for logs and reports.
    fn name(&self) -> &str;

    /// Extract a record of the given kind from document text.
    fn extract(&self, kind: DocumentKind, id: &str, text: &str) -> Result<ExtractionResult>;
}

/// The extraction provider selected by configuration.
pub fn extractor(config: &ExtractionConfig) -> Box<dyn RecordExtractor + Send + Sync> {
    match config.provider {
        ExtractionProvider::RuleBased => Box::new(RuleBasedExtractor::from_config(config)),
    }
}
