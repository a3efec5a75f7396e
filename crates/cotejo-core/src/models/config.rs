//! Configuration structures for validation and reconciliation.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CotejoError, Result};
use crate::models::document::FieldType;

/// Main configuration for the cotejo engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CotejoConfig {
    /// Fuzzy matching configuration.
    pub matching: MatchingConfig,

    /// Single-document validation configuration.
    pub validation: ValidationConfig,

    /// Candidate selection configuration.
    pub comparison: ComparisonConfig,

    /// Result cache configuration.
    pub cache: CacheConfig,

    /// Field extraction configuration.
    pub extraction: ExtractionConfig,
}

/// Per-field-type match thresholds (0.0 - 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub text: f64,
    pub address: f64,
    pub date: f64,
    pub numeric: f64,
    pub identifier: f64,
    pub cadastral_reference: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            text: 0.85,
            address: 0.85,
            date: 1.0,
            numeric: 1.0,
            identifier: 1.0,
            cadastral_reference: 1.0,
        }
    }
}

impl Thresholds {
    pub fn for_type(&self, field_type: FieldType) -> f64 {
        match field_type {
            FieldType::Text => self.text,
            FieldType::Address => self.address,
            FieldType::Date => self.date,
            FieldType::Numeric => self.numeric,
            FieldType::Identifier => self.identifier,
            FieldType::CadastralReference => self.cadastral_reference,
        }
    }

    fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("text", self.text),
            ("address", self.address),
            ("date", self.date),
            ("numeric", self.numeric),
            ("identifier", self.identifier),
            ("cadastral_reference", self.cadastral_reference),
        ]
    }
}

/// Fuzzy matcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Match thresholds per field type.
    pub thresholds: Thresholds,

    /// Absolute difference below which two amounts are equal.
    pub numeric_epsilon: f64,

    /// Weight of token-set overlap in text similarity; the remainder
    /// goes to the character edit-distance ratio.
    pub token_weight: f64,

    /// Jaro-Winkler score from which two tokens count as the same word.
    pub token_match: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            numeric_epsilon: 0.01,
            token_weight: 0.6,
            token_match: 0.85,
        }
    }
}

/// Validation engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Dates before January 1st of this year are rejected.
    pub min_year: i32,

    /// Days a date may lie in the future of the reference date.
    pub future_tolerance_days: i64,

    /// Allowed absolute difference for tax due vs base x rate.
    pub calculation_tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_year: 1900,
            future_tolerance_days: 1,
            calculation_tolerance: 0.01,
        }
    }
}

/// Candidate selection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Reference score below which a selected candidate is low-confidence.
    pub min_reference_match: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            min_reference_match: 0.5,
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Time to live of cached results, in seconds.
    pub ttl_secs: u64,

    /// Entries kept by the in-memory cache before the soonest to expire
    /// is evicted.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 86_400,
            max_entries: 10_000,
        }
    }
}

/// Available extraction providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionProvider {
    /// Label and pattern rules over OCR text.
    #[default]
    RuleBased,
}

/// Field extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub provider: ExtractionProvider,

    /// Fields extracted with a lower confidence are dropped.
    pub min_confidence: f32,

    /// Identifiers must pass their NIF/NIE/CIF check letter.
    pub validate_ids: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: ExtractionProvider::RuleBased,
            min_confidence: 0.4,
            validate_ids: true,
        }
    }
}

impl CotejoConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values outside their meaningful ranges.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in self.matching.thresholds.entries() {
            check_unit(&format!("matching.thresholds.{}", name), value)?;
        }
        check_unit("matching.token_weight", self.matching.token_weight)?;
        check_unit("matching.token_match", self.matching.token_match)?;
        check_unit(
            "extraction.min_confidence",
            f64::from(self.extraction.min_confidence),
        )?;
        check_unit(
            "comparison.min_reference_match",
            self.comparison.min_reference_match,
        )?;
        check_non_negative("matching.numeric_epsilon", self.matching.numeric_epsilon)?;
        check_non_negative(
            "validation.calculation_tolerance",
            self.validation.calculation_tolerance,
        )?;

        if self.cache.max_entries == 0 {
            return Err(CotejoError::Config(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }

        if self.validation.future_tolerance_days < 0 {
            return Err(CotejoError::Config(
                "validation.future_tolerance_days must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CotejoError::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(CotejoError::Config(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )))
    }
}
