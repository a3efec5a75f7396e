//! Validation and comparison result types.
//!
//! These are the structured outputs handed to front ends and audit logs.
//! Ordered collections are `Vec`/`BTreeMap` so serialization is stable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::IdentifierError;
use crate::models::document::{DocumentRecord, FieldName, FieldType};

/// Kind of a single-document finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    /// A field mandated by the schema is absent or blank.
    MissingField,
    /// NIF/NIE/CIF or cadastral reference failed format or checksum.
    InvalidIdentifier,
    /// Date does not parse or lies outside the sane range.
    InvalidDate,
    /// Amount does not parse, is negative, or is out of range.
    InvalidAmount,
    /// A statutory relationship between amounts does not hold.
    InconsistentCalculation,
}

impl FieldErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldErrorKind::MissingField => "missing_field",
            FieldErrorKind::InvalidIdentifier => "invalid_identifier",
            FieldErrorKind::InvalidDate => "invalid_date",
            FieldErrorKind::InvalidAmount => "invalid_amount",
            FieldErrorKind::InconsistentCalculation => "inconsistent_calculation",
        }
    }
}

/// One finding produced by the validation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: FieldName,
    pub kind: FieldErrorKind,
    pub message: String,

    /// Sub-reason for identifier failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_error: Option<IdentifierError>,
}

impl FieldError {
    pub fn new(field: FieldName, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            field,
            kind,
            message: message.into(),
            identifier_error: None,
        }
    }

    pub fn missing(field: FieldName) -> Self {
        Self::new(
            field,
            FieldErrorKind::MissingField,
            format!("required field {} is missing", field),
        )
    }

    pub fn invalid_identifier(field: FieldName, error: IdentifierError) -> Self {
        Self {
            field,
            kind: FieldErrorKind::InvalidIdentifier,
            message: format!("{}: {}", field, error),
            identifier_error: Some(error),
        }
    }
}

/// Outcome of validating one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True iff `field_errors` is empty.
    pub is_valid: bool,

    /// Every finding, in schema order followed by cross-field checks.
    pub field_errors: Vec<FieldError>,

    /// The input record with every value canonicalized.
    pub normalized_record: DocumentRecord,
}

impl ValidationResult {
    pub fn new(field_errors: Vec<FieldError>, normalized_record: DocumentRecord) -> Self {
        Self {
            is_valid: field_errors.is_empty(),
            field_errors,
            normalized_record,
        }
    }

    /// Findings of one kind.
    pub fn errors_of(&self, kind: FieldErrorKind) -> impl Iterator<Item = &FieldError> {
        self.field_errors.iter().filter(move |e| e.kind == kind)
    }

    /// Findings attached to one field.
    pub fn errors_for(&self, field: FieldName) -> impl Iterator<Item = &FieldError> {
        self.field_errors.iter().filter(move |e| e.field == field)
    }
}

/// Per-field cross-document verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Match,
    Mismatch,
    MissingInEscritura,
    MissingInModelo,
    /// Values could not be compared reliably.
    Inconclusive,
}

impl Verdict {
    pub fn is_missing(&self) -> bool {
        matches!(self, Verdict::MissingInEscritura | Verdict::MissingInModelo)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Match => "match",
            Verdict::Mismatch => "mismatch",
            Verdict::MissingInEscritura => "missing_in_escritura",
            Verdict::MissingInModelo => "missing_in_modelo",
            Verdict::Inconclusive => "inconclusive",
        }
    }
}

/// One row of a cross-document comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
    /// Name of the aligned pair, e.g. `cadastral_reference`.
    pub field_pair: String,
    pub escritura_field: FieldName,
    pub modelo_field: FieldName,
    pub field_type: FieldType,

    /// Raw values as extracted.
    pub escritura_value: Option<String>,
    pub modelo_value: Option<String>,

    /// Similarity of the normalized values (0.0 - 1.0).
    pub similarity: f64,

    /// Threshold configured for the field type.
    pub threshold: f64,

    pub verdict: Verdict,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Document-level outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallVerdict {
    Consistent,
    Discrepant,
    Incomplete,
}

impl OverallVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallVerdict::Consistent => "consistent",
            OverallVerdict::Discrepant => "discrepant",
            OverallVerdict::Incomplete => "incomplete",
        }
    }
}

/// Reference score of one Modelo 600 candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub modelo_id: String,

    /// Position in the supplied candidate list.
    pub position: usize,

    /// Mean of cadastral and identifier similarity (0.0 - 1.0).
    pub reference_score: f64,

    /// Canonical liquidation date used for tie-breaking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidation_date: Option<String>,

    pub selected: bool,
}

/// Cross-document reconciliation of one Escritura against its tax form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub escritura_id: String,

    /// The selected Modelo 600 candidate.
    pub modelo_id: String,

    pub field_comparisons: Vec<FieldComparison>,

    pub overall_verdict: OverallVerdict,

    /// The selected candidate scored below the minimum reference match.
    pub low_confidence_match: bool,

    /// Every candidate that was considered.
    pub candidate_scores: Vec<CandidateScore>,

    /// Forms reconciled together: the selected candidate, then the forms
    /// co-buyers filed for the same property.
    #[serde(default)]
    pub matched_modelos: Vec<String>,

    /// Informational remarks for reviewers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,

    pub escritura_validation: ValidationResult,
    pub modelo_validation: ValidationResult,
}

impl ComparisonReport {
    /// Number of rows with the given verdict.
    pub fn count(&self, verdict: Verdict) -> usize {
        self.field_comparisons
            .iter()
            .filter(|c| c.verdict == verdict)
            .count()
    }

    /// Row for an aligned pair.
    pub fn comparison(&self, field_pair: &str) -> Option<&FieldComparison> {
        self.field_comparisons
            .iter()
            .find(|c| c.field_pair == field_pair)
    }

    /// Flat mapping of field pair to verdict, for display and audit logs.
    pub fn verdict_map(&self) -> BTreeMap<String, Verdict> {
        self.field_comparisons
            .iter()
            .map(|c| (c.field_pair.clone(), c.verdict))
            .collect()
    }

    /// Ids of candidates that were considered but not selected.
    pub fn unselected_candidates(&self) -> Vec<&str> {
        self.candidate_scores
            .iter()
            .filter(|c| !c.selected)
            .map(|c| c.modelo_id.as_str())
            .collect()
    }
}
