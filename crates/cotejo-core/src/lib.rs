//! Core library for reconciling Spanish notarial deeds (Escrituras) with
//! their Modelo 600 transfer-tax self-assessments.
//!
//! This crate provides:
//! - Spanish identifier checks (NIF, NIE, CIF) and cadastral references
//! - Field normalization and fuzzy matching tolerant of OCR noise
//! - Per-document validation and cross-document comparison reports
//! - A rule-based extraction provider for OCR text
//! - An optional result cache

pub mod cache;
pub mod comparison;
pub mod error;
pub mod extract;
pub mod matching;
pub mod models;
pub mod normalize;
pub mod reconciler;
pub mod rules;
pub mod validation;

pub use cache::{fingerprint, CachedReconciler, MemoryCache, ResultCache};
pub use comparison::ComparisonEngine;
pub use error::{CotejoError, IdentifierError, Result, SchemaError};
pub use extract::{extractor, ExtractionResult, RecordExtractor, RuleBasedExtractor};
pub use matching::{similarity, FuzzyMatcher};
pub use models::config::{CotejoConfig, ExtractionConfig, ExtractionProvider};
pub use models::document::{
    DocumentKind, DocumentRecord, ExtractedField, FieldName, FieldType, RawDocument,
};
pub use models::report::{
    CandidateScore, ComparisonReport, FieldComparison, FieldError, FieldErrorKind,
    OverallVerdict, ValidationResult, Verdict,
};
pub use normalize::{normalize, normalize_value};
pub use reconciler::Reconciler;
pub use rules::{validate_identifier, IdentifierKind, NormalizedId};
pub use validation::Validator;
