//! Error types for the cotejo-core library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::document::DocumentKind;

/// Main error type for the cotejo library.
#[derive(Error, Debug)]
pub enum CotejoError {
    /// Input document does not have the shape of a known schema.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Structural problems with an input document.
///
/// These are fatal for the document they concern: validation and
/// comparison do not run against a record that fails the schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The document has no identifier.
    #[error("document has no id")]
    MissingId,

    /// The document kind is not one of the supported variants.
    #[error("unknown document kind: {0}")]
    UnknownKind(String),

    /// A document of one kind was supplied where another was expected.
    #[error("document {id} is a {found}, expected a {expected}")]
    WrongKind {
        id: String,
        expected: DocumentKind,
        found: DocumentKind,
    },

    /// A field name that is not part of the kind's schema.
    #[error("field {field} is not part of the {kind} schema")]
    UnknownField { kind: DocumentKind, field: String },

    /// Comparison was requested without any tax form candidates.
    #[error("no Modelo 600 candidates supplied")]
    NoCandidates,
}

/// Reasons a Spanish NIF/NIE/CIF fails validation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IdentifierError {
    /// The value does not match any recognised identifier layout.
    #[error("invalid identifier format: {value}")]
    InvalidFormat { value: String },

    /// The layout is recognised but the control character is wrong.
    #[error("checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch { expected: char, found: char },
}

/// Result type for the cotejo library.
pub type Result<T> = std::result::Result<T, CotejoError>;
