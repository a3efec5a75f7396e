//! Field rules for Spanish notarial documents: identifiers, cadastral
//! references, dates and amounts.

pub mod amounts;
pub mod cadastral;
pub mod dates;
pub mod patterns;
pub mod spanish_id;

pub use amounts::{
    canonical_amount, extract_percentage, format_spanish_amount, parse_amount, AmountExtractor,
};
pub use cadastral::{normalize_cadastral, parcel_of, validate_cadastral, CadastralExtractor};
pub use dates::{format_date, parse_spanish_date, DateExtractor};
pub use spanish_id::{
    classify, identifier_set, is_valid_identifier, normalize_identifier, normalize_identifier_list,
    split_identifiers, validate_identifier, IdentifierExtractor, IdentifierKind, NormalizedId,
};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// Extraction context with confidence scores.
#[derive(Debug, Clone)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
    /// Position in source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }
}
