//! Catastro parcel references.

use super::patterns::CADASTRAL_IN_TEXT;
use super::{ExtractionMatch, FieldExtractor};
use crate::error::IdentifierError;

/// Length of a parcel reference (finca / parcela).
pub const PARCEL_LENGTH: usize = 14;

/// Length of a full reference including unit and control characters.
pub const FULL_LENGTH: usize = 20;

/// Remove every non-alphanumeric character and upper-case.
pub fn normalize_cadastral(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Check the shape of a cadastral reference and return its normalized form.
pub fn validate_cadastral(s: &str) -> Result<String, IdentifierError> {
    let has_foreign_chars = s
        .chars()
        .any(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace() && !matches!(c, '-' | '.' | '/'));
    let normalized = normalize_cadastral(s);

    if has_foreign_chars || !matches!(normalized.len(), PARCEL_LENGTH | FULL_LENGTH) {
        return Err(IdentifierError::InvalidFormat {
            value: s.trim().to_string(),
        });
    }

    Ok(normalized)
}

/// The 14-character parcel part, shared by every unit of a building.
pub fn parcel_of(normalized: &str) -> Option<&str> {
    normalized.get(..PARCEL_LENGTH)
}

/// Labelled cadastral reference extractor.
pub struct CadastralExtractor;

impl CadastralExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CadastralExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for CadastralExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        CADASTRAL_IN_TEXT
            .captures_iter(text)
            .filter_map(|caps| {
                let reference = caps.get(1)?;
                let value = validate_cadastral(reference.as_str()).ok()?;
                Some(
                    ExtractionMatch::new(value, 0.9, reference.as_str())
                        .with_position(reference.start(), reference.end()),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cadastral() {
        assert_eq!(normalize_cadastral("1234567 ab1234n"), "1234567AB1234N");
        assert_eq!(normalize_cadastral("9872023-VH5797S-0001-WX"), "9872023VH5797S0001WX");
    }

    #[test]
    fn test_validate_lengths() {
        assert_eq!(validate_cadastral("1234567AB1234N").unwrap(), "1234567AB1234N");
        assert_eq!(
            validate_cadastral("9872023 VH5797S 0001 WX").unwrap(),
            "9872023VH5797S0001WX"
        );
        assert!(validate_cadastral("1234567AB123").is_err());
        assert!(validate_cadastral("1234567AB1234N00").is_err());
        assert!(validate_cadastral("1234567AB1234Ñ").is_err());
    }

    #[test]
    fn test_parcel_of() {
        assert_eq!(parcel_of("9872023VH5797S0001WX"), Some("9872023VH5797S"));
        assert_eq!(parcel_of("123"), None);
    }

    #[test]
    fn test_extract_labelled_reference() {
        let text = "Referencia catastral: 9872023 VH5797S 0001 WX\nSuperficie: 90 m2";
        let found = CadastralExtractor::new().extract(text).unwrap();
        assert_eq!(found.value, "9872023VH5797S0001WX");
    }
}
