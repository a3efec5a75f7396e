//! Spanish tax identifier (NIF / NIE / CIF) normalization and validation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::patterns::{CIF_FORMAT, ID_IN_TEXT, NIE_FORMAT, NIF_FORMAT};
use super::{ExtractionMatch, FieldExtractor};
use crate::error::IdentifierError;

/// Check letters for NIF and NIE, indexed by `number % 23`.
const NIF_LETTERS: &[u8; 23] = b"TRWAGMYFPDXBNJZSQVHLCKE";

/// CIF control letters, indexed by the control digit.
const CIF_LETTERS: &[u8; 10] = b"JABCDEFGHI";

/// Recognised identifier layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// Spanish national: 8 digits + check letter.
    Nif,
    /// Foreign resident: X/Y/Z + 7 digits + check letter.
    Nie,
    /// Legal entity: organisation letter + 7 digits + control character.
    Cif,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierKind::Nif => f.write_str("NIF"),
            IdentifierKind::Nie => f.write_str("NIE"),
            IdentifierKind::Cif => f.write_str("CIF"),
        }
    }
}

/// A validated identifier in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedId {
    pub kind: IdentifierKind,
    pub value: String,
}

impl fmt::Display for NormalizedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Strip separators and whitespace and upper-case letters.
///
/// No checksum is computed; the result is the presentation form used for
/// cross-document comparison.
pub fn normalize_identifier(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.' | '/' | '_'))
        .flat_map(char::to_uppercase)
        .collect()
}

/// Split a field holding several identifiers, one per co-owner.
///
/// Accepted separators are `,`, `;`, `|` and line breaks.
pub fn split_identifiers(s: &str) -> Vec<&str> {
    s.split([',', ';', '|', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Normalized identifiers of a list field, sorted and deduplicated.
pub fn identifier_set(s: &str) -> BTreeSet<String> {
    split_identifiers(s)
        .into_iter()
        .map(normalize_identifier)
        .filter(|id| !id.is_empty())
        .collect()
}

/// Canonical form of an identifier list: `identifier_set` joined by commas.
pub fn normalize_identifier_list(s: &str) -> String {
    identifier_set(s).into_iter().collect::<Vec<_>>().join(",")
}

/// Classify a normalized identifier by layout.
pub fn classify(normalized: &str) -> Option<IdentifierKind> {
    if NIF_FORMAT.is_match(normalized) {
        Some(IdentifierKind::Nif)
    } else if NIE_FORMAT.is_match(normalized) {
        Some(IdentifierKind::Nie)
    } else if CIF_FORMAT.is_match(normalized) {
        Some(IdentifierKind::Cif)
    } else {
        None
    }
}

/// Validate a NIF, NIE or CIF and return its normalized form.
pub fn validate_identifier(s: &str) -> Result<NormalizedId, IdentifierError> {
    let value = normalize_identifier(s);
    let kind = classify(&value).ok_or_else(|| IdentifierError::InvalidFormat {
        value: s.trim().to_string(),
    })?;

    // Layouts above guarantee ASCII, so byte indexing is safe.
    let bytes = value.as_bytes();
    let found = bytes[8] as char;

    let expected = match kind {
        IdentifierKind::Nif => nif_letter(&value[..8]),
        IdentifierKind::Nie => {
            let prefix = match bytes[0] {
                b'X' => '0',
                b'Y' => '1',
                _ => '2',
            };
            nif_letter(&format!("{}{}", prefix, &value[1..8]))
        }
        IdentifierKind::Cif => {
            let digit = cif_control_digit(&value[1..8]);
            cif_expected(bytes[0] as char, digit, found)
        }
    };

    match expected {
        Some(expected) if expected == found => Ok(NormalizedId { kind, value }),
        Some(expected) => Err(IdentifierError::ChecksumMismatch { expected, found }),
        None => Err(IdentifierError::InvalidFormat {
            value: s.trim().to_string(),
        }),
    }
}

/// Convenience predicate over [`validate_identifier`].
pub fn is_valid_identifier(s: &str) -> bool {
    validate_identifier(s).is_ok()
}

fn nif_letter(digits: &str) -> Option<char> {
    let number: u32 = digits.parse().ok()?;
    Some(NIF_LETTERS[(number % 23) as usize] as char)
}

/// Control digit of a CIF over its seven central digits.
///
/// Digits in odd positions (1st, 3rd, ...) are doubled and their decimal
/// digits summed; digits in even positions are added as they are.
fn cif_control_digit(digits: &str) -> u32 {
    let total: u32 = digits
        .chars()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 0 {
                let doubled = d * 2;
                doubled / 10 + doubled % 10
            } else {
                d
            }
        })
        .sum();

    (10 - total % 10) % 10
}

fn cif_expected(org: char, digit: u32, found: char) -> Option<char> {
    let as_digit = char::from_digit(digit, 10)?;
    let as_letter = CIF_LETTERS[digit as usize] as char;

    Some(match org {
        'A' | 'B' | 'E' | 'H' => as_digit,
        'N' | 'P' | 'Q' | 'R' | 'S' | 'W' => as_letter,
        _ if found.is_ascii_digit() => as_digit,
        _ => as_letter,
    })
}

/// NIF/NIE/CIF extractor for free text.
pub struct IdentifierExtractor {
    validate: bool,
}

impl IdentifierExtractor {
    pub fn new() -> Self {
        Self { validate: true }
    }

    /// Set whether candidates must pass the checksum.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

impl Default for IdentifierExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for IdentifierExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        for m in ID_IN_TEXT.find_iter(text) {
            let candidate = normalize_identifier(m.as_str());
            if results.iter().any(|r| r.value == candidate) {
                continue;
            }

            let confidence = match validate_identifier(&candidate) {
                Ok(_) => 0.95,
                Err(_) if !self.validate => 0.5,
                Err(_) => continue,
            };

            results.push(
                ExtractionMatch::new(candidate, confidence, m.as_str())
                    .with_position(m.start(), m.end()),
            );
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_nif_nie_cif() {
        assert_eq!(
            validate_identifier("12345678Z").unwrap(),
            NormalizedId {
                kind: IdentifierKind::Nif,
                value: "12345678Z".to_string()
            }
        );
        assert_eq!(validate_identifier("X1234567L").unwrap().kind, IdentifierKind::Nie);
        assert_eq!(validate_identifier("Y1234567X").unwrap().kind, IdentifierKind::Nie);
        assert_eq!(validate_identifier("B12345674").unwrap().kind, IdentifierKind::Cif);
        assert_eq!(validate_identifier("A58818501").unwrap().kind, IdentifierKind::Cif);
        assert_eq!(validate_identifier("Q1234567D").unwrap().kind, IdentifierKind::Cif);
    }

    #[test]
    fn test_normalization_strips_separators() {
        assert_eq!(validate_identifier(" 12.345.678-z ").unwrap().value, "12345678Z");
        assert_eq!(validate_identifier("x-1234567-l").unwrap().value, "X1234567L");
        assert_eq!(validate_identifier("B 1234567/4").unwrap().value, "B12345674");
        assert_eq!(normalize_identifier("12_345 678.z"), "12345678Z");
    }

    #[test]
    fn test_identifier_lists() {
        assert_eq!(
            split_identifiers("12345678Z, X1234567L;\nB12345674 | "),
            vec!["12345678Z", "X1234567L", "B12345674"]
        );
        assert_eq!(
            normalize_identifier_list("x-1234567-l; 12.345.678-z, 12345678Z"),
            "12345678Z,X1234567L"
        );
        assert_eq!(normalize_identifier_list("12345678-z"), "12345678Z");
        assert!(identifier_set(" ; ").is_empty());
    }

    #[test]
    fn test_checksum_mismatch_reports_expected() {
        assert_eq!(
            validate_identifier("12345678X"),
            Err(IdentifierError::ChecksumMismatch {
                expected: 'Z',
                found: 'X'
            })
        );
        // A-type CIF requires the digit form
        assert_eq!(
            validate_identifier("B1234567D"),
            Err(IdentifierError::ChecksumMismatch {
                expected: '4',
                found: 'D'
            })
        );
    }

    #[test]
    fn test_cif_either_form_accepted() {
        // C accepts both digit and letter control
        assert!(is_valid_identifier("C12345674"));
        assert!(is_valid_identifier("C1234567D"));
        assert!(!is_valid_identifier("C1234567E"));
    }

    #[test]
    fn test_invalid_format() {
        for value in ["", "1234567Z", "123456789", "K1234567L", "12345678Ñ", "ABC"] {
            assert!(
                matches!(
                    validate_identifier(value),
                    Err(IdentifierError::InvalidFormat { .. })
                ),
                "{} should be an invalid format",
                value
            );
        }
    }

    #[test]
    fn test_extract_identifiers_from_text() {
        let text = "DON JUAN PEREZ, con DNI 12345678-Z, y la mercantil ACME S.L., con CIF B12345674.";
        let found: Vec<String> = IdentifierExtractor::new()
            .extract_all(text)
            .into_iter()
            .map(|m| m.value)
            .collect();
        assert_eq!(found, vec!["12345678Z".to_string(), "B12345674".to_string()]);
    }

    fn nif_strategy() -> impl Strategy<Value = String> {
        (0u32..100_000_000).prop_map(|n| {
            let digits = format!("{:08}", n);
            let letter = NIF_LETTERS[(n % 23) as usize] as char;
            format!("{}{}", digits, letter)
        })
    }

    fn nie_strategy() -> impl Strategy<Value = String> {
        (0u32..3, 0u32..10_000_000).prop_map(|(p, n)| {
            let prefix = ['X', 'Y', 'Z'][p as usize];
            let number = p * 10_000_000 + n;
            let letter = NIF_LETTERS[(number % 23) as usize] as char;
            format!("{}{:07}{}", prefix, n, letter)
        })
    }

    fn strict_cif_strategy() -> impl Strategy<Value = String> {
        (prop::sample::select(vec!['A', 'B', 'E', 'H', 'N', 'P', 'Q', 'R', 'S', 'W']), 0u32..10_000_000)
            .prop_map(|(org, n)| {
                let digits = format!("{:07}", n);
                let digit = cif_control_digit(&digits);
                let control = if "ABEH".contains(org) {
                    char::from_digit(digit, 10).unwrap()
                } else {
                    CIF_LETTERS[digit as usize] as char
                };
                format!("{}{}{}", org, digits, control)
            })
    }

    fn any_identifier() -> impl Strategy<Value = String> {
        prop_oneof![nif_strategy(), nie_strategy(), strict_cif_strategy()]
    }

    proptest! {
        #[test]
        fn prop_valid_identifiers_pass(id in any_identifier()) {
            let normalized = validate_identifier(&id.to_lowercase()).unwrap();
            prop_assert_eq!(normalized.value, id);
        }

        #[test]
        fn prop_check_char_mutation_fails(
            id in any_identifier(),
            replacement in prop::sample::select(
                "ABCDEFGHIJKLMNOPQRSTUVWXYZ".chars().collect::<Vec<_>>()
            ),
        ) {
            let original = id.chars().last().unwrap();
            prop_assume!(replacement != original);

            let mutated = format!("{}{}", &id[..id.len() - 1], replacement);
            let is_mismatch = matches!(
                validate_identifier(&mutated),
                Err(IdentifierError::ChecksumMismatch { .. })
            );
            prop_assert!(is_mismatch);
        }
    }
}
