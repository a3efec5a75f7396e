//! Field normalizer: canonical forms that make comparison tolerant of
//! representation noise (accents, case, spacing, date and number layout).

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::document::FieldType;
use crate::rules::{canonical_amount, format_date, normalize_cadastral, normalize_identifier_list};
use crate::rules::{parse_amount, parse_spanish_date};

lazy_static! {
    static ref STREET_SLASH: Regex = Regex::new(r"\bc\s*/\s*").unwrap();
    static ref SIN_NUMERO: Regex = Regex::new(r"\bs\s*/\s*n\b").unwrap();
}

/// Result of normalizing one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normalized {
    /// Canonical form, or the trimmed input when it could not be parsed.
    pub value: String,

    /// Set when a date or amount did not parse and `value` is a pass-through.
    pub best_effort: bool,
}

impl Normalized {
    fn exact(value: String) -> Self {
        Self {
            value,
            best_effort: false,
        }
    }

    fn pass_through(value: &str) -> Self {
        Self {
            value: value.to_string(),
            best_effort: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Normalize a raw value according to its field type. Never fails.
pub fn normalize(value: &str, field_type: FieldType) -> Normalized {
    let value = value.trim();
    if value.is_empty() {
        return Normalized::exact(String::new());
    }

    match field_type {
        FieldType::Text => Normalized::exact(normalize_text(value)),
        FieldType::Address => Normalized::exact(normalize_address(value)),
        FieldType::Date => match parse_spanish_date(value) {
            Some(date) => Normalized::exact(format_date(date)),
            None => Normalized::pass_through(value),
        },
        FieldType::Numeric => match parse_amount(value) {
            Some(amount) => Normalized::exact(canonical_amount(amount)),
            None => Normalized::pass_through(value),
        },
        FieldType::Identifier => Normalized::exact(normalize_identifier_list(value)),
        FieldType::CadastralReference => Normalized::exact(normalize_cadastral(value)),
    }
}

/// Shorthand for the canonical string only.
pub fn normalize_value(value: &str, field_type: FieldType) -> String {
    normalize(value, field_type).value
}

/// Decompose and drop combining marks: "Peréz" becomes "Perez", "Muñoz" becomes "Munoz".
pub fn strip_diacritics(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Text canonical form: no diacritics, lower case, punctuation and
/// whitespace collapsed to single spaces.
///
/// Runs of single letters are joined, so "S.L." and "SL" agree.
pub fn normalize_text(s: &str) -> String {
    let folded = strip_diacritics(&s.to_lowercase());
    join_initials(&tokens(&folded)).join(" ")
}

/// Address canonical form: text normalization plus expansion of the usual
/// street-type and door abbreviations.
pub fn normalize_address(s: &str) -> String {
    let lowered = s.to_lowercase();
    let lowered = SIN_NUMERO.replace_all(&lowered, " sin numero ");
    let lowered = STREET_SLASH.replace_all(&lowered, " calle ");
    let folded = strip_diacritics(&lowered);

    tokens(&folded)
        .into_iter()
        .map(|token| expand_abbreviation(token).unwrap_or(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Broad property class of a property type or nature description.
///
/// Catastro only distinguishes urban from rustic land. Building types
/// ("vivienda", "local", ...) are urban; anything else is unclassified.
pub fn property_class(s: &str) -> Option<&'static str> {
    let folded = strip_diacritics(&s.to_lowercase());
    let tokens = tokens(&folded);

    if tokens.iter().any(|t| t.starts_with("rustic")) {
        return Some("rustica");
    }
    tokens
        .iter()
        .any(|t| t.starts_with("urban") || URBAN_TYPES.contains(t))
        .then_some("urbana")
}

const URBAN_TYPES: &[&str] = &[
    "vivienda", "piso", "apartamento", "casa", "chalet", "local", "garaje", "trastero", "nave",
    "solar", "edificio", "oficina",
];

fn tokens(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

fn join_initials(tokens: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut run = String::new();

    let is_initial = |t: &str| t.chars().count() == 1 && t.chars().all(char::is_alphabetic);

    for (i, token) in tokens.iter().enumerate() {
        let next_is_initial = tokens.get(i + 1).is_some_and(|t| is_initial(t));
        if is_initial(token) && (!run.is_empty() || next_is_initial) {
            run.push_str(token);
            continue;
        }
        if !run.is_empty() {
            out.push(std::mem::take(&mut run));
        }
        out.push((*token).to_string());
    }
    if !run.is_empty() {
        out.push(run);
    }

    out
}

fn expand_abbreviation(token: &str) -> Option<&'static str> {
    Some(match token {
        "c" | "cl" | "cll" | "calle" => "calle",
        "av" | "avd" | "avda" | "avenida" => "avenida",
        "pza" | "plza" | "pz" | "plaza" => "plaza",
        "ps" | "pso" | "po" | "paseo" => "paseo",
        "ctra" | "crta" | "carretera" => "carretera",
        "urb" | "urbanizacion" => "urbanizacion",
        "no" | "num" | "numero" => "numero",
        "pta" | "pt" | "puerta" => "puerta",
        "esc" | "escalera" => "escalera",
        "dcha" | "dch" | "derecha" => "derecha",
        "izda" | "izq" | "izqda" | "izquierda" => "izquierda",
        "bj" | "bjo" | "bajo" => "bajo",
        "edif" | "ed" | "edificio" => "edificio",
        "pg" | "pol" | "poligono" => "poligono",
        _ => return None,
    })
}
