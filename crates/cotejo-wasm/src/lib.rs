//! WASM bindings for Escritura / Modelo 600 reconciliation.
//!
//! This crate exposes validation, comparison and rule-based extraction to
//! the browser review UI and to Node.js.

use chrono::NaiveDate;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use cotejo_core::models::document::FieldType;
use cotejo_core::rules::{format_date, format_spanish_amount, parse_amount, parse_spanish_date};
use cotejo_core::{extractor, CotejoConfig, DocumentKind, IdentifierError, RawDocument, Reconciler};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Version information.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Outcome of an identifier check, as handed to JS.
#[derive(Serialize)]
struct IdentifierCheck {
    valid: bool,
    kind: Option<String>,
    value: String,
    error: Option<IdentifierError>,
}

/// Validate a Spanish NIF, NIE or CIF.
///
/// Returns `{ valid, kind, value, error }` where `value` is the
/// normalized identifier.
#[wasm_bindgen]
pub fn validate_identifier(id: &str) -> Result<JsValue, JsValue> {
    let check = match cotejo_core::validate_identifier(id) {
        Ok(normalized) => IdentifierCheck {
            valid: true,
            kind: Some(normalized.kind.to_string()),
            value: normalized.value,
            error: None,
        },
        Err(error) => IdentifierCheck {
            valid: false,
            kind: None,
            value: cotejo_core::rules::normalize_identifier(id),
            error: Some(error),
        },
    };
    to_js(&check)
}

/// Check a NIF, NIE or CIF without details.
#[wasm_bindgen]
pub fn is_valid_identifier(id: &str) -> bool {
    cotejo_core::rules::is_valid_identifier(id)
}

/// Canonical form of a value for a field type (`text`, `address`, `date`,
/// `numeric`, `identifier`, `cadastral_reference`).
#[wasm_bindgen]
pub fn normalize_value(value: &str, field_type: &str) -> Result<String, JsValue> {
    let field_type: FieldType =
        serde_json::from_value(serde_json::Value::String(field_type.to_string()))
            .map_err(|_| JsValue::from_str(&format!("unknown field type: {}", field_type)))?;
    Ok(cotejo_core::normalize_value(value, field_type))
}

/// Validate one document given as JSON.
#[wasm_bindgen]
pub fn validate_document(document_json: &str) -> Result<JsValue, JsValue> {
    Cotejo::new(None)?.validate(document_json)
}

/// Compare an Escritura against Modelo 600 candidates, all given as JSON.
#[wasm_bindgen]
pub fn compare_documents(escritura_json: &str, candidates_json: Vec<String>) -> Result<JsValue, JsValue> {
    Cotejo::new(None)?.compare(escritura_json, candidates_json)
}

/// Extract a document record from OCR text with the default provider.
///
/// Returns `{ record, raw_text, warnings, processing_time_ms }`.
#[wasm_bindgen]
pub fn extract_record(kind: &str, id: &str, text: &str) -> Result<JsValue, JsValue> {
    Cotejo::new(None)?.extract(kind, id, text)
}

/// Reconciler with its own configuration, for repeated use from JS.
#[wasm_bindgen]
pub struct Cotejo {
    reconciler: Reconciler,
}

#[wasm_bindgen]
impl Cotejo {
    /// Create a reconciler from an optional JSON configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<Cotejo, JsValue> {
        let config = match config_json {
            Some(json) => {
                let config: CotejoConfig = serde_json::from_str(&json).map_err(js_error)?;
                config.validate().map_err(js_error)?;
                config
            }
            None => CotejoConfig::default(),
        };

        let reconciler = Reconciler::new(config).with_reference_date(browser_today());
        Ok(Self { reconciler })
    }

    /// Pin "today" (YYYY-MM-DD) for the future-date check.
    #[wasm_bindgen]
    pub fn set_reference_date(&mut self, date: &str) -> Result<(), JsValue> {
        let date = parse_spanish_date(date)
            .ok_or_else(|| JsValue::from_str(&format!("invalid date: {}", date)))?;
        self.reconciler = self.reconciler.clone().with_reference_date(date);
        Ok(())
    }

    /// Validate one document given as JSON.
    #[wasm_bindgen]
    pub fn validate(&self, document_json: &str) -> Result<JsValue, JsValue> {
        let raw = parse_document(document_json)?;
        let result = self.reconciler.validate_document(&raw).map_err(js_error)?;
        to_js(&result)
    }

    /// Compare an Escritura against Modelo 600 candidates.
    #[wasm_bindgen]
    pub fn compare(&self, escritura_json: &str, candidates_json: Vec<String>) -> Result<JsValue, JsValue> {
        let escritura = parse_document(escritura_json)?;
        let candidates = candidates_json
            .iter()
            .map(|json| parse_document(json))
            .collect::<Result<Vec<_>, _>>()?;

        let report = self
            .reconciler
            .compare_documents(&escritura, &candidates)
            .map_err(js_error)?;

        if report.low_confidence_match {
            web_sys::console::warn_1(&JsValue::from_str(&format!(
                "cotejo: {} is a low-confidence match for {}",
                report.modelo_id, report.escritura_id
            )));
        }

        to_js(&report)
    }

    /// Extract a document record from OCR text with the configured provider.
    #[wasm_bindgen]
    pub fn extract(&self, kind: &str, id: &str, text: &str) -> Result<JsValue, JsValue> {
        let kind = DocumentKind::parse(kind)
            .ok_or_else(|| JsValue::from_str(&format!("unknown document kind: {}", kind)))?;

        let result = extractor(&self.reconciler.config().extraction)
            .extract(kind, id, text)
            .map_err(js_error)?;

        to_js(&result)
    }

    /// Active configuration.
    #[wasm_bindgen]
    pub fn config(&self) -> Result<JsValue, JsValue> {
        to_js(self.reconciler.config())
    }
}

/// Formatting helpers for Spanish values.
#[wasm_bindgen]
pub struct SpanishFormat;

#[wasm_bindgen]
impl SpanishFormat {
    /// Format an amount Spanish style (150.000,50).
    #[wasm_bindgen]
    pub fn format_amount(amount: &str) -> Option<String> {
        parse_amount(amount).map(format_spanish_amount)
    }

    /// Parse a Spanish date into `YYYY-MM-DD`.
    #[wasm_bindgen]
    pub fn parse_date(date: &str) -> Option<String> {
        parse_spanish_date(date).map(format_date)
    }
}

/// Today's date according to the JS clock.
fn browser_today() -> NaiveDate {
    let now = js_sys::Date::new_0();
    NaiveDate::from_ymd_opt(
        now.get_full_year() as i32,
        now.get_month() + 1,
        now.get_date(),
    )
    .unwrap_or_else(|| chrono::Local::now().date_naive())
}

fn parse_document(json: &str) -> Result<RawDocument, JsValue> {
    serde_json::from_str(json).map_err(js_error)
}

/// Plain JS objects rather than `Map`s for record fields.
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("12345678Z"));
        assert!(is_valid_identifier("x-1234567-l"));
        assert!(!is_valid_identifier("12345678A"));
    }

    #[wasm_bindgen_test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("15/03/2023", "date").unwrap(), "2023-03-15");
        assert_eq!(normalize_value("150.000,00 €", "numeric").unwrap(), "150000");
        assert!(normalize_value("x", "colour").is_err());
    }

    #[wasm_bindgen_test]
    fn test_spanish_format() {
        assert_eq!(SpanishFormat::format_amount("150000.5").as_deref(), Some("150.000,50"));
        assert_eq!(SpanishFormat::parse_date("1 de abril de 2023").as_deref(), Some("2023-04-01"));
    }

    #[wasm_bindgen_test]
    fn test_extract_uses_configuration() {
        let text = "Sujeto pasivo: JUAN PEREZ  NIF: 12345678A";
        let strict = Cotejo::new(None).unwrap();
        let lenient =
            Cotejo::new(Some(r#"{"extraction":{"validate_ids":false}}"#.to_string())).unwrap();

        let taxpayer = |value: JsValue| {
            let result: serde_json::Value = serde_wasm_bindgen::from_value(value).unwrap();
            result["record"]["fields"]["taxpayer_id"].clone()
        };
        assert!(taxpayer(strict.extract("modelo600", "m", text).unwrap()).is_null());
        assert!(!taxpayer(lenient.extract("modelo600", "m", text).unwrap()).is_null());
        assert!(strict.extract("factura", "m", text).is_err());
    }

    #[wasm_bindgen_test]
    fn test_compare_documents() {
        let escritura = r#"{"id":"e","kind":"escritura","fields":{"cadastral_reference":"1234567AB1234N","buyer_id":"12345678Z"}}"#;
        let modelo = r#"{"id":"m","kind":"modelo600","fields":{"cadastral_reference":"1234567AB1234N","taxpayer_id":"12345678Z"}}"#;
        assert!(compare_documents(escritura, vec![modelo.to_string()]).is_ok());
        assert!(compare_documents(escritura, vec![]).is_err());
    }
}
