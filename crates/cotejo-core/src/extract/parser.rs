//! Rule-based extraction for Escrituras and Modelo 600 forms.

use std::time::Instant;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{Result, SchemaError};
use crate::models::config::ExtractionConfig;
use crate::models::document::{DocumentKind, DocumentRecord, ExtractedField, FieldName};
use crate::rules::patterns::*;
use crate::rules::{
    canonical_amount, extract_percentage, format_date, parse_amount, split_identifiers,
    AmountExtractor, CadastralExtractor, DateExtractor, ExtractionMatch, FieldExtractor,
    IdentifierExtractor,
};

use super::{ExtractionResult, RecordExtractor};

/// Confidence of a value found next to its label.
const LABEL_CONFIDENCE: f32 = 0.85;

/// Confidence of a value found without a label.
const FALLBACK_CONFIDENCE: f32 = 0.5;

type Found = (FieldName, String, f32);

#[derive(Debug, Default)]
struct Party {
    id: Option<(String, f32)>,
    name: Option<String>,
}

/// Regex-driven extractor for OCR text of both document kinds.
pub struct RuleBasedExtractor {
    /// Whether identifiers must pass their checksum.
    validate_ids: bool,
    /// Minimum confidence for accepting fields.
    min_confidence: f32,
}

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self {
            validate_ids: true,
            min_confidence: 0.4,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new()
            .with_id_validation(config.validate_ids)
            .with_min_confidence(config.min_confidence)
    }

    /// Set NIF/NIE/CIF checksum validation.
    pub fn with_id_validation(mut self, validate: bool) -> Self {
        self.validate_ids = validate;
        self
    }

    /// Set minimum confidence threshold.
    pub fn with_min_confidence(mut self, confidence: f32) -> Self {
        self.min_confidence = confidence;
        self
    }

    fn extract_escritura(&self, text: &str) -> Vec<Found> {
        let mut found = Vec::new();

        if let Some(name) = labelled(&NOTARY_LABEL, text).and_then(clean_name) {
            found.push((FieldName::NotaryName, name, LABEL_CONFIDENCE));
        }
        if let Some(protocol) = labelled(&PROTOCOL_LABEL, text) {
            found.push((FieldName::ProtocolNumber, protocol.replace('.', ""), LABEL_CONFIDENCE));
        }
        if let Some((date, confidence)) =
            labelled_date(&DEED_DATE_LABEL, text).or_else(|| first_date(text))
        {
            found.push((FieldName::DeedDate, date, confidence));
        }
        push_cadastral(text, &mut found);
        if let Some(address) = labelled(&ADDRESS_LABEL, text).and_then(clean_address) {
            found.push((FieldName::PropertyAddress, address, LABEL_CONFIDENCE));
        }
        if let Some(property_type) = labelled(&PROPERTY_TYPE_LABEL, text) {
            found.push((
                FieldName::PropertyType,
                collapse_whitespace(&property_type.to_lowercase()),
                LABEL_CONFIDENCE,
            ));
        }

        let (buyer, seller) = self.extract_parties(text, &BUYER_SECTION, &SELLER_SECTION);
        push_party(&mut found, buyer, FieldName::BuyerId, Some(FieldName::BuyerName));
        push_party(&mut found, seller, FieldName::SellerId, Some(FieldName::SellerName));

        if let Some(price) = labelled_amount(&PRICE_LABEL, text).or_else(|| largest_amount(text)) {
            found.push((FieldName::SalePrice, price.0, price.1));
        }

        found
    }

    fn extract_modelo(&self, text: &str) -> Vec<Found> {
        let mut found = Vec::new();

        let (taxpayer, transferor) =
            self.extract_parties(text, &TAXPAYER_SECTION, &SELLER_SECTION);
        push_party(&mut found, taxpayer, FieldName::TaxpayerId, Some(FieldName::TaxpayerName));
        push_party(&mut found, transferor, FieldName::TransferorId, None);
        if let Some(shares) = labelled(&TRANSFEROR_SHARES_LABEL, text) {
            found.push((FieldName::TransferorShares, shares, LABEL_CONFIDENCE));
        }

        push_cadastral(text, &mut found);
        if let Some(address) = labelled(&ADDRESS_LABEL, text).and_then(clean_address) {
            found.push((FieldName::PropertyAddress, address, LABEL_CONFIDENCE));
        }
        if let Some(nature) = labelled(&PROPERTY_NATURE_LABEL, text) {
            found.push((
                FieldName::PropertyNature,
                collapse_whitespace(&nature.to_lowercase()),
                LABEL_CONFIDENCE,
            ));
        }
        if let Some(name) = labelled(&NOTARY_LABEL, text).and_then(clean_name) {
            found.push((FieldName::NotaryName, name, LABEL_CONFIDENCE));
        }

        if let Some((date, confidence)) = labelled_date(&ACCRUAL_DATE_LABEL, text) {
            found.push((FieldName::AccrualDate, date, confidence));
        }
        if let Some((date, confidence)) = labelled_date(&LIQUIDATION_DATE_LABEL, text) {
            found.push((FieldName::LiquidationDate, date, confidence));
        }

        let amounts = [
            (FieldName::DeclaredValue, &*DECLARED_VALUE_LABEL),
            (FieldName::TaxableBase, &*TAXABLE_BASE_LABEL),
            (FieldName::TaxRate, &*TAX_RATE_LABEL),
            (FieldName::TaxDue, &*TAX_DUE_LABEL),
        ];
        for (name, label) in amounts {
            if let Some((amount, confidence)) = labelled_amount(label, text) {
                found.push((name, amount, confidence));
            }
        }

        if let Some(percentage) = transferred_percentage(text) {
            found.push((FieldName::TransferredPercentage, percentage.0, percentage.1));
        }

        found
    }

    /// Split the text at the two party headers and pull identifiers and
    /// a name out of each section.
    ///
    /// An identifier missing from its section falls back to the next
    /// unclaimed identifier in document order.
    fn extract_parties(&self, text: &str, first: &Regex, second: &Regex) -> (Party, Party) {
        let first_pos = first.find(text).map(|m| m.start());
        let second_pos = second.find(text).map(|m| m.start());

        let (first_text, second_text) = match (first_pos, second_pos) {
            (Some(f), Some(s)) if f < s => (&text[f..s], &text[s..]),
            (Some(f), Some(s)) => (&text[f..], &text[s..f]),
            (Some(f), None) => (&text[f..], ""),
            (None, Some(s)) => ("", &text[s..]),
            (None, None) => ("", ""),
        };

        let extractor = IdentifierExtractor::new().with_validation(self.validate_ids);
        let first_id = section_ids(&extractor, first_text);
        let second_id = section_ids(&extractor, second_text);

        let claimed: Vec<String> = [&first_id, &second_id]
            .into_iter()
            .flatten()
            .flat_map(|m| {
                split_identifiers(&m.value)
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        let mut spare = extractor
            .extract_all(text)
            .into_iter()
            .filter(|m| !claimed.contains(&m.value));

        let mut resolve = |section: Option<ExtractionMatch<String>>| {
            section
                .map(|m| (m.value, m.confidence))
                .or_else(|| spare.next().map(|m| (m.value, FALLBACK_CONFIDENCE)))
        };

        let first_party = Party {
            id: resolve(first_id),
            name: party_name(first_text, first),
        };
        let second_party = Party {
            id: resolve(second_id),
            name: party_name(second_text, second),
        };

        (first_party, second_party)
    }
}

impl Default for RuleBasedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordExtractor for RuleBasedExtractor {
    fn name(&self) -> &str {
        "rule-based"
    }

    fn extract(&self, kind: DocumentKind, id: &str, text: &str) -> Result<ExtractionResult> {
        let started = start_timer();
        let id = id.trim();
        if id.is_empty() {
            return Err(SchemaError::MissingId.into());
        }

        let found = match kind {
            DocumentKind::Escritura => self.extract_escritura(text),
            DocumentKind::Modelo600 => self.extract_modelo(text),
        };

        let mut record = DocumentRecord::new(kind, id);
        let mut warnings = Vec::new();

        for (name, value, confidence) in found {
            if confidence < self.min_confidence {
                warnings.push(format!(
                    "{} dropped: confidence {:.2} below {:.2}",
                    name, confidence, self.min_confidence
                ));
                continue;
            }
            debug!("Extracted {} = {:?} ({:.2})", name, value, confidence);
            record.insert(name, ExtractedField::new(value).with_confidence(confidence))?;
        }

        for spec in kind.schema().iter().filter(|spec| spec.required) {
            if record.get(spec.name).is_none() {
                warnings.push(format!("required field {} not found", spec.name));
            }
        }

        let processing_time_ms = started
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            "Extracted {} fields from {} {} in {}ms ({} warnings)",
            record.len(),
            kind,
            id,
            processing_time_ms,
            warnings.len()
        );

        Ok(ExtractionResult {
            record,
            raw_text: text.to_string(),
            warnings,
            processing_time_ms,
        })
    }
}

// std's Instant panics on wasm32-unknown-unknown.
#[cfg(not(target_arch = "wasm32"))]
fn start_timer() -> Option<Instant> {
    Some(Instant::now())
}

#[cfg(target_arch = "wasm32")]
fn start_timer() -> Option<Instant> {
    None
}

/// Every identifier on the header line of a section, joined into one
/// list; otherwise the first identifier anywhere in the section.
fn section_ids(extractor: &IdentifierExtractor, section: &str) -> Option<ExtractionMatch<String>> {
    let header_line = section.lines().next().unwrap_or_default();
    let on_line = extractor.extract_all(header_line);
    if on_line.len() < 2 {
        return extractor.extract(section);
    }

    let confidence = on_line.iter().map(|m| m.confidence).fold(1.0, f32::min);
    let value = on_line
        .iter()
        .map(|m| m.value.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Some(ExtractionMatch::new(value, confidence, header_line))
}

fn labelled(label: &Regex, text: &str) -> Option<String> {
    label
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

fn labelled_date(label: &Regex, text: &str) -> Option<(String, f32)> {
    let line = labelled(label, text)?;
    DateExtractor::new()
        .extract(&line)
        .map(|m| (format_date(m.value), m.confidence))
}

fn first_date(text: &str) -> Option<(String, f32)> {
    DateExtractor::new()
        .extract(text)
        .map(|m| (format_date(m.value), FALLBACK_CONFIDENCE))
}

fn labelled_amount(label: &Regex, text: &str) -> Option<(String, f32)> {
    let raw = labelled(label, text)?;
    parse_amount(&raw).map(|amount| (canonical_amount(amount), LABEL_CONFIDENCE))
}

/// Largest amount written with a currency marker.
fn largest_amount(text: &str) -> Option<(String, f32)> {
    AmountExtractor::new()
        .extract_all(text)
        .into_iter()
        .filter(|m| m.confidence >= 0.9)
        .map(|m| m.value)
        .max()
        .map(|amount| (canonical_amount(amount), FALLBACK_CONFIDENCE))
}

fn transferred_percentage(text: &str) -> Option<(String, f32)> {
    if let Some(found) = labelled_amount(&PERCENTAGE_LABEL, text) {
        return Some(found);
    }

    text.lines()
        .filter(|line| line.to_lowercase().contains("transmitid"))
        .find_map(extract_percentage)
        .map(|p| (canonical_amount(p), FALLBACK_CONFIDENCE))
}

fn push_cadastral(text: &str, found: &mut Vec<Found>) {
    if let Some(m) = CadastralExtractor::new().extract(text) {
        found.push((FieldName::CadastralReference, m.value, m.confidence));
    }
}

fn push_party(found: &mut Vec<Found>, party: Party, id_field: FieldName, name_field: Option<FieldName>) {
    if let Some((id, confidence)) = party.id {
        found.push((id_field, id, confidence));
    }
    if let (Some(field), Some(name)) = (name_field, party.name) {
        found.push((field, name, LABEL_CONFIDENCE));
    }
}

fn party_name(section: &str, header: &Regex) -> Option<String> {
    let header = header.find(section)?;
    let caps = PARTY_NAME.captures(&section[header.end()..])?;
    clean_name(caps[1].to_string())
}

fn clean_name(name: String) -> Option<String> {
    let name = collapse_whitespace(name.trim_end_matches(['.', ',', ' ']));
    (!name.is_empty()).then_some(name)
}

fn clean_address(address: String) -> Option<String> {
    let address = collapse_whitespace(address.trim_end_matches(['.', ',', ' ']));
    (!address.is_empty()).then_some(address)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CotejoError;
    use pretty_assertions::assert_eq;

    const ESCRITURA_TEXT: &str = "ESCRITURA DE COMPRAVENTA
Número de protocolo: 1.234
En Madrid, a 15 de marzo de 2023.
Ante mí, DON LUIS FERNÁNDEZ RUIZ, Notario del Ilustre Colegio de Madrid.
COMPARECEN
PARTE VENDEDORA: DOÑA ANA LÓPEZ MARTÍN, con DNI X1234567L.
PARTE COMPRADORA: DON JUAN PÉREZ GARCÍA, con DNI 12345678Z.
Finca: vivienda situada en Calle Mayor 10, 3º B, Madrid.
Referencia catastral: 1234567AB1234N0001YZ
Precio de la compraventa: 150.000,00 euros.
";

    const MODELO_TEXT: &str = "MODELO 600 - AUTOLIQUIDACIÓN
Sujeto pasivo: JUAN PEREZ GARCIA  NIF: 12345678Z
Transmitente: ANA LOPEZ MARTIN  NIF: X1234567L
Referencia catastral: 1234567 AB1234N 0001 YZ
Dirección del inmueble: C/ Mayor 10, 3º B, Madrid
Notario: LUIS FERNANDEZ RUIZ
Fecha de devengo: 15/03/2023
Valor declarado: 150.000,00
Porcentaje transmitido: 100 %
Base imponible: 150.000,00
Tipo impositivo: 6 %
Cuota: 9.000,00
Fecha de presentación: 01/04/2023
";

    fn value(result: &ExtractionResult, name: FieldName) -> Option<&str> {
        result.record.value(name)
    }

    #[test]
    fn test_extract_escritura() {
        let result = RuleBasedExtractor::new()
            .extract(DocumentKind::Escritura, "esc-1", ESCRITURA_TEXT)
            .unwrap();

        assert_eq!(value(&result, FieldName::NotaryName), Some("LUIS FERNÁNDEZ RUIZ"));
        assert_eq!(value(&result, FieldName::ProtocolNumber), Some("1234"));
        assert_eq!(value(&result, FieldName::DeedDate), Some("2023-03-15"));
        assert_eq!(
            value(&result, FieldName::CadastralReference),
            Some("1234567AB1234N0001YZ")
        );
        assert_eq!(
            value(&result, FieldName::PropertyAddress),
            Some("Calle Mayor 10, 3º B, Madrid")
        );
        assert_eq!(value(&result, FieldName::PropertyType), Some("vivienda"));
        assert_eq!(value(&result, FieldName::BuyerId), Some("12345678Z"));
        assert_eq!(value(&result, FieldName::BuyerName), Some("JUAN PÉREZ GARCÍA"));
        assert_eq!(value(&result, FieldName::SellerId), Some("X1234567L"));
        assert_eq!(value(&result, FieldName::SellerName), Some("ANA LÓPEZ MARTÍN"));
        assert_eq!(value(&result, FieldName::SalePrice), Some("150000"));
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(result.raw_text, ESCRITURA_TEXT);
    }

    #[test]
    fn test_extract_modelo() {
        let result = RuleBasedExtractor::new()
            .extract(DocumentKind::Modelo600, "m600-1", MODELO_TEXT)
            .unwrap();

        assert_eq!(value(&result, FieldName::TaxpayerId), Some("12345678Z"));
        assert_eq!(value(&result, FieldName::TaxpayerName), Some("JUAN PEREZ GARCIA"));
        assert_eq!(value(&result, FieldName::TransferorId), Some("X1234567L"));
        assert_eq!(
            value(&result, FieldName::CadastralReference),
            Some("1234567AB1234N0001YZ")
        );
        assert_eq!(
            value(&result, FieldName::PropertyAddress),
            Some("C/ Mayor 10, 3º B, Madrid")
        );
        assert_eq!(value(&result, FieldName::NotaryName), Some("LUIS FERNANDEZ RUIZ"));
        assert_eq!(value(&result, FieldName::AccrualDate), Some("2023-03-15"));
        assert_eq!(value(&result, FieldName::LiquidationDate), Some("2023-04-01"));
        assert_eq!(value(&result, FieldName::DeclaredValue), Some("150000"));
        assert_eq!(value(&result, FieldName::TransferredPercentage), Some("100"));
        assert_eq!(value(&result, FieldName::TaxableBase), Some("150000"));
        assert_eq!(value(&result, FieldName::TaxRate), Some("6"));
        assert_eq!(value(&result, FieldName::TaxDue), Some("9000"));
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_co_owners_share_a_section() {
        let text = "PARTE VENDEDORA: DOÑA ANA LÓPEZ, con DNI X1234567L, y DON LUIS PÉREZ, con CIF B12345674.
PARTE COMPRADORA: DON JUAN GARCÍA, con DNI 12345678Z, y DOÑA EVA RUIZ, con NIE Y1234567X.
Referencia catastral: 1234567AB1234N0001YZ
";
        let result = RuleBasedExtractor::new()
            .extract(DocumentKind::Escritura, "esc", text)
            .unwrap();

        assert_eq!(value(&result, FieldName::SellerId), Some("X1234567L; B12345674"));
        assert_eq!(value(&result, FieldName::BuyerId), Some("12345678Z; Y1234567X"));
        assert_eq!(value(&result, FieldName::BuyerName), Some("JUAN GARCÍA"));
    }

    #[test]
    fn test_modelo_nature_and_shares() {
        let text = format!(
            "{}Naturaleza del bien: Urbana\nCoeficientes de los transmitentes: 50 %; 50 %\n",
            MODELO_TEXT
        );
        let result = RuleBasedExtractor::new()
            .extract(DocumentKind::Modelo600, "m600-1", &text)
            .unwrap();

        assert_eq!(value(&result, FieldName::PropertyNature), Some("urbana"));
        assert_eq!(value(&result, FieldName::TransferorShares), Some("50 %; 50 %"));
    }

    #[test]
    fn test_every_field_has_confidence() {
        let result = RuleBasedExtractor::new()
            .extract(DocumentKind::Modelo600, "m600-1", MODELO_TEXT)
            .unwrap();
        for (name, field) in result.record.fields() {
            let confidence = field.confidence.unwrap();
            assert!((0.0..=1.0).contains(&confidence), "{}", name);
        }
    }

    #[test]
    fn test_unlabelled_ids_fall_back_to_document_order() {
        let text = "Comparecen 12345678Z y X1234567L.\nfecha: 01/02/2023";
        let result = RuleBasedExtractor::new()
            .extract(DocumentKind::Escritura, "esc", text)
            .unwrap();

        assert_eq!(value(&result, FieldName::BuyerId), Some("12345678Z"));
        assert_eq!(value(&result, FieldName::SellerId), Some("X1234567L"));
        assert_eq!(
            result.record.get(FieldName::BuyerId).and_then(|f| f.confidence),
            Some(FALLBACK_CONFIDENCE)
        );
        assert_eq!(value(&result, FieldName::DeedDate), Some("2023-02-01"));
    }

    #[test]
    fn test_min_confidence_drops_fields() {
        let text = "Comparecen 12345678Z y X1234567L.";
        let result = RuleBasedExtractor::new()
            .with_min_confidence(0.6)
            .extract(DocumentKind::Escritura, "esc", text)
            .unwrap();

        assert_eq!(result.record.get(FieldName::BuyerId), None);
        assert!(result.warnings.iter().any(|w| w.starts_with("buyer_id dropped")));
    }

    #[test]
    fn test_missing_required_fields_warned() {
        let result = RuleBasedExtractor::new()
            .extract(DocumentKind::Modelo600, "m600", "documento ilegible")
            .unwrap();

        assert!(result.record.is_empty());
        assert!(result
            .warnings
            .contains(&"required field taxpayer_id not found".to_string()));
        assert!(result
            .warnings
            .contains(&"required field liquidation_date not found".to_string()));
    }

    #[test]
    fn test_invalid_checksum_rejected_unless_disabled() {
        let text = "Sujeto pasivo: JUAN PEREZ  NIF: 12345678A";

        let strict = RuleBasedExtractor::new()
            .extract(DocumentKind::Modelo600, "m", text)
            .unwrap();
        assert_eq!(value(&strict, FieldName::TaxpayerId), None);

        let lenient = RuleBasedExtractor::new()
            .with_id_validation(false)
            .extract(DocumentKind::Modelo600, "m", text)
            .unwrap();
        assert_eq!(value(&lenient, FieldName::TaxpayerId), Some("12345678A"));
    }

    #[test]
    fn test_price_without_label_uses_largest_amount() {
        let text = "Se pagan 1.500,00 € de arras y un total de 150.000,00 €.";
        let result = RuleBasedExtractor::new()
            .extract(DocumentKind::Escritura, "esc", text)
            .unwrap();
        assert_eq!(value(&result, FieldName::SalePrice), Some("150000"));
    }

    #[test]
    fn test_empty_id_rejected() {
        let err = RuleBasedExtractor::new()
            .extract(DocumentKind::Escritura, "  ", ESCRITURA_TEXT)
            .unwrap_err();
        assert!(matches!(err, CotejoError::Schema(SchemaError::MissingId)));
    }
}
