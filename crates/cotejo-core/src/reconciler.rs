//! Entry points for front ends: raw documents in, structured results out.

use chrono::NaiveDate;

use crate::comparison::ComparisonEngine;
use crate::error::SchemaError;
use crate::models::config::CotejoConfig;
use crate::models::document::{DocumentRecord, RawDocument};
use crate::models::report::{ComparisonReport, ValidationResult};

/// Validation and comparison over untrusted documents.
///
/// Raw input is schema-checked first; a [`SchemaError`] halts processing
/// of that document. Everything else is reported inside the results.
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: CotejoConfig,
    engine: ComparisonEngine,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(CotejoConfig::default())
    }
}

impl Reconciler {
    pub fn new(config: CotejoConfig) -> Self {
        let engine = ComparisonEngine::new(&config);
        Self { config, engine }
    }

    /// Pin "today" for the future-date check.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.engine = self.engine.with_reference_date(date);
        self
    }

    pub fn config(&self) -> &CotejoConfig {
        &self.config
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.engine.validator().reference_date()
    }

    pub fn validate_document(&self, raw: &RawDocument) -> Result<ValidationResult, SchemaError> {
        let record = DocumentRecord::from_raw(raw.clone())?;
        Ok(self.validate_record(&record))
    }

    pub fn compare_documents(
        &self,
        escritura: &RawDocument,
        candidates: &[RawDocument],
    ) -> Result<ComparisonReport, SchemaError> {
        let escritura = DocumentRecord::from_raw(escritura.clone())?;
        let candidates = candidates
            .iter()
            .cloned()
            .map(DocumentRecord::from_raw)
            .collect::<Result<Vec<_>, _>>()?;

        self.compare_records(&escritura, &candidates)
    }

    pub fn validate_record(&self, record: &DocumentRecord) -> ValidationResult {
        self.engine.validator().validate(record)
    }

    pub fn compare_records(
        &self,
        escritura: &DocumentRecord,
        candidates: &[DocumentRecord],
    ) -> Result<ComparisonReport, SchemaError> {
        self.engine.compare(escritura, candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::DocumentKind;
    use crate::models::report::{OverallVerdict, Verdict};

    fn reconciler() -> Reconciler {
        Reconciler::default().with_reference_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    #[test]
    fn test_schema_error_halts_before_validation() {
        let raw = RawDocument::new(DocumentKind::Escritura, "esc").with_field("iban", "ES00");
        assert!(matches!(
            reconciler().validate_document(&raw),
            Err(SchemaError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_compare_raw_documents() {
        let escritura = RawDocument::new(DocumentKind::Escritura, "esc")
            .with_field("cadastral_reference", "1234567AB1234N")
            .with_field("buyer_id", "12345678Z")
            .with_field("deed_date", "15/03/2023")
            .with_field("sale_price", "150.000,00");
        let modelo = RawDocument::new(DocumentKind::Modelo600, "m600")
            .with_field("cadastral_reference", "1234567 AB1234N")
            .with_field("taxpayer_id", "12345678Z")
            .with_field("accrual_date", "2023-03-15")
            .with_field("taxable_base", "150000");

        let report = reconciler().compare_documents(&escritura, &[modelo]).unwrap();
        assert!(report
            .field_comparisons
            .iter()
            .all(|c| c.verdict == Verdict::Match));
        assert!(!report.escritura_validation.is_valid);
        // Every aligned field agrees, but both documents lack required fields
        assert_eq!(report.overall_verdict, OverallVerdict::Incomplete);
        assert!(report
            .notes
            .iter()
            .any(|n| n.starts_with("required field(s) missing: escritura notary_name")));
    }

    #[test]
    fn test_bad_candidate_rejected() {
        let escritura = RawDocument::new(DocumentKind::Escritura, "esc");
        let bad = RawDocument {
            id: "x".to_string(),
            kind: "factura".to_string(),
            ..RawDocument::default()
        };
        assert_eq!(
            reconciler().compare_documents(&escritura, &[bad]),
            Err(SchemaError::UnknownKind("factura".to_string()))
        );
    }
}
