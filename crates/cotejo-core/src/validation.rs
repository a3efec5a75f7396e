//! Validation engine: schema and business-rule checks on one document.
//!
//! Every check runs regardless of earlier failures; findings are
//! accumulated into the [`ValidationResult`] and never returned as `Err`.

use chrono::{Datelike, Local, NaiveDate};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::config::ValidationConfig;
use crate::models::document::{DocumentKind, DocumentRecord, FieldName, FieldSpec, FieldType};
use crate::models::report::{FieldError, FieldErrorKind, ValidationResult};
use crate::normalize::normalize_value;
use crate::rules::{
    format_date, parse_amount, parse_spanish_date, split_identifiers, validate_cadastral,
    validate_identifier,
};

/// Single-document validator.
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
    reference_date: NaiveDate,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl Validator {
    /// Create a validator whose "now" is today's local date.
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            reference_date: Local::now().date_naive(),
        }
    }

    /// Pin the reference date used by the future-date check.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = date;
        self
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// Validate a schema-checked record.
    pub fn validate(&self, record: &DocumentRecord) -> ValidationResult {
        let mut errors = Vec::new();

        for spec in record.kind().schema() {
            match record.value(spec.name) {
                Some(value) => self.check_field(spec, value, &mut errors),
                None if spec.required => errors.push(FieldError::missing(spec.name)),
                None => {}
            }
        }

        if record.kind() == DocumentKind::Modelo600 {
            self.check_tax_calculation(record, &mut errors);
            self.check_taxable_base(record, &mut errors);
            self.check_transferor_shares(record, &mut errors);
            check_date_order(record, &mut errors);
        }

        let normalized = record.map_values(|name, value| {
            let field_type = record
                .kind()
                .field_spec(name)
                .map(|spec| spec.field_type)
                .unwrap_or(FieldType::Text);
            normalize_value(value, field_type)
        });

        debug!(
            "Validated {} {}: {} finding(s)",
            record.kind(),
            record.id(),
            errors.len()
        );

        ValidationResult::new(errors, normalized)
    }

    fn check_field(&self, spec: &FieldSpec, value: &str, errors: &mut Vec<FieldError>) {
        match spec.field_type {
            FieldType::Identifier => {
                let ids = split_identifiers(value);
                if ids.is_empty() {
                    if let Err(e) = validate_identifier(value) {
                        errors.push(FieldError::invalid_identifier(spec.name, e));
                    }
                }
                for id in ids {
                    if let Err(e) = validate_identifier(id) {
                        errors.push(FieldError::invalid_identifier(spec.name, e));
                    }
                }
            }
            FieldType::CadastralReference => {
                if let Err(e) = validate_cadastral(value) {
                    errors.push(FieldError::invalid_identifier(spec.name, e));
                }
            }
            FieldType::Date => self.check_date(spec.name, value, errors),
            FieldType::Numeric => check_amount(spec.name, value, errors),
            FieldType::Text | FieldType::Address => {}
        }
    }

    fn check_date(&self, field: FieldName, value: &str, errors: &mut Vec<FieldError>) {
        let Some(date) = parse_spanish_date(value) else {
            errors.push(FieldError::new(
                field,
                FieldErrorKind::InvalidDate,
                format!("{}: unrecognised date '{}'", field, value),
            ));
            return;
        };

        if date.year() < self.config.min_year {
            errors.push(FieldError::new(
                field,
                FieldErrorKind::InvalidDate,
                format!(
                    "{}: {} is before {}",
                    field,
                    format_date(date),
                    self.config.min_year
                ),
            ));
        }

        let ahead = date.signed_duration_since(self.reference_date).num_days();
        if ahead > self.config.future_tolerance_days {
            errors.push(FieldError::new(
                field,
                FieldErrorKind::InvalidDate,
                format!(
                    "{}: {} is {} day(s) after {}",
                    field,
                    format_date(date),
                    ahead,
                    format_date(self.reference_date)
                ),
            ));
        }
    }

    /// `tax_due ≈ taxable_base × tax_rate / 100`.
    fn check_tax_calculation(&self, record: &DocumentRecord, errors: &mut Vec<FieldError>) {
        let (Some(base), Some(rate), Some(due)) = (
            amount_of(record, FieldName::TaxableBase),
            amount_of(record, FieldName::TaxRate),
            amount_of(record, FieldName::TaxDue),
        ) else {
            return;
        };

        let expected = base
            .checked_mul(rate)
            .and_then(|product| product.checked_div(Decimal::ONE_HUNDRED));
        let difference = expected
            .and_then(|expected| due.checked_sub(expected))
            .map(|difference| difference.abs());

        let (Some(expected), Some(difference)) = (expected, difference) else {
            errors.push(FieldError::new(
                FieldName::TaxDue,
                FieldErrorKind::InconsistentCalculation,
                format!(
                    "tax_due {} cannot be checked: taxable_base {} x tax_rate {}% is out of range",
                    due.normalize(),
                    base.normalize(),
                    rate.normalize()
                ),
            ));
            return;
        };

        if difference > self.tolerance() {
            errors.push(FieldError::new(
                FieldName::TaxDue,
                FieldErrorKind::InconsistentCalculation,
                format!(
                    "tax_due {} differs from taxable_base {} x tax_rate {}% = {} by {}",
                    due.normalize(),
                    base.normalize(),
                    rate.normalize(),
                    expected.round_dp(2).normalize(),
                    difference.round_dp(2).normalize()
                ),
            ));
        }
    }

    /// The taxable base is never below the declared value.
    fn check_taxable_base(&self, record: &DocumentRecord, errors: &mut Vec<FieldError>) {
        let (Some(base), Some(declared)) = (
            amount_of(record, FieldName::TaxableBase),
            amount_of(record, FieldName::DeclaredValue),
        ) else {
            return;
        };

        // Overflow only happens with opposite signs, i.e. declared > base
        let below = match declared.checked_sub(base) {
            Some(difference) => difference > self.tolerance(),
            None => declared > base,
        };

        if below {
            errors.push(FieldError::new(
                FieldName::TaxableBase,
                FieldErrorKind::InconsistentCalculation,
                format!(
                    "taxable_base {} is below declared_value {}",
                    base.normalize(),
                    declared.normalize()
                ),
            ));
        }
    }

    /// Co-transferor shares are each within (0, 100] and add up to 100,
    /// one share per transferor identifier.
    fn check_transferor_shares(&self, record: &DocumentRecord, errors: &mut Vec<FieldError>) {
        let Some(raw) = record.value(FieldName::TransferorShares) else {
            return;
        };

        // Commas are decimal separators here ("33,33; 66,67")
        let shares: Vec<&str> = raw
            .split([';', '|', '\n'])
            .map(str::trim)
            .filter(|share| !share.is_empty())
            .collect();

        let mut total = Some(Decimal::ZERO);
        for share in &shares {
            match parse_amount(share) {
                Some(value) if value > Decimal::ZERO && value <= Decimal::ONE_HUNDRED => {
                    total = total.and_then(|t| t.checked_add(value));
                }
                _ => {
                    errors.push(FieldError::new(
                        FieldName::TransferorShares,
                        FieldErrorKind::InvalidAmount,
                        format!("transferor_shares: '{}' is not a valid share", share),
                    ));
                    total = None;
                }
            }
        }

        if let Some(total) = total.filter(|_| !shares.is_empty()) {
            if (total - Decimal::ONE_HUNDRED).abs() > self.tolerance() {
                errors.push(FieldError::new(
                    FieldName::TransferorShares,
                    FieldErrorKind::InconsistentCalculation,
                    format!("transferor_shares add up to {}%, not 100%", total.normalize()),
                ));
            }
        }

        let transferors = record
            .value(FieldName::TransferorId)
            .map(|ids| split_identifiers(ids).len())
            .unwrap_or(0);
        if transferors > 0 && transferors != shares.len() {
            errors.push(FieldError::new(
                FieldName::TransferorShares,
                FieldErrorKind::InconsistentCalculation,
                format!(
                    "{} transferor share(s) for {} transferor(s)",
                    shares.len(),
                    transferors
                ),
            ));
        }
    }

    fn tolerance(&self) -> Decimal {
        Decimal::from_f64(self.config.calculation_tolerance).unwrap_or(Decimal::ZERO)
    }
}

fn check_amount(field: FieldName, value: &str, errors: &mut Vec<FieldError>) {
    let Some(amount) = parse_amount(value) else {
        errors.push(FieldError::new(
            field,
            FieldErrorKind::InvalidAmount,
            format!("{}: unrecognised amount '{}'", field, value),
        ));
        return;
    };

    if amount.is_sign_negative() && !amount.is_zero() {
        errors.push(FieldError::new(
            field,
            FieldErrorKind::InvalidAmount,
            format!("{}: {} is negative", field, amount.normalize()),
        ));
        return;
    }

    let out_of_range = match field {
        FieldName::TransferredPercentage => {
            amount.is_zero() || amount > Decimal::ONE_HUNDRED
        }
        FieldName::TaxRate => amount > Decimal::ONE_HUNDRED,
        _ => false,
    };

    if out_of_range {
        errors.push(FieldError::new(
            field,
            FieldErrorKind::InvalidAmount,
            format!("{}: {} is not a valid percentage", field, amount.normalize()),
        ));
    }
}

/// A Modelo 600 is filed on or after the accrual of the tax.
fn check_date_order(record: &DocumentRecord, errors: &mut Vec<FieldError>) {
    let (Some(accrual), Some(liquidation)) = (
        date_of(record, FieldName::AccrualDate),
        date_of(record, FieldName::LiquidationDate),
    ) else {
        return;
    };

    if liquidation < accrual {
        errors.push(FieldError::new(
            FieldName::LiquidationDate,
            FieldErrorKind::InvalidDate,
            format!(
                "liquidation_date {} precedes accrual_date {}",
                format_date(liquidation),
                format_date(accrual)
            ),
        ));
    }
}

fn amount_of(record: &DocumentRecord, field: FieldName) -> Option<Decimal> {
    record.value(field).and_then(parse_amount)
}

fn date_of(record: &DocumentRecord, field: FieldName) -> Option<NaiveDate> {
    record.value(field).and_then(parse_spanish_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IdentifierError;
    use pretty_assertions::assert_eq;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn validator() -> Validator {
        Validator::default().with_reference_date(today())
    }

    fn escritura(pairs: &[(FieldName, &str)]) -> DocumentRecord {
        DocumentRecord::from_pairs(DocumentKind::Escritura, "esc-1", pairs).unwrap()
    }

    fn complete_escritura() -> Vec<(FieldName, &'static str)> {
        vec![
            (FieldName::NotaryName, "María López Ruiz"),
            (FieldName::DeedDate, "15/03/2023"),
            (FieldName::CadastralReference, "1234567AB1234N"),
            (FieldName::PropertyAddress, "C/ Mayor 5, Madrid"),
            (FieldName::BuyerId, "12345678Z"),
            (FieldName::BuyerName, "Juan Pérez García"),
            (FieldName::SellerId, "X1234567L"),
            (FieldName::SellerName, "Ana Torres"),
            (FieldName::SalePrice, "150.000,00 €"),
        ]
    }

    fn modelo(pairs: &[(FieldName, &str)]) -> DocumentRecord {
        DocumentRecord::from_pairs(DocumentKind::Modelo600, "m600-1", pairs).unwrap()
    }

    fn complete_modelo() -> Vec<(FieldName, &'static str)> {
        vec![
            (FieldName::TaxpayerId, "12345678Z"),
            (FieldName::CadastralReference, "1234567AB1234N"),
            (FieldName::AccrualDate, "15/03/2023"),
            (FieldName::TaxableBase, "150000"),
            (FieldName::TaxRate, "6"),
            (FieldName::TaxDue, "9000"),
            (FieldName::LiquidationDate, "10/04/2023"),
        ]
    }

    #[test]
    fn test_complete_records_are_valid() {
        let result = validator().validate(&escritura(&complete_escritura()));
        assert!(result.is_valid, "{:?}", result.field_errors);

        let result = validator().validate(&modelo(&complete_modelo()));
        assert!(result.is_valid, "{:?}", result.field_errors);
    }

    #[test]
    fn test_two_missing_fields_yield_two_errors() {
        let pairs: Vec<_> = complete_escritura()
            .into_iter()
            .filter(|(name, _)| !matches!(name, FieldName::BuyerName | FieldName::SalePrice))
            .collect();

        let result = validator().validate(&escritura(&pairs));

        assert!(!result.is_valid);
        assert_eq!(result.field_errors.len(), 2);
        assert!(result
            .field_errors
            .iter()
            .all(|e| e.kind == FieldErrorKind::MissingField));
        assert_eq!(
            result.field_errors.iter().map(|e| e.field).collect::<Vec<_>>(),
            vec![FieldName::BuyerName, FieldName::SalePrice]
        );
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut pairs = complete_escritura();
        pairs.retain(|(name, _)| *name != FieldName::NotaryName);
        pairs.push((FieldName::NotaryName, "   "));

        let result = validator().validate(&escritura(&pairs));
        assert_eq!(result.field_errors.len(), 1);
        assert_eq!(result.field_errors[0].kind, FieldErrorKind::MissingField);
    }

    #[test]
    fn test_identifier_sub_reason_attached() {
        let mut pairs = complete_escritura();
        pairs.retain(|(name, _)| *name != FieldName::BuyerId);
        pairs.push((FieldName::BuyerId, "12345678X"));

        let result = validator().validate(&escritura(&pairs));
        let error = result.errors_for(FieldName::BuyerId).next().unwrap();
        assert_eq!(error.kind, FieldErrorKind::InvalidIdentifier);
        assert_eq!(
            error.identifier_error,
            Some(IdentifierError::ChecksumMismatch {
                expected: 'Z',
                found: 'X'
            })
        );
    }

    #[test]
    fn test_all_findings_accumulate() {
        let pairs = vec![
            (FieldName::NotaryName, "María López"),
            (FieldName::DeedDate, "31/02/2023"),
            (FieldName::CadastralReference, "123"),
            (FieldName::PropertyAddress, "C/ Mayor 5"),
            (FieldName::BuyerId, "12345678X"),
            (FieldName::BuyerName, "Juan Pérez"),
            (FieldName::SellerId, "nope"),
            (FieldName::SalePrice, "-5"),
        ];

        let result = validator().validate(&escritura(&pairs));
        let kinds: Vec<(FieldName, FieldErrorKind)> =
            result.field_errors.iter().map(|e| (e.field, e.kind)).collect();

        assert_eq!(
            kinds,
            vec![
                (FieldName::DeedDate, FieldErrorKind::InvalidDate),
                (FieldName::CadastralReference, FieldErrorKind::InvalidIdentifier),
                (FieldName::BuyerId, FieldErrorKind::InvalidIdentifier),
                (FieldName::SellerId, FieldErrorKind::InvalidIdentifier),
                (FieldName::SellerName, FieldErrorKind::MissingField),
                (FieldName::SalePrice, FieldErrorKind::InvalidAmount),
            ]
        );
    }

    #[test]
    fn test_date_range() {
        let mut pairs = complete_escritura();
        pairs.retain(|(name, _)| *name != FieldName::DeedDate);

        let mut old = pairs.clone();
        old.push((FieldName::DeedDate, "01/01/1850"));
        let result = validator().validate(&escritura(&old));
        assert_eq!(result.errors_of(FieldErrorKind::InvalidDate).count(), 1);

        let mut tomorrow = pairs.clone();
        tomorrow.push((FieldName::DeedDate, "02/06/2024"));
        assert!(validator().validate(&escritura(&tomorrow)).is_valid);

        let mut future = pairs;
        future.push((FieldName::DeedDate, "10/06/2024"));
        let result = validator().validate(&escritura(&future));
        assert_eq!(result.errors_of(FieldErrorKind::InvalidDate).count(), 1);
    }

    #[test]
    fn test_tax_calculation_checked() {
        let mut pairs = complete_modelo();
        pairs.retain(|(name, _)| *name != FieldName::TaxDue);
        pairs.push((FieldName::TaxDue, "9.500,00"));

        let result = validator().validate(&modelo(&pairs));
        let errors: Vec<_> = result.errors_of(FieldErrorKind::InconsistentCalculation).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, FieldName::TaxDue);
    }

    #[test]
    fn test_tax_calculation_tolerance_is_configurable() {
        let mut pairs = complete_modelo();
        pairs.retain(|(name, _)| *name != FieldName::TaxDue);
        pairs.push((FieldName::TaxDue, "9000,40"));

        assert!(!validator().validate(&modelo(&pairs)).is_valid);

        let lenient = Validator::new(ValidationConfig {
            calculation_tolerance: 0.5,
            ..ValidationConfig::default()
        })
        .with_reference_date(today());
        assert!(lenient.validate(&modelo(&pairs)).is_valid);
    }

    #[test]
    fn test_reduced_rate_below_one_percent() {
        let mut pairs = complete_modelo();
        pairs.retain(|(name, _)| !matches!(name, FieldName::TaxRate | FieldName::TaxDue));
        pairs.push((FieldName::TaxRate, "0,75 %"));
        pairs.push((FieldName::TaxDue, "1.125,00"));

        assert!(validator().validate(&modelo(&pairs)).is_valid);
    }

    #[test]
    fn test_oversized_amounts_are_findings() {
        let mut pairs = complete_modelo();
        pairs.retain(|(name, _)| *name != FieldName::TaxableBase);
        pairs.push((FieldName::TaxableBase, "79228162514264337593543950335"));

        let result = validator().validate(&modelo(&pairs));
        let errors: Vec<_> = result.errors_of(FieldErrorKind::InconsistentCalculation).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, FieldName::TaxDue);
        assert!(errors[0].message.contains("out of range"), "{}", errors[0].message);
    }

    #[test]
    fn test_declared_value_overflowing_difference() {
        let mut pairs = complete_modelo();
        pairs.retain(|(name, _)| *name != FieldName::TaxableBase);
        pairs.push((FieldName::TaxableBase, "-79228162514264337593543950335"));
        pairs.push((FieldName::DeclaredValue, "79228162514264337593543950335"));

        let result = validator().validate(&modelo(&pairs));
        assert!(result
            .errors_for(FieldName::TaxableBase)
            .any(|e| e.kind == FieldErrorKind::InconsistentCalculation));
        assert!(result
            .errors_for(FieldName::TaxableBase)
            .any(|e| e.kind == FieldErrorKind::InvalidAmount));
    }

    #[test]
    fn test_identifier_lists_checked_per_identifier() {
        let mut pairs = complete_escritura();
        pairs.retain(|(name, _)| !matches!(name, FieldName::BuyerId | FieldName::SellerId));
        pairs.push((FieldName::BuyerId, "12345678Z; X1234567L"));
        pairs.push((FieldName::SellerId, "B12345674, 12345678X"));

        let result = validator().validate(&escritura(&pairs));
        let errors: Vec<_> = result.field_errors.iter().map(|e| (e.field, e.kind)).collect();
        assert_eq!(
            errors,
            vec![(FieldName::SellerId, FieldErrorKind::InvalidIdentifier)]
        );
        assert_eq!(
            result.normalized_record.value(FieldName::BuyerId),
            Some("12345678Z,X1234567L")
        );
    }

    #[test]
    fn test_transferor_shares() {
        let with_shares = |ids: &'static str, shares: &'static str| {
            let mut pairs = complete_modelo();
            pairs.push((FieldName::TransferorId, ids));
            pairs.push((FieldName::TransferorShares, shares));
            validator().validate(&modelo(&pairs))
        };

        assert!(with_shares("X1234567L; B12345674", "50 %; 50 %").is_valid);
        assert!(with_shares("X1234567L; B12345674; 12345678Z", "33,33; 33,33; 33,34").is_valid);

        let result = with_shares("X1234567L; B12345674", "60; 30");
        let errors: Vec<_> = result.errors_of(FieldErrorKind::InconsistentCalculation).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("90%"), "{}", errors[0].message);

        let result = with_shares("X1234567L; B12345674", "100");
        assert!(result
            .errors_of(FieldErrorKind::InconsistentCalculation)
            .any(|e| e.message == "1 transferor share(s) for 2 transferor(s)"));

        let result = with_shares("X1234567L", "mitad");
        assert_eq!(result.errors_of(FieldErrorKind::InvalidAmount).count(), 1);
        assert_eq!(result.errors_of(FieldErrorKind::InconsistentCalculation).count(), 0);
    }

    #[test]
    fn test_percentage_and_date_order() {
        let mut pairs = complete_modelo();
        pairs.retain(|(name, _)| *name != FieldName::LiquidationDate);
        pairs.push((FieldName::LiquidationDate, "01/03/2023"));
        pairs.push((FieldName::TransferredPercentage, "150"));
        pairs.push((FieldName::DeclaredValue, "160000"));

        let result = validator().validate(&modelo(&pairs));
        let kinds: Vec<(FieldName, FieldErrorKind)> =
            result.field_errors.iter().map(|e| (e.field, e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (FieldName::TransferredPercentage, FieldErrorKind::InvalidAmount),
                (FieldName::TaxableBase, FieldErrorKind::InconsistentCalculation),
                (FieldName::LiquidationDate, FieldErrorKind::InvalidDate),
            ]
        );
    }

    #[test]
    fn test_normalized_record() {
        let result = validator().validate(&escritura(&complete_escritura()));
        let record = &result.normalized_record;

        assert_eq!(record.value(FieldName::DeedDate), Some("2023-03-15"));
        assert_eq!(record.value(FieldName::SalePrice), Some("150000"));
        assert_eq!(record.value(FieldName::BuyerName), Some("juan perez garcia"));
        assert_eq!(record.value(FieldName::PropertyAddress), Some("calle mayor 5 madrid"));
        assert_eq!(record.id(), "esc-1");
    }
}
