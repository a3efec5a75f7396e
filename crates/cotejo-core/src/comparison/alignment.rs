//! Fixed correspondence between Escritura and Modelo 600 fields.

use crate::models::document::{FieldName, FieldType};

/// How the two values of a pair are scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairRule {
    /// Field-type similarity of the normalized values.
    Similarity,
    /// Escritura amount is scaled by the transferred percentage, or
    /// compared against the total of co-filed forms.
    Prorated,
    /// Every Modelo 600 identifier must appear in the Escritura list.
    ModeloSubset,
    /// Every Escritura identifier must appear in the Modelo 600 list.
    EscrituraSubset,
    /// Both sides are reduced to urban or rustic before comparing.
    PropertyClass,
}

/// One aligned pair of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPair {
    /// Name reported in `FieldComparison::field_pair`.
    pub name: &'static str,
    pub escritura: FieldName,
    pub modelo: FieldName,
    pub field_type: FieldType,

    /// Both sides absent is reported rather than skipped.
    pub required: bool,

    pub rule: PairRule,
}

impl FieldPair {
    const fn new(
        name: &'static str,
        escritura: FieldName,
        modelo: FieldName,
        field_type: FieldType,
        required: bool,
    ) -> Self {
        Self {
            name,
            escritura,
            modelo,
            field_type,
            required,
            rule: PairRule::Similarity,
        }
    }

    const fn rule(mut self, rule: PairRule) -> Self {
        self.rule = rule;
        self
    }
}

/// Aligned pairs in report order. Fields without a counterpart (protocol
/// number, tax rate, tax due, ...) only appear in validation results.
pub const ALIGNMENT: &[FieldPair] = &[
    FieldPair::new(
        "cadastral_reference",
        FieldName::CadastralReference,
        FieldName::CadastralReference,
        FieldType::CadastralReference,
        true,
    ),
    FieldPair::new(
        "buyer_id",
        FieldName::BuyerId,
        FieldName::TaxpayerId,
        FieldType::Identifier,
        true,
    )
    .rule(PairRule::ModeloSubset),
    FieldPair::new(
        "seller_id",
        FieldName::SellerId,
        FieldName::TransferorId,
        FieldType::Identifier,
        false,
    )
    .rule(PairRule::EscrituraSubset),
    FieldPair::new(
        "buyer_name",
        FieldName::BuyerName,
        FieldName::TaxpayerName,
        FieldType::Text,
        false,
    ),
    FieldPair::new(
        "property_address",
        FieldName::PropertyAddress,
        FieldName::PropertyAddress,
        FieldType::Address,
        false,
    ),
    FieldPair::new(
        "transfer_date",
        FieldName::DeedDate,
        FieldName::AccrualDate,
        FieldType::Date,
        true,
    ),
    FieldPair::new(
        "price",
        FieldName::SalePrice,
        FieldName::TaxableBase,
        FieldType::Numeric,
        true,
    )
    .rule(PairRule::Prorated),
    FieldPair::new(
        "property_type",
        FieldName::PropertyType,
        FieldName::PropertyNature,
        FieldType::Text,
        false,
    )
    .rule(PairRule::PropertyClass),
    FieldPair::new(
        "notary_name",
        FieldName::NotaryName,
        FieldName::NotaryName,
        FieldType::Text,
        false,
    ),
];

/// Look up an aligned pair by its reported name.
pub fn pair(name: &str) -> Option<&'static FieldPair> {
    ALIGNMENT.iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::DocumentKind;

    #[test]
    fn test_alignment_matches_schemas() {
        for pair in ALIGNMENT {
            let e = DocumentKind::Escritura.field_spec(pair.escritura).unwrap();
            let m = DocumentKind::Modelo600.field_spec(pair.modelo).unwrap();
            assert_eq!(e.field_type, pair.field_type, "{}", pair.name);
            assert_eq!(m.field_type, pair.field_type, "{}", pair.name);
        }
    }

    #[test]
    fn test_pair_names_unique() {
        for (i, p) in ALIGNMENT.iter().enumerate() {
            assert!(ALIGNMENT[i + 1..].iter().all(|q| q.name != p.name));
        }
        assert_eq!(pair("price").map(|p| p.rule), Some(PairRule::Prorated));
        assert_eq!(pair("buyer_id").map(|p| p.rule), Some(PairRule::ModeloSubset));
        assert_eq!(pair("seller_id").map(|p| p.rule), Some(PairRule::EscrituraSubset));
    }
}
