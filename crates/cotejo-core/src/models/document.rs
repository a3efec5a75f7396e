//! Document records for the two supported notarial document kinds.
//!
//! A record is a fixed mapping from [`FieldName`] to [`ExtractedField`].
//! Every field must belong to the schema of the record's [`DocumentKind`];
//! untrusted input enters through [`RawDocument`] and is checked by
//! [`DocumentRecord::from_raw`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Supported document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Notarial deed of sale (escritura de compraventa).
    Escritura,
    /// Property-transfer tax self-assessment (Modelo 600).
    Modelo600,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Escritura => "escritura",
            DocumentKind::Modelo600 => "modelo600",
        }
    }

    /// Parse a document kind, tolerating the spellings extraction
    /// providers commonly emit ("Modelo 600", "modelo_600", "tax_form").
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        match key.as_str() {
            "escritura" | "deed" | "escrituradecompraventa" => Some(DocumentKind::Escritura),
            "modelo600" | "m600" | "autoliquidacion" | "taxform" => Some(DocumentKind::Modelo600),
            _ => None,
        }
    }

    /// The fixed schema for this kind, in canonical field order.
    pub fn schema(&self) -> &'static [FieldSpec] {
        match self {
            DocumentKind::Escritura => ESCRITURA_SCHEMA,
            DocumentKind::Modelo600 => MODELO600_SCHEMA,
        }
    }

    /// Look up a field in this kind's schema.
    pub fn field_spec(&self, name: FieldName) -> Option<&'static FieldSpec> {
        self.schema().iter().find(|spec| spec.name == name)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every field name known to either schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    NotaryName,
    ProtocolNumber,
    DeedDate,
    CadastralReference,
    PropertyAddress,
    PropertyType,
    BuyerId,
    BuyerName,
    SellerId,
    SellerName,
    SalePrice,
    TaxpayerId,
    TaxpayerName,
    TransferorId,
    TransferorShares,
    PropertyNature,
    AccrualDate,
    DeclaredValue,
    TransferredPercentage,
    TaxableBase,
    TaxRate,
    TaxDue,
    LiquidationDate,
}

impl FieldName {
    pub const ALL: [FieldName; 23] = [
        FieldName::NotaryName,
        FieldName::ProtocolNumber,
        FieldName::DeedDate,
        FieldName::CadastralReference,
        FieldName::PropertyAddress,
        FieldName::PropertyType,
        FieldName::BuyerId,
        FieldName::BuyerName,
        FieldName::SellerId,
        FieldName::SellerName,
        FieldName::SalePrice,
        FieldName::TaxpayerId,
        FieldName::TaxpayerName,
        FieldName::TransferorId,
        FieldName::TransferorShares,
        FieldName::PropertyNature,
        FieldName::AccrualDate,
        FieldName::DeclaredValue,
        FieldName::TransferredPercentage,
        FieldName::TaxableBase,
        FieldName::TaxRate,
        FieldName::TaxDue,
        FieldName::LiquidationDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::NotaryName => "notary_name",
            FieldName::ProtocolNumber => "protocol_number",
            FieldName::DeedDate => "deed_date",
            FieldName::CadastralReference => "cadastral_reference",
            FieldName::PropertyAddress => "property_address",
            FieldName::PropertyType => "property_type",
            FieldName::BuyerId => "buyer_id",
            FieldName::BuyerName => "buyer_name",
            FieldName::SellerId => "seller_id",
            FieldName::SellerName => "seller_name",
            FieldName::SalePrice => "sale_price",
            FieldName::TaxpayerId => "taxpayer_id",
            FieldName::TaxpayerName => "taxpayer_name",
            FieldName::TransferorId => "transferor_id",
            FieldName::TransferorShares => "transferor_shares",
            FieldName::PropertyNature => "property_nature",
            FieldName::AccrualDate => "accrual_date",
            FieldName::DeclaredValue => "declared_value",
            FieldName::TransferredPercentage => "transferred_percentage",
            FieldName::TaxableBase => "taxable_base",
            FieldName::TaxRate => "tax_rate",
            FieldName::TaxDue => "tax_due",
            FieldName::LiquidationDate => "liquidation_date",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.iter().copied().find(|name| name.as_str() == s)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a field's values are normalized and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Free text such as person or notary names.
    Text,
    /// Postal address; text with street abbreviations expanded.
    Address,
    /// Calendar date.
    Date,
    /// Amounts, rates and percentages.
    Numeric,
    /// Spanish NIF / NIE / CIF.
    Identifier,
    /// Catastro parcel reference.
    CadastralReference,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Address => "address",
            FieldType::Date => "date",
            FieldType::Numeric => "numeric",
            FieldType::Identifier => "identifier",
            FieldType::CadastralReference => "cadastral_reference",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a document schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: FieldName,
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldSpec {
    const fn required(name: FieldName, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
        }
    }

    const fn optional(name: FieldName, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
        }
    }
}

const ESCRITURA_SCHEMA: &[FieldSpec] = &[
    FieldSpec::required(FieldName::NotaryName, FieldType::Text),
    FieldSpec::optional(FieldName::ProtocolNumber, FieldType::Text),
    FieldSpec::required(FieldName::DeedDate, FieldType::Date),
    FieldSpec::required(FieldName::CadastralReference, FieldType::CadastralReference),
    FieldSpec::required(FieldName::PropertyAddress, FieldType::Address),
    FieldSpec::optional(FieldName::PropertyType, FieldType::Text),
    FieldSpec::required(FieldName::BuyerId, FieldType::Identifier),
    FieldSpec::required(FieldName::BuyerName, FieldType::Text),
    FieldSpec::required(FieldName::SellerId, FieldType::Identifier),
    FieldSpec::required(FieldName::SellerName, FieldType::Text),
    FieldSpec::required(FieldName::SalePrice, FieldType::Numeric),
];

const MODELO600_SCHEMA: &[FieldSpec] = &[
    FieldSpec::required(FieldName::TaxpayerId, FieldType::Identifier),
    FieldSpec::optional(FieldName::TaxpayerName, FieldType::Text),
    FieldSpec::optional(FieldName::TransferorId, FieldType::Identifier),
    FieldSpec::optional(FieldName::TransferorShares, FieldType::Text),
    FieldSpec::required(FieldName::CadastralReference, FieldType::CadastralReference),
    FieldSpec::optional(FieldName::PropertyAddress, FieldType::Address),
    FieldSpec::optional(FieldName::PropertyNature, FieldType::Text),
    FieldSpec::optional(FieldName::NotaryName, FieldType::Text),
    FieldSpec::required(FieldName::AccrualDate, FieldType::Date),
    FieldSpec::optional(FieldName::DeclaredValue, FieldType::Numeric),
    FieldSpec::optional(FieldName::TransferredPercentage, FieldType::Numeric),
    FieldSpec::required(FieldName::TaxableBase, FieldType::Numeric),
    FieldSpec::required(FieldName::TaxRate, FieldType::Numeric),
    FieldSpec::required(FieldName::TaxDue, FieldType::Numeric),
    FieldSpec::required(FieldName::LiquidationDate, FieldType::Date),
];

/// A single datum pulled from a document by an extraction provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireField")]
pub struct ExtractedField {
    /// Raw extracted value; `None` when extraction failed.
    pub value: Option<String>,

    /// Provider confidence (0.0 - 1.0), when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl ExtractedField {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            confidence: None,
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// The trimmed value, or `None` if absent or blank.
    pub fn text(&self) -> Option<&str> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn is_present(&self) -> bool {
        self.text().is_some()
    }
}

/// Accepted wire shapes for a field: a bare string, `null`, a bare
/// number, or `{ "value": ..., "confidence": ... }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireField {
    Bare(Option<String>),
    Number(serde_json::Number),
    Full {
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        confidence: Option<f32>,
    },
}

impl From<WireField> for ExtractedField {
    fn from(wire: WireField) -> Self {
        match wire {
            WireField::Bare(value) => Self {
                value,
                confidence: None,
            },
            WireField::Number(n) => Self {
                value: Some(n.to_string()),
                confidence: None,
            },
            WireField::Full { value, confidence } => Self { value, confidence },
        }
    }
}

/// Untrusted document shape as produced by an extraction collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub id: String,

    pub kind: String,

    #[serde(default)]
    pub fields: BTreeMap<String, ExtractedField>,
}

impl RawDocument {
    pub fn new(kind: DocumentKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.as_str().to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), ExtractedField::new(value));
        self
    }
}

/// A schema-checked document record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDocument", into = "RawDocument")]
pub struct DocumentRecord {
    id: String,
    kind: DocumentKind,
    fields: BTreeMap<FieldName, ExtractedField>,
}

impl DocumentRecord {
    /// Create an empty record of the given kind.
    pub fn new(kind: DocumentKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// Check a raw document against its kind's schema.
    pub fn from_raw(raw: RawDocument) -> Result<Self, SchemaError> {
        let id = raw.id.trim().to_string();
        if id.is_empty() {
            return Err(SchemaError::MissingId);
        }

        let kind =
            DocumentKind::parse(&raw.kind).ok_or_else(|| SchemaError::UnknownKind(raw.kind.clone()))?;

        let mut record = Self::new(kind, id);
        for (name, field) in raw.fields {
            let parsed = FieldName::parse(&name)
                .ok_or_else(|| SchemaError::UnknownField {
                    kind,
                    field: name.clone(),
                })?;
            record.insert(parsed, field)?;
        }

        Ok(record)
    }

    /// Build a record from `(field, value)` pairs.
    pub fn from_pairs(
        kind: DocumentKind,
        id: impl Into<String>,
        pairs: &[(FieldName, &str)],
    ) -> Result<Self, SchemaError> {
        let mut record = Self::new(kind, id);
        for (name, value) in pairs {
            record.insert(*name, ExtractedField::new(*value))?;
        }
        Ok(record)
    }

    /// Insert or replace a field, rejecting names outside the schema.
    pub fn insert(&mut self, name: FieldName, field: ExtractedField) -> Result<(), SchemaError> {
        if self.kind.field_spec(name).is_none() {
            return Err(SchemaError::UnknownField {
                kind: self.kind,
                field: name.as_str().to_string(),
            });
        }
        self.fields.insert(name, field);
        Ok(())
    }

    /// Fail unless this record is of the expected kind.
    pub fn expect_kind(&self, expected: DocumentKind) -> Result<(), SchemaError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(SchemaError::WrongKind {
                id: self.id.clone(),
                expected,
                found: self.kind,
            })
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn get(&self, name: FieldName) -> Option<&ExtractedField> {
        self.fields.get(&name)
    }

    /// Trimmed, non-empty value of a field.
    pub fn value(&self, name: FieldName) -> Option<&str> {
        self.get(name).and_then(ExtractedField::text)
    }

    /// Copy of this record with every present value rewritten by `f`.
    /// Absent values and confidences are carried over unchanged.
    pub fn map_values<F>(&self, mut f: F) -> Self
    where
        F: FnMut(FieldName, &str) -> String,
    {
        let fields = self
            .fields
            .iter()
            .map(|(name, field)| {
                let value = field.text().map(|v| f(*name, v));
                (
                    *name,
                    ExtractedField {
                        value,
                        confidence: field.confidence,
                    },
                )
            })
            .collect();

        Self {
            id: self.id.clone(),
            kind: self.kind,
            fields,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldName, &ExtractedField)> {
        self.fields.iter().map(|(name, field)| (*name, field))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<RawDocument> for DocumentRecord {
    type Error = SchemaError;

    fn try_from(raw: RawDocument) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

impl From<DocumentRecord> for RawDocument {
    fn from(record: DocumentRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind.as_str().to_string(),
            fields: record
                .fields
                .into_iter()
                .map(|(name, field)| (name.as_str().to_string(), field))
                .collect(),
        }
    }
}
