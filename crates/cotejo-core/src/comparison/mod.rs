//! Comparison engine: reconciles an Escritura against its Modelo 600.
//!
//! The engine selects the best candidate form, validates both documents,
//! compares every aligned field pair and aggregates the per-field verdicts
//! into a [`ComparisonReport`]. It is a pure function of its inputs and
//! configuration (including the validator's reference date).

pub mod alignment;
pub mod selection;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

pub use alignment::{pair, FieldPair, PairRule, ALIGNMENT};
pub use selection::{co_filed, coverage, reference_score, select_candidate, Selection};

use crate::error::SchemaError;
use crate::matching::FuzzyMatcher;
use crate::models::config::{ComparisonConfig, CotejoConfig};
use crate::models::document::{DocumentKind, DocumentRecord, FieldName};
use crate::models::report::{
    ComparisonReport, FieldComparison, FieldErrorKind, OverallVerdict, Verdict,
};
use crate::normalize::{normalize, property_class, Normalized};
use crate::rules::{canonical_amount, identifier_set, parcel_of, parse_amount};
use crate::validation::Validator;

/// Cross-document comparison engine.
#[derive(Debug, Clone)]
pub struct ComparisonEngine {
    matcher: FuzzyMatcher,
    validator: Validator,
    config: ComparisonConfig,
}

impl Default for ComparisonEngine {
    fn default() -> Self {
        Self::new(&CotejoConfig::default())
    }
}

impl ComparisonEngine {
    pub fn new(config: &CotejoConfig) -> Self {
        Self {
            matcher: FuzzyMatcher::new(config.matching.clone()),
            validator: Validator::new(config.validation.clone()),
            config: config.comparison.clone(),
        }
    }

    /// Pin the reference date used by date-range validation.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.validator = self.validator.with_reference_date(date);
        self
    }

    pub fn matcher(&self) -> &FuzzyMatcher {
        &self.matcher
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Compare an Escritura against one or more Modelo 600 candidates.
    pub fn compare(
        &self,
        escritura: &DocumentRecord,
        candidates: &[DocumentRecord],
    ) -> Result<ComparisonReport, SchemaError> {
        escritura.expect_kind(DocumentKind::Escritura)?;
        for candidate in candidates {
            candidate.expect_kind(DocumentKind::Modelo600)?;
        }

        let selection = select_candidate(
            &self.matcher,
            escritura,
            candidates,
            self.config.min_reference_match,
        )?;
        let modelo = &candidates[selection.index];

        info!(
            "Comparing escritura {} against modelo {} ({} candidate(s))",
            escritura.id(),
            modelo.id(),
            candidates.len()
        );

        let mut notes = Vec::new();
        if selection.low_confidence {
            let score = selection.scores[selection.index].reference_score;
            warn!(
                "Low-confidence match for escritura {}: best candidate {} scored {:.2}",
                escritura.id(),
                modelo.id(),
                score
            );
            notes.push(format!(
                "low-confidence match: best candidate {} scored {:.2} (minimum {:.2})",
                modelo.id(),
                score,
                self.config.min_reference_match
            ));
        }

        let group = co_filed(escritura, candidates, selection.index);
        let co_filing = (group.len() > 1).then(|| CoFiling::new(&group, candidates));
        if let Some(co_filing) = &co_filing {
            info!(
                "Escritura {} reconciled against co-filed modelos {}",
                escritura.id(),
                co_filing.ids.join(", ")
            );
        }

        let field_comparisons: Vec<FieldComparison> = ALIGNMENT
            .iter()
            .filter_map(|pair| self.compare_pair(pair, escritura, modelo, co_filing.as_ref()))
            .collect();

        let escritura_validation = self.validator.validate(escritura);
        let modelo_validation = self.validator.validate(modelo);

        let missing: Vec<String> = [
            ("escritura", &escritura_validation),
            ("modelo", &modelo_validation),
        ]
        .into_iter()
        .flat_map(|(label, result)| {
            result
                .errors_of(FieldErrorKind::MissingField)
                .map(move |e| format!("{} {}", label, e.field))
        })
        .collect();

        let overall_verdict = aggregate(&field_comparisons, selection.low_confidence, !missing.is_empty());
        if selection.low_confidence
            && field_comparisons.iter().any(|c| c.verdict == Verdict::Mismatch)
        {
            notes.push(
                "mismatches reported against a low-confidence candidate; verdict held at incomplete"
                    .to_string(),
            );
        }
        if !missing.is_empty() {
            notes.push(format!("required field(s) missing: {}", missing.join(", ")));
        }

        for (label, result) in [
            ("escritura", &escritura_validation),
            ("modelo", &modelo_validation),
        ] {
            if !result.is_valid {
                notes.push(format!(
                    "{} has {} validation finding(s)",
                    label,
                    result.field_errors.len()
                ));
            }
        }

        debug!(
            "Comparison {} / {}: {:?}",
            escritura.id(),
            modelo.id(),
            overall_verdict
        );

        let matched_modelos = group
            .iter()
            .map(|&index| candidates[index].id().to_string())
            .collect();

        Ok(ComparisonReport {
            escritura_id: escritura.id().to_string(),
            modelo_id: modelo.id().to_string(),
            field_comparisons,
            overall_verdict,
            low_confidence_match: selection.low_confidence,
            candidate_scores: selection.scores,
            matched_modelos,
            notes,
            escritura_validation,
            modelo_validation,
        })
    }

    /// Compare one aligned pair; `None` when an optional pair is absent on both sides.
    fn compare_pair(
        &self,
        pair: &FieldPair,
        escritura: &DocumentRecord,
        modelo: &DocumentRecord,
        co_filing: Option<&CoFiling>,
    ) -> Option<FieldComparison> {
        let co_filing = co_filing.filter(|_| pair.rule == PairRule::Prorated);
        let group_total = co_filing.and_then(|c| c.total).map(canonical_amount);

        let raw_e = escritura.value(pair.escritura);
        let raw_m = group_total.as_deref().or_else(|| modelo.value(pair.modelo));
        let threshold = self.matcher.threshold(pair.field_type);

        let mut row = FieldComparison {
            field_pair: pair.name.to_string(),
            escritura_field: pair.escritura,
            modelo_field: pair.modelo,
            field_type: pair.field_type,
            escritura_value: raw_e.map(str::to_string),
            modelo_value: raw_m.map(str::to_string),
            similarity: 0.0,
            threshold,
            verdict: Verdict::Inconclusive,
            note: None,
        };

        let (raw_e, raw_m) = match (raw_e, raw_m) {
            (None, None) if !pair.required => return None,
            (None, None) => {
                row.note = Some("absent in both documents".to_string());
                return Some(row);
            }
            (None, Some(_)) => {
                row.verdict = Verdict::MissingInEscritura;
                return Some(row);
            }
            (Some(_), None) => {
                row.verdict = Verdict::MissingInModelo;
                return Some(row);
            }
            (Some(e), Some(m)) => (e, m),
        };

        let mut norm_e = normalize(raw_e, pair.field_type);
        let mut norm_m = normalize(raw_m, pair.field_type);

        match pair.rule {
            PairRule::Similarity => {}
            PairRule::Prorated => match co_filing {
                Some(co_filing) => row.note = Some(co_filing.note()),
                None => {
                    if let Some((prorated, note)) = prorate(&norm_e, modelo) {
                        norm_e = prorated;
                        row.note = Some(note);
                    }
                }
            },
            PairRule::ModeloSubset | PairRule::EscrituraSubset => {
                let escritura_ids = identifier_set(raw_e);
                let modelo_ids = identifier_set(raw_m);
                let (ids, within, side) = if pair.rule == PairRule::ModeloSubset {
                    (&modelo_ids, &escritura_ids, pair.escritura)
                } else {
                    (&escritura_ids, &modelo_ids, pair.modelo)
                };

                row.similarity = coverage(ids, within);
                row.verdict = classify(row.similarity, threshold, &norm_e, &norm_m);
                if row.verdict == Verdict::Mismatch {
                    let absent: Vec<&str> = ids.difference(within).map(String::as_str).collect();
                    row.note = Some(format!("{} not in {}", absent.join(", "), side));
                }
                return Some(row);
            }
            PairRule::PropertyClass => {
                norm_e = property_class_of(norm_e);
                norm_m = property_class_of(norm_m);
            }
        }

        row.similarity = self
            .matcher
            .similarity_normalized(&norm_e, &norm_m, pair.field_type);
        row.verdict = classify(row.similarity, threshold, &norm_e, &norm_m);

        if row.verdict == Verdict::Inconclusive {
            row.note = Some(match pair.rule {
                PairRule::PropertyClass => "property class not recognised; compared as text".to_string(),
                _ => "value could not be normalized; compared as text".to_string(),
            });
        } else if row.verdict == Verdict::Mismatch && pair.escritura == FieldName::CadastralReference {
            if let (Some(a), Some(b)) = (parcel_of(&norm_e.value), parcel_of(&norm_m.value)) {
                if a == b {
                    row.note = Some(format!("same parcel {}, different unit", a));
                }
            }
        }

        Some(row)
    }
}

/// Forms co-buyers filed for one property, compared as a whole on price.
#[derive(Debug)]
struct CoFiling {
    ids: Vec<String>,
    /// Sum of the taxable bases; `None` when one is missing or unreadable.
    total: Option<Decimal>,
}

impl CoFiling {
    fn new(group: &[usize], candidates: &[DocumentRecord]) -> Self {
        let forms: Vec<&DocumentRecord> = group.iter().map(|&index| &candidates[index]).collect();
        let total = forms.iter().try_fold(Decimal::ZERO, |total, form| {
            let base = form
                .value(FieldName::TaxableBase)
                .or_else(|| form.value(FieldName::DeclaredValue))
                .and_then(parse_amount)?;
            total.checked_add(base)
        });

        Self {
            ids: forms.iter().map(|form| form.id().to_string()).collect(),
            total,
        }
    }

    fn note(&self) -> String {
        match self.total {
            Some(total) => format!(
                "taxable bases of modelos {} add up to {}",
                self.ids.join(", "),
                canonical_amount(total)
            ),
            None => format!(
                "modelos {} filed for the same property could not be added up",
                self.ids.join(", ")
            ),
        }
    }
}

fn property_class_of(value: Normalized) -> Normalized {
    match property_class(&value.value) {
        Some(class) => Normalized {
            value: class.to_string(),
            best_effort: false,
        },
        None => Normalized {
            best_effort: true,
            ..value
        },
    }
}

/// Verdict of a pair with both values present.
fn classify(similarity: f64, threshold: f64, a: &Normalized, b: &Normalized) -> Verdict {
    if a.is_empty() || b.is_empty() {
        Verdict::Inconclusive
    } else if similarity >= threshold {
        Verdict::Match
    } else if a.best_effort || b.best_effort {
        Verdict::Inconclusive
    } else {
        Verdict::Mismatch
    }
}

/// Scale the Escritura price to the share a partial Modelo 600 declares.
fn prorate(price: &Normalized, modelo: &DocumentRecord) -> Option<(Normalized, String)> {
    if price.best_effort {
        return None;
    }

    let percentage = modelo
        .value(FieldName::TransferredPercentage)
        .and_then(parse_amount)
        .filter(|p| *p > Decimal::ZERO && *p < Decimal::ONE_HUNDRED)?;
    let amount = parse_amount(&price.value)?;

    let share = amount
        .checked_mul(percentage)?
        .checked_div(Decimal::ONE_HUNDRED)?
        .round_dp(2);
    let value = canonical_amount(share);
    let note = format!(
        "sale price {} prorated to {}% = {}",
        price.value,
        percentage.normalize(),
        value
    );

    Some((
        Normalized {
            value,
            best_effort: false,
        },
        note,
    ))
}

/// Document-level verdict.
///
/// Any mismatch makes the pair discrepant, unless the candidate itself is
/// a low-confidence match, in which case the result is incomplete. A
/// required field missing from either document also makes it incomplete.
pub fn aggregate(comparisons: &[FieldComparison], low_confidence: bool, missing_required: bool) -> OverallVerdict {
    if low_confidence {
        return OverallVerdict::Incomplete;
    }

    if comparisons.iter().any(|c| c.verdict == Verdict::Mismatch) {
        OverallVerdict::Discrepant
    } else if missing_required
        || comparisons
            .iter()
            .any(|c| c.verdict.is_missing() || c.verdict == Verdict::Inconclusive)
    {
        OverallVerdict::Incomplete
    } else {
        OverallVerdict::Consistent
    }
}
