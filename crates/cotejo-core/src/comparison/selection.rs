//! Choosing the Modelo 600 that belongs to an Escritura.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::SchemaError;
use crate::matching::FuzzyMatcher;
use crate::models::document::{DocumentRecord, FieldName, FieldType};
use crate::models::report::CandidateScore;
use crate::rules::{format_date, identifier_set, normalize_cadastral, parse_spanish_date};

/// Outcome of candidate selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Index of the chosen candidate.
    pub index: usize,
    /// One score per candidate, in input order.
    pub scores: Vec<CandidateScore>,
    /// The chosen candidate scored below the minimum reference match.
    pub low_confidence: bool,
}

/// Reference score of a candidate: mean of cadastral similarity and the
/// share of its taxpayers found among the Escritura buyers and sellers.
pub fn reference_score(matcher: &FuzzyMatcher, escritura: &DocumentRecord, modelo: &DocumentRecord) -> f64 {
    let cadastral = present_similarity(
        matcher,
        escritura.value(FieldName::CadastralReference),
        modelo.value(FieldName::CadastralReference),
        FieldType::CadastralReference,
    );

    let parties: BTreeSet<String> = [FieldName::BuyerId, FieldName::SellerId]
        .into_iter()
        .filter_map(|party| escritura.value(party))
        .flat_map(identifier_set)
        .collect();
    let identifier = coverage(&ids_of(modelo, FieldName::TaxpayerId), &parties);

    (cadastral + identifier) / 2.0
}

/// Fraction of `ids` contained in `within`; zero for an empty list.
pub fn coverage(ids: &BTreeSet<String>, within: &BTreeSet<String>) -> f64 {
    if ids.is_empty() {
        return 0.0;
    }
    ids.intersection(within).count() as f64 / ids.len() as f64
}

/// Candidates filed for the same property by the other buyers.
///
/// Starts with `selected`. Another candidate joins when it carries the same
/// cadastral reference and its taxpayers are Escritura buyers not yet
/// covered by an earlier member; a second form from the same taxpayer is a
/// resubmission, not a co-filing.
pub fn co_filed(escritura: &DocumentRecord, candidates: &[DocumentRecord], selected: usize) -> Vec<usize> {
    let mut group = vec![selected];
    let Some(target) = candidates.get(selected).and_then(cadastral_of) else {
        return group;
    };

    let buyers = ids_of(escritura, FieldName::BuyerId);
    let mut covered = ids_of(&candidates[selected], FieldName::TaxpayerId);
    if covered.is_empty() || !covered.is_subset(&buyers) {
        return group;
    }

    for (index, candidate) in candidates.iter().enumerate() {
        if index == selected || cadastral_of(candidate).as_ref() != Some(&target) {
            continue;
        }
        let taxpayers = ids_of(candidate, FieldName::TaxpayerId);
        if !taxpayers.is_empty() && taxpayers.is_subset(&buyers) && taxpayers.is_disjoint(&covered) {
            debug!("Candidate {} co-filed with {}", candidate.id(), candidates[selected].id());
            covered.extend(taxpayers);
            group.push(index);
        }
    }

    group
}

fn ids_of(record: &DocumentRecord, field: FieldName) -> BTreeSet<String> {
    record.value(field).map(identifier_set).unwrap_or_default()
}

fn cadastral_of(record: &DocumentRecord) -> Option<String> {
    record
        .value(FieldName::CadastralReference)
        .map(normalize_cadastral)
        .filter(|reference| !reference.is_empty())
}

/// Score every candidate and pick the best.
///
/// Highest score wins; ties go to the latest liquidation date, then to
/// the earliest position.
pub fn select_candidate(
    matcher: &FuzzyMatcher,
    escritura: &DocumentRecord,
    candidates: &[DocumentRecord],
    min_reference_match: f64,
) -> Result<Selection, SchemaError> {
    if candidates.is_empty() {
        return Err(SchemaError::NoCandidates);
    }

    let ranked: Vec<(f64, Option<NaiveDate>)> = candidates
        .iter()
        .map(|candidate| {
            let score = reference_score(matcher, escritura, candidate);
            let liquidation = candidate
                .value(FieldName::LiquidationDate)
                .and_then(parse_spanish_date);
            debug!("Candidate {} reference score {:.3}", candidate.id(), score);
            (score, liquidation)
        })
        .collect();

    let index = (0..ranked.len())
        .min_by(|&a, &b| rank(&ranked[a], &ranked[b]).then(a.cmp(&b)))
        .unwrap_or(0);

    let scores = candidates
        .iter()
        .zip(&ranked)
        .enumerate()
        .map(|(position, (candidate, (score, liquidation)))| CandidateScore {
            modelo_id: candidate.id().to_string(),
            position,
            reference_score: *score,
            liquidation_date: liquidation.map(format_date),
            selected: position == index,
        })
        .collect();

    Ok(Selection {
        index,
        scores,
        low_confidence: ranked[index].0 < min_reference_match,
    })
}

/// Better candidates order first.
fn rank(a: &(f64, Option<NaiveDate>), b: &(f64, Option<NaiveDate>)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1))
}

fn present_similarity(
    matcher: &FuzzyMatcher,
    a: Option<&str>,
    b: Option<&str>,
    field_type: FieldType,
) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => matcher.similarity(a, b, field_type),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::DocumentKind;

    fn escritura() -> DocumentRecord {
        DocumentRecord::from_pairs(
            DocumentKind::Escritura,
            "esc",
            &[
                (FieldName::CadastralReference, "1234567AB1234N"),
                (FieldName::BuyerId, "12345678Z"),
                (FieldName::SellerId, "X1234567L"),
            ],
        )
        .unwrap()
    }

    fn candidate(id: &str, cadastral: &str, taxpayer: &str, liquidation: &str) -> DocumentRecord {
        DocumentRecord::from_pairs(
            DocumentKind::Modelo600,
            id,
            &[
                (FieldName::CadastralReference, cadastral),
                (FieldName::TaxpayerId, taxpayer),
                (FieldName::LiquidationDate, liquidation),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_candidates() {
        let result = select_candidate(&FuzzyMatcher::default(), &escritura(), &[], 0.5);
        assert_eq!(result, Err(SchemaError::NoCandidates));
    }

    #[test]
    fn test_best_reference_wins() {
        let candidates = vec![
            candidate("other-property", "7654321ZZ4321A", "12345678Z", "01/04/2023"),
            candidate("match", "1234567 AB1234N", "12345678Z", "01/04/2023"),
        ];
        let selection = select_candidate(&FuzzyMatcher::default(), &escritura(), &candidates, 0.5).unwrap();

        assert_eq!(selection.index, 1);
        assert!(!selection.low_confidence);
        assert_eq!(selection.scores[0].reference_score, 0.5);
        assert_eq!(selection.scores[1].reference_score, 1.0);
        assert!(selection.scores[1].selected && !selection.scores[0].selected);
    }

    #[test]
    fn test_seller_as_taxpayer_counts() {
        let candidates = vec![candidate("m", "1234567AB1234N", "X1234567L", "01/04/2023")];
        let selection = select_candidate(&FuzzyMatcher::default(), &escritura(), &candidates, 0.5).unwrap();
        assert_eq!(selection.scores[0].reference_score, 1.0);
    }

    #[test]
    fn test_taxpayer_among_several_buyers() {
        let escritura = DocumentRecord::from_pairs(
            DocumentKind::Escritura,
            "esc",
            &[
                (FieldName::CadastralReference, "1234567AB1234N"),
                (FieldName::BuyerId, "12345678Z; Y1234567X"),
            ],
        )
        .unwrap();

        let candidates = vec![candidate("m", "1234567AB1234N", "Y1234567X", "01/04/2023")];
        let selection = select_candidate(&FuzzyMatcher::default(), &escritura, &candidates, 0.5).unwrap();
        assert_eq!(selection.scores[0].reference_score, 1.0);
    }

    #[test]
    fn test_co_filed_forms_grouped_by_property() {
        let escritura = DocumentRecord::from_pairs(
            DocumentKind::Escritura,
            "esc",
            &[
                (FieldName::CadastralReference, "1234567AB1234N"),
                (FieldName::BuyerId, "12345678Z, Y1234567X"),
            ],
        )
        .unwrap();
        let candidates = vec![
            candidate("first-buyer", "1234567AB1234N", "12345678Z", "01/04/2023"),
            candidate("resubmission", "1234567AB1234N", "12345678Z", "02/04/2023"),
            candidate("other-property", "7654321ZZ4321A", "Y1234567X", "01/04/2023"),
            candidate("second-buyer", "1234567 AB1234N", "Y1234567X", "01/04/2023"),
        ];

        assert_eq!(co_filed(&escritura, &candidates, 0), vec![0, 3]);
        assert_eq!(co_filed(&escritura, &candidates, 1), vec![1, 3]);

        // Single buyer: nothing to group
        assert_eq!(co_filed(&self::escritura(), &candidates, 0), vec![0]);
    }

    #[test]
    fn test_tie_broken_by_latest_liquidation_then_position() {
        let candidates = vec![
            candidate("first", "1234567AB1234N", "12345678Z", "01/04/2023"),
            candidate("latest", "1234567AB1234N", "12345678Z", "15/05/2023"),
            candidate("also-latest", "1234567AB1234N", "12345678Z", "2023-05-15"),
        ];
        let selection = select_candidate(&FuzzyMatcher::default(), &escritura(), &candidates, 0.5).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.scores[1].liquidation_date.as_deref(), Some("2023-05-15"));
    }

    #[test]
    fn test_low_confidence_flag() {
        let candidates = vec![candidate("stranger", "7654321ZZ4321A", "B12345674", "01/04/2023")];
        let selection = select_candidate(&FuzzyMatcher::default(), &escritura(), &candidates, 0.5).unwrap();
        assert_eq!(selection.index, 0);
        assert!(selection.low_confidence);
        assert_eq!(selection.scores[0].reference_score, 0.0);
    }
}
