//! Fuzzy matcher: similarity scores in `[0, 1]` between field values.

use std::collections::BTreeSet;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::models::config::MatchingConfig;
use crate::models::document::FieldType;
use crate::normalize::{normalize, Normalized};

/// Field-type aware similarity scoring.
#[derive(Debug, Clone, Default)]
pub struct FuzzyMatcher {
    config: MatchingConfig,
}

impl FuzzyMatcher {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Configured match threshold for a field type.
    pub fn threshold(&self, field_type: FieldType) -> f64 {
        self.config.thresholds.for_type(field_type)
    }

    /// Similarity of two raw values; both are normalized first.
    pub fn similarity(&self, a: &str, b: &str, field_type: FieldType) -> f64 {
        let a = normalize(a, field_type);
        let b = normalize(b, field_type);
        self.similarity_normalized(&a, &b, field_type)
    }

    /// Similarity of two already normalized values.
    pub fn similarity_normalized(&self, a: &Normalized, b: &Normalized, field_type: FieldType) -> f64 {
        match (a.is_empty(), b.is_empty()) {
            (true, true) => return 1.0,
            (true, false) | (false, true) => return 0.0,
            _ => {}
        }

        match field_type {
            FieldType::Text | FieldType::Address => text_similarity(
                &a.value,
                &b.value,
                self.config.token_weight,
                self.config.token_match,
            ),
            FieldType::Numeric => self.numeric_similarity(a, b),
            FieldType::Date | FieldType::Identifier | FieldType::CadastralReference => {
                exact(&a.value, &b.value)
            }
        }
    }

    /// Whether a score clears the threshold for its field type.
    pub fn is_match(&self, similarity: f64, field_type: FieldType) -> bool {
        similarity >= self.threshold(field_type)
    }

    fn numeric_similarity(&self, a: &Normalized, b: &Normalized) -> f64 {
        if a.best_effort || b.best_effort {
            return exact(&a.value, &b.value);
        }

        match (Decimal::from_str(&a.value), Decimal::from_str(&b.value)) {
            (Ok(x), Ok(y)) => relative_similarity(x, y, self.config.numeric_epsilon),
            _ => exact(&a.value, &b.value),
        }
    }
}

/// Similarity with the default configuration.
pub fn similarity(a: &str, b: &str, field_type: FieldType) -> f64 {
    FuzzyMatcher::default().similarity(a, b, field_type)
}

fn exact(a: &str, b: &str) -> f64 {
    if a == b { 1.0 } else { 0.0 }
}

/// `1 - min(1, |a - b| / max(|a|, |b|, epsilon))`, with differences within
/// epsilon counted as equal.
pub fn relative_similarity(a: Decimal, b: Decimal, epsilon: f64) -> f64 {
    let Some(diff) = a.checked_sub(b) else {
        // Only opposite signs overflow, which is as far apart as it gets
        return 0.0;
    };
    let diff = diff.abs().to_f64().unwrap_or(f64::INFINITY);
    if diff <= epsilon {
        return 1.0;
    }

    let scale = a
        .abs()
        .to_f64()
        .unwrap_or(0.0)
        .max(b.abs().to_f64().unwrap_or(0.0))
        .max(epsilon);

    if scale <= 0.0 {
        return 0.0;
    }

    (1.0 - (diff / scale).min(1.0)).clamp(0.0, 1.0)
}

/// Weighted blend of soft token overlap and normalized Levenshtein.
///
/// Each token is paired with its closest token on the other side; pairs
/// scoring at least `token_match` (Jaro-Winkler) count with that score, so
/// "garcia" still covers "garcai". The edit ratio is taken over the
/// token-sorted strings so that "perez garcia juan" and "juan perez garcia"
/// are identical.
pub fn text_similarity(a: &str, b: &str, token_weight: f64, token_match: f64) -> f64 {
    let sorted_a = sorted_tokens(a);
    let sorted_b = sorted_tokens(b);
    if sorted_a == sorted_b {
        return 1.0;
    }

    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    let total = tokens_a.len() + tokens_b.len();
    let overlap = if total == 0 {
        0.0
    } else {
        (soft_cover(&tokens_a, &tokens_b, token_match) + soft_cover(&tokens_b, &tokens_a, token_match))
            / total as f64
    };

    let edit = strsim::normalized_levenshtein(&sorted_a, &sorted_b);

    (token_weight * overlap + (1.0 - token_weight) * edit).clamp(0.0, 1.0)
}

/// Sum over `from` of the best token score found in `to`.
fn soft_cover(from: &BTreeSet<&str>, to: &BTreeSet<&str>, token_match: f64) -> f64 {
    from.iter()
        .map(|x| {
            let best = to.iter().map(|y| token_score(x, y)).fold(0.0, f64::max);
            if best >= token_match { best } else { 0.0 }
        })
        .sum()
}

fn token_score(x: &str, y: &str) -> f64 {
    if x == y {
        return 1.0;
    }
    strsim::jaro_winkler(x, y).max(strsim::jaro_winkler(y, x))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
