//! Date parsing for Spanish notarial documents.

use chrono::NaiveDate;

use super::patterns::{DATE_DMY, DATE_IN_TEXT, DATE_ISO, DATE_SPANISH_LONG};
use super::{ExtractionMatch, FieldExtractor};

/// Canonical date layout.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d";

/// Parse a single date value.
///
/// Accepts `DD/MM/YYYY` (also `-` and `.` separators, two-digit years),
/// ISO `YYYY-MM-DD` and `DD de <mes> de YYYY`.
pub fn parse_spanish_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim().trim_end_matches('.').to_lowercase();

    if let Some(caps) = DATE_ISO.captures(&s) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_DMY.captures(&s) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = parse_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_SPANISH_LONG.captures(&fold_month_accents(&s)) {
        let day: u32 = caps[1].parse().ok()?;
        let month = spanish_month_to_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// Canonical `YYYY-MM-DD` rendering.
pub fn format_date(date: NaiveDate) -> String {
    date.format(CANONICAL_FORMAT).to_string()
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    if s.len() <= 2 {
        // Two-digit year: 00-50 is 20xx, 51-99 is 19xx
        Some(if year <= 50 { 2000 + year } else { 1900 + year })
    } else {
        Some(year)
    }
}

fn fold_month_accents(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' => 'u',
            _ => c,
        })
        .collect()
}

fn spanish_month_to_number(month: &str) -> Option<u32> {
    Some(match month {
        "enero" => 1,
        "febrero" => 2,
        "marzo" => 3,
        "abril" => 4,
        "mayo" => 5,
        "junio" => 6,
        "julio" => 7,
        "agosto" => 8,
        "septiembre" | "setiembre" => 9,
        "octubre" => 10,
        "noviembre" => 11,
        "diciembre" => 12,
        _ => return None,
    })
}

/// Date extractor for free text.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        for m in DATE_IN_TEXT.find_iter(text) {
            let Some(date) = parse_spanish_date(m.as_str()) else {
                continue;
            };
            if results.iter().any(|r| r.value == date) {
                continue;
            }

            // Written-out dates are less likely to be OCR noise
            let confidence = if m.as_str().chars().any(char::is_alphabetic) {
                0.95
            } else {
                0.9
            };

            results.push(
                ExtractionMatch::new(date, confidence, m.as_str())
                    .with_position(m.start(), m.end()),
            );
        }

        results
    }
}
