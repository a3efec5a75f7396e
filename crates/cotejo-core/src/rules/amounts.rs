//! Amount parsing for Spanish notarial documents.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::{AMOUNT_IN_TEXT, PERCENT_IN_TEXT};
use super::{ExtractionMatch, FieldExtractor};

/// Parse an amount in Spanish (`150.000,50 €`), plain (`150000.50`) or
/// English (`150,000.50`) notation.
///
/// When both `,` and `.` occur, the right-most one is the decimal marker.
/// A lone separator followed by exactly three digits groups thousands.
/// Currency symbols, `EUR`/`euros` and `%` are ignored.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let lowered = s.trim().to_lowercase();
    let stripped = lowered
        .replace("euros", "")
        .replace("euro", "")
        .replace("eur", "")
        .replace(['€', '%'], "");

    let cleaned: String = stripped
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{00a0}')
        .collect();

    let (negative, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
        return None;
    }

    let normalized = match (body.rfind(','), body.rfind('.')) {
        (Some(c), Some(d)) if c > d => body.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => body.replace(',', ""),
        (Some(_), None) => single_separator(body, ',')?,
        (None, Some(_)) => single_separator(body, '.')?,
        (None, None) => body.to_string(),
    };

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

/// Resolve a value that uses only one kind of separator.
fn single_separator(body: &str, sep: char) -> Option<String> {
    let groups: Vec<&str> = body.split(sep).collect();

    if groups.iter().any(|g| g.is_empty()) {
        return None;
    }

    if groups.len() > 2 {
        // Repeated separator can only group thousands
        return groups[1..]
            .iter()
            .all(|g| g.len() == 3)
            .then(|| groups.concat());
    }

    if groups[1].len() == 3 {
        Some(groups.concat())
    } else {
        Some(format!("{}.{}", groups[0], groups[1]))
    }
}

/// Canonical string form: trailing zeros removed.
pub fn canonical_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// Format an amount in Spanish style (`150.000,50`).
pub fn format_spanish_amount(amount: Decimal) -> String {
    let s = format!("{:.2}", amount.abs());
    let Some((integer_part, decimal_part)) = s.split_once('.') else {
        return s;
    };

    let chars: Vec<char> = integer_part.chars().collect();
    let mut formatted = String::new();
    if amount.is_sign_negative() && !amount.is_zero() {
        formatted.push('-');
    }

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            formatted.push('.');
        }
        formatted.push(*c);
    }

    format!("{},{}", formatted, decimal_part)
}

/// Amount extractor for free text.
pub struct AmountExtractor;

impl AmountExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        AMOUNT_IN_TEXT
            .captures_iter(text)
            .filter_map(|caps| {
                let full = caps.get(0)?;
                let amount = parse_amount(&caps[1])?;
                // A currency marker makes the amount far less ambiguous
                let confidence = if full.as_str().trim_end() != caps[1].trim_end() {
                    0.9
                } else {
                    0.6
                };
                Some(
                    ExtractionMatch::new(amount, confidence, full.as_str())
                        .with_position(full.start(), full.end()),
                )
            })
            .collect()
    }
}

/// Extract the first percentage (`50 %`, `6,5%`) from text.
pub fn extract_percentage(text: &str) -> Option<Decimal> {
    PERCENT_IN_TEXT
        .captures(text)
        .and_then(|caps| parse_amount(&caps[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_spanish_and_english_formats() {
        assert_eq!(parse_amount("150.000,50 €"), Some(dec("150000.50")));
        assert_eq!(parse_amount("150,000.50"), Some(dec("150000.50")));
        assert_eq!(parse_amount("150000.50"), Some(dec("150000.50")));
        assert_eq!(parse_amount("150000,5"), Some(dec("150000.5")));
        assert_eq!(parse_amount("1.234.567"), Some(dec("1234567")));
        assert_eq!(parse_amount("150.000 EUR"), Some(dec("150000")));
        assert_eq!(parse_amount("6 %"), Some(dec("6")));
        assert_eq!(parse_amount("0,75%"), Some(dec("0.75")));
        assert_eq!(parse_amount("-1.500,00"), Some(dec("-1500.00")));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("ciento cincuenta mil"), None);
        assert_eq!(parse_amount("12a34"), None);
        assert_eq!(parse_amount("1.23.4"), None);
        assert_eq!(parse_amount("1,,5"), None);
    }

    #[test]
    fn test_canonical_amount() {
        assert_eq!(canonical_amount(dec("150000.00")), "150000");
        assert_eq!(canonical_amount(dec("150000.50")), "150000.5");
    }

    #[test]
    fn test_format_spanish_amount() {
        assert_eq!(format_spanish_amount(dec("150000.5")), "150.000,50");
        assert_eq!(format_spanish_amount(dec("999")), "999,00");
        assert_eq!(format_spanish_amount(dec("-1234.5")), "-1.234,50");
    }

    #[test]
    fn test_extract_amounts_and_percentage() {
        let text = "Precio: 150.000,00 € y cuota de 9.000 euros";
        let amounts: Vec<Decimal> = AmountExtractor::new()
            .extract_all(text)
            .into_iter()
            .map(|m| m.value)
            .collect();
        assert_eq!(amounts, vec![dec("150000.00"), dec("9000")]);

        assert_eq!(extract_percentage("porcentaje adquirido: 50 %"), Some(dec("50")));
    }
}
