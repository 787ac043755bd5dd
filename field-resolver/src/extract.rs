//! Reading values out of evidence text.
//!
//! Recognized text rarely holds a bare number: `"$3.29/gal"`, `"Total 1.234,50 €"`.
//! The extractor takes the first numeric token and normalizes its separators.
//!
//! Separator rules for a token:
//!
//! - both `.` and `,` present: the one that occurs last is the decimal separator
//! - one kind, several occurrences: grouping (`1,234,567`)
//! - one kind, one occurrence followed by exactly three digits: grouping, unless
//!   it is the locale's decimal separator
//! - otherwise: decimal separator
//!
//! A separator directly before the first digit (`$.99`) opens a fraction.

use std::collections::BTreeSet;

use crate::config::ExtractionConfig;
use crate::types::FieldData;

/// Turns span text into a [`FieldData`].
#[derive(Debug, Clone)]
pub struct ValueExtractor {
    decimal_comma_languages: BTreeSet<String>,
}

impl ValueExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            decimal_comma_languages: config
                .decimal_comma_locales
                .iter()
                .map(|l| l.to_lowercase())
                .collect(),
        }
    }

    /// Numeric value of the first number in `text`, or the trimmed text.
    pub fn extract(&self, text: &str, locale: &str) -> FieldData {
        match parse_first_number(text, self.decimal_separator(locale)) {
            Some(number) => FieldData::Number(number),
            None => FieldData::Text(text.trim().to_string()),
        }
    }

    /// Decimal separator preferred by the language part of `locale`.
    pub fn decimal_separator(&self, locale: &str) -> char {
        let language = locale
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if self.decimal_comma_languages.contains(&language) {
            ','
        } else {
            '.'
        }
    }
}

impl Default for ValueExtractor {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

/// Parse the first numeric token in `text`.
pub fn parse_first_number(text: &str, decimal_separator: char) -> Option<f64> {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.iter().position(|c| c.is_ascii_digit())?;

    // Digits, plus separators that are immediately followed by a digit.
    let mut end = start;
    while end < chars.len() {
        let c = chars[end];
        let continues = c.is_ascii_digit()
            || ((c == '.' || c == ',')
                && chars.get(end + 1).is_some_and(|n| n.is_ascii_digit()));
        if !continues {
            break;
        }
        end += 1;
    }

    // `.99` / `,5`: a separator opening the number is always the decimal one,
    // and only the digit run after it belongs to the number.
    let leading_separator = start > 0
        && matches!(chars[start - 1], '.' | ',')
        && (start == 1 || !chars[start - 2].is_alphanumeric());
    let number_start = if leading_separator { start - 1 } else { start };

    let negative = number_start > 0
        && chars[number_start - 1] == '-'
        && (number_start == 1 || !chars[number_start - 2].is_alphanumeric());

    let value: f64 = if leading_separator {
        let fraction: String = chars[start..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        format!("0.{}", fraction).parse().ok()?
    } else {
        let token: String = chars[start..end].iter().collect();
        normalize_separators(&token, decimal_separator)?.parse().ok()?
    };

    Some(if negative { -value } else { value })
}

fn normalize_separators(token: &str, decimal_separator: char) -> Option<String> {
    let dots = token.matches('.').count();
    let commas = token.matches(',').count();

    let decimal = match (dots, commas) {
        (0, 0) => return Some(token.to_string()),
        (_, 0) | (0, _) => {
            let sep = if dots > 0 { '.' } else { ',' };
            let count = dots + commas;
            if count > 1 {
                None
            } else {
                let digits_after = token.len() - token.rfind(sep)? - 1;
                if digits_after == 3 && sep != decimal_separator {
                    None
                } else {
                    Some(sep)
                }
            }
        }
        _ => {
            let last_dot = token.rfind('.')?;
            let last_comma = token.rfind(',')?;
            let sep = if last_dot > last_comma { '.' } else { ',' };
            // The decimal separator may only occur once.
            if token.matches(sep).count() > 1 {
                return None;
            }
            Some(sep)
        }
    };

    let normalized = token
        .chars()
        .filter_map(|c| match (c, decimal) {
            (c, Some(d)) if c == d => Some('.'),
            ('.', _) | (',', _) => None,
            (c, _) => Some(c),
        })
        .collect();

    Some(normalized)
}
