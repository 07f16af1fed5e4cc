use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// Number parsing and formatting. The decimal separator in effect is always
// an explicit parameter; system locale is never consulted.

/// The decimal separator to use when parsing and formatting numbers.
///
/// The opposite character doubles as the digit grouping separator, so
/// `Period` reads and writes `1,234.56` while `Comma` reads and writes
/// `1.234,56`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecimalSeparator {
    #[default]
    #[serde(rename = ".")]
    Period,
    #[serde(rename = ",")]
    Comma,
}

impl DecimalSeparator {
    pub fn decimal_char(self) -> char {
        match self {
            DecimalSeparator::Period => '.',
            DecimalSeparator::Comma => ',',
        }
    }

    pub fn grouping_char(self) -> char {
        match self {
            DecimalSeparator::Period => ',',
            DecimalSeparator::Comma => '.',
        }
    }
}

/// Parse a number, stripping digit grouping separators.
pub fn parse_number(text: &str, separator: DecimalSeparator) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let cleaned: String = text
        .chars()
        .filter(|&c| c != separator.grouping_char())
        .map(|c| {
            if c == separator.decimal_char() {
                '.'
            } else {
                c
            }
        })
        .collect();

    // reject strings that end up with more than one decimal point
    if cleaned.matches('.').count() > 1 {
        return None;
    }

    cleaned.parse::<f64>().ok()
}

/// Truncate a value to a number of decimal places using half-even rounding.
///
/// The full binary expansion of the value is rounded, so `2.675` (stored as
/// `2.67499…`) truncates to `2.67`, the way the underlying float compares.
pub fn truncate_floating_point(value: f64, places: u32) -> f64 {
    match Decimal::from_f64_retain(value) {
        Some(decimal) => decimal.round_dp(places).to_f64().unwrap_or(value),
        None => value,
    }
}

/// Return the number of places after the decimal separator in a number string.
///
/// A single trailing zero decimal (e.g. `"2.0"`) counts as zero places.
pub fn decimal_places_str(text: &str, separator: DecimalSeparator) -> usize {
    let text = text.trim();
    let mut places = 0;
    if let Some(index) = text.rfind(separator.decimal_char()) {
        places = text.chars().count() - text[..index].chars().count() - 1;
        if places == 1 && text.ends_with('0') {
            return 0;
        }
    }
    places
}

/// Return the number of decimal places in the shortest representation of a value.
pub fn decimal_places(value: f64) -> usize {
    let text = format!("{}", value);
    match text.rfind('.') {
        Some(index) => text.len() - index - 1,
        None => 0,
    }
}

/// Return a human-readable string for a number.
///
/// The value is rounded to `places` decimals when given, or rendered in its
/// shortest representation otherwise. Digits are grouped in thousands using
/// the separator's grouping character, e.g. `1.000,60` for comma-decimal
/// notation. With `trailing_zero` disabled, a whole number keeps no
/// fractional part.
pub fn format_amount(
    value: f64,
    places: Option<usize>,
    trailing_zero: bool,
    separator: DecimalSeparator,
) -> String {
    let mut text = match places {
        Some(places) => format!("{:.1$}", value, places),
        None => format!("{}", value),
    };

    if !trailing_zero {
        if let Some(places) = places {
            let pad: String = std::iter::once('.')
                .chain(std::iter::repeat('0').take(places))
                .collect();
            if places > 0 && text.ends_with(&pad) {
                text.truncate(text.len() - pad.len());
            }
        }
    }

    let (integer, fraction) = match text.find('.') {
        Some(index) => (text[..index].to_string(), Some(text[index + 1..].to_string())),
        None => (text, None),
    };

    let (sign, digits) = match integer.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", integer.as_str()),
    };

    let mut grouped = String::new();
    for (n, c) in digits.chars().enumerate() {
        let remaining = digits.len() - n;
        if n > 0 && remaining % 3 == 0 {
            grouped.push(separator.grouping_char());
        }
        grouped.push(c);
    }

    let mut result = format!("{}{}", sign, grouped);
    if let Some(fraction) = fraction {
        result.push(separator.decimal_char());
        result.push_str(&fraction);
    }
    result
}
