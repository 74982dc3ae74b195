//! FILENAME: engine/src/number_format.rs
//! PURPOSE: Display formats for columns flagged `useFormat`.
//! CONTEXT: The pivot pipeline replaces raw values of `useFormat` columns with
//! their metadata-declared display format. Dates are epoch milliseconds (the
//! unit produced by date normalization), not spreadsheet serials.
//!
//! In metadata JSON a format is tagged by `kind`:
//! `{"kind": "currency", "decimalPlaces": 0, "symbol": "$"}`.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Display format declared on a column in metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NumberFormat {
    /// Shortest plain representation.
    #[default]
    General,
    Number {
        #[serde(default)]
        decimal_places: u8,
        #[serde(default)]
        use_thousands_separator: bool,
    },
    Currency {
        #[serde(default)]
        decimal_places: u8,
        symbol: String,
        #[serde(default)]
        symbol_position: CurrencyPosition,
    },
    /// `0.25` shows as `25%`.
    Percentage {
        #[serde(default)]
        decimal_places: u8,
    },
    /// Calendar date built from `YYYY`, `YY`, `MM`, `DD`, `M` and `D` tokens.
    Date { pattern: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CurrencyPosition {
    #[default]
    Before,
    After,
}

/// Renders `value` in `format`. Non-finite values print as-is.
pub fn format_number(value: f64, format: &NumberFormat) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    match format {
        NumberFormat::General => general(value),
        NumberFormat::Number {
            decimal_places,
            use_thousands_separator,
        } => {
            let fixed = fixed(value, *decimal_places);
            if *use_thousands_separator {
                group_thousands(&fixed)
            } else {
                fixed
            }
        }
        NumberFormat::Currency {
            decimal_places,
            symbol,
            symbol_position,
        } => {
            let amount = group_thousands(&fixed(value.abs(), *decimal_places));
            let shown = match symbol_position {
                CurrencyPosition::Before => format!("{}{}", symbol, amount),
                CurrencyPosition::After => format!("{}{}", amount, symbol),
            };
            // Accounting style for losses.
            if value < 0.0 {
                format!("({})", shown)
            } else {
                shown
            }
        }
        NumberFormat::Percentage { decimal_places } => {
            format!("{}%", fixed(value * 100.0, *decimal_places))
        }
        NumberFormat::Date { pattern } => epoch_date(value, pattern),
    }
}

fn fixed(value: f64, decimal_places: u8) -> String {
    format!("{:.*}", decimal_places as usize, value)
}

fn general(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{:.0}", value);
    }
    let text = format!("{:.10}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Inserts `,` every three integer digits of an already formatted number.
fn group_thousands(text: &str) -> String {
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(text.len() + int_part.len() / 3);
    grouped.push_str(sign);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}

fn epoch_date(epoch_ms: f64, pattern: &str) -> String {
    let Some(dt) = DateTime::<Utc>::from_timestamp_millis(epoch_ms.trunc() as i64) else {
        return epoch_ms.to_string();
    };
    // Longest tokens first so "MM" is not consumed as two "M".
    pattern
        .replace("YYYY", &format!("{:04}", dt.year()))
        .replace("YY", &format!("{:02}", dt.year() % 100))
        .replace("MM", &format!("{:02}", dt.month()))
        .replace("DD", &format!("{:02}", dt.day()))
        .replace('M', &dt.month().to_string())
        .replace('D', &dt.day().to_string())
}
