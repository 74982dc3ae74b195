//! FILENAME: pivot-engine/src/dates.rs
//! PURPOSE: DateString parsing, epoch conversion and month binning.
//! CONTEXT: Dataset dates arrive as `MM/DD/YYYY` or `MM/YYYY` strings. The
//! pipeline converts them to epoch milliseconds (UTC midnight). Values that
//! cannot be parsed become NaN rather than failing the pipeline.

use chrono::{Datelike, NaiveDate};
use engine::Value;

/// Expands `MM/YYYY` to `MM/1/YYYY`; anything else is returned unchanged.
pub fn to_full_date(value: &str) -> String {
    let parts: Vec<&str> = value.split('/').collect();
    if parts.len() == 2 {
        format!("{}/1/{}", parts[0], parts[1])
    } else {
        value.to_string()
    }
}

/// Parses `MM/DD/YYYY`, `MM/YYYY` or ISO `YYYY-MM-DD`.
pub fn parse_date_string(value: &str) -> Option<NaiveDate> {
    let full = to_full_date(value.trim());
    let parts: Vec<&str> = full.split('/').collect();
    if parts.len() == 3 {
        let month: u32 = parts[0].trim().parse().ok()?;
        let day: u32 = parts[1].trim().parse().ok()?;
        let year: i32 = parts[2].trim().parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let date_part = full.get(..10).unwrap_or(&full);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Epoch milliseconds of UTC midnight on `date`.
pub fn epoch_millis(date: NaiveDate) -> f64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis() as f64)
        .unwrap_or(f64::NAN)
}

/// Converts a DateString value into epoch milliseconds. Numbers are assumed
/// to be epochs already and pass through; everything unparseable is NaN.
pub fn normalize_date_value(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(*n),
        Value::Text(s) => Value::Number(parse_date_string(s).map(epoch_millis).unwrap_or(f64::NAN)),
        _ => Value::Number(f64::NAN),
    }
}

/// The `byMonth` binner: epoch milliseconds of the first day of the value's
/// month. Epoch inputs are binned too, so binning is idempotent.
pub fn bin_by_month(value: &Value) -> Value {
    let date = match value {
        Value::Text(s) => parse_date_string(s),
        Value::Number(n) if n.is_finite() => {
            chrono::DateTime::from_timestamp_millis(*n as i64).map(|dt| dt.date_naive())
        }
        _ => None,
    };
    let month_start = date.and_then(|d| d.with_day0(0));
    Value::Number(month_start.map(epoch_millis).unwrap_or(f64::NAN))
}
