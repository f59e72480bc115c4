//! Normalization helpers shared with the spreadsheet ingestion side
//!
//! Toll operator exports are messy: plates carry dashes and spaces, dates and
//! times come in several shapes, and amounts mix currency symbols with both
//! thousand-separator conventions. The parsers here are the agreed vocabulary
//! between the ingestion collaborator and the reconciliation engine; all of
//! them return `Option` and treat unparsable input as a skip, not an error.

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

static SHORT_YEAR_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}-\d{1,2}-\d{2}$").expect("hardcoded regex should be valid"));

/// Normalize a license plate for matching: uppercase, separators stripped
///
/// `"12-ABC-3"`, `"12 abc 3"` and `"12ABC3"` all normalize to `"12ABC3"`.
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

/// Parse a date cell in the formats toll exports actually use
///
/// Accepts dd-mm-yyyy and yyyy-mm-dd with `-`, `/` or `.` separators, plus
/// dd-mm-yy with the usual two-digit year expansion (00-68 become 20xx).
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().replace(['/', '.'], "-");
    if cleaned.is_empty() {
        return None;
    }
    if SHORT_YEAR_DATE.is_match(&cleaned) {
        return NaiveDate::parse_from_str(&cleaned, "%d-%m-%y").ok();
    }
    for format in ["%d-%m-%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            return Some(date);
        }
    }
    None
}

/// Parse a time cell: clock text, Excel day fraction, or decimal hours
///
/// `"07:41"` and `"07:41:30"` parse as clock times. Numeric cells below 1.0
/// are Excel day fractions (0.5 is noon); values from 1.0 up to 24.0 are
/// decimal hours (14.5 is 14:30), with a comma accepted as decimal separator.
pub fn parse_flexible_time(raw: &str) -> Option<NaiveTime> {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return None;
    }
    for format in ["%H:%M:%S", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(cleaned, format) {
            return Some(time);
        }
    }
    let value: f64 = cleaned.replace(',', ".").parse().ok()?;
    let seconds = if (0.0..1.0).contains(&value) {
        (value * 86_400.0).round() as u32
    } else if (1.0..24.0).contains(&value) {
        (value * 3_600.0).round() as u32
    } else {
        return None;
    };
    NaiveTime::from_num_seconds_from_midnight_opt(seconds.min(86_399), 0)
}

/// Parse a money cell, tolerant of `€`, whitespace and separator conventions
///
/// Both `"1.234,56"` and `"1,234.56"` parse to 1234.56; `"9,40"` parses to
/// 9.40. The result is scaled to 2 decimals, half-up.
pub fn parse_money(raw: &str) -> Option<BigDecimal> {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€')
        .collect();
    if stripped.is_empty() {
        return None;
    }

    let has_comma = stripped.contains(',');
    let has_dot = stripped.contains('.');
    let normalized = if has_comma && has_dot {
        // The rightmost separator is the decimal one; the other marks thousands
        let last_comma = stripped.rfind(',');
        let last_dot = stripped.rfind('.');
        if last_comma > last_dot {
            stripped.replace('.', "").replace(',', ".")
        } else {
            stripped.replace(',', "")
        }
    } else if has_comma {
        decimal_or_thousands(&stripped, ',')
    } else if has_dot {
        decimal_or_thousands(&stripped, '.')
    } else {
        stripped
    };

    let amount = BigDecimal::from_str(&normalized).ok()?;
    Some(amount.with_scale_round(2, RoundingMode::HalfUp))
}

/// A lone separator followed by one or two digits is a decimal mark;
/// anything else is a thousands separator
fn decimal_or_thousands(value: &str, separator: char) -> String {
    let occurrences = value.matches(separator).count();
    let trailing_digits = value
        .rsplit(separator)
        .next()
        .map(|tail| tail.len())
        .unwrap_or(0);
    if occurrences == 1 && (1..=2).contains(&trailing_digits) {
        value.replace(separator, ".")
    } else {
        value.replace(separator, "")
    }
}

/// Parse a VAT percentage: `"21"`, `"21%"`, `"21.0"` and `"0,21"` all mean 21
pub fn parse_vat_rate(raw: &str) -> Option<i32> {
    let cleaned = raw.trim().trim_end_matches('%').trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    // The float grammar also accepts "nan" and "inf"; NaN rounds to 0
    if !value.is_finite() {
        return None;
    }
    let percentage = if value > 0.0 && value < 1.0 {
        (value * 100.0).round() as i32
    } else {
        value.round() as i32
    };
    (0..=100).contains(&percentage).then_some(percentage)
}
