//! Invoice reference parsing
//!
//! Concept invoices that bill a vehicle-week carry a reference like
//! `"Week 11 - 2025 (12-ABC-3)"`. That text is the historical contract with
//! the invoicing side; newer invoices store the key structurally and render
//! the text from it. The parser here is the bridge for the older records.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::calendar::WeekId;
use crate::ingest::normalize_plate;

static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bweek\s*(\d{1,2})\D+?(\d{4})\b.*\(([^()]+)\)\s*$")
        .expect("hardcoded regex should be valid")
});

/// The (plate, week) pair identifying which vehicle-week an invoice bills
///
/// The plate is stored normalized (uppercase, separators stripped) so it
/// compares directly against transaction plates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TollKey {
    /// Normalized license plate
    pub plate: String,
    /// Week the invoice bills
    pub week: WeekId,
}

impl TollKey {
    /// Create a toll key; the plate is normalized on the way in
    pub fn new(plate: &str, week: WeekId) -> Self {
        Self {
            plate: normalize_plate(plate),
            week,
        }
    }

    /// Render the canonical reference text for this key
    pub fn display_reference(&self) -> String {
        format!(
            "Week {} - {} ({})",
            self.week.number, self.week.year, self.plate
        )
    }
}

/// Extract the toll key from an invoice reference, if it carries one
///
/// Absence of the pattern is a normal, silent outcome: most invoices do not
/// bill a vehicle-week. Never errors.
pub fn parse_reference(reference: &str) -> Option<TollKey> {
    let captures = REFERENCE_PATTERN.captures(reference)?;
    let number: u32 = captures[1].parse().ok()?;
    if !(1..=53).contains(&number) {
        return None;
    }
    let year: i32 = captures[2].parse().ok()?;
    let plate = normalize_plate(&captures[3]);
    if plate.is_empty() {
        return None;
    }
    Some(TollKey {
        plate,
        week: WeekId::new(year, number),
    })
}
