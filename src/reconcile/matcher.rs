//! Matching of charge groups against the lines of a concept invoice

use bigdecimal::BigDecimal;
use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::calendar::dutch_weekday_name;
use crate::country::display_name_or_code;
use crate::reconcile::grouping::ChargeGroup;
use crate::types::{InvoiceLine, LineKind};

/// The billed amounts a matched group writes onto its line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinePayload {
    /// Always one unit
    pub quantity: BigDecimal,
    /// The group total
    pub unit_price: BigDecimal,
    /// The group's VAT percentage
    pub vat_rate: i32,
    /// The group total
    pub total: BigDecimal,
}

impl LinePayload {
    /// Payload for a charge group: one unit at the group's summed price
    pub fn for_group(group: &ChargeGroup) -> Self {
        Self {
            quantity: BigDecimal::from(1),
            unit_price: group.total.clone(),
            vat_rate: group.vat_rate,
            total: group.total.clone(),
        }
    }

    /// Overwrite a line's billed amounts with this payload
    pub fn write_amounts(&self, line: &mut InvoiceLine) {
        line.quantity = self.quantity.clone();
        line.unit_price = self.unit_price.clone();
        line.vat_rate = self.vat_rate;
        line.total = self.total.clone();
        line.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// Where a charge group's amounts should land
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineTarget {
    /// Update a populated toll line that matches exactly
    Existing {
        /// Id of the line to update
        line_id: String,
    },
    /// Fill a placeholder, which adopts the group's country and rate
    Placeholder {
        /// Id of the placeholder to fill
        line_id: String,
    },
    /// Nothing reusable; create a fresh line with this display text
    Create {
        /// Description for the new line
        description: String,
    },
}

/// A matcher decision: the target line plus the payload to write
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDecision {
    /// Which line the group lands on
    pub target: LineTarget,
    /// The amounts to write there
    pub payload: LinePayload,
}

/// Display text for a toll line: Dutch weekday, date, country name
///
/// When the group's country is unknown the second part is just "Tol".
pub fn describe_group(group: &ChargeGroup) -> String {
    let weekday = dutch_weekday_name(group.date.weekday());
    let day = group.date.format("%d-%m-%Y");
    match &group.country {
        Some(code) => format!("{} {}\nTol {}", weekday, day, display_name_or_code(code)),
        None => format!("{} {}\nTol", weekday, day),
    }
}

/// Decide where `group` lands among `lines`
///
/// Exact matches come first: toll lines for the group's date and rate, and
/// for its country when that is known. Among exact matches a placeholder is
/// preferred over a populated line. With no exact match, any placeholder for
/// the date and rate is reused regardless of its country. Only when both
/// tiers come up empty does the group get a new line.
pub fn match_group_to_lines(group: &ChargeGroup, lines: &[InvoiceLine]) -> MatchDecision {
    let payload = LinePayload::for_group(group);

    // Exact tier: date, rate and (when known) country all agree
    let exact: Vec<&InvoiceLine> = lines
        .iter()
        .filter(|line| {
            line.kind == LineKind::Toll
                && line.toll_date == Some(group.date)
                && line.vat_rate == group.vat_rate
                && match &group.country {
                    Some(code) => line.toll_country.as_deref() == Some(code.as_str()),
                    None => true,
                }
        })
        .collect();

    if let Some(placeholder) = exact.iter().find(|line| line.is_toll_placeholder()) {
        return MatchDecision {
            target: LineTarget::Placeholder {
                line_id: placeholder.id.clone(),
            },
            payload,
        };
    }
    if let Some(line) = exact.first() {
        return MatchDecision {
            target: LineTarget::Existing {
                line_id: line.id.clone(),
            },
            payload,
        };
    }

    // Fallback tier: any placeholder for the date and rate, preferring one
    // already carrying the group's country
    let placeholders: Vec<&InvoiceLine> = lines
        .iter()
        .filter(|line| {
            line.is_toll_placeholder()
                && line.toll_date == Some(group.date)
                && line.vat_rate == group.vat_rate
        })
        .collect();
    let chosen = placeholders
        .iter()
        .find(|line| group.country.is_some() && line.toll_country == group.country)
        .or_else(|| placeholders.first());
    if let Some(placeholder) = chosen {
        return MatchDecision {
            target: LineTarget::Placeholder {
                line_id: placeholder.id.clone(),
            },
            payload,
        };
    }

    MatchDecision {
        target: LineTarget::Create {
            description: describe_group(group),
        },
        payload,
    }
}
