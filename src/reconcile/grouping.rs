//! Grouping of raw toll transactions into billable charge groups

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::calendar::{week_of, WeekConfig, WeekId};
use crate::types::TollTransaction;

/// Partition key for one charge group
///
/// Ordering is derived from the field order, so iterating a `BTreeMap` keyed
/// by this yields plate, then date, then country (unknown first), then rate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    license_plate: String,
    date: NaiveDate,
    country: Option<String>,
    vat_rate: i32,
}

#[derive(Debug, Default)]
struct Bucket {
    sum: BigDecimal,
    vat_rate: i32,
    transaction_ids: Vec<String>,
}

/// All same-day, same-country, same-rate charges of one vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeGroup {
    /// Normalized license plate shared by every member
    pub license_plate: String,
    /// Calendar day the charges were incurred
    pub date: NaiveDate,
    /// Country code, `None` when the source rows carried none
    pub country: Option<String>,
    /// VAT percentage shared by the group
    pub vat_rate: i32,
    /// Sum of member amounts, rounded to cents (half up)
    pub total: BigDecimal,
    /// Invoice week the group's date falls in
    pub week: WeekId,
    /// Member transaction ids in input order
    pub transaction_ids: Vec<String>,
}

/// Fold transactions into charge groups
///
/// The result is deterministic regardless of input order: groups come out
/// sorted by plate, date, country and rate. Member ids keep the order they
/// arrived in.
pub fn group_transactions(
    transactions: &[TollTransaction],
    config: &WeekConfig,
) -> Vec<ChargeGroup> {
    let mut buckets: BTreeMap<GroupKey, Bucket> = BTreeMap::new();

    for transaction in transactions {
        let key = GroupKey {
            license_plate: transaction.license_plate.clone(),
            date: transaction.transaction_date,
            country: transaction.country.clone(),
            vat_rate: transaction.vat_rate,
        };
        let bucket = buckets.entry(key).or_default();
        if bucket.transaction_ids.is_empty() {
            bucket.vat_rate = transaction.vat_rate;
        } else if bucket.vat_rate != transaction.vat_rate {
            // Cannot happen while the rate is part of the key; kept as a
            // guard so a key change never turns into a hard failure
            tracing::warn!(
                plate = %transaction.license_plate,
                date = %transaction.transaction_date,
                kept = bucket.vat_rate,
                conflicting = transaction.vat_rate,
                "VAT rate disagreement within a charge group, keeping the first rate"
            );
        }
        bucket.sum += &transaction.amount;
        bucket.transaction_ids.push(transaction.id.clone());
    }

    buckets
        .into_iter()
        .map(|(key, bucket)| ChargeGroup {
            week: week_of(key.date, config),
            total: bucket.sum.with_scale_round(2, RoundingMode::HalfUp),
            license_plate: key.license_plate,
            date: key.date,
            country: key.country,
            vat_rate: bucket.vat_rate,
            transaction_ids: bucket.transaction_ids,
        })
        .collect()
}
