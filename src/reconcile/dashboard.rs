//! Read-only reporting over toll match health

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{Duration, NaiveDate, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

use crate::calendar::{week_of, WeekConfig, WeekId};
use crate::reconcile::core::LineCache;
use crate::reference::TollKey;
use crate::traits::TollStorage;
use crate::types::*;

/// Look-back window when the caller does not pass one
const DEFAULT_DAYS_BACK: i64 = 120;
/// Hard cap on transactions scanned per dashboard build
const MAX_SCAN_ROWS: usize = 5_000;
/// Ids per lookup query; keeps parameter lists bounded on SQL backends
const LOOKUP_CHUNK_SIZE: usize = 200;

/// One matched aggregate: all linked charges of a plate-day on one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRow {
    /// Line the charges are billed on
    pub invoice_line_id: String,
    /// Vehicle the charges belong to
    pub license_plate: String,
    /// Day the charges were incurred
    pub date: NaiveDate,
    /// Invoice week of that day
    pub week: WeekId,
    /// How many transactions the aggregate covers
    pub transaction_count: usize,
    /// Their summed amount, rounded to cents
    pub total: BigDecimal,
    /// Invoice of the line; `None` when the line or invoice is dangling
    pub invoice_id: Option<String>,
    /// Reference of that invoice
    pub invoice_reference: Option<String>,
}

/// Why an unmatched aggregate has not landed on an invoice yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// No concept invoice bills this vehicle-week
    NoConceptInvoice,
    /// A concept invoice has a toll line for this date; attach will link it
    InvoiceFoundLineExists,
    /// A concept invoice exists but has no toll line for this date yet
    InvoiceFoundMissingLine,
}

impl UnmatchedReason {
    /// Operator-facing explanation with the suggested next step
    pub fn message(&self) -> &'static str {
        match self {
            UnmatchedReason::NoConceptInvoice => "no concept invoice found for this vehicle-week",
            UnmatchedReason::InvoiceFoundLineExists => {
                "concept invoice found but not yet linked, run attach on it"
            }
            UnmatchedReason::InvoiceFoundMissingLine => {
                "concept invoice found without a toll line for this date, attach will create one"
            }
        }
    }
}

/// One unmatched aggregate: unclaimed charges of a plate-day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedRow {
    /// Vehicle the charges belong to
    pub license_plate: String,
    /// Day the charges were incurred
    pub date: NaiveDate,
    /// Invoice week of that day
    pub week: WeekId,
    /// How many transactions the aggregate covers
    pub transaction_count: usize,
    /// Their summed amount, rounded to cents
    pub total: BigDecimal,
    /// Why the charges are still unmatched
    pub reason: UnmatchedReason,
    /// Text form of the reason
    pub message: String,
    /// Concept invoice the charges would land on, when one exists
    pub suggested_invoice_id: Option<String>,
    /// Reference of that invoice
    pub suggested_invoice_reference: Option<String>,
}

/// Why a placeholder line counts as missing its toll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTollKind {
    /// No charges exist at all for the plate and date
    NoTransactions,
    /// Charges exist but none is linked to this placeholder
    TransactionsNotLinked,
}

/// A toll placeholder with no charges behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingTollRow {
    /// Invoice carrying the placeholder
    pub invoice_id: String,
    /// Reference of that invoice
    pub invoice_reference: String,
    /// The placeholder line
    pub line_id: String,
    /// Vehicle the invoice bills
    pub license_plate: String,
    /// Day the placeholder expects charges for
    pub date: NaiveDate,
    /// Invoice week of that day
    pub week: WeekId,
    /// What exactly is missing
    pub kind: MissingTollKind,
}

/// Per vehicle-week rollup across the other sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekOverviewRow {
    /// The invoice week
    pub week: WeekId,
    /// The vehicle
    pub license_plate: String,
    /// Sum of matched totals in the week
    pub matched_total: BigDecimal,
    /// Sum of unmatched totals in the week
    pub unmatched_total: BigDecimal,
    /// Placeholders still missing their toll
    pub missing_count: usize,
    /// True when nothing is unmatched or missing
    pub ok: bool,
}

/// The full match-health dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TollDashboard {
    /// Date the window is anchored at
    pub as_of: NaiveDate,
    /// Length of the look-back window in days
    pub days_back: i64,
    /// Linked charges, aggregated per line and plate-day
    pub matched: Vec<MatchedRow>,
    /// Unclaimed charges, aggregated per plate-day, with reasons
    pub unmatched: Vec<UnmatchedRow>,
    /// Placeholder lines without charges behind them
    pub missing_toll: Vec<MissingTollRow>,
    /// Rollup per vehicle-week
    pub week_overview: Vec<WeekOverviewRow>,
}

/// Builds the read-only toll dashboard
///
/// Never writes; every section is aggregated deterministically so two builds
/// over the same data render identically.
pub struct DashboardBuilder<S: TollStorage> {
    storage: S,
    week_config: WeekConfig,
}

impl<S: TollStorage> DashboardBuilder<S> {
    /// Create a builder over `storage`
    pub fn new(storage: S, week_config: WeekConfig) -> Self {
        Self {
            storage,
            week_config,
        }
    }

    /// Dashboard anchored at today
    pub async fn build(&self, days_back: Option<i64>) -> TollResult<TollDashboard> {
        self.build_as_of(Utc::now().date_naive(), days_back).await
    }

    /// Dashboard anchored at an explicit date
    pub async fn build_as_of(
        &self,
        as_of: NaiveDate,
        days_back: Option<i64>,
    ) -> TollResult<TollDashboard> {
        let days_back = days_back.unwrap_or(DEFAULT_DAYS_BACK);
        if days_back <= 0 {
            return Err(TollError::Validation(format!(
                "days_back must be positive, got {}",
                days_back
            )));
        }
        let window_start = as_of - Duration::days(days_back);

        let transactions: Vec<TollTransaction> = self
            .storage
            .get_transactions_since(window_start, MAX_SCAN_ROWS)
            .await?
            .into_iter()
            .filter(|txn| txn.transaction_date <= as_of)
            .collect();

        // Concept invoices feed both the unmatched reasons and the
        // placeholder scan; fetched once
        let concept_invoices = self.storage.list_concept_invoices().await?;
        let mut concepts_by_key: HashMap<TollKey, Invoice> = HashMap::new();
        for invoice in &concept_invoices {
            if let Some(key) = invoice.resolved_toll_key() {
                concepts_by_key.entry(key).or_insert_with(|| invoice.clone());
            }
        }

        let mut cache = LineCache::new();
        let matched = self.matched_rows(&transactions).await?;
        let unmatched = self
            .unmatched_rows(&transactions, &concepts_by_key, &mut cache)
            .await?;
        let missing_toll = self
            .missing_toll_rows(&transactions, &concept_invoices, &mut cache, window_start, as_of)
            .await?;
        let week_overview = week_overview_rows(&matched, &unmatched, &missing_toll);

        Ok(TollDashboard {
            as_of,
            days_back,
            matched,
            unmatched,
            missing_toll,
            week_overview,
        })
    }

    /// Linked charges aggregated per (line, plate, day)
    async fn matched_rows(&self, transactions: &[TollTransaction]) -> TollResult<Vec<MatchedRow>> {
        let mut aggregates: BTreeMap<(String, String, NaiveDate), (usize, BigDecimal)> =
            BTreeMap::new();
        for txn in transactions {
            if txn.status != TransactionStatus::Matched {
                continue;
            }
            let line_id = match &txn.invoice_line_id {
                Some(line_id) => line_id.clone(),
                None => continue,
            };
            let entry = aggregates
                .entry((line_id, txn.license_plate.clone(), txn.transaction_date))
                .or_insert_with(|| (0, BigDecimal::from(0)));
            entry.0 += 1;
            entry.1 += &txn.amount;
        }

        // Resolve lines, then their invoices, in bounded chunks
        let line_ids: Vec<String> = aggregates
            .keys()
            .map(|(line_id, _, _)| line_id.clone())
            .collect::<IndexSet<String>>()
            .into_iter()
            .collect();
        let lines = self.lines_by_ids(&line_ids).await?;

        let invoice_ids: Vec<String> = lines
            .values()
            .map(|line| line.invoice_id.clone())
            .collect::<IndexSet<String>>()
            .into_iter()
            .collect();
        let invoices = self.invoices_by_ids(&invoice_ids).await?;

        let mut rows = Vec::with_capacity(aggregates.len());
        for ((line_id, license_plate, date), (transaction_count, sum)) in aggregates {
            let invoice = match lines.get(&line_id) {
                Some(line) => {
                    let invoice = invoices.get(&line.invoice_id);
                    if invoice.is_none() {
                        warn!(
                            invoice_id = %line.invoice_id,
                            line_id = %line_id,
                            "invoice line points at a missing invoice"
                        );
                    }
                    invoice
                }
                None => {
                    warn!(line_id = %line_id, "matched transactions point at a missing line");
                    None
                }
            };
            rows.push(MatchedRow {
                week: week_of(date, &self.week_config),
                invoice_id: invoice.map(|invoice| invoice.id.clone()),
                invoice_reference: invoice.map(|invoice| invoice.reference.clone()),
                invoice_line_id: line_id,
                license_plate,
                date,
                transaction_count,
                total: sum.with_scale_round(2, RoundingMode::HalfUp),
            });
        }
        Ok(rows)
    }

    /// Unclaimed charges aggregated per (plate, day), with a reason each
    async fn unmatched_rows(
        &self,
        transactions: &[TollTransaction],
        concepts_by_key: &HashMap<TollKey, Invoice>,
        cache: &mut LineCache,
    ) -> TollResult<Vec<UnmatchedRow>> {
        let mut aggregates: BTreeMap<(String, NaiveDate), (usize, BigDecimal)> = BTreeMap::new();
        for txn in transactions {
            if !txn.is_unclaimed() {
                continue;
            }
            let entry = aggregates
                .entry((txn.license_plate.clone(), txn.transaction_date))
                .or_insert_with(|| (0, BigDecimal::from(0)));
            entry.0 += 1;
            entry.1 += &txn.amount;
        }

        let mut rows = Vec::with_capacity(aggregates.len());
        for ((license_plate, date), (transaction_count, sum)) in aggregates {
            let week = week_of(date, &self.week_config);
            let key = TollKey::new(&license_plate, week);
            let (reason, suggested) = match concepts_by_key.get(&key) {
                None => (UnmatchedReason::NoConceptInvoice, None),
                Some(invoice) => {
                    let lines = cache.lines_for(&self.storage, &invoice.id).await?;
                    let has_line = lines
                        .iter()
                        .any(|line| line.kind == LineKind::Toll && line.toll_date == Some(date));
                    let reason = if has_line {
                        UnmatchedReason::InvoiceFoundLineExists
                    } else {
                        UnmatchedReason::InvoiceFoundMissingLine
                    };
                    (reason, Some(invoice))
                }
            };
            rows.push(UnmatchedRow {
                license_plate,
                date,
                week,
                transaction_count,
                total: sum.with_scale_round(2, RoundingMode::HalfUp),
                reason,
                message: reason.message().to_string(),
                suggested_invoice_id: suggested.map(|invoice| invoice.id.clone()),
                suggested_invoice_reference: suggested.map(|invoice| invoice.reference.clone()),
            });
        }
        Ok(rows)
    }

    /// Placeholder lines in the window that have no charges behind them
    async fn missing_toll_rows(
        &self,
        transactions: &[TollTransaction],
        concept_invoices: &[Invoice],
        cache: &mut LineCache,
        window_start: NaiveDate,
        as_of: NaiveDate,
    ) -> TollResult<Vec<MissingTollRow>> {
        let mut charged_plate_days: HashSet<(String, NaiveDate)> = HashSet::new();
        let mut billed_line_ids: HashSet<String> = HashSet::new();
        for txn in transactions {
            charged_plate_days.insert((txn.license_plate.clone(), txn.transaction_date));
            if let Some(line_id) = &txn.invoice_line_id {
                billed_line_ids.insert(line_id.clone());
            }
        }

        let mut rows = Vec::new();
        for invoice in concept_invoices {
            let key = match invoice.resolved_toll_key() {
                Some(key) => key,
                None => continue,
            };
            let lines = cache.lines_for(&self.storage, &invoice.id).await?;
            for line in lines {
                if !line.is_toll_placeholder() {
                    continue;
                }
                let date = match line.toll_date {
                    Some(date) if date >= window_start && date <= as_of => date,
                    _ => continue,
                };
                let kind = if !charged_plate_days.contains(&(key.plate.clone(), date)) {
                    MissingTollKind::NoTransactions
                } else if !billed_line_ids.contains(&line.id) {
                    MissingTollKind::TransactionsNotLinked
                } else {
                    continue;
                };
                rows.push(MissingTollRow {
                    invoice_id: invoice.id.clone(),
                    invoice_reference: invoice.reference.clone(),
                    line_id: line.id.clone(),
                    license_plate: key.plate.clone(),
                    date,
                    week: week_of(date, &self.week_config),
                    kind,
                });
            }
        }
        Ok(rows)
    }

    async fn lines_by_ids(&self, ids: &[String]) -> TollResult<HashMap<String, InvoiceLine>> {
        let mut by_id = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(LOOKUP_CHUNK_SIZE) {
            for line in self.storage.get_lines_by_ids(chunk).await? {
                by_id.insert(line.id.clone(), line);
            }
        }
        Ok(by_id)
    }

    async fn invoices_by_ids(&self, ids: &[String]) -> TollResult<HashMap<String, Invoice>> {
        let mut by_id = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(LOOKUP_CHUNK_SIZE) {
            for invoice in self.storage.get_invoices_by_ids(chunk).await? {
                by_id.insert(invoice.id.clone(), invoice);
            }
        }
        Ok(by_id)
    }
}

/// Roll the three sections up per (week, plate)
fn week_overview_rows(
    matched: &[MatchedRow],
    unmatched: &[UnmatchedRow],
    missing: &[MissingTollRow],
) -> Vec<WeekOverviewRow> {
    #[derive(Default)]
    struct Tally {
        matched_total: BigDecimal,
        unmatched_total: BigDecimal,
        missing_count: usize,
    }

    let mut tallies: BTreeMap<(WeekId, String), Tally> = BTreeMap::new();
    for row in matched {
        let tally = tallies
            .entry((row.week, row.license_plate.clone()))
            .or_default();
        tally.matched_total += &row.total;
    }
    for row in unmatched {
        let tally = tallies
            .entry((row.week, row.license_plate.clone()))
            .or_default();
        tally.unmatched_total += &row.total;
    }
    for row in missing {
        let tally = tallies
            .entry((row.week, row.license_plate.clone()))
            .or_default();
        tally.missing_count += 1;
    }

    tallies
        .into_iter()
        .map(|((week, license_plate), tally)| WeekOverviewRow {
            week,
            license_plate,
            ok: tally.unmatched_total == BigDecimal::from(0) && tally.missing_count == 0,
            matched_total: tally.matched_total,
            unmatched_total: tally.unmatched_total,
            missing_count: tally.missing_count,
        })
        .collect()
}
