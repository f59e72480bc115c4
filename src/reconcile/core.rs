//! The reconciliation engine orchestrating grouping, matching and linking

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::calendar::{week_of, WeekConfig};
use crate::reconcile::dashboard::{DashboardBuilder, TollDashboard};
use crate::reconcile::grouping::{group_transactions, ChargeGroup};
use crate::reconcile::matcher::{describe_group, match_group_to_lines, LineTarget, MatchDecision};
use crate::reference::TollKey;
use crate::traits::TollStorage;
use crate::types::*;

/// Invoice lines fetched once per engine call
///
/// The cache lives for a single operation and is dropped with it, so a
/// stale entry can never leak into the next call. Lines the operation
/// creates or updates are folded back in through `upsert` so later groups
/// in the same call see them.
#[derive(Debug, Default)]
pub struct LineCache {
    lines_by_invoice: HashMap<String, Vec<InvoiceLine>>,
}

impl LineCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The lines of `invoice_id`, fetched from storage on first use
    pub async fn lines_for<S: TollStorage>(
        &mut self,
        storage: &S,
        invoice_id: &str,
    ) -> TollResult<&[InvoiceLine]> {
        if !self.lines_by_invoice.contains_key(invoice_id) {
            let lines = storage.list_invoice_lines(invoice_id).await?;
            self.lines_by_invoice.insert(invoice_id.to_string(), lines);
        }
        Ok(self
            .lines_by_invoice
            .get(invoice_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    /// A specific line, if its invoice has been fetched
    pub fn get(&self, invoice_id: &str, line_id: &str) -> Option<&InvoiceLine> {
        self.lines_by_invoice
            .get(invoice_id)?
            .iter()
            .find(|line| line.id == line_id)
    }

    /// Fold a created or updated line back in
    pub fn upsert(&mut self, line: InvoiceLine) {
        let lines = self
            .lines_by_invoice
            .entry(line.invoice_id.clone())
            .or_default();
        match lines.iter_mut().find(|existing| existing.id == line.id) {
            Some(existing) => *existing = line,
            None => lines.push(line),
        }
    }
}

/// Result of attaching toll charges to one specific invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachOutcome {
    /// Transactions linked or re-homed by this call, in processing order
    pub matched_transactions: Vec<String>,
    /// Lines created or updated by this call
    pub updated_invoice_lines: Vec<String>,
    /// Operator-facing summary of what happened
    pub message: String,
}

/// A charge group the batch sweep could not place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedGroup {
    /// The group that found no home
    pub group: ChargeGroup,
    /// Why it was left unmatched
    pub reason: String,
}

/// Result of one batch reconciliation sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// How many unclaimed transactions the sweep examined
    pub processed_transactions: usize,
    /// Transactions linked by this sweep, in processing order
    pub matched_transactions: Vec<String>,
    /// Charge groups with no concept invoice to land on
    pub unmatched_groups: Vec<UnmatchedGroup>,
    /// Lines created or updated by this sweep
    pub updated_invoice_lines: Vec<String>,
}

/// The toll reconciliation engine
///
/// Generic over the storage backend. Holds the week calendar used to
/// translate transaction dates into invoice weeks; construct it with
/// `with_week_config` when the business calendar pins week 1 of some year
/// to a non-computed Monday.
pub struct TollReconciler<S: TollStorage> {
    pub(crate) storage: S,
    week_config: WeekConfig,
    dashboard: DashboardBuilder<S>,
}

impl<S: TollStorage + Clone> TollReconciler<S> {
    /// Create a reconciler with the default week calendar
    pub fn new(storage: S) -> Self {
        Self::with_week_config(storage, WeekConfig::default())
    }

    /// Create a reconciler with an explicit week calendar
    pub fn with_week_config(storage: S, week_config: WeekConfig) -> Self {
        Self {
            dashboard: DashboardBuilder::new(storage.clone(), week_config.clone()),
            storage,
            week_config,
        }
    }

    /// Attach every toll charge of the invoice's vehicle-week to `invoice_id`
    ///
    /// This is the explicit, conflict-aware path: transactions already bound
    /// to a different invoice are unlinked and re-homed here, and parked
    /// (ignored) transactions are claimed too. Transactions already on this
    /// invoice are left untouched, so repeating the call is a no-op.
    pub async fn add_toll_to_invoice(&mut self, invoice_id: &str) -> TollResult<AttachOutcome> {
        let invoice = self
            .storage
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| TollError::InvoiceNotFound(invoice_id.to_string()))?;
        if !invoice.is_concept() {
            return Err(TollError::InvoiceNotEligible(format!(
                "invoice '{}' has status {:?}",
                invoice.id, invoice.status
            )));
        }
        let key = invoice.resolved_toll_key().ok_or_else(|| {
            TollError::UnparsableReference(format!(
                "invoice '{}' reference '{}' does not name a vehicle-week",
                invoice.id, invoice.reference
            ))
        })?;

        // Every charge of the plate that falls in the invoice's week
        let in_week: Vec<TollTransaction> = self
            .storage
            .get_transactions_for_plate(&key.plate)
            .await?
            .into_iter()
            .filter(|txn| week_of(txn.transaction_date, &self.week_config) == key.week)
            .collect();

        let mut cache = LineCache::new();
        let own_line_ids: HashSet<String> = cache
            .lines_for(&self.storage, &invoice.id)
            .await?
            .iter()
            .map(|line| line.id.clone())
            .collect();

        // Partition: already billed here, bound elsewhere, or free
        let mut candidates: Vec<TollTransaction> = Vec::new();
        let mut already_attached = 0usize;
        for mut txn in in_week {
            match &txn.invoice_line_id {
                Some(line_id) if own_line_ids.contains(line_id) => {
                    already_attached += 1;
                }
                Some(_) => {
                    // Bound to another invoice's line; release it first
                    txn.apply(StatusEvent::Unlink)?;
                    self.storage.update_transaction(&txn).await?;
                    candidates.push(txn);
                }
                None => candidates.push(txn),
            }
        }

        if candidates.is_empty() {
            return Ok(AttachOutcome {
                matched_transactions: Vec::new(),
                updated_invoice_lines: Vec::new(),
                message: format!(
                    "No toll transactions to attach for week {} ({} already on this invoice)",
                    key.week, already_attached
                ),
            });
        }

        let groups = group_transactions(&candidates, &self.week_config);
        let mut transactions_by_id: HashMap<String, TollTransaction> = candidates
            .into_iter()
            .map(|txn| (txn.id.clone(), txn))
            .collect();

        let mut matched = IndexSet::new();
        let mut updated_lines = IndexSet::new();
        for group in &groups {
            self.apply_group(
                &invoice,
                group,
                &mut cache,
                &mut transactions_by_id,
                &mut matched,
                &mut updated_lines,
            )
            .await?;
        }

        info!(
            invoice = %invoice.id,
            matched = matched.len(),
            lines = updated_lines.len(),
            "attached toll transactions"
        );
        Ok(AttachOutcome {
            message: format!(
                "Attached {} toll transaction(s) in {} group(s) to invoice '{}'",
                matched.len(),
                groups.len(),
                invoice.id
            ),
            matched_transactions: matched.into_iter().collect(),
            updated_invoice_lines: updated_lines.into_iter().collect(),
        })
    }

    /// Sweep all unclaimed transactions onto their concept invoices
    ///
    /// Only transactions that are new and unbound are considered, so the
    /// sweep never steals charges from an invoice and re-running it after a
    /// quiet period is a no-op. Groups whose vehicle-week has no concept
    /// invoice are reported, not written.
    pub async fn reconcile_new_toll_transactions(&mut self) -> TollResult<BatchOutcome> {
        let candidates = self.storage.list_unclaimed_transactions().await?;
        let processed_transactions = candidates.len();

        // Concept invoices indexed by the vehicle-week they bill; the first
        // invoice wins when two concepts name the same week
        let mut invoices_by_key: HashMap<TollKey, Invoice> = HashMap::new();
        for invoice in self.storage.list_concept_invoices().await? {
            if let Some(key) = invoice.resolved_toll_key() {
                invoices_by_key.entry(key).or_insert(invoice);
            }
        }

        let groups = group_transactions(&candidates, &self.week_config);
        let mut transactions_by_id: HashMap<String, TollTransaction> = candidates
            .into_iter()
            .map(|txn| (txn.id.clone(), txn))
            .collect();

        let mut cache = LineCache::new();
        let mut matched = IndexSet::new();
        let mut updated_lines = IndexSet::new();
        let mut unmatched_groups = Vec::new();

        for group in &groups {
            let lookup = TollKey::new(&group.license_plate, group.week);
            let invoice = match invoices_by_key.get(&lookup) {
                Some(invoice) => invoice,
                None => {
                    unmatched_groups.push(UnmatchedGroup {
                        reason: format!(
                            "no concept invoice for plate {} in week {}",
                            group.license_plate, group.week
                        ),
                        group: group.clone(),
                    });
                    continue;
                }
            };
            let invoice = invoice.clone();
            self.apply_group(
                &invoice,
                group,
                &mut cache,
                &mut transactions_by_id,
                &mut matched,
                &mut updated_lines,
            )
            .await?;
        }

        info!(
            processed = processed_transactions,
            matched = matched.len(),
            unmatched = unmatched_groups.len(),
            "batch toll reconciliation finished"
        );
        Ok(BatchOutcome {
            processed_transactions,
            matched_transactions: matched.into_iter().collect(),
            unmatched_groups,
            updated_invoice_lines: updated_lines.into_iter().collect(),
        })
    }

    /// Build the match-health dashboard looking back `days_back` days
    ///
    /// Defaults to 120 days and anchors at today.
    pub async fn build_toll_dashboard(
        &self,
        days_back: Option<i64>,
    ) -> TollResult<TollDashboard> {
        self.dashboard.build(days_back).await
    }

    /// Dashboard anchored at an explicit date instead of today
    pub async fn build_toll_dashboard_as_of(
        &self,
        as_of: chrono::NaiveDate,
        days_back: Option<i64>,
    ) -> TollResult<TollDashboard> {
        self.dashboard.build_as_of(as_of, days_back).await
    }

    /// Land one group on `invoice`: upsert the line, then bind the members
    async fn apply_group(
        &mut self,
        invoice: &Invoice,
        group: &ChargeGroup,
        cache: &mut LineCache,
        transactions_by_id: &mut HashMap<String, TollTransaction>,
        matched: &mut IndexSet<String>,
        updated_lines: &mut IndexSet<String>,
    ) -> TollResult<()> {
        let decision = {
            let lines = cache.lines_for(&self.storage, &invoice.id).await?;
            match_group_to_lines(group, lines)
        };

        let line = self.write_decision(invoice, group, &decision, cache).await?;
        updated_lines.insert(line.id.clone());
        cache.upsert(line.clone());

        for transaction_id in &group.transaction_ids {
            if let Some(txn) = transactions_by_id.get_mut(transaction_id) {
                txn.apply(StatusEvent::Link {
                    line_id: line.id.clone(),
                })?;
                self.storage.update_transaction(txn).await?;
                matched.insert(transaction_id.clone());
            }
        }
        Ok(())
    }

    /// Create or update the line a decision names, returning its saved state
    async fn write_decision(
        &mut self,
        invoice: &Invoice,
        group: &ChargeGroup,
        decision: &MatchDecision,
        cache: &LineCache,
    ) -> TollResult<InvoiceLine> {
        match &decision.target {
            LineTarget::Create { description } => {
                let new_line = NewInvoiceLine {
                    invoice_id: invoice.id.clone(),
                    kind: LineKind::Toll,
                    toll_date: Some(group.date),
                    toll_country: group.country.clone(),
                    description: description.clone(),
                    quantity: decision.payload.quantity.clone(),
                    unit_price: decision.payload.unit_price.clone(),
                    vat_rate: decision.payload.vat_rate,
                    total: decision.payload.total.clone(),
                };
                self.storage.create_line(&new_line).await
            }
            LineTarget::Placeholder { line_id } => {
                let mut line = self.line_to_update(cache, &invoice.id, line_id)?;
                // A placeholder adopts the group's country and rate along
                // with the amounts, and its display text is regenerated
                line.toll_country = group.country.clone();
                line.description = describe_group(group);
                decision.payload.write_amounts(&mut line);
                self.storage.update_line(&line).await?;
                Ok(line)
            }
            LineTarget::Existing { line_id } => {
                let mut line = self.line_to_update(cache, &invoice.id, line_id)?;
                decision.payload.write_amounts(&mut line);
                self.storage.update_line(&line).await?;
                Ok(line)
            }
        }
    }

    /// Fetch the line a decision points at from the call's cache
    fn line_to_update(
        &self,
        cache: &LineCache,
        invoice_id: &str,
        line_id: &str,
    ) -> TollResult<InvoiceLine> {
        cache
            .get(invoice_id, line_id)
            .cloned()
            .ok_or_else(|| TollError::LineNotFound(line_id.to_string()))
    }
}
