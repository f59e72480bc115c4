//! Traits for storage abstraction

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::*;

/// Storage abstraction for the reconciliation engine
///
/// This trait allows the engine to work with any storage backend
/// (PostgreSQL, MySQL, SQLite, in-memory, etc.) by implementing these
/// methods. List methods must return rows in a stable order so repeated
/// runs make the same decisions.
#[async_trait]
pub trait TollStorage: Send + Sync {
    /// Save a toll transaction to storage
    async fn save_transaction(&mut self, transaction: &TollTransaction) -> TollResult<()>;

    /// Get a toll transaction by ID
    async fn get_transaction(&self, transaction_id: &str) -> TollResult<Option<TollTransaction>>;

    /// List every transaction for a plate, regardless of status
    async fn get_transactions_for_plate(
        &self,
        license_plate: &str,
    ) -> TollResult<Vec<TollTransaction>>;

    /// List transactions the batch sweep may claim: status new, no line bound
    async fn list_unclaimed_transactions(&self) -> TollResult<Vec<TollTransaction>>;

    /// List transactions dated on or after `start_date`, capped at `max_rows`
    async fn get_transactions_since(
        &self,
        start_date: NaiveDate,
        max_rows: usize,
    ) -> TollResult<Vec<TollTransaction>>;

    /// Update a toll transaction
    async fn update_transaction(&mut self, transaction: &TollTransaction) -> TollResult<()>;

    /// Save an invoice to storage
    async fn save_invoice(&mut self, invoice: &Invoice) -> TollResult<()>;

    /// Get an invoice by ID
    async fn get_invoice(&self, invoice_id: &str) -> TollResult<Option<Invoice>>;

    /// List all invoices still in concept status
    async fn list_concept_invoices(&self) -> TollResult<Vec<Invoice>>;

    /// Get invoices by ID; missing ids are skipped silently
    ///
    /// Callers chunk the id list, so implementations never see more than a
    /// few hundred ids per call.
    async fn get_invoices_by_ids(&self, invoice_ids: &[String]) -> TollResult<Vec<Invoice>>;

    /// Create an invoice line; storage mints the id and timestamps
    async fn create_line(&mut self, new_line: &NewInvoiceLine) -> TollResult<InvoiceLine>;

    /// Save an invoice line with a caller-provided ID
    async fn save_line(&mut self, line: &InvoiceLine) -> TollResult<()>;

    /// Get an invoice line by ID
    async fn get_line(&self, line_id: &str) -> TollResult<Option<InvoiceLine>>;

    /// Get invoice lines by ID; missing ids are skipped silently
    async fn get_lines_by_ids(&self, line_ids: &[String]) -> TollResult<Vec<InvoiceLine>>;

    /// List all lines of one invoice
    async fn list_invoice_lines(&self, invoice_id: &str) -> TollResult<Vec<InvoiceLine>>;

    /// Update an invoice line
    async fn update_line(&mut self, line: &InvoiceLine) -> TollResult<()>;
}
