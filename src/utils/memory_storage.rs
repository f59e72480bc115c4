//! In-memory storage implementation for testing

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;

/// In-memory storage implementation for testing and development
///
/// Clones share the underlying maps, so a handle kept by a test observes
/// everything the engine writes. List methods return rows in a stable
/// order, matching what a SQL backend with an ORDER BY would produce.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    transactions: Arc<RwLock<HashMap<String, TollTransaction>>>,
    invoices: Arc<RwLock<HashMap<String, Invoice>>>,
    lines: Arc<RwLock<HashMap<String, InvoiceLine>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
            invoices: Arc::new(RwLock::new(HashMap::new())),
            lines: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.transactions.write().unwrap().clear();
        self.invoices.write().unwrap().clear();
        self.lines.write().unwrap().clear();
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_transactions(transactions: &mut [TollTransaction]) {
    transactions.sort_by(|a, b| {
        (a.transaction_date, a.transaction_time, &a.id)
            .cmp(&(b.transaction_date, b.transaction_time, &b.id))
    });
}

#[async_trait]
impl TollStorage for MemoryStorage {
    async fn save_transaction(&mut self, transaction: &TollTransaction) -> TollResult<()> {
        self.transactions
            .write()
            .unwrap()
            .insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }

    async fn get_transaction(&self, transaction_id: &str) -> TollResult<Option<TollTransaction>> {
        Ok(self
            .transactions
            .read()
            .unwrap()
            .get(transaction_id)
            .cloned())
    }

    async fn get_transactions_for_plate(
        &self,
        license_plate: &str,
    ) -> TollResult<Vec<TollTransaction>> {
        let transactions = self.transactions.read().unwrap();
        let mut filtered: Vec<TollTransaction> = transactions
            .values()
            .filter(|txn| txn.license_plate == license_plate)
            .cloned()
            .collect();
        sort_transactions(&mut filtered);
        Ok(filtered)
    }

    async fn list_unclaimed_transactions(&self) -> TollResult<Vec<TollTransaction>> {
        let transactions = self.transactions.read().unwrap();
        let mut filtered: Vec<TollTransaction> = transactions
            .values()
            .filter(|txn| txn.is_unclaimed())
            .cloned()
            .collect();
        sort_transactions(&mut filtered);
        Ok(filtered)
    }

    async fn get_transactions_since(
        &self,
        start_date: NaiveDate,
        max_rows: usize,
    ) -> TollResult<Vec<TollTransaction>> {
        let transactions = self.transactions.read().unwrap();
        let mut filtered: Vec<TollTransaction> = transactions
            .values()
            .filter(|txn| txn.transaction_date >= start_date)
            .cloned()
            .collect();
        sort_transactions(&mut filtered);
        filtered.truncate(max_rows);
        Ok(filtered)
    }

    async fn update_transaction(&mut self, transaction: &TollTransaction) -> TollResult<()> {
        if self
            .transactions
            .read()
            .unwrap()
            .contains_key(&transaction.id)
        {
            self.transactions
                .write()
                .unwrap()
                .insert(transaction.id.clone(), transaction.clone());
            Ok(())
        } else {
            Err(TollError::TransactionNotFound(transaction.id.clone()))
        }
    }

    async fn save_invoice(&mut self, invoice: &Invoice) -> TollResult<()> {
        self.invoices
            .write()
            .unwrap()
            .insert(invoice.id.clone(), invoice.clone());
        Ok(())
    }

    async fn get_invoice(&self, invoice_id: &str) -> TollResult<Option<Invoice>> {
        Ok(self.invoices.read().unwrap().get(invoice_id).cloned())
    }

    async fn list_concept_invoices(&self) -> TollResult<Vec<Invoice>> {
        let invoices = self.invoices.read().unwrap();
        let mut filtered: Vec<Invoice> = invoices
            .values()
            .filter(|invoice| invoice.is_concept())
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(filtered)
    }

    async fn get_invoices_by_ids(&self, invoice_ids: &[String]) -> TollResult<Vec<Invoice>> {
        let invoices = self.invoices.read().unwrap();
        Ok(invoice_ids
            .iter()
            .filter_map(|id| invoices.get(id).cloned())
            .collect())
    }

    async fn create_line(&mut self, new_line: &NewInvoiceLine) -> TollResult<InvoiceLine> {
        let now = chrono::Utc::now().naive_utc();
        let line = InvoiceLine {
            id: Uuid::new_v4().to_string(),
            invoice_id: new_line.invoice_id.clone(),
            kind: new_line.kind,
            toll_date: new_line.toll_date,
            toll_country: new_line.toll_country.clone(),
            description: new_line.description.clone(),
            quantity: new_line.quantity.clone(),
            unit_price: new_line.unit_price.clone(),
            vat_rate: new_line.vat_rate,
            total: new_line.total.clone(),
            created_at: now,
            updated_at: now,
        };
        self.lines
            .write()
            .unwrap()
            .insert(line.id.clone(), line.clone());
        Ok(line)
    }

    async fn save_line(&mut self, line: &InvoiceLine) -> TollResult<()> {
        self.lines
            .write()
            .unwrap()
            .insert(line.id.clone(), line.clone());
        Ok(())
    }

    async fn get_line(&self, line_id: &str) -> TollResult<Option<InvoiceLine>> {
        Ok(self.lines.read().unwrap().get(line_id).cloned())
    }

    async fn get_lines_by_ids(&self, line_ids: &[String]) -> TollResult<Vec<InvoiceLine>> {
        let lines = self.lines.read().unwrap();
        Ok(line_ids
            .iter()
            .filter_map(|id| lines.get(id).cloned())
            .collect())
    }

    async fn list_invoice_lines(&self, invoice_id: &str) -> TollResult<Vec<InvoiceLine>> {
        let lines = self.lines.read().unwrap();
        let mut filtered: Vec<InvoiceLine> = lines
            .values()
            .filter(|line| line.invoice_id == invoice_id)
            .cloned()
            .collect();
        filtered.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(filtered)
    }

    async fn update_line(&mut self, line: &InvoiceLine) -> TollResult<()> {
        if self.lines.read().unwrap().contains_key(&line.id) {
            self.lines
                .write()
                .unwrap()
                .insert(line.id.clone(), line.clone());
            Ok(())
        } else {
            Err(TollError::LineNotFound(line.id.clone()))
        }
    }
}
