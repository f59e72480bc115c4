//! Core types and data structures for the toll reconciliation engine

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::ingest::normalize_plate;
use crate::reference::{parse_reference, TollKey};

/// Lifecycle states of a toll transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Imported but not yet bound to an invoice line
    New,
    /// Bound to an invoice line
    Matched,
    /// Parked by an operator; the batch sweep leaves these alone
    Ignored,
}

/// Events that drive the transaction status machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusEvent {
    /// Bind the transaction to an invoice line
    Link {
        /// Line the transaction is billed on
        line_id: String,
    },
    /// Release the current binding
    Unlink,
    /// Park the transaction
    Ignore,
}

/// One toll-gate charge incurred by a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TollTransaction {
    /// Unique identifier, immutable after ingestion
    pub id: String,
    /// Normalized license plate (uppercase, no separators)
    pub license_plate: String,
    /// Date the charge was incurred
    pub transaction_date: NaiveDate,
    /// Time of day, best effort; midnight when the export had none
    pub transaction_time: NaiveTime,
    /// Charge amount, 2-decimal precision, currency implicit
    pub amount: BigDecimal,
    /// VAT percentage, e.g. 21
    pub vat_rate: i32,
    /// 2-letter country code; `None` when the export did not say
    pub country: Option<String>,
    /// Invoice line the charge is billed on; set only through `apply`
    pub invoice_line_id: Option<String>,
    /// Current lifecycle status
    pub status: TransactionStatus,
    /// When the transaction was ingested
    pub created_at: NaiveDateTime,
    /// When the transaction was last updated
    pub updated_at: NaiveDateTime,
}

impl TollTransaction {
    /// Create a freshly ingested transaction
    pub fn new(
        id: String,
        license_plate: &str,
        transaction_date: NaiveDate,
        transaction_time: Option<NaiveTime>,
        amount: BigDecimal,
        vat_rate: i32,
        country: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            license_plate: normalize_plate(license_plate),
            transaction_date,
            transaction_time: transaction_time.unwrap_or(NaiveTime::MIN),
            amount,
            vat_rate,
            country: country
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty()),
            invoice_line_id: None,
            status: TransactionStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the status machine with `event`
    ///
    /// `Link` is accepted from `New` and from `Ignored` (the explicit attach
    /// operation is the correction path for parked charges). `Unlink` is
    /// accepted from `Matched` only, `Ignore` from `New` only. Any other
    /// combination is rejected so call sites cannot drift into inconsistent
    /// states.
    pub fn apply(&mut self, event: StatusEvent) -> TollResult<()> {
        match (self.status, event) {
            (
                TransactionStatus::New | TransactionStatus::Ignored,
                StatusEvent::Link { line_id },
            ) => {
                self.invoice_line_id = Some(line_id);
                self.status = TransactionStatus::Matched;
            }
            (TransactionStatus::Matched, StatusEvent::Unlink) => {
                self.invoice_line_id = None;
                self.status = TransactionStatus::New;
            }
            (TransactionStatus::New, StatusEvent::Ignore) => {
                self.status = TransactionStatus::Ignored;
            }
            (status, event) => {
                return Err(TollError::InvalidTransition(format!(
                    "cannot apply {:?} to a transaction with status {:?}",
                    event, status
                )));
            }
        }
        self.updated_at = chrono::Utc::now().naive_utc();
        Ok(())
    }

    /// True when the batch sweep may claim this transaction
    pub fn is_unclaimed(&self) -> bool {
        self.status == TransactionStatus::New && self.invoice_line_id.is_none()
    }
}

/// Lifecycle states of an invoice; only `Concept` accepts toll edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Draft, still being assembled
    Concept,
    /// Sent to the customer
    Sent,
    /// Settled
    Paid,
    /// Withdrawn
    Cancelled,
}

/// A customer bill
///
/// The invoicing subsystem owns invoices; this engine only touches toll
/// lines on concept invoices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier for the invoice
    pub id: String,
    /// Free-text reference shown to the customer
    pub reference: String,
    /// Lifecycle status
    pub status: InvoiceStatus,
    /// Structured vehicle-week key; authoritative when present
    pub toll_key: Option<TollKey>,
    /// When the invoice was created
    pub created_at: NaiveDateTime,
    /// When the invoice was last updated
    pub updated_at: NaiveDateTime,
}

impl Invoice {
    /// Create an invoice with a free-text reference (the legacy shape)
    pub fn new(id: String, reference: String, status: InvoiceStatus) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            reference,
            status,
            toll_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a concept invoice for a vehicle-week; the reference text is
    /// rendered from the structured key
    pub fn for_toll_week(id: String, key: TollKey) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            reference: key.display_reference(),
            status: InvoiceStatus::Concept,
            toll_key: Some(key),
            created_at: now,
            updated_at: now,
        }
    }

    /// The vehicle-week this invoice bills, if any
    ///
    /// The structured key wins; invoices from before the structured column
    /// existed fall back to parsing the reference text.
    pub fn resolved_toll_key(&self) -> Option<TollKey> {
        self.toll_key
            .clone()
            .or_else(|| parse_reference(&self.reference))
    }

    /// Whether toll edits are allowed on this invoice
    pub fn is_concept(&self) -> bool {
        self.status == InvoiceStatus::Concept
    }
}

/// What an invoice line bills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    /// Toll charges for one vehicle-day
    Toll,
    /// Anything else on the invoice
    Other,
}

/// One line item of an invoice
///
/// Toll lines carry their matching key in the structured `toll_date` and
/// `toll_country` columns; `description` is a derived display string and is
/// never parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    /// Unique identifier for the line
    pub id: String,
    /// Invoice the line belongs to
    pub invoice_id: String,
    /// What the line bills
    pub kind: LineKind,
    /// Date of the toll charges on this line (toll lines only)
    pub toll_date: Option<NaiveDate>,
    /// 2-letter country code of the charges (toll lines only, when known)
    pub toll_country: Option<String>,
    /// Display text, e.g. "Maandag 10-03-2025\nTol België"
    pub description: String,
    /// Billed quantity
    pub quantity: BigDecimal,
    /// Price per unit
    pub unit_price: BigDecimal,
    /// VAT percentage for the line
    pub vat_rate: i32,
    /// Line total
    pub total: BigDecimal,
    /// When the line was created
    pub created_at: NaiveDateTime,
    /// When the line was last updated
    pub updated_at: NaiveDateTime,
}

impl InvoiceLine {
    /// A pre-seeded "toll goes here" marker: toll kind, zero quantity and price
    pub fn is_toll_placeholder(&self) -> bool {
        self.kind == LineKind::Toll
            && self.quantity == BigDecimal::from(0)
            && self.unit_price == BigDecimal::from(0)
    }

    /// A toll line that already carries billed amounts
    pub fn is_populated_toll(&self) -> bool {
        self.kind == LineKind::Toll && !self.is_toll_placeholder()
    }
}

/// Payload for creating an invoice line; storage mints the id and timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoiceLine {
    /// Invoice the line belongs to
    pub invoice_id: String,
    /// What the line bills
    pub kind: LineKind,
    /// Date of the toll charges (toll lines only)
    pub toll_date: Option<NaiveDate>,
    /// Country of the charges (toll lines only, when known)
    pub toll_country: Option<String>,
    /// Display text
    pub description: String,
    /// Billed quantity
    pub quantity: BigDecimal,
    /// Price per unit
    pub unit_price: BigDecimal,
    /// VAT percentage
    pub vat_rate: i32,
    /// Line total
    pub total: BigDecimal,
}

/// Errors that can occur in the reconciliation engine
#[derive(Debug, thiserror::Error)]
pub enum TollError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),
    #[error("Invoice not eligible for toll attachment: {0}")]
    InvoiceNotEligible(String),
    #[error("Unparsable invoice reference: {0}")]
    UnparsableReference(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Invoice line not found: {0}")]
    LineNotFound(String),
    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type for reconciliation operations
pub type TollResult<T> = Result<T, TollError>;
