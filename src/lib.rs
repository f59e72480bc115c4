//! # Tollmatch Core
//!
//! A reconciliation engine that matches raw toll-gate charges against the
//! weekly concept invoices of a trucking back-office, so every charge a
//! vehicle incurs ends up billed on the right customer invoice.
//!
//! ## Features
//!
//! - **Charge grouping**: Same-day, same-country, same-rate charges of a
//!   vehicle collapse into one billable group with a summed total
//! - **Invoice matching**: Groups land on existing toll lines or pre-seeded
//!   placeholders before a new line is created
//! - **Explicit attach**: A conflict-aware correction path that re-homes
//!   charges bound to the wrong invoice
//! - **Batch reconciliation**: An idempotent sweep that places all newly
//!   imported charges and reports the ones it could not place
//! - **Match-health dashboard**: Read-only matched/unmatched/missing views
//!   with per vehicle-week rollups
//! - **Storage abstraction**: Database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use tollmatch_core::{TollReconciler, TollTransaction, TollStorage};
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! // This example shows basic usage - you need to implement TollStorage trait
//! // let storage = YourStorageImplementation::new();
//! // let mut engine = TollReconciler::new(storage);
//! ```

pub mod calendar;
pub mod country;
pub mod ingest;
pub mod reconcile;
pub mod reference;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use calendar::*;
pub use country::*;
pub use ingest::*;
pub use reconcile::*;
pub use reference::*;
pub use traits::*;
pub use types::*;
