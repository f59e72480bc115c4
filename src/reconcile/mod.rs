//! Reconciliation module containing grouping, matching, linking and reporting

pub mod core;
pub mod dashboard;
pub mod grouping;
pub mod matcher;

pub use core::*;
pub use dashboard::*;
pub use grouping::*;
pub use matcher::*;
