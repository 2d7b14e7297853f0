//! Quota Accounting
//!
//! Per-user admission control and usage persistence boundary.

mod ledger;
mod store;

pub use ledger::{QuotaLedger, QuotaSnapshot, Reservation};
pub use store::{MemoryUsageStore, UsageStore};
