//! Request-level workflows that combine the purchase source, the repository
//! and the commission engine.

pub mod purchase;

pub use purchase::{PurchaseError, PurchaseEvent, PurchaseOutcome, PurchaseProcessor};
