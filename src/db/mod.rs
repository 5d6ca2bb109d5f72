//! SQLite storage for the affiliate ledger.
//!
//! `init_db` opens the pool and applies the schema; `Repository` holds the
//! affiliate, distribution, commission and withdrawal queries. Amounts are
//! stored as integer cents.

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
