//! Repository layer for database operations.
//!
//! Methods are organized across submodules by entity:
//! - `affiliates.rs` - Affiliate records and the SQLite upline source
//! - `commissions.rs` - Distribution claims, commission rows, earnings accumulators
//! - `withdrawals.rs` - Withdrawal rows and grouped sums
//!
//! Amounts are stored as integer minor units so `SUM` and `col = col + ?`
//! stay exact.

mod affiliates;
mod commissions;
mod withdrawals;

pub use affiliates::fetch_affiliate;
pub use commissions::{
    claim_order, credit_earnings, finish_distribution, insert_commission, DistributionRow,
};

use crate::domain::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Transaction;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Start a transaction for multi-statement writes.
    ///
    /// Dropping the returned transaction without committing rolls it back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Round-trip a trivial query to confirm the database is reachable.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Check out a single connection, e.g. to drive an upline walk.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, sqlx::Error> {
        self.pool.acquire().await
    }
}

/// Convert an amount to minor units, rejecting values outside `i64`.
pub(crate) fn to_minor(amount: Decimal) -> Result<i64, sqlx::Error> {
    amount.to_minor_units().ok_or_else(|| {
        sqlx::Error::Protocol(format!("amount {} does not fit storage range", amount))
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Repository;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    pub async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }
}
