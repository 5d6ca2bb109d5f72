//! Distribution claims, commission rows and earnings accumulators.
//!
//! The free functions take an explicit connection so the distributor can run
//! them inside one transaction.

use super::{to_minor, Repository};
use crate::domain::{
    AffiliateId, Commission, CommissionId, CommissionStatus, Decimal, Order, OrderId, TimeMs,
    UserId,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

const COMMISSION_COLUMNS: &str =
    "id, affiliate_id, order_id, level, amount_minor, status, reference, created_at";

/// Persisted summary of one distributed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionRow {
    pub order_id: OrderId,
    pub buyer: UserId,
    pub order_amount: Decimal,
    pub referrer_id: AffiliateId,
    pub total_commission: Decimal,
    pub levels_paid: u32,
    pub created_at: TimeMs,
}

fn commission_from_row(row: &SqliteRow) -> Commission {
    let id: String = row.get("id");
    let status_str: String = row.get("status");
    let status = CommissionStatus::from_str(&status_str).unwrap_or_else(|e| {
        warn!(commission_id = %id, status = %status_str, error = %e, "Unknown commission status, treating as unpaid");
        CommissionStatus::Unpaid
    });
    let level: i64 = row.get("level");

    Commission {
        id: CommissionId::new(id),
        affiliate_id: AffiliateId::new(row.get::<String, _>("affiliate_id")),
        order_id: OrderId::new(row.get::<String, _>("order_id")),
        level: u32::try_from(level).unwrap_or(0),
        amount: Decimal::from_minor_units(row.get("amount_minor")),
        status,
        reference: row.get("reference"),
        created_at: TimeMs::new(row.get("created_at")),
    }
}

/// Claim an order for distribution.
///
/// Returns false if the order was already claimed. Run this first in the
/// distribution transaction so the write lock is held before any read.
pub async fn claim_order(
    conn: &mut SqliteConnection,
    order: &Order,
    referrer: &AffiliateId,
    created_at: TimeMs,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO distributions (order_id, buyer, order_amount_minor, referrer_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(order_id) DO NOTHING
        "#,
    )
    .bind(order.id.as_str())
    .bind(order.buyer.as_str())
    .bind(to_minor(order.amount)?)
    .bind(referrer.as_str())
    .bind(created_at.as_ms())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Insert a commission. Returns false if (order, beneficiary) already has one.
pub async fn insert_commission(
    conn: &mut SqliteConnection,
    commission: &Commission,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO commissions (
            id, affiliate_id, order_id, level, amount_minor, status, reference, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(order_id, affiliate_id) DO NOTHING
        "#,
    )
    .bind(commission.id.as_str())
    .bind(commission.affiliate_id.as_str())
    .bind(commission.order_id.as_str())
    .bind(i64::from(commission.level))
    .bind(to_minor(commission.amount)?)
    .bind(commission.status.as_str())
    .bind(&commission.reference)
    .bind(commission.created_at.as_ms())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Atomically add `amount` to an affiliate's running earnings total.
pub async fn credit_earnings(
    conn: &mut SqliteConnection,
    affiliate_id: &AffiliateId,
    amount: Decimal,
) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        "UPDATE affiliates SET total_earnings_minor = total_earnings_minor + ? WHERE id = ?",
    )
    .bind(to_minor(amount)?)
    .bind(affiliate_id.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Record the totals of a claimed distribution.
pub async fn finish_distribution(
    conn: &mut SqliteConnection,
    order_id: &OrderId,
    total_commission: Decimal,
    levels_paid: u32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE distributions SET total_commission_minor = ?, levels_paid = ? WHERE order_id = ?",
    )
    .bind(to_minor(total_commission)?)
    .bind(i64::from(levels_paid))
    .bind(order_id.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

impl Repository {
    /// Bulk read of every commission, used by the hierarchy aggregator.
    pub async fn list_commissions(&self) -> Result<Vec<Commission>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM commissions ORDER BY created_at ASC, level ASC, id ASC",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(commission_from_row).collect())
    }

    /// Commissions earned by one affiliate, oldest first.
    pub async fn list_commissions_for_affiliate(
        &self,
        affiliate_id: &AffiliateId,
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM commissions WHERE affiliate_id = ? \
             ORDER BY created_at ASC, level ASC, id ASC",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(affiliate_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(commission_from_row).collect())
    }

    /// Commissions created for one order, by level.
    pub async fn list_commissions_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM commissions WHERE order_id = ? ORDER BY level ASC",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(commission_from_row).collect())
    }

    pub async fn get_distribution(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<DistributionRow>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT order_id, buyer, order_amount_minor, referrer_id,
                   total_commission_minor, levels_paid, created_at
            FROM distributions
            WHERE order_id = ?
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let levels_paid: i64 = r.get("levels_paid");
            DistributionRow {
                order_id: OrderId::new(r.get::<String, _>("order_id")),
                buyer: UserId::new(r.get::<String, _>("buyer")),
                order_amount: Decimal::from_minor_units(r.get("order_amount_minor")),
                referrer_id: AffiliateId::new(r.get::<String, _>("referrer_id")),
                total_commission: Decimal::from_minor_units(r.get("total_commission_minor")),
                levels_paid: u32::try_from(levels_paid).unwrap_or(0),
                created_at: TimeMs::new(r.get("created_at")),
            }
        }))
    }

    /// Sum an affiliate's commissions per status in one grouped read.
    pub async fn sum_commissions_by_status(
        &self,
        affiliate_id: &AffiliateId,
    ) -> Result<Vec<(CommissionStatus, Decimal)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT status, SUM(amount_minor) AS total_minor
            FROM commissions
            WHERE affiliate_id = ?
            GROUP BY status
            "#,
        )
        .bind(affiliate_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut sums = Vec::with_capacity(rows.len());
        for row in rows {
            let status_str: String = row.get("status");
            match CommissionStatus::from_str(&status_str) {
                Ok(status) => {
                    sums.push((status, Decimal::from_minor_units(row.get("total_minor"))))
                }
                Err(e) => {
                    warn!(affiliate_id = %affiliate_id, status = %status_str, error = %e, "Skipping commission group with unknown status");
                }
            }
        }

        Ok(sums)
    }

    /// Move a commission to a new payout status.
    ///
    /// Entering `Paid` credits the affiliate's `total_paid`; amount, level and
    /// beneficiary are never touched. Returns false if the commission does not exist.
    pub async fn update_commission_status(
        &self,
        id: &CommissionId,
        status: CommissionStatus,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT affiliate_id, amount_minor, status FROM commissions WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let affiliate_id: String = row.get("affiliate_id");
        let amount_minor: i64 = row.get("amount_minor");
        let previous: String = row.get("status");

        sqlx::query("UPDATE commissions SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        let was_paid = previous == CommissionStatus::Paid.as_str();
        let is_paid = status == CommissionStatus::Paid;
        if was_paid != is_paid {
            let delta = if is_paid { amount_minor } else { -amount_minor };
            sqlx::query("UPDATE affiliates SET total_paid_minor = total_paid_minor + ? WHERE id = ?")
                .bind(delta)
                .bind(&affiliate_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use super::*;
    use crate::domain::{Affiliate, AffiliateStatus, OrderStatus};

    async fn seed_affiliate(repo: &Repository, user: &str) -> Affiliate {
        let a = Affiliate::new(
            UserId::new(user),
            user.to_string(),
            None,
            AffiliateStatus::Active,
        );
        repo.insert_affiliate(&a).await.unwrap();
        a
    }

    fn order(id: &str) -> Order {
        Order {
            id: OrderId::new(id),
            buyer: UserId::new("buyer"),
            amount: Decimal::from(500000),
            status: OrderStatus::Completed,
            referred_by: None,
        }
    }

    #[tokio::test]
    async fn test_claim_order_only_once() {
        let (repo, _temp) = setup_test_db().await;
        let a = seed_affiliate(&repo, "u1").await;
        let o = order("ORD-1");

        let mut tx = repo.begin().await.unwrap();
        assert!(claim_order(&mut tx, &o, &a.id, TimeMs::new(1)).await.unwrap());
        assert!(!claim_order(&mut tx, &o, &a.id, TimeMs::new(2)).await.unwrap());
        tx.commit().await.unwrap();

        let row = repo.get_distribution(&o.id).await.unwrap().unwrap();
        assert_eq!(row.order_amount, Decimal::from(500000));
        assert_eq!(row.referrer_id, a.id);
    }

    #[tokio::test]
    async fn test_rolled_back_claim_leaves_nothing() {
        let (repo, _temp) = setup_test_db().await;
        let a = seed_affiliate(&repo, "u1").await;
        let o = order("ORD-1");

        {
            let mut tx = repo.begin().await.unwrap();
            claim_order(&mut tx, &o, &a.id, TimeMs::new(1)).await.unwrap();
            let c = Commission::unpaid(a.id.clone(), o.id.clone(), 1, Decimal::from(10), TimeMs::new(1));
            insert_commission(&mut tx, &c).await.unwrap();
            credit_earnings(&mut tx, &a.id, c.amount).await.unwrap();
        }

        assert!(repo.get_distribution(&o.id).await.unwrap().is_none());
        assert!(repo.list_commissions().await.unwrap().is_empty());
        let reloaded = repo.get_affiliate(&a.id).await.unwrap().unwrap();
        assert_eq!(reloaded.total_earnings, Decimal::zero());
    }

    #[tokio::test]
    async fn test_credit_earnings_unknown_affiliate_fails() {
        let (repo, _temp) = setup_test_db().await;
        let mut tx = repo.begin().await.unwrap();
        let err = credit_earnings(&mut tx, &AffiliateId::new("ghost"), Decimal::from(1))
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn test_sum_by_status_and_paid_accumulator() {
        let (repo, _temp) = setup_test_db().await;
        let a = seed_affiliate(&repo, "u1").await;

        let mut tx = repo.begin().await.unwrap();
        let mut ids = Vec::new();
        for (n, amount) in [("ORD-1", 100), ("ORD-2", 250), ("ORD-3", 50)] {
            let o = order(n);
            claim_order(&mut tx, &o, &a.id, TimeMs::new(1)).await.unwrap();
            let c = Commission::unpaid(a.id.clone(), o.id.clone(), 1, Decimal::from(amount), TimeMs::new(1));
            insert_commission(&mut tx, &c).await.unwrap();
            credit_earnings(&mut tx, &a.id, c.amount).await.unwrap();
            ids.push(c.id);
        }
        tx.commit().await.unwrap();

        assert!(repo.update_commission_status(&ids[0], CommissionStatus::Approved).await.unwrap());
        assert!(repo.update_commission_status(&ids[1], CommissionStatus::Approved).await.unwrap());
        assert!(repo.update_commission_status(&ids[2], CommissionStatus::Paid).await.unwrap());

        let mut sums = repo.sum_commissions_by_status(&a.id).await.unwrap();
        sums.sort();
        assert_eq!(
            sums,
            vec![
                (CommissionStatus::Approved, Decimal::from(350)),
                (CommissionStatus::Paid, Decimal::from(50)),
            ]
        );

        let reloaded = repo.get_affiliate(&a.id).await.unwrap().unwrap();
        assert_eq!(reloaded.total_earnings, Decimal::from(400));
        assert_eq!(reloaded.total_paid, Decimal::from(50));
        assert_eq!(reloaded.unpaid_earnings(), Decimal::from(350));
    }

    #[tokio::test]
    async fn test_update_status_missing_commission() {
        let (repo, _temp) = setup_test_db().await;
        let updated = repo
            .update_commission_status(&CommissionId::new("nope"), CommissionStatus::Paid)
            .await
            .unwrap();
        assert!(!updated);
    }
}
