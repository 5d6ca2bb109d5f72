//! Withdrawal operations.

use super::{to_minor, Repository};
use crate::domain::{AffiliateId, CommissionStatus, Decimal, Withdrawal, WithdrawalStatus};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

impl Repository {
    pub async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO withdrawals (id, affiliate_id, amount_minor, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(withdrawal.id.as_str())
        .bind(withdrawal.affiliate_id.as_str())
        .bind(to_minor(withdrawal.amount)?)
        .bind(withdrawal.status.as_str())
        .bind(withdrawal.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert an outstanding withdrawal only if it fits the available balance.
    ///
    /// The balance check and the insert are one statement, so SQLite takes the
    /// write lock before reading the sums and concurrent requests serialize.
    /// Returns `false` when the request exceeds the balance and nothing was written.
    pub async fn insert_withdrawal_within_balance(
        &self,
        withdrawal: &Withdrawal,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO withdrawals (id, affiliate_id, amount_minor, status, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5
            WHERE ?3 <= (
                SELECT COALESCE(SUM(amount_minor), 0)
                FROM commissions
                WHERE affiliate_id = ?2 AND status = ?6
            ) - (
                SELECT COALESCE(SUM(amount_minor), 0)
                FROM withdrawals
                WHERE affiliate_id = ?2 AND status IN (?7, ?8)
            )
            "#,
        )
        .bind(withdrawal.id.as_str())
        .bind(withdrawal.affiliate_id.as_str())
        .bind(to_minor(withdrawal.amount)?)
        .bind(withdrawal.status.as_str())
        .bind(withdrawal.created_at.as_ms())
        .bind(CommissionStatus::Approved.as_str())
        .bind(WithdrawalStatus::Pending.as_str())
        .bind(WithdrawalStatus::Approved.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Sum an affiliate's withdrawals per status in one grouped read.
    pub async fn sum_withdrawals_by_status(
        &self,
        affiliate_id: &AffiliateId,
    ) -> Result<Vec<(WithdrawalStatus, Decimal)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT status, SUM(amount_minor) AS total_minor
            FROM withdrawals
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
            match WithdrawalStatus::from_str(&status_str) {
                Ok(status) => {
                    sums.push((status, Decimal::from_minor_units(row.get("total_minor"))))
                }
                Err(e) => {
                    warn!(affiliate_id = %affiliate_id, status = %status_str, error = %e, "Skipping withdrawal group with unknown status");
                }
            }
        }

        Ok(sums)
    }
}
