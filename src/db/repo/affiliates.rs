//! Affiliate operations.

use super::{to_minor, Repository};
use crate::domain::{
    Affiliate, AffiliateId, AffiliateStatus, Decimal, ReferralCode, TimeMs, UserId,
};
use crate::engine::upline::AffiliateSource;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

const AFFILIATE_COLUMNS: &str = "id, user_id, display_name, code, status, referred_by, \
     total_earnings_minor, total_paid_minor, created_at";

fn affiliate_from_row(row: &SqliteRow) -> Affiliate {
    let id: String = row.get("id");
    let status_str: String = row.get("status");
    let status = AffiliateStatus::from_str(&status_str).unwrap_or_else(|e| {
        warn!(affiliate_id = %id, status = %status_str, error = %e, "Unknown affiliate status, treating as inactive");
        AffiliateStatus::Inactive
    });
    let referred_by: Option<String> = row.get("referred_by");

    Affiliate {
        id: AffiliateId::new(id),
        user_id: UserId::new(row.get::<String, _>("user_id")),
        display_name: row.get("display_name"),
        code: ReferralCode::new(row.get::<String, _>("code")),
        status,
        referred_by: referred_by.map(AffiliateId::new),
        total_earnings: Decimal::from_minor_units(row.get("total_earnings_minor")),
        total_paid: Decimal::from_minor_units(row.get("total_paid_minor")),
        created_at: TimeMs::new(row.get("created_at")),
    }
}

/// Load one affiliate on an explicit connection (pool or transaction).
pub async fn fetch_affiliate(
    conn: &mut SqliteConnection,
    id: &AffiliateId,
) -> Result<Option<Affiliate>, sqlx::Error> {
    let sql = format!("SELECT {} FROM affiliates WHERE id = ?", AFFILIATE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(affiliate_from_row))
}

#[async_trait]
impl AffiliateSource for SqliteConnection {
    async fn affiliate(&mut self, id: &AffiliateId) -> Result<Option<Affiliate>, sqlx::Error> {
        fetch_affiliate(self, id).await
    }
}

impl Repository {
    /// Insert a new affiliate.
    ///
    /// # Errors
    /// Returns an error if the user or referral code is already taken.
    pub async fn insert_affiliate(&self, affiliate: &Affiliate) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO affiliates (
                id, user_id, display_name, code, status, referred_by,
                total_earnings_minor, total_paid_minor, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(affiliate.id.as_str())
        .bind(affiliate.user_id.as_str())
        .bind(&affiliate.display_name)
        .bind(affiliate.code.as_str())
        .bind(affiliate.status.as_str())
        .bind(affiliate.referred_by.as_ref().map(|r| r.as_str()))
        .bind(to_minor(affiliate.total_earnings)?)
        .bind(to_minor(affiliate.total_paid)?)
        .bind(affiliate.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get an affiliate by id.
    pub async fn get_affiliate(&self, id: &AffiliateId) -> Result<Option<Affiliate>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_affiliate(&mut conn, id).await
    }

    /// Get the affiliate owned by a user, if the user has qualified.
    pub async fn find_affiliate_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Affiliate>, sqlx::Error> {
        let sql = format!("SELECT {} FROM affiliates WHERE user_id = ?", AFFILIATE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(affiliate_from_row))
    }

    /// Resolve a referral code to its affiliate.
    pub async fn find_affiliate_by_code(
        &self,
        code: &ReferralCode,
    ) -> Result<Option<Affiliate>, sqlx::Error> {
        let sql = format!("SELECT {} FROM affiliates WHERE code = ?", AFFILIATE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(affiliate_from_row))
    }

    /// Direct referrals of an affiliate, oldest first.
    pub async fn list_referrals(
        &self,
        referrer: &AffiliateId,
    ) -> Result<Vec<Affiliate>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM affiliates WHERE referred_by = ? ORDER BY created_at ASC, id ASC",
            AFFILIATE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(referrer.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(affiliate_from_row).collect())
    }

    /// Bulk read of every affiliate, used by the hierarchy aggregator.
    pub async fn list_affiliates(&self) -> Result<Vec<Affiliate>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM affiliates ORDER BY created_at ASC, id ASC",
            AFFILIATE_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(affiliate_from_row).collect())
    }

    /// Update an affiliate's status. Returns false if the affiliate does not exist.
    pub async fn set_affiliate_status(
        &self,
        id: &AffiliateId,
        status: AffiliateStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE affiliates SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
