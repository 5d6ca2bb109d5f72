//! Affiliate records and their status.

use crate::domain::{AffiliateId, Decimal, ReferralCode, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of an affiliate. Affiliates are never deleted, only deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AffiliateStatus {
    Active,
    Inactive,
    Pending,
}

impl AffiliateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AffiliateStatus::Active => "ACTIVE",
            AffiliateStatus::Inactive => "INACTIVE",
            AffiliateStatus::Pending => "PENDING",
        }
    }
}

impl std::fmt::Display for AffiliateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AffiliateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(AffiliateStatus::Active),
            "INACTIVE" => Ok(AffiliateStatus::Inactive),
            "PENDING" => Ok(AffiliateStatus::Pending),
            other => Err(format!("unknown affiliate status: {}", other)),
        }
    }
}

/// A participant in the referral network.
///
/// `referred_by` is a parent pointer; the set of affiliates forms a forest.
/// Bad data may still contain cycles, so every traversal keeps a visited set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affiliate {
    pub id: AffiliateId,
    pub user_id: UserId,
    pub display_name: String,
    pub code: ReferralCode,
    pub status: AffiliateStatus,
    pub referred_by: Option<AffiliateId>,
    pub total_earnings: Decimal,
    pub total_paid: Decimal,
    pub created_at: TimeMs,
}

impl Affiliate {
    /// Build a fresh affiliate with a generated id and derived referral code.
    pub fn new(
        user_id: UserId,
        display_name: String,
        referred_by: Option<AffiliateId>,
        status: AffiliateStatus,
    ) -> Self {
        let id = AffiliateId::new(uuid::Uuid::new_v4().to_string());
        let code = ReferralCode::derive(&id);
        Self {
            id,
            user_id,
            display_name,
            code,
            status,
            referred_by,
            total_earnings: Decimal::zero(),
            total_paid: Decimal::zero(),
            created_at: TimeMs::now(),
        }
    }

    /// Earnings credited but not yet paid out.
    pub fn unpaid_earnings(&self) -> Decimal {
        self.total_earnings - self.total_paid
    }
}
