//! Commission records created by a distribution run.

use crate::domain::{AffiliateId, CommissionId, Decimal, OrderId, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Payout status of a commission. Only the external payout workflow moves it past `Unpaid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Unpaid,
    Pending,
    Approved,
    Paid,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Unpaid => "UNPAID",
            CommissionStatus::Pending => "PENDING",
            CommissionStatus::Approved => "APPROVED",
            CommissionStatus::Paid => "PAID",
        }
    }
}

impl std::fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNPAID" => Ok(CommissionStatus::Unpaid),
            "PENDING" => Ok(CommissionStatus::Pending),
            "APPROVED" => Ok(CommissionStatus::Approved),
            "PAID" => Ok(CommissionStatus::Paid),
            other => Err(format!("unknown commission status: {}", other)),
        }
    }
}

/// One payout line: `amount` owed to `affiliate_id` for `order_id` at `level`.
///
/// Level is relative to the buyer (1 = the buyer's direct referrer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: CommissionId,
    pub affiliate_id: AffiliateId,
    pub order_id: OrderId,
    pub level: u32,
    pub amount: Decimal,
    pub status: CommissionStatus,
    pub reference: String,
    pub created_at: TimeMs,
}

impl Commission {
    /// Create an unpaid commission with a fresh id.
    pub fn unpaid(
        affiliate_id: AffiliateId,
        order_id: OrderId,
        level: u32,
        amount: Decimal,
        created_at: TimeMs,
    ) -> Self {
        let reference = Self::reference_for(&order_id, level);
        Self {
            id: CommissionId::new(uuid::Uuid::new_v4().to_string()),
            affiliate_id,
            order_id,
            level,
            amount,
            status: CommissionStatus::Unpaid,
            reference,
            created_at,
        }
    }

    pub fn reference_for(order_id: &OrderId, level: u32) -> String {
        format!("L{} commission for order {}", level, order_id)
    }
}
