//! Withdrawable balance from grouped commission and withdrawal sums.

use crate::db::Repository;
use crate::domain::{AffiliateId, CommissionStatus, Decimal, WithdrawalStatus};
use crate::engine::QueryError;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub total_earned: Decimal,
    pub approved_commission: Decimal,
    /// Withdrawals still in flight (PENDING or APPROVED).
    pub pending_withdrawal: Decimal,
    pub completed_withdrawal: Decimal,
    pub available_for_withdrawal: Decimal,
}

impl Balance {
    /// Combine per-status sums into a balance.
    ///
    /// `available_for_withdrawal` is clamped at zero.
    pub fn from_grouped(
        commissions: &[(CommissionStatus, Decimal)],
        withdrawals: &[(WithdrawalStatus, Decimal)],
    ) -> Self {
        let approved_commission: Decimal = commissions
            .iter()
            .filter(|(status, _)| *status == CommissionStatus::Approved)
            .map(|(_, sum)| *sum)
            .sum();
        let pending_withdrawal: Decimal = withdrawals
            .iter()
            .filter(|(status, _)| status.is_outstanding())
            .map(|(_, sum)| *sum)
            .sum();
        let completed_withdrawal: Decimal = withdrawals
            .iter()
            .filter(|(status, _)| *status == WithdrawalStatus::Completed)
            .map(|(_, sum)| *sum)
            .sum();

        Self {
            total_earned: approved_commission + completed_withdrawal,
            approved_commission,
            pending_withdrawal,
            completed_withdrawal,
            available_for_withdrawal: (approved_commission - pending_withdrawal).max_zero(),
        }
    }
}

#[derive(Clone)]
pub struct BalanceAggregator {
    repo: Arc<Repository>,
}

impl BalanceAggregator {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Balance of one affiliate from one grouped read per entity kind.
    pub async fn available_balance(&self, affiliate_id: &AffiliateId) -> Result<Balance, QueryError> {
        let (affiliate, commissions, withdrawals) = futures::try_join!(
            self.repo.get_affiliate(affiliate_id),
            self.repo.sum_commissions_by_status(affiliate_id),
            self.repo.sum_withdrawals_by_status(affiliate_id),
        )?;

        if affiliate.is_none() {
            return Err(QueryError::AffiliateNotFound(affiliate_id.clone()));
        }

        Ok(Balance::from_grouped(&commissions, &withdrawals))
    }
}
