//! Commission distribution for completed orders.

use crate::db::repo::{self, Repository};
use crate::domain::{AffiliateId, Commission, Decimal, Order, OrderId, OrderStatus, TimeMs};
use crate::engine::schedule::CommissionSchedule;
use crate::engine::upline::{resolve_upline, Upline};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("referrer {0} not found")]
    ReferrerNotFound(AffiliateId),
    #[error("order {0} has already been distributed")]
    DuplicateOrder(OrderId),
    #[error("order {order_id} is {status}, only completed orders earn commission")]
    OrderNotCompleted {
        order_id: OrderId,
        status: OrderStatus,
    },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSummary {
    pub order_total: Decimal,
    pub total_commission: Decimal,
    pub levels_paid: u32,
}

/// Result of one distribution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub order: Order,
    pub commissions: Vec<Commission>,
    pub summary: DistributionSummary,
    /// Present when the upline was truncated by malformed referral data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<crate::engine::GraphAnomaly>,
}

/// Turn a resolved upline into commission records.
///
/// One record per upline level whose scheduled amount, rounded to cents, is
/// positive.
pub fn plan_commissions(
    order: &Order,
    upline: &Upline,
    schedule: &CommissionSchedule,
    created_at: TimeMs,
) -> Vec<Commission> {
    upline
        .entries
        .iter()
        .filter_map(|entry| {
            let amount = schedule.amount_for(entry.level, order.amount);
            amount.is_positive().then(|| {
                Commission::unpaid(
                    entry.affiliate_id.clone(),
                    order.id.clone(),
                    entry.level,
                    amount,
                    created_at,
                )
            })
        })
        .collect()
}

/// Creates commission records for completed orders.
///
/// Each run is one SQLite transaction that starts by claiming the order in
/// `distributions`. The claim, the upline walk, every commission insert and
/// every earnings increment commit together or not at all, and a second run
/// for the same order finds the claim and fails with `DuplicateOrder`.
#[derive(Clone)]
pub struct CommissionDistributor {
    repo: Arc<Repository>,
    schedule: Arc<CommissionSchedule>,
    max_depth: u32,
}

impl CommissionDistributor {
    /// `max_depth` caps the upline walk below the schedule's highest level.
    pub fn new(
        repo: Arc<Repository>,
        schedule: Arc<CommissionSchedule>,
        max_depth: Option<u32>,
    ) -> Self {
        let max_depth = match max_depth {
            Some(cap) => cap.min(schedule.max_level()),
            None => schedule.max_level(),
        };
        Self {
            repo,
            schedule,
            max_depth,
        }
    }

    pub fn schedule(&self) -> &CommissionSchedule {
        &self.schedule
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub async fn distribute(
        &self,
        order: &Order,
        direct_referrer: &AffiliateId,
    ) -> Result<Distribution, DistributionError> {
        if !order.is_completed() {
            return Err(DistributionError::OrderNotCompleted {
                order_id: order.id.clone(),
                status: order.status,
            });
        }

        let now = TimeMs::now();
        let mut tx = self.repo.begin().await?;

        if !repo::claim_order(&mut tx, order, direct_referrer, now).await? {
            warn!(order_id = %order.id, "Order already distributed, skipping");
            return Err(DistributionError::DuplicateOrder(order.id.clone()));
        }

        if repo::fetch_affiliate(&mut tx, direct_referrer).await?.is_none() {
            return Err(DistributionError::ReferrerNotFound(direct_referrer.clone()));
        }

        let upline = resolve_upline(&mut *tx, direct_referrer, self.max_depth).await?;
        let commissions = plan_commissions(order, &upline, &self.schedule, now);

        let mut total_commission = Decimal::zero();
        for commission in &commissions {
            if !repo::insert_commission(&mut tx, commission).await? {
                warn!(order_id = %order.id, affiliate_id = %commission.affiliate_id, "Commission already exists for order, aborting run");
                return Err(DistributionError::DuplicateOrder(order.id.clone()));
            }
            repo::credit_earnings(&mut tx, &commission.affiliate_id, commission.amount).await?;
            total_commission += commission.amount;
        }

        let levels_paid = commissions.len() as u32;
        repo::finish_distribution(&mut tx, &order.id, total_commission, levels_paid).await?;
        tx.commit().await?;

        info!(
            order_id = %order.id,
            referrer = %direct_referrer,
            levels_paid,
            total_commission = %total_commission,
            "Distributed commissions"
        );

        Ok(Distribution {
            order: order.clone(),
            commissions,
            summary: DistributionSummary {
                order_total: order.amount,
                total_commission,
                levels_paid,
            },
            anomaly: upline.anomaly,
        })
    }
}
