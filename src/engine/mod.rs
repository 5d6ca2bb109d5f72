//! Commission distribution and referral-network aggregation.

use crate::domain::AffiliateId;
use thiserror::Error;

pub mod balance;
pub mod distributor;
pub mod hierarchy;
pub mod schedule;
pub mod upline;

pub use balance::{Balance, BalanceAggregator};
pub use distributor::{
    plan_commissions, CommissionDistributor, Distribution, DistributionError, DistributionSummary,
};
pub use hierarchy::{AffiliateTree, HierarchyAggregator, NetworkSnapshot, TreeNode, TreeSummary};
pub use schedule::{CommissionRate, CommissionSchedule, ScheduleError};
pub use upline::{resolve_upline, AffiliateSource, GraphAnomaly, Upline, UplineEntry};

/// Failure of a read-side query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("affiliate {0} not found")]
    AffiliateNotFound(AffiliateId),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
