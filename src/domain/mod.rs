//! Domain types for the affiliate network.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Identifier primitives: AffiliateId, UserId, OrderId, ReferralCode, TimeMs
//! - Affiliate, Order, Commission and Withdrawal records with their statuses

pub mod affiliate;
pub mod commission;
pub mod decimal;
pub mod order;
pub mod primitives;
pub mod withdrawal;

pub use affiliate::{Affiliate, AffiliateStatus};
pub use commission::{Commission, CommissionStatus};
pub use decimal::Decimal;
pub use order::{Order, OrderStatus};
pub use primitives::{
    AffiliateId, CommissionId, IdParseError, OrderId, ReferralCode, TimeMs, UserId, WithdrawalId,
};
pub use withdrawal::{Withdrawal, WithdrawalStatus};
