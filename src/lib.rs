pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{
    DataSourceError, HttpPurchaseSource, MockPurchaseSource, PurchaseFacts, PurchaseSource,
};
pub use db::{init_db, Repository};
pub use domain::{
    Affiliate, AffiliateId, AffiliateStatus, Commission, CommissionStatus, Decimal, Order,
    OrderId, OrderStatus, ReferralCode, TimeMs, UserId, Withdrawal, WithdrawalStatus,
};
pub use engine::{
    BalanceAggregator, CommissionDistributor, CommissionSchedule, HierarchyAggregator,
};
pub use error::AppError;
