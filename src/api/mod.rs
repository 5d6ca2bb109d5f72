pub mod affiliates;
pub mod commissions;
pub mod health;
pub mod network;
pub mod orders;

use crate::config::Config;
use crate::datasource::PurchaseSource;
use crate::db::Repository;
use crate::domain::AffiliateId;
use crate::engine::{BalanceAggregator, CommissionDistributor, HierarchyAggregator};
use crate::error::AppError;
use crate::orchestration::PurchaseProcessor;
use axum::{
    routing::{get, post},
    Router,
};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub distributor: Arc<CommissionDistributor>,
    pub hierarchy: Arc<HierarchyAggregator>,
    pub balance: Arc<BalanceAggregator>,
    pub purchases: Arc<PurchaseProcessor>,
}

impl AppState {
    /// Wire the engine components around one repository.
    pub fn new(repo: Arc<Repository>, config: &Config, source: Arc<dyn PurchaseSource>) -> Self {
        let distributor = Arc::new(CommissionDistributor::new(
            repo.clone(),
            Arc::new(config.commission_schedule.clone()),
            config.max_upline_depth,
        ));
        let purchases = Arc::new(PurchaseProcessor::new(
            source,
            repo.clone(),
            distributor.clone(),
        ));

        Self {
            hierarchy: Arc::new(HierarchyAggregator::new(repo.clone())),
            balance: Arc::new(BalanceAggregator::new(repo.clone())),
            repo,
            distributor,
            purchases,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/affiliates", post(affiliates::create_affiliate))
        .route("/v1/affiliates/:id", get(affiliates::get_affiliate))
        .route("/v1/affiliates/:id/status", post(affiliates::set_status))
        .route("/v1/affiliates/:id/upline", get(network::get_upline))
        .route("/v1/affiliates/:id/tree", get(network::get_tree))
        .route("/v1/affiliates/:id/balance", get(network::get_balance))
        .route(
            "/v1/affiliates/:id/commissions",
            get(commissions::list_commissions),
        )
        .route(
            "/v1/affiliates/:id/withdrawals",
            post(affiliates::create_withdrawal),
        )
        .route(
            "/v1/commissions/:id/status",
            post(commissions::set_commission_status),
        )
        .route("/v1/commission-schedule", get(orders::get_schedule))
        .route("/v1/orders/distribute", post(orders::distribute))
        .route("/v1/purchases", post(orders::record_purchase))
        .layer(cors)
        .with_state(state)
}

fn parse_affiliate_id(raw: &str) -> Result<AffiliateId, AppError> {
    AffiliateId::from_str(raw)
        .map_err(|e| AppError::BadRequest(format!("Invalid affiliate id: {}", e)))
}
