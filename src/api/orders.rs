use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{parse_affiliate_id, AppState};
use crate::domain::{Decimal, Order, OrderId, OrderStatus, UserId};
use crate::engine::{CommissionRate, Distribution};
use crate::error::AppError;
use crate::orchestration::{PurchaseEvent, PurchaseOutcome};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeRequest {
    pub order_id: String,
    pub buyer: String,
    pub amount: Decimal,
    pub status: OrderStatus,
    /// The buyer's direct referrer.
    pub referrer_id: String,
}

/// Create commissions for a completed order with a known referrer.
pub async fn distribute(
    State(state): State<AppState>,
    Json(req): Json<DistributeRequest>,
) -> Result<(StatusCode, Json<Distribution>), AppError> {
    let order_id = OrderId::from_str(&req.order_id)
        .map_err(|e| AppError::BadRequest(format!("Invalid order id: {}", e)))?;
    let buyer = UserId::from_str(&req.buyer)
        .map_err(|e| AppError::BadRequest(format!("Invalid buyer: {}", e)))?;
    let referrer = parse_affiliate_id(&req.referrer_id)?;
    validate_amount(req.amount)?;

    let order = Order {
        id: order_id,
        buyer,
        amount: req.amount,
        status: req.status,
        referred_by: Some(referrer.clone()),
    };
    let distribution = state.distributor.distribute(&order, &referrer).await?;
    Ok((StatusCode::CREATED, Json(distribution)))
}

/// Purchase webhook from the commerce provider.
pub async fn record_purchase(
    State(state): State<AppState>,
    Json(event): Json<PurchaseEvent>,
) -> Result<Json<PurchaseOutcome>, AppError> {
    validate_amount(event.amount)?;
    let outcome = state.purchases.process(event).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleLevel {
    pub level: u32,
    pub rate: CommissionRate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub levels: Vec<ScheduleLevel>,
    /// Levels actually walked per order.
    pub max_depth: u32,
}

pub async fn get_schedule(State(state): State<AppState>) -> Json<ScheduleResponse> {
    let levels = state
        .distributor
        .schedule()
        .iter()
        .map(|(level, rate)| ScheduleLevel { level, rate })
        .collect();
    Json(ScheduleResponse {
        levels,
        max_depth: state.distributor.max_depth(),
    })
}

fn validate_amount(amount: Decimal) -> Result<(), AppError> {
    if amount.is_negative() {
        return Err(AppError::BadRequest("amount must not be negative".into()));
    }
    if amount.to_minor_units().is_none() {
        return Err(AppError::BadRequest("amount out of range".into()));
    }
    Ok(())
}
