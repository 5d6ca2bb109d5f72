use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;
use tracing::info;

use super::{parse_affiliate_id, AppState};
use crate::domain::{
    Affiliate, AffiliateId, AffiliateStatus, Decimal, ReferralCode, UserId, Withdrawal,
    WithdrawalStatus,
};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAffiliateRequest {
    pub user_id: String,
    pub display_name: String,
    /// Recruiter's public referral code.
    pub referral_code: Option<String>,
    /// Recruiter's affiliate id, when the code is not at hand.
    pub referred_by: Option<String>,
    pub status: Option<AffiliateStatus>,
}

pub async fn create_affiliate(
    State(state): State<AppState>,
    Json(req): Json<CreateAffiliateRequest>,
) -> Result<(StatusCode, Json<Affiliate>), AppError> {
    let user_id = UserId::from_str(&req.user_id)
        .map_err(|e| AppError::BadRequest(format!("Invalid user id: {}", e)))?;
    let display_name = req.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::BadRequest("displayName must not be empty".into()));
    }

    let referrer = match (req.referral_code.as_deref(), req.referred_by.as_deref()) {
        (Some(code), _) => {
            let code = ReferralCode::new(code);
            let recruiter = state
                .repo
                .find_affiliate_by_code(&code)
                .await?
                .ok_or_else(|| AppError::BadRequest(format!("Unknown referral code {}", code)))?;
            Some(recruiter.id)
        }
        (None, Some(raw)) => {
            let id = parse_affiliate_id(raw)?;
            if state.repo.get_affiliate(&id).await?.is_none() {
                return Err(AppError::BadRequest(format!("Unknown referrer {}", id)));
            }
            Some(id)
        }
        (None, None) => None,
    };

    if state.repo.find_affiliate_by_user(&user_id).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "User {} is already an affiliate",
            user_id
        )));
    }

    let affiliate = Affiliate::new(
        user_id,
        display_name.to_string(),
        referrer,
        req.status.unwrap_or(AffiliateStatus::Active),
    );
    match state.repo.insert_affiliate(&affiliate).await {
        Ok(()) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::Conflict(format!(
                "User {} is already an affiliate",
                affiliate.user_id
            )));
        }
        Err(e) => return Err(e.into()),
    }

    info!(affiliate_id = %affiliate.id, code = %affiliate.code, "Registered affiliate");
    Ok((StatusCode::CREATED, Json(affiliate)))
}

pub async fn get_affiliate(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Affiliate>, AppError> {
    let id = parse_affiliate_id(&id)?;
    let affiliate = load_affiliate(&state, &id).await?;
    Ok(Json(affiliate))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: AffiliateStatus,
}

/// Activate or deactivate an affiliate. Affiliates are never deleted.
pub async fn set_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<Affiliate>, AppError> {
    let id = parse_affiliate_id(&id)?;
    if !state.repo.set_affiliate_status(&id, req.status).await? {
        return Err(AppError::NotFound(format!("Affiliate {} not found", id)));
    }
    info!(affiliate_id = %id, status = %req.status, "Affiliate status changed");

    let affiliate = load_affiliate(&state, &id).await?;
    Ok(Json(affiliate))
}

#[derive(Debug, Deserialize)]
pub struct CreateWithdrawalRequest {
    pub amount: Decimal,
    pub status: Option<WithdrawalStatus>,
}

/// Record a withdrawal request against an affiliate's balance.
///
/// Outstanding requests may not exceed the available balance, checked in the
/// same statement as the insert.
pub async fn create_withdrawal(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<Withdrawal>), AppError> {
    let id = parse_affiliate_id(&id)?;
    let amount = req.amount.round_money();
    if !amount.is_positive() {
        return Err(AppError::BadRequest("amount must be at least 0.01".into()));
    }

    load_affiliate(&state, &id).await?;

    let status = req.status.unwrap_or(WithdrawalStatus::Pending);
    let withdrawal = Withdrawal::new(id, amount, status);
    if !status.is_outstanding() {
        state.repo.insert_withdrawal(&withdrawal).await?;
    } else if !state.repo.insert_withdrawal_within_balance(&withdrawal).await? {
        let balance = state.balance.available_balance(&withdrawal.affiliate_id).await?;
        return Err(AppError::Unprocessable(format!(
            "Requested {} exceeds available balance {}",
            withdrawal.amount, balance.available_for_withdrawal
        )));
    }

    info!(
        withdrawal_id = %withdrawal.id,
        affiliate_id = %withdrawal.affiliate_id,
        amount = %withdrawal.amount,
        "Recorded withdrawal"
    );
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

pub(super) async fn load_affiliate(
    state: &AppState,
    id: &AffiliateId,
) -> Result<Affiliate, AppError> {
    state
        .repo
        .get_affiliate(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Affiliate {} not found", id)))
}
