use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use super::affiliates::load_affiliate;
use super::{parse_affiliate_id, AppState};
use crate::domain::{Commission, CommissionId, CommissionStatus};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CommissionsQuery {
    pub status: Option<String>,
    /// `json` (default) or `csv`.
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionsResponse {
    pub commissions: Vec<Commission>,
}

/// One line of a CSV commission statement.
#[derive(Debug, Serialize)]
struct StatementRow<'a> {
    commission_id: &'a str,
    order_id: &'a str,
    level: u32,
    amount: String,
    status: &'static str,
    reference: &'a str,
    created_at_ms: i64,
}

pub async fn list_commissions(
    Path(id): Path<String>,
    Query(params): Query<CommissionsQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let id = parse_affiliate_id(&id)?;
    let status = match params.status.as_deref() {
        Some("") | None => None,
        Some(s) => Some(CommissionStatus::from_str(s).map_err(AppError::BadRequest)?),
    };

    load_affiliate(&state, &id).await?;
    let mut commissions = state.repo.list_commissions_for_affiliate(&id).await?;
    if let Some(status) = status {
        commissions.retain(|c| c.status == status);
    }

    match params.format.as_deref() {
        Some("csv") => {
            let body = write_statement(&commissions)?;
            let filename = format!("attachment; filename=\"commissions-{}.csv\"", id);
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
                .header(header::CONTENT_DISPOSITION, filename)
                .body(body.into())
                .map_err(|e| AppError::Internal(e.to_string()))
        }
        Some("json") | None => Ok(Json(CommissionsResponse { commissions }).into_response()),
        Some(other) => Err(AppError::BadRequest(format!(
            "Unsupported format {}, expected json or csv",
            other
        ))),
    }
}

fn write_statement(commissions: &[Commission]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for c in commissions {
        writer
            .serialize(StatementRow {
                commission_id: c.id.as_str(),
                order_id: c.order_id.as_str(),
                level: c.level,
                amount: c.amount.to_canonical_string(),
                status: c.status.as_str(),
                reference: &c.reference,
                created_at_ms: c.created_at.as_ms(),
            })
            .map_err(|e| AppError::Internal(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct SetCommissionStatusRequest {
    pub status: CommissionStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionStatusResponse {
    pub id: CommissionId,
    pub status: CommissionStatus,
}

/// Payout workflow hook. Only the status moves; amount and beneficiary stay fixed.
pub async fn set_commission_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<SetCommissionStatusRequest>,
) -> Result<Json<CommissionStatusResponse>, AppError> {
    let id = CommissionId::from_str(&id)
        .map_err(|e| AppError::BadRequest(format!("Invalid commission id: {}", e)))?;
    if !state.repo.update_commission_status(&id, req.status).await? {
        return Err(AppError::NotFound(format!("Commission {} not found", id)));
    }
    info!(commission_id = %id, status = %req.status, "Commission status changed");

    Ok(Json(CommissionStatusResponse {
        id,
        status: req.status,
    }))
}
