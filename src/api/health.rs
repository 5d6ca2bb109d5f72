use axum::extract::State;
use axum::Json;
use tracing::error;

use super::AppState;
use crate::error::AppError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the ledger database answers queries.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.ping().await.map_err(|e| {
        error!(error = %e, "Readiness check failed");
        AppError::Internal("database unavailable".into())
    })?;
    Ok(Json(serde_json::json!({
        "status": "ready",
        "commissionLevels": state.distributor.max_depth(),
    })))
}
