use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::affiliates::load_affiliate;
use super::{parse_affiliate_id, AppState};
use crate::engine::{resolve_upline, AffiliateTree, Balance, TreeSummary, Upline};
use crate::error::AppError;

/// Upper bound on `levels` for upline queries.
const MAX_QUERY_LEVELS: u32 = 64;

/// Deepest tree level served; serialization recurses once per level.
pub const MAX_TREE_DEPTH: u32 = 128;

#[derive(Debug, Deserialize)]
pub struct UplineQuery {
    pub levels: Option<u32>,
}

/// Ancestors of an affiliate, nearest first.
///
/// Defaults to the depth commissions are paid to.
pub async fn get_upline(
    Path(id): Path<String>,
    Query(params): Query<UplineQuery>,
    State(state): State<AppState>,
) -> Result<Json<Upline>, AppError> {
    let id = parse_affiliate_id(&id)?;
    let levels = params
        .levels
        .unwrap_or_else(|| state.distributor.max_depth())
        .min(MAX_QUERY_LEVELS);

    let affiliate = load_affiliate(&state, &id).await?;
    let Some(referrer) = affiliate.referred_by else {
        return Ok(Json(Upline::default()));
    };

    let mut conn = state.repo.acquire().await?;
    let upline = resolve_upline(&mut *conn, &referrer, levels).await?;
    Ok(Json(upline))
}

#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    pub depth: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeResponse {
    #[serde(flatten)]
    pub tree: AffiliateTree,
    /// Covers the whole downline, including levels cut from `root`.
    pub summary: TreeSummary,
    /// Nodes removed below the served depth.
    pub truncated: usize,
}

/// Downline tree of an affiliate, served to at most `MAX_TREE_DEPTH` levels.
pub async fn get_tree(
    Path(id): Path<String>,
    Query(params): Query<TreeQuery>,
    State(state): State<AppState>,
) -> Result<Json<TreeResponse>, AppError> {
    let id = parse_affiliate_id(&id)?;
    let depth = params.depth.unwrap_or(MAX_TREE_DEPTH).min(MAX_TREE_DEPTH);

    let mut tree = state.hierarchy.build_tree(&id).await?;
    let summary = tree.summary();
    let truncated = tree.prune_deeper_than(depth);
    if truncated > 0 {
        debug!(affiliate_id = %id, depth, truncated, "Tree response cut at depth");
    }
    Ok(Json(TreeResponse {
        tree,
        summary,
        truncated,
    }))
}

pub async fn get_balance(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Balance>, AppError> {
    let id = parse_affiliate_id(&id)?;
    let balance = state.balance.available_balance(&id).await?;
    Ok(Json(balance))
}
