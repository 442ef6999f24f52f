//! Loyalty routes: overview, redeem (self or staff) and award (staff).

use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::{CurrentUser, STAFF};
use super::JsonBody;
use crate::domain::aggregates::next_reward_threshold;
use crate::model::{LoyaltyReward, LoyaltyTransaction};
use crate::services::loyalty;
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    /// Defaults to the caller.
    pub user_id: Option<Uuid>,
    pub reward_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub success: bool,
    pub message: String,
    pub reward_code: String,
    pub new_points_balance: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardRequest {
    pub user_id: Uuid,
    pub order_id: Option<Uuid>,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AwardResponse {
    pub success: bool,
    pub points: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyOverview {
    pub points: i64,
    pub next_reward_at: i64,
    pub transactions: Vec<LoyaltyTransaction>,
    pub rewards: Vec<LoyaltyReward>,
}

pub async fn overview(State(s): State<AppState>, user: CurrentUser) -> Result<Json<LoyaltyOverview>> {
    let transactions = s.store.loyalty_history(user.id()).await?;
    let rewards = s.store.rewards().await?;
    let points = user.0.loyalty_points;
    Ok(Json(LoyaltyOverview { points, next_reward_at: next_reward_threshold(points), transactions, rewards }))
}

pub async fn redeem(State(s): State<AppState>, user: CurrentUser, JsonBody(req): JsonBody<RedeemRequest>) -> Result<Json<RedeemResponse>> {
    let target = req.user_id.unwrap_or(user.id());
    if target != user.id() {
        user.require(STAFF)?;
    }
    let redemption = loyalty::redeem(&s, target, req.reward_id).await?;
    Ok(Json(RedeemResponse {
        success: true,
        message: format!("{} redeemed successfully!", redemption.reward.name),
        reward_code: redemption.reward_code,
        new_points_balance: redemption.new_points_balance,
    }))
}

pub async fn award(State(s): State<AppState>, user: CurrentUser, JsonBody(req): JsonBody<AwardRequest>) -> Result<Json<AwardResponse>> {
    user.require(STAFF)?;
    let points = loyalty::award(&s, req.user_id, req.order_id, req.amount, req.description).await?;
    let message = (points > 0).then(|| format!("{points} points awarded!"));
    Ok(Json(AwardResponse { success: true, points, message }))
}
