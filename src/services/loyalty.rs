//! Loyalty redemption and manual awards.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::aggregates::{reward_code, NewLoyaltyTransaction};
use crate::domain::events::{DomainEvent, LoyaltyEvent};
use crate::domain::value_objects::whole_points;
use crate::model::LoyaltyReward;
use crate::{AppState, Result, StorefrontError};

#[derive(Debug, Clone)]
pub struct Redemption {
    pub reward: LoyaltyReward,
    pub reward_code: String,
    pub new_points_balance: i64,
}

#[tracing::instrument(skip(state))]
pub async fn redeem(state: &AppState, user_id: Uuid, reward_id: Uuid) -> Result<Redemption> {
    state.store.profile(user_id).await?.ok_or(StorefrontError::NotFound("Profile"))?;
    let reward = state.store.reward(reward_id).await?.ok_or(StorefrontError::NotFound("Reward"))?;

    let new_points_balance = state.store.redeem_reward(user_id, &reward).await?;
    tracing::info!(%user_id, %reward_id, points = reward.points_required, new_points_balance, "reward redeemed");

    state.events.publish(DomainEvent::Loyalty(LoyaltyEvent::Redeemed { user_id, reward_id, points: reward.points_required })).await;

    Ok(Redemption { reward_code: reward_code(&reward, Utc::now().timestamp_millis()), new_points_balance, reward })
}

/// Grants floor(amount) points; nothing is written for amounts below one point.
#[tracing::instrument(skip(state, description))]
pub async fn award(state: &AppState, user_id: Uuid, order_id: Option<Uuid>, amount: Decimal, description: Option<String>) -> Result<i64> {
    let points = whole_points(amount);
    if points <= 0 {
        return Ok(0);
    }
    let description = description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| "Points earned for order".to_string());
    state.store.append_loyalty(NewLoyaltyTransaction::earned(user_id, order_id, points, description)).await?;
    tracing::info!(%user_id, points, "loyalty points awarded");
    Ok(points)
}
