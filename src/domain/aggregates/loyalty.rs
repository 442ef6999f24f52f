//! Loyalty ledger entries and reward codes

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::model::{LoyaltyKind, LoyaltyReward, RewardType};

/// Rewards unlock every this many points on the consumer dashboard.
pub const REWARD_STEP: i64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoyaltyTransaction {
    pub user_id: Uuid,
    pub order_id: Option<Uuid>,
    pub points: i64,
    pub kind: LoyaltyKind,
    pub description: String,
}

impl NewLoyaltyTransaction {
    pub fn earned(user_id: Uuid, order_id: Option<Uuid>, points: i64, description: impl Into<String>) -> Self {
        Self { user_id, order_id, points, kind: LoyaltyKind::Earned, description: description.into() }
    }

    pub fn adjusted(user_id: Uuid, order_id: Option<Uuid>, points: i64, description: impl Into<String>) -> Self {
        Self { user_id, order_id, points, kind: LoyaltyKind::Adjusted, description: description.into() }
    }

    pub fn redeemed(user_id: Uuid, reward: &LoyaltyReward) -> Self {
        Self {
            user_id,
            order_id: None,
            points: -reward.points_required,
            kind: LoyaltyKind::Redeemed,
            description: format!("Reward redeemed: {}", reward.name),
        }
    }
}

/// Display code the customer quotes to support; it is not stored.
pub fn reward_code(reward: &LoyaltyReward, now_millis: i64) -> String {
    let stamp = base36(now_millis.max(0) as u64);
    let value = reward.reward_value.normalize();
    match reward.reward_type {
        RewardType::Discount => format!("DISCOUNT-{value}-{stamp}"),
        RewardType::Percentage => format!("PCT{value}-{stamp}"),
        RewardType::FreeShipping => format!("FREESHIP-{stamp}"),
        RewardType::FreeProduct => format!("REWARD-{stamp}"),
    }
}

/// Next multiple of [`REWARD_STEP`] strictly above `balance`.
pub fn next_reward_threshold(balance: i64) -> i64 {
    (balance.max(0) / REWARD_STEP + 1) * REWARD_STEP
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 { return "0".into(); }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
