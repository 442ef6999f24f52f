//! One-time admin bootstrap, enabled only while `SETUP_SECRET_KEY` is set and
//! no admin exists yet.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use validator::Validate;

use super::JsonBody;
use crate::model::{Profile, Role};
use crate::store::{NewProfile, ProfileFilter};
use crate::{AppState, Result, StorefrontError};

pub const SETUP_KEY_HEADER: &str = "x-setup-key";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapRequest {
    pub user_id: Uuid,
    #[validate(email)]
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

fn key_matches(expected: &str, presented: Option<&str>) -> bool {
    presented.is_some_and(|p| bool::from(p.as_bytes().ct_eq(expected.as_bytes())))
}

pub async fn bootstrap_admin(State(s): State<AppState>, headers: HeaderMap, JsonBody(req): JsonBody<BootstrapRequest>) -> Result<Json<Profile>> {
    let Some(expected) = s.config.setup_secret_key.as_deref() else {
        return Err(StorefrontError::NotFound("Route"));
    };
    let presented = headers.get(SETUP_KEY_HEADER).and_then(|v| v.to_str().ok());
    if !key_matches(expected, presented) {
        tracing::warn!("admin bootstrap attempted with a wrong setup key");
        return Err(StorefrontError::Unauthorized);
    }
    req.validate()?;

    let admins = s.store.list_profiles(&ProfileFilter { roles: vec![Role::Admin], search: None }).await?;
    if !admins.is_empty() {
        tracing::warn!(admins = admins.len(), "admin bootstrap refused; an admin already exists");
        return Err(StorefrontError::Conflict("An admin already exists".into()));
    }

    let profile = s.store.upsert_profile(NewProfile {
        id: req.user_id,
        email: req.email.trim().to_lowercase(),
        role: Role::Admin,
        first_name: req.first_name,
        last_name: req.last_name,
    }).await?;
    tracing::info!(user_id = %profile.id, "admin profile bootstrapped");
    Ok(Json(profile))
}
