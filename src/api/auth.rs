//! Authentication and role checks
//!
//! Access tokens are HS256 JWTs issued by the auth provider; `sub` is the
//! profile id. Role gating goes through [`authorize`] everywhere.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Profile, Role};
use crate::{AppState, StorefrontError};

pub const STAFF: &[Role] = &[Role::Admin, Role::Employee];
pub const ADMIN: &[Role] = &[Role::Admin];
pub const B2B: &[Role] = &[Role::B2b];
pub const CUSTOMER: &[Role] = &[Role::Consumer, Role::B2b];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, StorefrontError> {
        decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims).map_err(|e| {
            tracing::debug!(error = %e, "rejected access token");
            StorefrontError::Unauthorized
        })
    }
}

/// The single capability check behind every role-gated route.
pub fn authorize(profile: &Profile, required: &[Role]) -> Result<(), StorefrontError> {
    if required.contains(&profile.role) { Ok(()) } else { Err(StorefrontError::Forbidden) }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?.trim();
    (!token.is_empty()).then_some(token)
}

async fn resolve(parts: &Parts, state: &AppState) -> Result<Option<Profile>, StorefrontError> {
    let Some(token) = bearer_token(parts) else { return Ok(None) };
    let claims = state.tokens.verify(token)?;
    match state.store.profile(claims.sub).await? {
        Some(profile) => Ok(Some(profile)),
        None => {
            tracing::debug!(user_id = %claims.sub, "token subject has no profile");
            Err(StorefrontError::Unauthorized)
        }
    }
}

/// Authenticated caller; rejects with 401.
pub struct CurrentUser(pub Profile);

impl CurrentUser {
    pub fn require(&self, roles: &[Role]) -> Result<&Profile, StorefrontError> {
        authorize(&self.0, roles)?;
        Ok(&self.0)
    }

    pub fn id(&self) -> Uuid { self.0.id }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = StorefrontError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve(parts, state).await?.map(CurrentUser).ok_or(StorefrontError::Unauthorized)
    }
}

/// Caller if a token is present. A present but invalid token is still a 401.
pub struct MaybeUser(pub Option<Profile>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = StorefrontError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(resolve(parts, state).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn profile(role: Role) -> Profile {
        Profile {
            id: Uuid::new_v4(), email: "p@example.com".into(), role, first_name: None, last_name: None, phone: None,
            company_name: None, vat_number: None, b2b_price_list_id: None, loyalty_points: 0,
            created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    fn token(secret: &str, sub: Uuid, exp: i64) -> String {
        let claims = Claims { sub, exp: exp as u64, email: None };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn test_authorize_by_role_set() {
        assert!(authorize(&profile(Role::Employee), STAFF).is_ok());
        assert!(matches!(authorize(&profile(Role::Employee), ADMIN), Err(StorefrontError::Forbidden)));
        assert!(authorize(&profile(Role::B2b), CUSTOMER).is_ok());
        assert!(authorize(&profile(Role::Guest), CUSTOMER).is_err());
    }

    #[test]
    fn test_verify_token() {
        let verifier = TokenVerifier::new("secret", None);
        let sub = Uuid::new_v4();
        let claims = verifier.verify(&token("secret", sub, Utc::now().timestamp() + 60)).unwrap();
        assert_eq!(claims.sub, sub);
        assert!(verifier.verify(&token("other", sub, Utc::now().timestamp() + 60)).is_err());
        assert!(verifier.verify(&token("secret", sub, Utc::now().timestamp() - 3600)).is_err());
        assert!(verifier.verify("garbage").is_err());
    }
}
