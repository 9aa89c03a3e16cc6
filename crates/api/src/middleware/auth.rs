//! JWT authentication and cron-secret extractors.
//!
//! `AuthUser` accepts any valid `Authorization: Bearer <JWT>`, `AdminUser` additionally
//! requires the `admin` role, and `CronAuth` checks the `X-Cron-Secret` header used by
//! scheduled job triggers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_common::error::CourierError;

use crate::state::AppState;

pub const ADMIN_ROLE: &str = "admin";
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// JWT claims stored in the token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the user's UUID
    pub sub: String,
    /// `admin` or `user`
    #[serde(default)]
    pub role: String,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
}

/// Authenticated caller extracted from a JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub claims: Claims,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.claims.role == ADMIN_ROLE
    }
}

/// Authenticated caller holding the `admin` role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

/// Marker for requests that presented the configured cron secret.
#[derive(Debug, Clone, Copy)]
pub struct CronAuth;

/// Encode a JWT token for a user.
pub fn encode_jwt(
    user_id: Uuid,
    role: &str,
    secret: &str,
    expiry_hours: u64,
) -> Result<String, CourierError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| CourierError::Auth(format!("Failed to encode JWT: {}", e)))?;

    Ok(token)
}

/// Decode and validate a JWT token.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, CourierError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| CourierError::Auth(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = CourierError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let secret = state.config.jwt_secret.clone();
        let token = bearer_token(parts);

        async move {
            let token = token.ok_or_else(|| {
                CourierError::Auth(
                    "Missing or invalid Authorization header. Use 'Bearer <JWT>'".to_string(),
                )
            })?;
            let claims = decode_jwt(&token, &secret)?;
            let user_id = Uuid::parse_str(&claims.sub)
                .map_err(|_| CourierError::Auth("Invalid user ID in token".to_string()))?;
            Ok(AuthUser { user_id, claims })
        }
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = CourierError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(CourierError::Forbidden("Admin role required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

impl FromRequestParts<AppState> for CronAuth {
    type Rejection = CourierError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(CRON_SECRET_HEADER)
            .and_then(|v| v.to_str().ok());

        match presented {
            Some(secret) if secret == state.config.cron_secret => Ok(CronAuth),
            Some(_) => Err(CourierError::Auth("Invalid cron secret".to_string())),
            None => Err(CourierError::Auth("Missing X-Cron-Secret header".to_string())),
        }
    }
}
