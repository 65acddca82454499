//! Bearer-token authentication for review authors.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Id of the authenticated user; becomes the review's author.
    pub sub: String,
    pub exp: usize,
    pub iat: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct AuthError {
    pub message: String,
}

type Rejection = (StatusCode, Json<AuthError>);

fn unauthorized(message: &str) -> Rejection {
    (
        StatusCode::UNAUTHORIZED,
        Json(AuthError {
            message: message.to_string(),
        }),
    )
}

/// Verify an HS256 token and return its claims.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(token, &key, &validation).map(|data| data.claims)
}

pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| unauthorized("Missing Authorization header"))?;

        let token = extract_bearer_token(auth_header)
            .ok_or_else(|| unauthorized("Invalid Authorization header format"))?;

        let claims = verify_token(token, &state.config.jwt_secret).map_err(|e| {
            tracing::warn!(error = %e, "Rejected review author token");
            unauthorized("Invalid or expired token")
        })?;

        Ok(AuthUser { id: claims.sub })
    }
}
