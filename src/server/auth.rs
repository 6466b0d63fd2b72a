//! Bearer token authentication for the download routes.
//!
//! Tokens are HS256 JWTs signed with `server.auth.jwt_secret`. The proxy
//! route itself is not behind this middleware.

use crate::config::AuthConfig;
use crate::server::error::AppError;
use crate::server::AppContext;
use anyhow::Context;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Identity used when auth is disabled.
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// Token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiry as seconds since the Unix epoch
    pub exp: u64,
}

/// Authenticated caller, inserted into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

impl AuthUser {
    pub fn anonymous() -> Self {
        Self {
            id: ANONYMOUS_USER_ID.to_string(),
            email: None,
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            email: claims.email,
        }
    }
}

fn secret(config: &AuthConfig) -> anyhow::Result<&[u8]> {
    config
        .jwt_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::as_bytes)
        .context("No JWT secret configured")
}

/// Mint a token for `id` valid for `token_ttl_hours`.
pub fn issue_token(config: &AuthConfig, id: &str, email: Option<&str>) -> anyhow::Result<String> {
    let exp = chrono::Utc::now() + chrono::Duration::hours(config.token_ttl_hours as i64);
    let claims = Claims {
        id: id.to_string(),
        email: email.map(String::from),
        exp: exp.timestamp().max(0) as u64,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret(config)?),
    )
    .context("Failed to sign token")?;
    Ok(token)
}

/// Check signature and expiry.
pub fn verify_token(config: &AuthConfig, token: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret(config)?),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

/// Pull the token out of `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Middleware for the authenticated routes.
///
/// Missing token is a 401, a bad or expired one a 403.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth = &ctx.config.server.auth;

    let user = if auth.enabled {
        let token = bearer_token(request.headers())
            .ok_or_else(|| AppError::Unauthorized("Token not provided".into()))?;

        match verify_token(auth, token) {
            Ok(claims) => AuthUser::from(claims),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected bearer token");
                return Err(AppError::Forbidden("Invalid or expired token".into()));
            }
        }
    } else {
        AuthUser::anonymous()
    };

    tracing::debug!(user = %user.id, "Authenticated request");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
