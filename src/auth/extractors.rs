use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use super::repo;
use super::services::JwtKeys;
use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated caller. Rejects the request with 401 when no valid token is presented.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

/// Caller on endpoints that also serve anonymous users.
///
/// A missing header yields `None`; a header carrying a bad token is still a 401.
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<Uuid>);

/// Claims of the presented access token, for endpoints that act on the token itself.
#[derive(Debug, Clone)]
pub struct AccessClaims(pub Claims);

/// Token part of `Authorization: Bearer <t>` (or DRF-style `Token <t>`).
pub(crate) fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token") {
        Some(token)
    } else {
        None
    }
}

fn authorization(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

async fn authenticate(header: &str, state: &AppState) -> Result<Claims, ApiError> {
    let token = bearer_token(header)
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;

    let keys = JwtKeys::from_ref(state);
    let claims = match keys.verify_kind(token, TokenKind::Access) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "invalid or expired token");
            return Err(ApiError::Unauthorized("Invalid or expired token".into()));
        }
    };

    if repo::is_revoked(&state.db, claims.jti).await? {
        warn!(user_id = %claims.sub, "revoked token presented");
        return Err(ApiError::Unauthorized("Invalid or expired token".into()));
    }

    Ok(claims)
}

#[async_trait]
impl FromRequestParts<AppState> for AccessClaims {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = authorization(parts).ok_or_else(|| {
            ApiError::Unauthorized("Authentication credentials were not provided.".into())
        })?;
        Ok(AccessClaims(authenticate(header, state).await?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AccessClaims(claims) = AccessClaims::from_request_parts(parts, state).await?;
        Ok(AuthUser(claims.sub))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match authorization(parts) {
            None => Ok(MaybeUser(None)),
            Some(header) => Ok(MaybeUser(Some(authenticate(header, state).await?.sub))),
        }
    }
}
