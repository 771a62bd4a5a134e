use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        claims::TokenKind,
        dto::{LoginRequest, RefreshRequest, TokenResponse},
        extractors::AccessClaims,
        repo,
        services::{verify_password, JwtKeys},
    },
    error::{ApiError, ApiResult, NON_FIELD_ERRORS},
    extract::ApiJson,
    state::AppState,
    users::repo_types::User,
};

const BAD_CREDENTIALS: &str = "Unable to log in with provided credentials.";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/token/login", post(login))
        .route("/auth/token/refresh", post(refresh))
        .route("/auth/token/logout", post(logout))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(mut payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    payload.email = payload.email.trim().to_lowercase();

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::field(NON_FIELD_ERRORS, BAD_CREDENTIALS));
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(ApiError::field(NON_FIELD_ERRORS, BAD_CREDENTIALS));
    }

    let keys = JwtKeys::from_ref(&state);
    let tokens = keys.issue_pair(user.id)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(tokens))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_kind(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| {
            warn!(error = %e, "invalid refresh token");
            ApiError::Unauthorized("Invalid or expired token".into())
        })?;

    if repo::is_revoked(&state.db, claims.jti).await? {
        warn!(user_id = %claims.sub, "revoked refresh token presented");
        return Err(ApiError::Unauthorized("Invalid or expired token".into()));
    }
    // A deleted account cannot refresh.
    if User::find_by_id(&state.db, claims.sub).await?.is_none() {
        return Err(ApiError::Unauthorized("User not found".into()));
    }

    // Refresh tokens are single use.
    repo::revoke(&state.db, claims.jti, claims.expires_at()?).await?;
    let tokens = keys.issue_pair(claims.sub)?;
    info!(user_id = %claims.sub, "tokens refreshed");
    Ok(Json(tokens))
}

#[instrument(skip(state, claims))]
pub async fn logout(
    State(state): State<AppState>,
    AccessClaims(claims): AccessClaims,
) -> ApiResult<StatusCode> {
    repo::revoke(&state.db, claims.jti, claims.expires_at()?).await?;
    let purged = repo::purge_expired(&state.db).await?;
    info!(user_id = %claims.sub, purged, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fake;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[test]
    fn revocation_lasts_until_token_expiry() {
        let keys = JwtKeys::from(&fake::config().jwt);
        let claims = keys.verify(&keys.sign_access(Uuid::new_v4()).unwrap()).unwrap();
        let until = claims.expires_at().unwrap();
        assert_eq!(until.unix_timestamp(), claims.exp as i64);
        assert!(until > OffsetDateTime::now_utc());
    }

    #[test]
    fn token_response_uses_auth_token_key() {
        let json = serde_json::to_value(TokenResponse {
            auth_token: "a".into(),
            refresh_token: "r".into(),
        })
        .unwrap();
        assert_eq!(json["auth_token"], "a");
        assert_eq!(json["refresh_token"], "r");
    }

    #[tokio::test]
    async fn garbage_refresh_token_is_unauthorized() {
        let state = crate::state::AppState::fake();
        let err = refresh(
            State(state),
            ApiJson(RefreshRequest {
                refresh_token: "nope".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn access_token_cannot_refresh() {
        let state = crate::state::AppState::fake();
        let access = JwtKeys::from_ref(&state).sign_access(Uuid::new_v4()).unwrap();
        let err = refresh(State(state), ApiJson(RefreshRequest { refresh_token: access }))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
