use crate::auth::claims::{Claims, TokenKind};
use crate::auth::dto::TokenResponse;
use crate::config::JwtConfig;
use crate::state::AppState;
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn argon_failure(stage: &'static str, e: argon2::password_hash::Error) -> anyhow::Error {
    error!(error = %e, stage, "argon2 failure");
    anyhow::anyhow!("argon2 {stage}: {e}")
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| argon_failure("hash", e))
}

/// `Ok(false)` on a mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| argon_failure("parse", e))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Signing material plus the issuer, audience and lifetimes every token carries.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::minutes(cfg.ttl_minutes.max(0)),
            refresh_ttl: Duration::minutes(cfg.refresh_ttl_minutes.max(0)),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    fn sign(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now.unix_timestamp() as usize,
            exp: (now + self.ttl(kind)).unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(%user_id, ?kind, jti = %claims.jti, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign(user_id, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign(user_id, TokenKind::Refresh)
    }

    /// Fresh access and refresh tokens for `user_id`.
    pub fn issue_pair(&self, user_id: Uuid) -> anyhow::Result<TokenResponse> {
        Ok(TokenResponse {
            auth_token: self.sign_access(user_id)?,
            refresh_token: self.sign_refresh(user_id)?,
        })
    }

    /// Signature, expiry, issuer and audience checks. Revocation is checked by callers.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        debug!(user_id = %claims.sub, kind = ?claims.kind, "jwt verified");
        Ok(claims)
    }

    pub fn verify_kind(&self, token: &str, kind: TokenKind) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        anyhow::ensure!(claims.kind == kind, "expected a {kind:?} token, got {:?}", claims.kind);
        Ok(claims)
    }
}


#[cfg(test)]
mod jwt_tests {
    use super::*;
    use crate::state::fake;

    fn keys() -> JwtKeys {
        JwtKeys::from(&fake::config().jwt)
    }

    #[test]
    fn access_token_carries_issuer_and_audience() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let claims = keys.verify(&keys.sign_access(user_id).unwrap()).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, 5 * 60);
    }

    #[test]
    fn every_token_gets_its_own_id() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let a = keys.verify(&keys.sign_access(user_id).unwrap()).unwrap();
        let b = keys.verify(&keys.sign_access(user_id).unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn pair_holds_one_token_of_each_kind() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let pair = keys.issue_pair(user_id).unwrap();
        let access = keys.verify_kind(&pair.auth_token, TokenKind::Access).unwrap();
        let refresh = keys.verify_kind(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(access.sub, user_id);
        assert_eq!(refresh.sub, user_id);
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let keys = keys();
        let access = keys.sign_access(Uuid::new_v4()).unwrap();
        assert!(keys.verify_kind(&access, TokenKind::Refresh).is_err());
        let refresh = keys.sign_refresh(Uuid::new_v4()).unwrap();
        assert!(keys.verify_kind(&refresh, TokenKind::Access).is_err());
    }

    #[test]
    fn foreign_issuer_or_audience_is_rejected() {
        let mut cfg = fake::config().jwt;
        cfg.issuer = "other-issuer".into();
        cfg.audience = "other-aud".into();
        let token = keys().sign_access(Uuid::new_v4()).unwrap();
        assert!(JwtKeys::from(&cfg).verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut stale = keys();
        // beyond the default 60s validation leeway
        stale.access_ttl = Duration::minutes(-5);
        let token = stale.sign_access(Uuid::new_v4()).unwrap();
        assert!(keys().verify(&token).is_err());
    }
}
