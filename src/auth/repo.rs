use anyhow::Context;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

/// Record a token id as revoked until it would have expired anyway.
pub async fn revoke(db: &PgPool, jti: Uuid, expires_at: OffsetDateTime) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO revoked_tokens (jti, expires_at)
        VALUES ($1, $2)
        ON CONFLICT (jti) DO NOTHING
        "#,
    )
    .bind(jti)
    .bind(expires_at)
    .execute(db)
    .await
    .context("revoke token")?;
    Ok(())
}

pub async fn is_revoked(db: &PgPool, jti: Uuid) -> anyhow::Result<bool> {
    let (revoked,): (bool,) =
        sqlx::query_as(r#"SELECT EXISTS (SELECT 1 FROM revoked_tokens WHERE jti = $1)"#)
            .bind(jti)
            .fetch_one(db)
            .await
            .context("check revoked token")?;
    Ok(revoked)
}

/// Drop revocation rows whose tokens have expired on their own.
pub async fn purge_expired(db: &PgPool) -> anyhow::Result<u64> {
    let res = sqlx::query(r#"DELETE FROM revoked_tokens WHERE expires_at < now()"#)
        .execute(db)
        .await
        .context("purge revoked tokens")?;
    Ok(res.rows_affected())
}
