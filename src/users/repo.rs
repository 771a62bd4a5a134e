use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewUser, User};

const USER_COLUMNS: &str =
    "id, email, username, first_name, last_name, password_hash, avatar_key, created_at";

fn search_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")))
}

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    pub async fn find_many(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(db)
        .await
        .context("find users by ids")?;
        Ok(users)
    }

    /// Which of email / username are already registered.
    pub async fn taken(db: &PgPool, email: &str, username: &str) -> anyhow::Result<(bool, bool)> {
        let row: (bool, bool) = sqlx::query_as(
            r#"
            SELECT EXISTS (SELECT 1 FROM users WHERE email = $1),
                   EXISTS (SELECT 1 FROM users WHERE username = $2)
            "#,
        )
        .bind(email)
        .bind(username)
        .fetch_one(db)
        .await
        .context("check registration uniqueness")?;
        Ok(row)
    }

    /// Create a new user with hashed password.
    pub async fn create(db: &PgPool, new: &NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, username, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.username)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.password_hash)
        .fetch_one(db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    pub async fn list(
        db: &PgPool,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE $1::text IS NULL OR username ILIKE $1 OR email ILIKE $1
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(search_pattern(search))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list users")?;
        Ok(users)
    }

    pub async fn count(db: &PgPool, search: Option<&str>) -> anyhow::Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE $1::text IS NULL OR username ILIKE $1 OR email ILIKE $1
            "#,
        )
        .bind(search_pattern(search))
        .fetch_one(db)
        .await
        .context("count users")?;
        Ok(count)
    }

    /// Authors `follower` is subscribed to, most recent subscription first.
    pub async fn subscriptions_of(
        db: &PgPool,
        follower: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<User>> {
        let cols = USER_COLUMNS
            .split(", ")
            .map(|c| format!("u.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {cols}
            FROM subscriptions s
            JOIN users u ON u.id = s.author_id
            WHERE s.user_id = $1
            ORDER BY s.created_at DESC, u.id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(follower)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list subscriptions")?;
        Ok(users)
    }

    pub async fn count_subscriptions(db: &PgPool, follower: Uuid) -> anyhow::Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM subscriptions WHERE user_id = $1"#)
                .bind(follower)
                .fetch_one(db)
                .await
                .context("count subscriptions")?;
        Ok(count)
    }

    /// Replace the avatar key, returning the previous one.
    pub async fn set_avatar(
        db: &PgPool,
        id: Uuid,
        key: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        let (previous,): (Option<String>,) = sqlx::query_as(
            r#"
            UPDATE users u
            SET avatar_key = $2
            FROM (SELECT avatar_key FROM users WHERE id = $1 FOR UPDATE) old
            WHERE u.id = $1
            RETURNING old.avatar_key
            "#,
        )
        .bind(id)
        .bind(key)
        .fetch_one(db)
        .await
        .context("update avatar")?;
        Ok(previous)
    }

    pub async fn set_password_hash(db: &PgPool, id: Uuid, hash: &str) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET password_hash = $2 WHERE id = $1"#)
            .bind(id)
            .bind(hash)
            .execute(db)
            .await
            .context("update password")?;
        Ok(())
    }
}
