use std::collections::HashMap;

use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{RegisterRequest, UserRead, UserWithRecipes};
use super::repo_types::{NewUser, User};
use crate::auth::services::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::images::services::{decode_data_uri, discard_image, presign, presign_opt, store_image};
use crate::query::QueryPairs;
use crate::recipes::{repo as recipe_repo, services::render_short};
use crate::relations::{present_targets, Relation};
use crate::state::AppState;

/// Render users from the point of view of `viewer`, preserving input order.
pub async fn render_users(
    st: &AppState,
    viewer: Option<Uuid>,
    users: Vec<User>,
) -> anyhow::Result<Vec<UserRead>> {
    let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    let subscribed = present_targets(&st.db, Relation::Subscription, viewer, &ids).await?;

    let mut out = Vec::with_capacity(users.len());
    for u in users {
        let avatar = presign_opt(st, u.avatar_key.as_deref()).await?;
        out.push(UserRead {
            is_subscribed: subscribed.contains(&u.id),
            id: u.id,
            email: u.email,
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
            avatar,
        });
    }
    Ok(out)
}

pub async fn render_user(st: &AppState, viewer: Option<Uuid>, user: User) -> anyhow::Result<UserRead> {
    let mut rendered = render_users(st, viewer, vec![user]).await?;
    rendered
        .pop()
        .ok_or_else(|| anyhow::anyhow!("render_users dropped a user"))
}

/// `recipes_limit` query parameter: how many recipes to preview per author.
pub fn recipes_limit(q: &QueryPairs) -> ApiResult<Option<i64>> {
    match q.get("recipes_limit") {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .map(Some)
            .ok_or_else(|| ApiError::field("recipes_limit", "A non-negative integer is required.")),
    }
}

pub async fn with_recipes(
    st: &AppState,
    viewer: Option<Uuid>,
    authors: Vec<User>,
    limit: Option<i64>,
) -> anyhow::Result<Vec<UserWithRecipes>> {
    let ids: Vec<Uuid> = authors.iter().map(|u| u.id).collect();
    let counts = recipe_repo::count_by_authors(&st.db, &ids).await?;
    let rows = recipe_repo::latest_by_authors(&st.db, &ids, limit).await?;

    let mut by_author: HashMap<Uuid, Vec<_>> = HashMap::new();
    for row in rows {
        by_author.entry(row.author_id).or_default().push(row);
    }

    let users = render_users(st, viewer, authors).await?;
    let mut out = Vec::with_capacity(users.len());
    for user in users {
        let recipes = render_short(st, by_author.remove(&user.id).unwrap_or_default()).await?;
        out.push(UserWithRecipes {
            recipes_count: counts.get(&user.id).copied().unwrap_or(0),
            recipes,
            user,
        });
    }
    Ok(out)
}

pub async fn register(st: &AppState, mut req: RegisterRequest) -> ApiResult<User> {
    if let Err(errors) = req.normalize_and_validate() {
        warn!(email = %req.email, "registration rejected");
        return Err(ApiError::Validation(errors));
    }

    let (email_taken, username_taken) = User::taken(&st.db, &req.email, &req.username).await?;
    let mut errors = FieldErrors::new();
    if email_taken {
        errors.add("email", "A user with that email already exists.");
    }
    if username_taken {
        errors.add("username", "A user with that username already exists.");
    }
    errors.into_result()?;

    let password_hash = hash_password(&req.password)?;
    let user = User::create(
        &st.db,
        &NewUser {
            email: req.email,
            username: req.username,
            first_name: req.first_name,
            last_name: req.last_name,
            password_hash,
        },
    )
    .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

pub async fn change_password(
    st: &AppState,
    user: &User,
    current: &str,
    new: &str,
) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    if current.is_empty() {
        errors.add("current_password", "This field is required.");
    } else if !verify_password(current, &user.password_hash)? {
        errors.add("current_password", "Current password is incorrect.");
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "new_password",
            format!("Ensure this field has at least {MIN_PASSWORD_LEN} characters."),
        );
    }
    errors.into_result()?;

    let hash = hash_password(new)?;
    User::set_password_hash(&st.db, user.id, &hash).await?;
    info!(user_id = %user.id, "password changed");
    Ok(())
}

/// Store a new avatar and return its URL. The old object is removed.
pub async fn set_avatar(st: &AppState, user_id: Uuid, raw: Option<&str>) -> ApiResult<String> {
    let raw = raw
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::field("avatar", "This field is required."))?;
    let img = decode_data_uri(raw).map_err(|e| ApiError::field("avatar", e.to_string()))?;

    let key = store_image(st, &format!("avatars/{user_id}"), img).await?;
    let previous = User::set_avatar(&st.db, user_id, Some(&key)).await?;
    if let Some(old) = previous.filter(|old| *old != key) {
        discard_image(st, &old).await;
    }
    info!(%user_id, "avatar updated");
    Ok(presign(st, &key).await?)
}

pub async fn delete_avatar(st: &AppState, user_id: Uuid) -> ApiResult<()> {
    if let Some(old) = User::set_avatar(&st.db, user_id, None).await? {
        discard_image(st, &old).await;
    }
    info!(%user_id, "avatar removed");
    Ok(())
}
