use axum::{
    extract::{OriginalUri, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        AvatarRequest, AvatarResponse, RegisterRequest, SetPasswordRequest, UserCreated, UserRead,
        UserWithRecipes,
    },
    repo_types::User,
    services,
};
use crate::{
    auth::extractors::{AuthUser, MaybeUser},
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiQuery},
    pagination::{Page, PageLinks, PageParams},
    query::QueryPairs,
    relations::{self, Relation},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(register))
        .route("/users/me", get(get_me))
        .route("/users/me/avatar", put(set_avatar).delete(delete_avatar))
        .route("/users/set_password", post(set_password))
        .route("/users/subscriptions", get(list_subscriptions))
        .route("/users/:id", get(get_user))
        .route("/users/:id/subscribe", post(subscribe).delete(unsubscribe))
}

async fn load_user(state: &AppState, id: Uuid) -> ApiResult<User> {
    User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(ApiError::not_found)
}

#[instrument(skip(state, q))]
pub async fn list_users(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(q): ApiQuery<QueryPairs>,
) -> ApiResult<Json<Page<UserRead>>> {
    let params = PageParams::from_query(&q, &state.config.pagination)?;
    let links = PageLinks::new(state.base_url(), &uri);
    let search = q.get("search");

    let count = User::count(&state.db, search).await?;
    params.ensure_in_range(count)?;
    let users = User::list(&state.db, search, params.limit, params.offset()).await?;
    let results = services::render_users(&state, viewer, users).await?;
    Ok(Json(Page::new(results, count, params, &links)))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserCreated>)> {
    let user = services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserCreated {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserRead>> {
    let user = load_user(&state, id).await?;
    Ok(Json(services::render_user(&state, viewer, user).await?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<UserRead>> {
    // A valid token for a deleted account is treated as unauthenticated.
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    Ok(Json(services::render_user(&state, Some(user_id), user).await?))
}

#[instrument(skip(state, payload))]
pub async fn set_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<AvatarRequest>,
) -> ApiResult<Json<AvatarResponse>> {
    let avatar = services::set_avatar(&state, user_id, payload.avatar.as_deref()).await?;
    Ok(Json(AvatarResponse { avatar }))
}

#[instrument(skip(state))]
pub async fn delete_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<StatusCode> {
    services::delete_avatar(&state, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn set_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<SetPasswordRequest>,
) -> ApiResult<StatusCode> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    services::change_password(&state, &user, &payload.current_password, &payload.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, q))]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(q): ApiQuery<QueryPairs>,
) -> ApiResult<Json<Page<UserWithRecipes>>> {
    let params = PageParams::from_query(&q, &state.config.pagination)?;
    let limit = services::recipes_limit(&q)?;
    let links = PageLinks::new(state.base_url(), &uri);

    let count = User::count_subscriptions(&state.db, user_id).await?;
    params.ensure_in_range(count)?;
    let authors =
        User::subscriptions_of(&state.db, user_id, params.limit, params.offset()).await?;
    let results = services::with_recipes(&state, Some(user_id), authors, limit).await?;
    Ok(Json(Page::new(results, count, params, &links)))
}

#[instrument(skip(state, q))]
pub async fn subscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(author_id): Path<Uuid>,
    ApiQuery(q): ApiQuery<QueryPairs>,
) -> ApiResult<(StatusCode, Json<UserWithRecipes>)> {
    let limit = services::recipes_limit(&q)?;
    let author = load_user(&state, author_id).await?;
    relations::add(&state.db, Relation::Subscription, user_id, author_id).await?;

    let mut views = services::with_recipes(&state, Some(user_id), vec![author], limit).await?;
    let view = views
        .pop()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("author view missing")))?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(skip(state))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(author_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    load_user(&state, author_id).await?;
    relations::remove(&state.db, Relation::Subscription, user_id, author_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
