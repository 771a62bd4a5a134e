use axum::{
    extract::{OriginalUri, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{RecipeRead, RecipeShort, RecipeWrite, ShortLinkResponse},
    filters::RecipeQuery,
    repo, services,
    shopping_list::FILENAME,
};
use crate::{
    auth::extractors::{AuthUser, MaybeUser},
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiQuery},
    pagination::{Page, PageLinks, PageParams},
    query::QueryPairs,
    relations::{self, Relation},
    state::AppState,
    tags::repo as tag_repo,
};

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route("/recipes/download_shopping_cart", get(download_shopping_cart))
        .route(
            "/recipes/:id",
            get(get_recipe).patch(update_recipe).delete(delete_recipe),
        )
        .route("/recipes/:id/favorite", post(add_favorite).delete(remove_favorite))
        .route(
            "/recipes/:id/shopping_cart",
            post(add_to_cart).delete(remove_from_cart),
        )
        .route("/recipes/:id/get-link", get(get_link))
}

/// Routes served outside the API prefix.
pub fn short_link_routes() -> Router<AppState> {
    Router::new().route("/s/:code", get(follow_short_link))
}

#[instrument(skip(state, q))]
pub async fn list_recipes(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(q): ApiQuery<QueryPairs>,
) -> ApiResult<Json<Page<RecipeRead>>> {
    let params = PageParams::from_query(&q, &state.config.pagination)?;
    let links = PageLinks::new(state.base_url(), &uri);
    let known = tag_repo::all_slugs(&state.db).await?;
    let filter = RecipeQuery::from_query(&q)?.resolve(viewer, &known);

    if filter.is_empty_result() {
        params.ensure_in_range(0)?;
        return Ok(Json(Page::empty(params, &links)));
    }

    let count = repo::count(&state.db, &filter).await?;
    params.ensure_in_range(count)?;
    let rows = repo::list(&state.db, &filter, params.limit, params.offset()).await?;
    let results = services::render_full(&state, viewer, rows).await?;
    Ok(Json(Page::new(results, count, params, &links)))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<RecipeWrite>,
) -> ApiResult<(StatusCode, Json<RecipeRead>)> {
    let recipe = services::create_recipe(&state, user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RecipeRead>> {
    let row = services::load(&state, id).await?;
    Ok(Json(services::render_one(&state, viewer, row).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<RecipeWrite>,
) -> ApiResult<Json<RecipeRead>> {
    Ok(Json(services::update_recipe(&state, user_id, id, payload).await?))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    services::delete_recipe(&state, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_relation(
    state: &AppState,
    relation: Relation,
    user_id: Uuid,
    id: Uuid,
) -> ApiResult<(StatusCode, Json<RecipeShort>)> {
    let row = services::load(state, id).await?;
    relations::add(&state.db, relation, user_id, id).await?;
    let view = services::render_short(state, vec![row])
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("recipe view missing")))?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn remove_relation(
    state: &AppState,
    relation: Relation,
    user_id: Uuid,
    id: Uuid,
) -> ApiResult<StatusCode> {
    services::load(state, id).await?;
    relations::remove(&state.db, relation, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn add_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<RecipeShort>)> {
    add_relation(&state, Relation::Favorite, user_id, id).await
}

#[instrument(skip(state))]
pub async fn remove_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    remove_relation(&state, Relation::Favorite, user_id, id).await
}

#[instrument(skip(state))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<RecipeShort>)> {
    add_relation(&state, Relation::ShoppingCart, user_id, id).await
}

#[instrument(skip(state))]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    remove_relation(&state, Relation::ShoppingCart, user_id, id).await
}

#[instrument(skip(state))]
pub async fn download_shopping_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<impl IntoResponse> {
    let list = services::shopping_list(&state, user_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{FILENAME}\""),
            ),
        ],
        list.render(),
    ))
}

#[instrument(skip(state))]
pub async fn get_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ShortLinkResponse>> {
    let short_link = services::short_link(&state, id).await?;
    Ok(Json(ShortLinkResponse { short_link }))
}

#[instrument(skip(state))]
pub async fn follow_short_link(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Redirect> {
    let target = services::resolve_short_link(&state, &code).await?;
    Ok(Redirect::temporary(&target))
}
