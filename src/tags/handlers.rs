use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{dto::TagRead, repo};
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn tag_routes() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/tags/:id", get(get_tag))
}

#[instrument(skip(state))]
pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<Vec<TagRead>>> {
    let tags = repo::list_all(&state.db).await?;
    Ok(Json(tags.into_iter().map(TagRead::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_tag(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TagRead>> {
    let tag = repo::find(&state.db, id).await?.ok_or_else(ApiError::not_found)?;
    Ok(Json(tag.into()))
}
