use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{IngredientRead, IngredientSearch},
    repo,
};
use crate::{
    error::{ApiError, ApiResult},
    extract::ApiQuery,
    state::AppState,
};

pub fn ingredient_routes() -> Router<AppState> {
    Router::new()
        .route("/ingredients", get(list_ingredients))
        .route("/ingredients/:id", get(get_ingredient))
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<IngredientSearch>,
) -> ApiResult<Json<Vec<IngredientRead>>> {
    let rows = repo::search(&state.db, q.name.as_deref()).await?;
    Ok(Json(rows.into_iter().map(IngredientRead::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_ingredient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<IngredientRead>> {
    let row = repo::find(&state.db, id).await?.ok_or_else(ApiError::not_found)?;
    Ok(Json(row.into()))
}
