use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub name: String,
    pub image_key: String,
    pub text: String,
    pub cooking_time: i32,
    pub created_at: OffsetDateTime,
}

/// A tag attached to a recipe.
#[derive(Debug, Clone, FromRow)]
pub struct RecipeTagRow {
    pub recipe_id: Uuid,
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// An ingredient line of a recipe, joined with the ingredient itself.
#[derive(Debug, Clone, FromRow)]
pub struct RecipeIngredientRow {
    pub recipe_id: Uuid,
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// Scalar fields to write on create or update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct RecipeFields {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image_key: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ShortLinkRow {
    pub recipe_id: Uuid,
    pub code: String,
    pub short_url: String,
}
