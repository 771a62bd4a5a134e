use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo::Ingredient;

#[derive(Debug, Deserialize)]
pub struct IngredientSearch {
    /// Case-insensitive name prefix.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngredientRead {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
}

impl From<Ingredient> for IngredientRead {
    fn from(i: Ingredient) -> Self {
        Self {
            id: i.id,
            name: i.name,
            measurement_unit: i.measurement_unit,
        }
    }
}
