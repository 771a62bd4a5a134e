use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FieldErrors;
use crate::images::services::{decode_data_uri, UploadItem};
use crate::tags::dto::TagRead;
use crate::users::dto::UserRead;

pub const MAX_NAME_LENGTH: usize = 256;

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientAmount {
    pub id: Uuid,
    pub amount: i64,
}

/// Body of `POST /recipes` and `PATCH /recipes/{id}`.
///
/// Every field is optional at the wire level; `validate` decides which are
/// required for the operation at hand.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeWrite {
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub tags: Option<Vec<Uuid>>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i64>,
}

/// Validated recipe payload. `None` fields are left unchanged on update.
#[derive(Debug, Default)]
pub struct RecipeInput {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<UploadItem>,
    pub tags: Option<Vec<Uuid>>,
    pub ingredients: Option<Vec<(Uuid, i32)>>,
}

const REQUIRED: &str = "This field is required.";

fn required<T>(errors: &mut FieldErrors, field: &str, value: Option<T>, partial: bool) -> Option<T> {
    if value.is_none() && !partial {
        errors.add(field, REQUIRED);
    }
    value
}

fn positive_i32(value: i64) -> Option<i32> {
    i32::try_from(value).ok().filter(|v| *v >= 1)
}

impl RecipeWrite {
    /// Check shapes and ranges. With `partial`, absent fields are allowed.
    /// Existence of referenced tags and ingredients is checked separately.
    pub fn validate(self, partial: bool) -> Result<RecipeInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut input = RecipeInput::default();

        if let Some(ingredients) = required(&mut errors, "ingredients", self.ingredients, partial) {
            if ingredients.is_empty() {
                errors.add("ingredients", "At least one ingredient is required.");
            }
            let mut seen = HashSet::new();
            let mut lines = Vec::with_capacity(ingredients.len());
            for item in ingredients {
                if !seen.insert(item.id) {
                    errors.add("ingredients", "Ingredients must be unique.");
                    continue;
                }
                match positive_i32(item.amount) {
                    Some(amount) => lines.push((item.id, amount)),
                    None => errors.add("ingredients", "Amount must be at least 1."),
                }
            }
            input.ingredients = Some(lines);
        }

        if let Some(tags) = required(&mut errors, "tags", self.tags, partial) {
            if tags.is_empty() {
                errors.add("tags", "At least one tag is required.");
            }
            let unique: HashSet<&Uuid> = tags.iter().collect();
            if unique.len() != tags.len() {
                errors.add("tags", "Tags must be unique.");
            }
            input.tags = Some(tags);
        }

        if let Some(image) = required(&mut errors, "image", self.image, partial) {
            match decode_data_uri(&image) {
                Ok(img) => input.image = Some(img),
                Err(e) => errors.add("image", e.to_string()),
            }
        }

        if let Some(name) = required(&mut errors, "name", self.name, partial) {
            let name = name.trim().to_string();
            if name.is_empty() {
                errors.add("name", "This field may not be blank.");
            } else if name.chars().count() > MAX_NAME_LENGTH {
                errors.add(
                    "name",
                    format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters."),
                );
            }
            input.name = Some(name);
        }

        if let Some(text) = required(&mut errors, "text", self.text, partial) {
            if text.trim().is_empty() {
                errors.add("text", "This field may not be blank.");
            }
            input.text = Some(text);
        }

        if let Some(minutes) = required(&mut errors, "cooking_time", self.cooking_time, partial) {
            match positive_i32(minutes) {
                Some(m) => input.cooking_time = Some(m),
                None => errors.add(
                    "cooking_time",
                    "Ensure this value is greater than or equal to 1.",
                ),
            }
        }

        if errors.is_empty() {
            Ok(input)
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeIngredientRead {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// Full recipe view used by list, detail, create and update.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeRead {
    pub id: Uuid,
    pub tags: Vec<TagRead>,
    pub author: UserRead,
    pub ingredients: Vec<RecipeIngredientRead>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

/// Compact recipe view used by favorite/cart actions and author previews.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeShort {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

#[derive(Debug, Serialize)]
pub struct ShortLinkResponse {
    #[serde(rename = "short-link")]
    pub short_link: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE: &str = "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

    fn full() -> RecipeWrite {
        RecipeWrite {
            ingredients: Some(vec![
                IngredientAmount { id: Uuid::new_v4(), amount: 2 },
                IngredientAmount { id: Uuid::new_v4(), amount: 1 },
            ]),
            tags: Some(vec![Uuid::new_v4()]),
            image: Some(IMAGE.into()),
            name: Some("  Omelette ".into()),
            text: Some("Beat the eggs.".into()),
            cooking_time: Some(10),
        }
    }

    #[test]
    fn accepts_complete_payload() {
        let input = full().validate(false).unwrap();
        assert_eq!(input.name.as_deref(), Some("Omelette"));
        assert_eq!(input.cooking_time, Some(10));
        assert_eq!(input.ingredients.unwrap().len(), 2);
        assert!(input.image.is_some());
    }

    #[test]
    fn create_requires_every_field() {
        let errors = RecipeWrite::default().validate(false).unwrap_err();
        for field in ["ingredients", "tags", "image", "name", "text", "cooking_time"] {
            assert_eq!(errors.get(field), Some(&[REQUIRED.to_string()][..]), "{field}");
        }
    }

    #[test]
    fn patch_accepts_absent_fields() {
        let input = RecipeWrite {
            name: Some("New name".into()),
            ..Default::default()
        }
        .validate(true)
        .unwrap();
        assert_eq!(input.name.as_deref(), Some("New name"));
        assert!(input.tags.is_none());
        assert!(input.ingredients.is_none());
        assert!(input.image.is_none());
    }

    #[test]
    fn rejects_duplicate_ingredients_and_bad_amounts() {
        let id = Uuid::new_v4();
        let mut body = full();
        body.ingredients = Some(vec![
            IngredientAmount { id, amount: 1 },
            IngredientAmount { id, amount: 3 },
            IngredientAmount { id: Uuid::new_v4(), amount: 0 },
        ]);
        let errors = body.validate(false).unwrap_err();
        let msgs = errors.get("ingredients").unwrap();
        assert!(msgs.iter().any(|m| m.contains("unique")));
        assert!(msgs.iter().any(|m| m.contains("at least 1")));
    }

    #[test]
    fn rejects_empty_collections() {
        let mut body = full();
        body.ingredients = Some(vec![]);
        body.tags = Some(vec![]);
        let errors = body.validate(false).unwrap_err();
        assert!(errors.get("ingredients").is_some());
        assert!(errors.get("tags").is_some());
    }

    #[test]
    fn rejects_duplicate_tags() {
        let tag = Uuid::new_v4();
        let mut body = full();
        body.tags = Some(vec![tag, tag]);
        let errors = body.validate(false).unwrap_err();
        assert_eq!(errors.get("tags").unwrap(), ["Tags must be unique.".to_string()]);
    }

    #[test]
    fn rejects_out_of_range_scalars() {
        let mut body = full();
        body.cooking_time = Some(0);
        body.name = Some("x".repeat(MAX_NAME_LENGTH + 1));
        body.text = Some("   ".into());
        body.image = Some("not base64".into());
        let errors = body.validate(true).unwrap_err();
        for field in ["cooking_time", "name", "text", "image"] {
            assert!(errors.get(field).is_some(), "{field}");
        }
    }

    #[test]
    fn short_link_key_has_a_dash() {
        let json = serde_json::to_string(&ShortLinkResponse {
            short_link: "http://x/s/abc".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"short-link":"http://x/s/abc"}"#);
    }
}
