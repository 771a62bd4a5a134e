use std::collections::{HashMap, HashSet};

use rand::{distributions::Alphanumeric, Rng};
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{RecipeIngredientRead, RecipeInput, RecipeRead, RecipeShort, RecipeWrite};
use super::repo;
use super::repo_types::{RecipeFields, RecipeRow};
use super::shopping_list::ShoppingList;
use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::images::services::{discard_image, presign, store_image};
use crate::ingredients::repo as ingredient_repo;
use crate::relations::{present_targets, Relation};
use crate::state::AppState;
use crate::tags::{dto::TagRead, repo as tag_repo};
use crate::users::{repo_types::User, services::render_users};

pub const SHORT_CODE_LEN: usize = 6;
const SHORT_CODE_ATTEMPTS: usize = 5;

/// Full views for `rows`, in the same order, as seen by `viewer`.
pub async fn render_full(
    st: &AppState,
    viewer: Option<Uuid>,
    rows: Vec<RecipeRow>,
) -> anyhow::Result<Vec<RecipeRead>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut author_ids: Vec<Uuid> = rows.iter().map(|r| r.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let authors = User::find_many(&st.db, &author_ids).await?;
    let authors: HashMap<Uuid, _> = render_users(st, viewer, authors)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let mut tags: HashMap<Uuid, Vec<TagRead>> = HashMap::new();
    for t in repo::tags_for(&st.db, &ids).await? {
        tags.entry(t.recipe_id).or_default().push(TagRead {
            id: t.id,
            name: t.name,
            slug: t.slug,
        });
    }
    let mut ingredients: HashMap<Uuid, Vec<RecipeIngredientRead>> = HashMap::new();
    for i in repo::ingredients_for(&st.db, &ids).await? {
        ingredients.entry(i.recipe_id).or_default().push(RecipeIngredientRead {
            id: i.id,
            name: i.name,
            measurement_unit: i.measurement_unit,
            amount: i.amount,
        });
    }

    let favorited = present_targets(&st.db, Relation::Favorite, viewer, &ids).await?;
    let in_cart = present_targets(&st.db, Relation::ShoppingCart, viewer, &ids).await?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        // the same author may own several rows on one page
        let author = authors
            .get(&r.author_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("author {} of recipe {} missing", r.author_id, r.id))?;
        out.push(RecipeRead {
            image: presign(st, &r.image_key).await?,
            tags: tags.remove(&r.id).unwrap_or_default(),
            ingredients: ingredients.remove(&r.id).unwrap_or_default(),
            is_favorited: favorited.contains(&r.id),
            is_in_shopping_cart: in_cart.contains(&r.id),
            author,
            id: r.id,
            name: r.name,
            text: r.text,
            cooking_time: r.cooking_time,
        });
    }
    Ok(out)
}

pub async fn render_one(st: &AppState, viewer: Option<Uuid>, row: RecipeRow) -> anyhow::Result<RecipeRead> {
    render_full(st, viewer, vec![row])
        .await?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("render_full dropped a recipe"))
}

pub async fn render_short(st: &AppState, rows: Vec<RecipeRow>) -> anyhow::Result<Vec<RecipeShort>> {
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        out.push(RecipeShort {
            image: presign(st, &r.image_key).await?,
            id: r.id,
            name: r.name,
            cooking_time: r.cooking_time,
        });
    }
    Ok(out)
}

pub async fn load(st: &AppState, id: Uuid) -> ApiResult<RecipeRow> {
    repo::get(&st.db, id).await?.ok_or_else(ApiError::not_found)
}

fn ensure_author(recipe: &RecipeRow, user_id: Uuid) -> ApiResult<()> {
    if recipe.author_id != user_id {
        warn!(recipe_id = %recipe.id, %user_id, "recipe change by non-author rejected");
        return Err(ApiError::Forbidden(
            "You do not have permission to perform this action.".into(),
        ));
    }
    Ok(())
}

fn missing_ids(
    errors: &mut FieldErrors,
    field: &str,
    requested: impl IntoIterator<Item = Uuid>,
    found: &HashSet<Uuid>,
) {
    for id in requested {
        if !found.contains(&id) {
            errors.add(field, format!("Invalid pk \"{id}\" - object does not exist."));
        }
    }
}

/// Field errors for referenced tags and ingredients that do not exist.
async fn check_references(st: &AppState, input: &RecipeInput) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    if let Some(lines) = &input.ingredients {
        let ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();
        let found = ingredient_repo::existing_ids(&st.db, &ids).await?;
        missing_ids(&mut errors, "ingredients", ids, &found);
    }
    if let Some(tag_ids) = &input.tags {
        let found = tag_repo::existing_ids(&st.db, tag_ids).await?;
        missing_ids(&mut errors, "tags", tag_ids.iter().copied(), &found);
    }
    errors.into_result()
}

fn validate(body: RecipeWrite, partial: bool) -> ApiResult<RecipeInput> {
    body.validate(partial).map_err(|errors| {
        warn!(?errors, partial, "recipe payload rejected");
        ApiError::Validation(errors)
    })
}

pub async fn create_recipe(st: &AppState, author_id: Uuid, body: RecipeWrite) -> ApiResult<RecipeRead> {
    let input = validate(body, false)?;
    check_references(st, &input).await?;

    let (Some(name), Some(text), Some(cooking_time), Some(image), Some(tags), Some(lines)) = (
        input.name,
        input.text,
        input.cooking_time,
        input.image,
        input.tags,
        input.ingredients,
    ) else {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "validated recipe payload is incomplete"
        )));
    };

    let id = Uuid::new_v4();
    let key = store_image(st, &format!("recipes/{id}"), image).await?;

    let saved = async {
        let mut tx = st.db.begin().await?;
        let row = repo::insert(&mut tx, id, author_id, &name, &text, cooking_time, &key).await?;
        repo::replace_tags(&mut tx, id, &tags).await?;
        repo::replace_ingredients(&mut tx, id, &lines).await?;
        tx.commit().await?;
        anyhow::Ok(row)
    }
    .await;
    let row = match saved {
        Ok(row) => row,
        Err(e) => {
            discard_image(st, &key).await;
            return Err(e.into());
        }
    };

    info!(recipe_id = %id, %author_id, "recipe created");
    Ok(render_one(st, Some(author_id), row).await?)
}

pub async fn update_recipe(
    st: &AppState,
    user_id: Uuid,
    id: Uuid,
    body: RecipeWrite,
) -> ApiResult<RecipeRead> {
    let current = load(st, id).await?;
    ensure_author(&current, user_id)?;
    let input = validate(body, true)?;
    check_references(st, &input).await?;

    let new_key = match input.image {
        Some(image) => Some(store_image(st, &format!("recipes/{id}"), image).await?),
        None => None,
    };
    let fields = RecipeFields {
        name: input.name,
        text: input.text,
        cooking_time: input.cooking_time,
        image_key: new_key.clone(),
    };

    let saved = async {
        let mut tx = st.db.begin().await?;
        let row = repo::update_fields(&mut tx, id, &fields).await?;
        if let Some(tags) = &input.tags {
            repo::replace_tags(&mut tx, id, tags).await?;
        }
        if let Some(lines) = &input.ingredients {
            repo::replace_ingredients(&mut tx, id, lines).await?;
        }
        tx.commit().await?;
        anyhow::Ok(row)
    }
    .await;

    let row = match saved {
        Ok(row) => row,
        Err(e) => {
            if let Some(key) = &new_key {
                discard_image(st, key).await;
            }
            return Err(e.into());
        }
    };
    if new_key.is_some() && current.image_key != row.image_key {
        discard_image(st, &current.image_key).await;
    }

    info!(recipe_id = %id, %user_id, "recipe updated");
    Ok(render_one(st, Some(user_id), row).await?)
}

pub async fn delete_recipe(st: &AppState, user_id: Uuid, id: Uuid) -> ApiResult<()> {
    let current = load(st, id).await?;
    ensure_author(&current, user_id)?;
    if let Some(key) = repo::delete(&st.db, id).await? {
        discard_image(st, &key).await;
    }
    info!(recipe_id = %id, %user_id, "recipe deleted");
    Ok(())
}

pub async fn shopping_list(st: &AppState, user_id: Uuid) -> anyhow::Result<ShoppingList> {
    let lines = repo::cart_lines(&st.db, user_id).await?;
    let list = ShoppingList::aggregate(lines);
    info!(%user_id, "shopping list generated");
    Ok(list)
}

pub fn random_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHORT_CODE_LEN)
        .map(char::from)
        .collect()
}

pub fn short_url(base_url: &str, code: &str) -> String {
    format!("{base_url}/s/{code}")
}

/// The recipe's short URL, created on first request.
pub async fn short_link(st: &AppState, recipe_id: Uuid) -> ApiResult<String> {
    if !repo::exists(&st.db, recipe_id).await? {
        return Err(ApiError::not_found());
    }
    if let Some(link) = repo::short_link_for(&st.db, recipe_id).await? {
        return Ok(link.short_url);
    }
    for _ in 0..SHORT_CODE_ATTEMPTS {
        let code = random_code();
        let url = short_url(st.base_url(), &code);
        if let Some(link) = repo::insert_short_link(&st.db, recipe_id, &code, &url).await? {
            info!(recipe_id = %link.recipe_id, code = %link.code, "short link created");
            return Ok(link.short_url);
        }
        // either a concurrent request won for this recipe or the code is taken
        if let Some(link) = repo::short_link_for(&st.db, recipe_id).await? {
            return Ok(link.short_url);
        }
    }
    Err(ApiError::Internal(anyhow::anyhow!(
        "could not allocate a short link code for recipe {recipe_id}"
    )))
}

/// Where a short code points, as an absolute recipe URL.
pub async fn resolve_short_link(st: &AppState, code: &str) -> ApiResult<String> {
    let recipe_id = repo::recipe_for_code(&st.db, code)
        .await?
        .ok_or_else(ApiError::not_found)?;
    Ok(format!("{}/recipes/{recipe_id}", st.base_url()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn row(author_id: Uuid) -> RecipeRow {
        RecipeRow {
            id: Uuid::new_v4(),
            author_id,
            name: "Pancakes".into(),
            image_key: "recipes/x/img.png".into(),
            text: "Mix and fry.".into(),
            cooking_time: 20,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn only_the_author_may_change_a_recipe() {
        let author = Uuid::new_v4();
        let recipe = row(author);
        assert!(ensure_author(&recipe, author).is_ok());
        let err = ensure_author(&recipe, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn missing_references_are_reported_per_id() {
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        let mut errors = FieldErrors::new();
        missing_ids(&mut errors, "tags", [known, unknown], &HashSet::from([known]));
        let msgs = errors.get("tags").unwrap();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains(&unknown.to_string()));
    }

    #[test]
    fn short_codes_are_alphanumeric() {
        let code = random_code();
        assert_eq!(code.len(), SHORT_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(short_url("http://testserver", "abc123"), "http://testserver/s/abc123");
    }

    #[tokio::test]
    async fn short_view_presigns_the_image() {
        let state = AppState::fake();
        let r = row(Uuid::new_v4());
        let id = r.id;
        let views = render_short(&state, vec![r]).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, id);
        assert_eq!(views[0].image, "https://fake.local/recipes/x/img.png");
        assert_eq!(views[0].cooking_time, 20);
    }

    #[tokio::test]
    async fn rendering_nothing_touches_nothing() {
        let state = AppState::fake();
        assert!(render_full(&state, None, Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_payload_fails_before_any_io() {
        let state = AppState::fake();
        let err = create_recipe(&state, Uuid::new_v4(), RecipeWrite::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref f) if f.get("name").is_some()));
    }
}
