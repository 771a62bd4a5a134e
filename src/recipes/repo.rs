use std::collections::HashMap;

use anyhow::Context;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::filters::{RecipeFilter, TagSelection};
use super::repo_types::{RecipeFields, RecipeIngredientRow, RecipeRow, RecipeTagRow, ShortLinkRow};
use super::shopping_list::CartLine;

const RECIPE_COLUMNS: &str = "r.id, r.author_id, r.name, r.image_key, r.text, r.cooking_time, r.created_at";

/// Appends the `WHERE` clause for a resolved list filter.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &RecipeFilter) {
    qb.push(" WHERE TRUE");
    if let Some(author) = filter.author {
        qb.push(" AND r.author_id = ").push_bind(author);
    }
    match &filter.tags {
        TagSelection::Any => {}
        TagSelection::Nothing => {
            qb.push(" AND FALSE");
        }
        TagSelection::Only(slugs) => {
            qb.push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(slugs.iter().cloned().collect::<Vec<String>>())
            .push("))");
        }
    }
    if let Some(user) = filter.favorited_by {
        qb.push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
            .push_bind(user)
            .push(")");
    }
    if let Some(user) = filter.in_cart_of {
        qb.push(
            " AND EXISTS (SELECT 1 FROM shopping_cart sc WHERE sc.recipe_id = r.id AND sc.user_id = ",
        )
        .push_bind(user)
        .push(")");
    }
}

fn list_query(filter: &RecipeFilter, limit: i64, offset: i64) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {RECIPE_COLUMNS} FROM recipes r"));
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY r.created_at DESC, r.id LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    qb
}

fn count_query(filter: &RecipeFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM recipes r");
    push_filter(&mut qb, filter);
    qb
}

pub async fn list(
    db: &PgPool,
    filter: &RecipeFilter,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<RecipeRow>> {
    let rows = list_query(filter, limit, offset)
        .build_query_as::<RecipeRow>()
        .fetch_all(db)
        .await
        .context("list recipes")?;
    Ok(rows)
}

pub async fn count(db: &PgPool, filter: &RecipeFilter) -> anyhow::Result<i64> {
    let (count,): (i64,) = count_query(filter)
        .build_query_as()
        .fetch_one(db)
        .await
        .context("count recipes")?;
    Ok(count)
}

pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<RecipeRow>> {
    let row = sqlx::query_as::<_, RecipeRow>(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
    .context("get recipe")?;
    Ok(row)
}

pub async fn exists(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let (found,): (bool,) = sqlx::query_as(r#"SELECT EXISTS (SELECT 1 FROM recipes WHERE id = $1)"#)
        .bind(id)
        .fetch_one(db)
        .await
        .context("check recipe")?;
    Ok(found)
}

/// Insert the recipe row. `id` is chosen by the caller so the image key can embed it.
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    author_id: Uuid,
    name: &str,
    text: &str,
    cooking_time: i32,
    image_key: &str,
) -> anyhow::Result<RecipeRow> {
    let row = sqlx::query_as::<_, RecipeRow>(
        r#"
        INSERT INTO recipes (id, author_id, name, text, cooking_time, image_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, author_id, name, image_key, text, cooking_time, created_at
        "#,
    )
    .bind(id)
    .bind(author_id)
    .bind(name)
    .bind(text)
    .bind(cooking_time)
    .bind(image_key)
    .fetch_one(&mut **tx)
    .await
    .context("insert recipe")?;
    Ok(row)
}

pub async fn update_fields(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    fields: &RecipeFields,
) -> anyhow::Result<RecipeRow> {
    let row = sqlx::query_as::<_, RecipeRow>(
        r#"
        UPDATE recipes
        SET name = COALESCE($2, name),
            text = COALESCE($3, text),
            cooking_time = COALESCE($4, cooking_time),
            image_key = COALESCE($5, image_key)
        WHERE id = $1
        RETURNING id, author_id, name, image_key, text, cooking_time, created_at
        "#,
    )
    .bind(id)
    .bind(fields.name.as_deref())
    .bind(fields.text.as_deref())
    .bind(fields.cooking_time)
    .bind(fields.image_key.as_deref())
    .fetch_one(&mut **tx)
    .await
    .context("update recipe")?;
    Ok(row)
}

pub async fn replace_tags(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    tag_ids: &[Uuid],
) -> anyhow::Result<()> {
    sqlx::query(r#"DELETE FROM recipe_tags WHERE recipe_id = $1"#)
        .bind(recipe_id)
        .execute(&mut **tx)
        .await
        .context("clear recipe tags")?;
    sqlx::query(
        r#"
        INSERT INTO recipe_tags (recipe_id, tag_id)
        SELECT $1, t.tag_id FROM UNNEST($2::uuid[]) AS t(tag_id)
        "#,
    )
    .bind(recipe_id)
    .bind(tag_ids)
    .execute(&mut **tx)
    .await
    .context("insert recipe tags")?;
    Ok(())
}

/// Replace the ingredient lines, keeping the given order in `position`.
pub async fn replace_ingredients(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    lines: &[(Uuid, i32)],
) -> anyhow::Result<()> {
    let (ids, amounts): (Vec<Uuid>, Vec<i32>) = lines.iter().copied().unzip();
    sqlx::query(r#"DELETE FROM recipe_ingredients WHERE recipe_id = $1"#)
        .bind(recipe_id)
        .execute(&mut **tx)
        .await
        .context("clear recipe ingredients")?;
    sqlx::query(
        r#"
        INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount, position)
        SELECT $1, t.ingredient_id, t.amount, t.ord::int
        FROM UNNEST($2::uuid[], $3::int4[]) WITH ORDINALITY AS t(ingredient_id, amount, ord)
        "#,
    )
    .bind(recipe_id)
    .bind(&ids)
    .bind(&amounts)
    .execute(&mut **tx)
    .await
    .context("insert recipe ingredients")?;
    Ok(())
}

/// Delete a recipe, returning its image key. Join rows go with it via cascade.
pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<Option<String>> {
    let key: Option<(String,)> =
        sqlx::query_as(r#"DELETE FROM recipes WHERE id = $1 RETURNING image_key"#)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("delete recipe")?;
    Ok(key.map(|(k,)| k))
}

pub async fn tags_for(db: &PgPool, recipe_ids: &[Uuid]) -> anyhow::Result<Vec<RecipeTagRow>> {
    let rows = sqlx::query_as::<_, RecipeTagRow>(
        r#"
        SELECT rt.recipe_id, t.id, t.name, t.slug
        FROM recipe_tags rt
        JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name
        "#,
    )
    .bind(recipe_ids)
    .fetch_all(db)
    .await
    .context("load recipe tags")?;
    Ok(rows)
}

pub async fn ingredients_for(
    db: &PgPool,
    recipe_ids: &[Uuid],
) -> anyhow::Result<Vec<RecipeIngredientRow>> {
    let rows = sqlx::query_as::<_, RecipeIngredientRow>(
        r#"
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.position
        "#,
    )
    .bind(recipe_ids)
    .fetch_all(db)
    .await
    .context("load recipe ingredients")?;
    Ok(rows)
}

/// Newest recipes of each author, at most `limit` per author when given.
pub async fn latest_by_authors(
    db: &PgPool,
    author_ids: &[Uuid],
    limit: Option<i64>,
) -> anyhow::Result<Vec<RecipeRow>> {
    if author_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, RecipeRow>(
        r#"
        SELECT id, author_id, name, image_key, text, cooking_time, created_at
        FROM (
            SELECT r.*,
                   ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.created_at DESC, r.id) AS rn
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) ranked
        WHERE $2::bigint IS NULL OR rn <= $2
        ORDER BY author_id, rn
        "#,
    )
    .bind(author_ids)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("load recipes by authors")?;
    Ok(rows)
}

pub async fn count_by_authors(
    db: &PgPool,
    author_ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, i64>> {
    if author_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(Uuid, i64)> = sqlx::query_as(
        r#"
        SELECT author_id, COUNT(*)
        FROM recipes
        WHERE author_id = ANY($1)
        GROUP BY author_id
        "#,
    )
    .bind(author_ids)
    .fetch_all(db)
    .await
    .context("count recipes by authors")?;
    Ok(rows.into_iter().collect())
}

/// Ingredient lines of every recipe in the user's cart, in cart then line order.
pub async fn cart_lines(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<CartLine>> {
    let rows = sqlx::query_as::<_, CartLine>(
        r#"
        SELECT i.name, i.measurement_unit, ri.amount
        FROM shopping_cart sc
        JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
        ORDER BY sc.created_at, sc.recipe_id, ri.position
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("load shopping cart lines")?;
    Ok(rows)
}

pub async fn short_link_for(db: &PgPool, recipe_id: Uuid) -> anyhow::Result<Option<ShortLinkRow>> {
    let row = sqlx::query_as::<_, ShortLinkRow>(
        r#"SELECT recipe_id, code, short_url FROM short_links WHERE recipe_id = $1"#,
    )
    .bind(recipe_id)
    .fetch_optional(db)
    .await
    .context("get short link")?;
    Ok(row)
}

/// Try to store a link. `None` when the recipe already has one or the code is taken.
pub async fn insert_short_link(
    db: &PgPool,
    recipe_id: Uuid,
    code: &str,
    short_url: &str,
) -> anyhow::Result<Option<ShortLinkRow>> {
    let row = sqlx::query_as::<_, ShortLinkRow>(
        r#"
        INSERT INTO short_links (recipe_id, code, short_url)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        RETURNING recipe_id, code, short_url
        "#,
    )
    .bind(recipe_id)
    .bind(code)
    .bind(short_url)
    .fetch_optional(db)
    .await
    .context("insert short link")?;
    Ok(row)
}

pub async fn recipe_for_code(db: &PgPool, code: &str) -> anyhow::Result<Option<Uuid>> {
    let row: Option<(Uuid,)> =
        sqlx::query_as(r#"SELECT recipe_id FROM short_links WHERE code = $1"#)
            .bind(code)
            .fetch_optional(db)
            .await
            .context("resolve short link")?;
    Ok(row.map(|(id,)| id))
}
