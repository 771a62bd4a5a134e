use std::collections::HashSet;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ingredient {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
}

/// `LIKE` pattern matching names that start with `prefix`, wildcards escaped.
pub(crate) fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub async fn search(db: &PgPool, prefix: Option<&str>) -> anyhow::Result<Vec<Ingredient>> {
    let pattern = prefix_pattern(prefix.unwrap_or_default().trim());
    let rows = sqlx::query_as::<_, Ingredient>(
        r#"
        SELECT id, name, measurement_unit
        FROM ingredients
        WHERE name ILIKE $1
        ORDER BY name, measurement_unit
        "#,
    )
    .bind(pattern)
    .fetch_all(db)
    .await
    .context("search ingredients")?;
    Ok(rows)
}

pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Ingredient>> {
    let row = sqlx::query_as::<_, Ingredient>(
        r#"SELECT id, name, measurement_unit FROM ingredients WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("get ingredient")?;
    Ok(row)
}

pub async fn existing_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<HashSet<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(r#"SELECT id FROM ingredients WHERE id = ANY($1)"#)
        .bind(ids)
        .fetch_all(db)
        .await
        .context("check ingredient ids")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
