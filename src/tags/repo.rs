use std::collections::HashSet;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<Tag>> {
    let rows = sqlx::query_as::<_, Tag>(r#"SELECT id, name, slug FROM tags ORDER BY name"#)
        .fetch_all(db)
        .await
        .context("list tags")?;
    Ok(rows)
}

pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Tag>> {
    let row = sqlx::query_as::<_, Tag>(r#"SELECT id, name, slug FROM tags WHERE id = $1"#)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("get tag")?;
    Ok(row)
}

/// Every known slug; the universe the tag filter validates against.
pub async fn all_slugs(db: &PgPool) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(r#"SELECT slug FROM tags"#)
        .fetch_all(db)
        .await
        .context("list tag slugs")?;
    Ok(rows.into_iter().map(|(s,)| s).collect())
}

pub async fn existing_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<HashSet<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(r#"SELECT id FROM tags WHERE id = ANY($1)"#)
        .bind(ids)
        .fetch_all(db)
        .await
        .context("check tag ids")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
