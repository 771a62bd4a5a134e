//! User-owned join rows: favorites, shopping cart entries and subscriptions.
//!
//! Each (owner, target) pair is either absent or present. Adding a present
//! pair or removing an absent one is a client error, never a silent no-op.
//! The primary key on every table is what actually rejects concurrent
//! duplicates; the insert simply reports whether it created a row.

use std::collections::HashSet;

use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Favorite,
    ShoppingCart,
    Subscription,
}

impl Relation {
    fn table(self) -> &'static str {
        match self {
            Relation::Favorite => "favorites",
            Relation::ShoppingCart => "shopping_cart",
            Relation::Subscription => "subscriptions",
        }
    }

    fn target_column(self) -> &'static str {
        match self {
            Relation::Favorite | Relation::ShoppingCart => "recipe_id",
            Relation::Subscription => "author_id",
        }
    }

    fn already_present(self) -> &'static str {
        match self {
            Relation::Favorite => "Recipe is already in favorites.",
            Relation::ShoppingCart => "Recipe is already in the shopping cart.",
            Relation::Subscription => "You are already subscribed to this user.",
        }
    }

    fn not_present(self) -> &'static str {
        match self {
            Relation::Favorite => "Recipe was not in favorites.",
            Relation::ShoppingCart => "Recipe was not in the shopping cart.",
            Relation::Subscription => "You were not subscribed to this user.",
        }
    }
}

/// Rejects pairs that may never exist, whatever the current state.
pub fn check_pair(relation: Relation, owner: Uuid, target: Uuid) -> ApiResult<()> {
    if relation == Relation::Subscription && owner == target {
        return Err(ApiError::Conflict("You cannot subscribe to yourself.".into()));
    }
    Ok(())
}

/// Outcome of an insert that created `rows` rows.
pub fn added(relation: Relation, rows: u64) -> ApiResult<()> {
    if rows == 0 {
        return Err(ApiError::Conflict(relation.already_present().into()));
    }
    Ok(())
}

/// Outcome of a delete that removed `rows` rows.
pub fn removed(relation: Relation, rows: u64) -> ApiResult<()> {
    if rows == 0 {
        return Err(ApiError::Conflict(relation.not_present().into()));
    }
    Ok(())
}

/// ABSENT -> PRESENT.
pub async fn add(db: &PgPool, relation: Relation, owner: Uuid, target: Uuid) -> ApiResult<()> {
    check_pair(relation, owner, target)?;
    let sql = format!(
        "INSERT INTO {} (user_id, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        relation.table(),
        relation.target_column()
    );
    let res = sqlx::query(&sql)
        .bind(owner)
        .bind(target)
        .execute(db)
        .await
        .with_context(|| format!("insert into {}", relation.table()))?;
    if let Err(e) = added(relation, res.rows_affected()) {
        warn!(?relation, %owner, %target, "relation already present");
        return Err(e);
    }
    info!(?relation, %owner, %target, "relation added");
    Ok(())
}

/// PRESENT -> ABSENT.
pub async fn remove(db: &PgPool, relation: Relation, owner: Uuid, target: Uuid) -> ApiResult<()> {
    let sql = format!(
        "DELETE FROM {} WHERE user_id = $1 AND {} = $2",
        relation.table(),
        relation.target_column()
    );
    let res = sqlx::query(&sql)
        .bind(owner)
        .bind(target)
        .execute(db)
        .await
        .with_context(|| format!("delete from {}", relation.table()))?;
    if let Err(e) = removed(relation, res.rows_affected()) {
        warn!(?relation, %owner, %target, "relation not present");
        return Err(e);
    }
    info!(?relation, %owner, %target, "relation removed");
    Ok(())
}

/// Which of `targets` the owner currently has a row for.
pub async fn present_targets(
    db: &PgPool,
    relation: Relation,
    owner: Option<Uuid>,
    targets: &[Uuid],
) -> anyhow::Result<HashSet<Uuid>> {
    let Some(owner) = owner else {
        return Ok(HashSet::new());
    };
    if targets.is_empty() {
        return Ok(HashSet::new());
    }
    let sql = format!(
        "SELECT {col} FROM {table} WHERE user_id = $1 AND {col} = ANY($2)",
        col = relation.target_column(),
        table = relation.table()
    );
    let rows: Vec<(Uuid,)> = sqlx::query_as(&sql)
        .bind(owner)
        .bind(targets)
        .fetch_all(db)
        .await
        .with_context(|| format!("select from {}", relation.table()))?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn self_subscription_always_fails() {
        let me = Uuid::new_v4();
        let err = check_pair(Relation::Subscription, me, me).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("yourself"));
        assert!(check_pair(Relation::Subscription, me, Uuid::new_v4()).is_ok());
    }

    #[test]
    fn same_id_is_fine_for_recipe_relations() {
        let id = Uuid::new_v4();
        assert!(check_pair(Relation::Favorite, id, id).is_ok());
        assert!(check_pair(Relation::ShoppingCart, id, id).is_ok());
    }

    #[test]
    fn second_add_is_a_conflict() {
        // first insert creates the row, the second hits ON CONFLICT DO NOTHING
        assert!(added(Relation::Favorite, 1).is_ok());
        let err = added(Relation::Favorite, 0).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(ref m) if m == "Recipe is already in favorites."));
    }

    #[test]
    fn removing_absent_pair_is_a_conflict() {
        assert!(removed(Relation::ShoppingCart, 1).is_ok());
        let err = removed(Relation::ShoppingCart, 0).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err = removed(Relation::Subscription, 0).unwrap_err();
        assert!(err.to_string().contains("not subscribed"));
    }

    #[tokio::test]
    async fn anonymous_owner_has_no_targets() {
        let state = crate::state::AppState::fake();
        let found = present_targets(&state.db, Relation::Favorite, None, &[Uuid::new_v4()])
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}

#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::state::fake::seed;
    use axum::http::StatusCode;

    async fn rows(db: &PgPool, table: &str, owner: Uuid) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table} WHERE user_id = $1"))
            .bind(owner)
            .fetch_one(db)
            .await
            .unwrap();
        n
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn favorite_added_twice_keeps_one_row(db: PgPool) {
        let cook = seed::user(&db, "cook").await;
        let recipe = seed::recipe(&db, cook, "soup", &[]).await;

        add(&db, Relation::Favorite, cook, recipe).await.unwrap();
        let err = add(&db, Relation::Favorite, cook, recipe).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(rows(&db, "favorites", cook).await, 1);

        let found = present_targets(&db, Relation::Favorite, Some(cook), &[recipe, Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(found, HashSet::from([recipe]));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn cart_remove_twice_is_a_conflict(db: PgPool) {
        let cook = seed::user(&db, "cook").await;
        let recipe = seed::recipe(&db, cook, "soup", &[]).await;

        add(&db, Relation::ShoppingCart, cook, recipe).await.unwrap();
        remove(&db, Relation::ShoppingCart, cook, recipe).await.unwrap();
        let err = remove(&db, Relation::ShoppingCart, cook, recipe).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(rows(&db, "shopping_cart", cook).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn self_subscription_never_persists(db: PgPool) {
        let cook = seed::user(&db, "cook").await;
        let err = add(&db, Relation::Subscription, cook, cook).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(rows(&db, "subscriptions", cook).await, 0);

        let author = seed::user(&db, "author").await;
        add(&db, Relation::Subscription, cook, author).await.unwrap();
        assert_eq!(rows(&db, "subscriptions", cook).await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn vanished_target_is_not_found(db: PgPool) {
        let cook = seed::user(&db, "cook").await;
        let err = add(&db, Relation::Favorite, cook, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(rows(&db, "favorites", cook).await, 0);
    }
}
