use std::collections::{BTreeSet, HashSet};

use uuid::Uuid;

use crate::error::{ApiResult, FieldErrors};
use crate::query::{parse_bool, QueryPairs};

/// How the `tags` parameter narrows the recipe list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSelection {
    /// No narrowing: parameter absent, or every known tag was requested.
    Any,
    /// Parameter present but no requested slug exists.
    Nothing,
    /// Recipes carrying at least one of these slugs.
    Only(BTreeSet<String>),
}

/// Flattens repeated and comma-joined `tags` values, dropping empty segments.
///
/// `None` means the parameter never appeared, which is different from an
/// empty list (`?tags=`).
pub fn requested_slugs(values: Option<Vec<&str>>) -> Option<Vec<String>> {
    values.map(|values| {
        values
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

/// Resolves requested slugs against the universe of known slugs.
///
/// Unknown slugs are dropped, not rejected. Selecting every known tag is
/// treated exactly like not filtering at all.
pub fn resolve_tags<S: AsRef<str>>(requested: Option<Vec<String>>, known: &[S]) -> TagSelection {
    let Some(requested) = requested else {
        return TagSelection::Any;
    };
    let universe: HashSet<&str> = known.iter().map(AsRef::as_ref).collect();
    let valid: BTreeSet<String> = requested
        .into_iter()
        .filter(|slug| universe.contains(slug.as_str()))
        .collect();

    if valid.is_empty() {
        TagSelection::Nothing
    } else if valid.len() == universe.len() {
        TagSelection::Any
    } else {
        TagSelection::Only(valid)
    }
}

/// Recipe list query parameters, parsed but not yet resolved against the database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeQuery {
    pub author: Option<Uuid>,
    pub tags: Option<Vec<String>>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeQuery {
    pub fn from_query(q: &QueryPairs) -> ApiResult<Self> {
        let mut errors = FieldErrors::new();

        let author = match q.get("author").map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<Uuid>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add("author", "Enter a valid user id.");
                    None
                }
            },
        };

        let mut flag = |name: &str| match q.get(name).map(str::trim) {
            None | Some("") => false,
            Some(raw) => parse_bool(raw).unwrap_or_else(|| {
                errors.add(name, "Enter a valid boolean: 1, 0, true or false.");
                false
            }),
        };
        let is_favorited = flag("is_favorited");
        let is_in_shopping_cart = flag("is_in_shopping_cart");

        errors.into_result()?;
        Ok(Self {
            author,
            tags: requested_slugs(q.all("tags")),
            is_favorited,
            is_in_shopping_cart,
        })
    }

    /// Combine with the caller and the known tag universe.
    ///
    /// The favorite and cart flags only narrow for an authenticated caller.
    pub fn resolve<S: AsRef<str>>(self, viewer: Option<Uuid>, known_slugs: &[S]) -> RecipeFilter {
        RecipeFilter {
            author: self.author,
            tags: resolve_tags(self.tags, known_slugs),
            favorited_by: viewer.filter(|_| self.is_favorited),
            in_cart_of: viewer.filter(|_| self.is_in_shopping_cart),
        }
    }
}

/// Fully resolved list filter, ready to be turned into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<Uuid>,
    pub tags: TagSelection,
    pub favorited_by: Option<Uuid>,
    pub in_cart_of: Option<Uuid>,
}

impl RecipeFilter {
    /// True when no row can match, so the query can be skipped.
    pub fn is_empty_result(&self) -> bool {
        self.tags == TagSelection::Nothing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: [&str; 3] = ["breakfast", "lunch", "dinner"];

    fn slugs(raw: &[&str]) -> Option<Vec<String>> {
        requested_slugs(Some(raw.to_vec()))
    }

    #[test]
    fn flattens_repeated_and_comma_joined_values() {
        assert_eq!(
            slugs(&["lunch,dinner", "", "breakfast", " ,lunch"]),
            Some(vec![
                "lunch".to_string(),
                "dinner".to_string(),
                "breakfast".to_string(),
                "lunch".to_string()
            ])
        );
        assert_eq!(requested_slugs(None), None);
        assert_eq!(slugs(&[""]), Some(vec![]));
    }

    #[test]
    fn absent_parameter_does_not_filter() {
        assert_eq!(resolve_tags(None, &KNOWN), TagSelection::Any);
    }

    #[test]
    fn only_invalid_slugs_yield_nothing() {
        assert_eq!(resolve_tags(slugs(&["invalid-slug"]), &KNOWN), TagSelection::Nothing);
    }

    #[test]
    fn present_but_empty_parameter_yields_nothing() {
        assert_eq!(resolve_tags(slugs(&[""]), &KNOWN), TagSelection::Nothing);
    }

    #[test]
    fn full_set_behaves_like_no_filter() {
        let sel = resolve_tags(slugs(&["dinner,lunch", "breakfast"]), &KNOWN);
        assert_eq!(sel, resolve_tags(None, &KNOWN));
    }

    #[test]
    fn invalid_slugs_are_dropped_and_duplicates_merged() {
        let sel = resolve_tags(slugs(&["dinner", "nope", "dinner"]), &KNOWN);
        assert_eq!(sel, TagSelection::Only(BTreeSet::from(["dinner".to_string()])));
    }

    #[test]
    fn partial_set_narrows_to_requested_slugs() {
        let sel = resolve_tags(slugs(&["lunch", "dinner"]), &KNOWN);
        assert_eq!(
            sel,
            TagSelection::Only(BTreeSet::from(["dinner".to_string(), "lunch".to_string()]))
        );
    }

    #[test]
    fn empty_universe_never_matches() {
        let known: [&str; 0] = [];
        assert_eq!(resolve_tags(slugs(&["lunch"]), &known), TagSelection::Nothing);
    }

    #[test]
    fn parses_list_query() {
        let author = Uuid::new_v4();
        let author_raw = author.to_string();
        let q = QueryPairs::from([
            ("author", author_raw.as_str()),
            ("tags", "lunch"),
            ("tags", "dinner"),
            ("is_favorited", "1"),
            ("is_in_shopping_cart", "false"),
        ]);
        let parsed = RecipeQuery::from_query(&q).unwrap();
        assert_eq!(parsed.author, Some(author));
        assert_eq!(parsed.tags, Some(vec!["lunch".into(), "dinner".into()]));
        assert!(parsed.is_favorited);
        assert!(!parsed.is_in_shopping_cart);
    }

    #[test]
    fn bad_values_are_field_errors() {
        let q = QueryPairs::from([("author", "seven"), ("is_favorited", "maybe")]);
        match RecipeQuery::from_query(&q).unwrap_err() {
            crate::error::ApiError::Validation(errors) => {
                assert!(errors.get("author").is_some());
                assert!(errors.get("is_favorited").is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn viewer_flags_are_noop_for_anonymous() {
        let q = RecipeQuery {
            is_favorited: true,
            is_in_shopping_cart: true,
            ..Default::default()
        };
        let anon = q.clone().resolve(None, &KNOWN);
        assert_eq!(anon.favorited_by, None);
        assert_eq!(anon.in_cart_of, None);

        let me = Uuid::new_v4();
        let authed = q.resolve(Some(me), &KNOWN);
        assert_eq!(authed.favorited_by, Some(me));
        assert_eq!(authed.in_cart_of, Some(me));
    }

    #[test]
    fn false_flags_do_not_narrow() {
        let me = Uuid::new_v4();
        let filter = RecipeQuery::default().resolve(Some(me), &KNOWN);
        assert_eq!(filter.favorited_by, None);
        assert_eq!(filter.in_cart_of, None);
        assert!(!filter.is_empty_result());
    }
}
