use indexmap::IndexMap;
use sqlx::FromRow;

/// Attachment name of the downloadable list.
pub const FILENAME: &str = "shopping_list.txt";

/// One ingredient line of one recipe in a user's cart.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CartLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// Ingredient totals keyed by (name, unit), in first-seen order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShoppingList {
    items: IndexMap<(String, String), i64>,
}

impl ShoppingList {
    pub fn aggregate(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut items: IndexMap<(String, String), i64> = IndexMap::new();
        for line in lines {
            *items.entry((line.name, line.measurement_unit)).or_insert(0) += i64::from(line.amount);
        }
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn lines(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|((name, unit), total)| format!("{name} ({unit}) — {total}"))
            .collect()
    }

    /// Plain-text body of the download, one line per ingredient.
    pub fn render(&self) -> String {
        self.lines().join("\n")
    }
}
