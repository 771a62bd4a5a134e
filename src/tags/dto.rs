use serde::Serialize;
use uuid::Uuid;

use super::repo::Tag;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TagRead {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

impl From<Tag> for TagRead {
    fn from(t: Tag) -> Self {
        Self {
            id: t.id,
            name: t.name,
            slug: t.slug,
        }
    }
}
