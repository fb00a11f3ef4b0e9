//! Tags and ingredients: user-owned, named rows attached to recipes.
//!
//! Both share one shape and lifecycle, so they are modelled once and told
//! apart by [`AttributeKind`].

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use validator::Validate;

pub const NAME_MAX_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Tag,
    Ingredient,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 2] = [AttributeKind::Tag, AttributeKind::Ingredient];

    /// Table holding the rows.
    pub fn table(self) -> &'static str {
        match self {
            AttributeKind::Tag => "tag",
            AttributeKind::Ingredient => "ingredient",
        }
    }

    /// Join table linking rows to recipes.
    pub fn link_table(self) -> &'static str {
        match self {
            AttributeKind::Tag => "recipe_tags",
            AttributeKind::Ingredient => "recipe_ingredients",
        }
    }

    /// Foreign key column in [`Self::link_table`].
    pub fn link_column(self) -> &'static str {
        match self {
            AttributeKind::Tag => "tag_id",
            AttributeKind::Ingredient => "ingredient_id",
        }
    }

    /// Name of the recipe payload field carrying this relation.
    pub fn field(self) -> &'static str {
        match self {
            AttributeKind::Tag => "tags",
            AttributeKind::Ingredient => "ingredients",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttributeKind::Tag => "Tag",
            AttributeKind::Ingredient => "Ingredient",
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Attribute {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
}

/// An attribute row together with the recipe it is linked to.
#[derive(Debug, Clone, FromRow)]
pub struct LinkedAttribute {
    pub recipe_id: i64,
    pub id: i64,
    pub user_id: i64,
    pub name: String,
}

impl From<LinkedAttribute> for Attribute {
    fn from(linked: LinkedAttribute) -> Self {
        Attribute {
            id: linked.id,
            user_id: linked.user_id,
            name: linked.name,
        }
    }
}

/// `{name}` spec as embedded in recipe payloads. Any `id` sent along is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameSpec {
    pub name: String,
}

impl NameSpec {
    pub fn new(name: impl Into<String>) -> Self {
        NameSpec { name: name.into() }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AttributeForm {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters."))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AttributeUpdateForm {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters."))]
    pub name: Option<String>,
}

impl From<AttributeForm> for AttributeUpdateForm {
    fn from(form: AttributeForm) -> Self {
        AttributeUpdateForm {
            name: Some(form.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeResponse {
    pub id: i64,
    pub name: String,
}

impl From<Attribute> for AttributeResponse {
    fn from(attribute: Attribute) -> Self {
        AttributeResponse {
            id: attribute.id,
            name: attribute.name,
        }
    }
}
