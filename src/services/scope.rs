//! Ownership scoping.
//!
//! Every recipe, tag and ingredient lookup is made on behalf of one user and
//! only sees that user's rows. A row owned by someone else is reported exactly
//! like a row that does not exist.

use crate::error::{AppError, AppResult};
use crate::models::AttributeKind;

/// The authenticated user a request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerScope {
    user_id: i64,
}

impl OwnerScope {
    pub fn new(user_id: i64) -> Self {
        OwnerScope { user_id }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Unwraps an owner-filtered lookup of a recipe.
    pub fn recipe<T>(&self, row: Option<T>) -> AppResult<T> {
        row.ok_or_else(recipe_not_found)
    }

    /// Unwraps an owner-filtered lookup of a tag or ingredient.
    pub fn attribute<T>(&self, kind: AttributeKind, row: Option<T>) -> AppResult<T> {
        row.ok_or_else(|| attribute_not_found(kind))
    }

    /// Turns the affected-row flag of an owner-filtered delete into a result.
    pub fn deleted_recipe(&self, deleted: bool) -> AppResult<()> {
        if deleted {
            Ok(())
        } else {
            Err(recipe_not_found())
        }
    }

    pub fn deleted_attribute(&self, kind: AttributeKind, deleted: bool) -> AppResult<()> {
        if deleted {
            Ok(())
        } else {
            Err(attribute_not_found(kind))
        }
    }
}

fn recipe_not_found() -> AppError {
    AppError::NotFound("Recipe not found".to_string())
}

fn attribute_not_found(kind: AttributeKind) -> AppError {
    AppError::NotFound(format!("{} not found", kind.label()))
}
