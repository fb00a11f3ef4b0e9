//! Entity store: persistence for users, recipes, tags and ingredients.
//!
//! Every read takes the owning user's id and only ever sees that user's rows.
//! Recipe writes go through a [`StoreTx`] so a recipe and its relations
//! change together or not at all.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::AppResult;
use crate::models::{
    Attribute, AttributeKind, NewUser, Recipe, RecipeFields, RecipeRecord, User, UserChanges,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    Ascending,
    Descending,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Round-trip to the backing datastore.
    async fn ping(&self) -> AppResult<()>;

    // === Users ===

    /// Fails with `UserAlreadyExists` when the email is taken.
    async fn create_user(&self, user: NewUser) -> AppResult<User>;

    async fn get_user_by_id(&self, id: i64) -> AppResult<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn update_user(&self, id: i64, changes: UserChanges) -> AppResult<Option<User>>;

    // === Recipes ===

    /// Recipes owned by `owner`, by id in `order`.
    async fn list_recipes(&self, owner: i64, order: ListOrder) -> AppResult<Vec<RecipeRecord>>;

    async fn get_recipe(&self, owner: i64, id: i64) -> AppResult<Option<RecipeRecord>>;

    /// Removes the recipe and its links; the linked tags/ingredients stay.
    async fn delete_recipe(&self, owner: i64, id: i64) -> AppResult<bool>;

    async fn set_recipe_image(&self, owner: i64, id: i64, image: &str) -> AppResult<Option<Recipe>>;

    // === Tags / ingredients ===

    /// Rows of `kind` owned by `owner`, by name in `order`.
    async fn list_attributes(
        &self,
        kind: AttributeKind,
        owner: i64,
        order: ListOrder,
    ) -> AppResult<Vec<Attribute>>;

    async fn get_attribute(
        &self,
        kind: AttributeKind,
        owner: i64,
        id: i64,
    ) -> AppResult<Option<Attribute>>;

    /// Fails with a `name` validation error when `owner` already has a row of that name.
    async fn rename_attribute(
        &self,
        kind: AttributeKind,
        owner: i64,
        id: i64,
        name: &str,
    ) -> AppResult<Option<Attribute>>;

    async fn delete_attribute(&self, kind: AttributeKind, owner: i64, id: i64) -> AppResult<bool>;

    // === Units of work ===

    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;
}

/// A write transaction. Dropping it without [`StoreTx::commit`] discards every change.
#[async_trait]
pub trait StoreTx: Send {
    async fn insert_recipe(&mut self, owner: i64, fields: &RecipeFields) -> AppResult<Recipe>;

    /// Fetches the recipe for update, holding it until the transaction ends.
    async fn lock_recipe(&mut self, owner: i64, id: i64) -> AppResult<Option<Recipe>>;

    /// Persists the scalar fields of `recipe`.
    async fn update_recipe(&mut self, recipe: &Recipe) -> AppResult<()>;

    /// Returns `owner`'s row of `kind` named exactly `name`, creating it if missing.
    ///
    /// Safe under concurrent callers: two transactions asking for the same
    /// name end up with the same row.
    async fn get_or_create_attribute(
        &mut self,
        kind: AttributeKind,
        owner: i64,
        name: &str,
    ) -> AppResult<Attribute>;

    /// Makes `attribute_ids` the complete set of `kind` rows linked to the recipe.
    async fn set_association(
        &mut self,
        recipe_id: i64,
        kind: AttributeKind,
        attribute_ids: &[i64],
    ) -> AppResult<()>;

    async fn load_recipe(&mut self, owner: i64, id: i64) -> AppResult<Option<RecipeRecord>>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Opens the store selected by `DATABASE_URL`.
pub async fn connect(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    if config.uses_memory_store() {
        tracing::warn!("Using in-memory store; data is lost on shutdown");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let db = Database::connect(config).await?;
    db.run_migrations().await?;
    Ok(Arc::new(PgStore::new(db)))
}
