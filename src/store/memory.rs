use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ListOrder, Store, StoreTx};
use crate::error::{AppError, AppResult};
use crate::models::{
    Attribute, AttributeKind, NewUser, Recipe, RecipeFields, RecipeRecord, User, UserChanges,
};
use crate::utils::time::unix_seconds;

#[derive(Debug, Clone, Default)]
struct AttributeTable {
    last_id: i64,
    rows: BTreeMap<i64, Attribute>,
    /// `(recipe_id, attribute_id)` pairs.
    links: BTreeSet<(i64, i64)>,
}

impl AttributeTable {
    fn linked_to(&self, recipe_id: i64) -> Vec<Attribute> {
        self.links
            .range((recipe_id, i64::MIN)..=(recipe_id, i64::MAX))
            .filter_map(|(_, attribute_id)| self.rows.get(attribute_id).cloned())
            .collect()
    }

    fn unlink_recipe(&mut self, recipe_id: i64) {
        self.links.retain(|(linked_recipe, _)| *linked_recipe != recipe_id);
    }

    fn find(&self, owner: i64, name: &str) -> Option<&Attribute> {
        self.rows
            .values()
            .find(|row| row.user_id == owner && row.name == name)
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_user_id: i64,
    users: BTreeMap<i64, User>,
    last_recipe_id: i64,
    recipes: BTreeMap<i64, Recipe>,
    tags: AttributeTable,
    ingredients: AttributeTable,
}

impl MemoryState {
    fn table(&self, kind: AttributeKind) -> &AttributeTable {
        match kind {
            AttributeKind::Tag => &self.tags,
            AttributeKind::Ingredient => &self.ingredients,
        }
    }

    fn table_mut(&mut self, kind: AttributeKind) -> &mut AttributeTable {
        match kind {
            AttributeKind::Tag => &mut self.tags,
            AttributeKind::Ingredient => &mut self.ingredients,
        }
    }

    fn owned_recipe(&self, owner: i64, id: i64) -> Option<&Recipe> {
        self.recipes.get(&id).filter(|recipe| recipe.user_id == owner)
    }

    fn record(&self, recipe: &Recipe) -> RecipeRecord {
        RecipeRecord {
            recipe: recipe.clone(),
            tags: self.tags.linked_to(recipe.id),
            ingredients: self.ingredients.linked_to(recipe.id),
        }
    }

    fn owned_record(&self, owner: i64, id: i64) -> Option<RecipeRecord> {
        self.owned_recipe(owner, id).map(|recipe| self.record(recipe))
    }
}

/// Process-local store for development and tests.
///
/// A single lock guards the whole state; a transaction holds it from
/// `begin` until commit or drop, which serialises writers.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AppError::UserAlreadyExists);
        }

        state.last_user_id += 1;
        let created = User {
            id: state.last_user_id,
            email: user.email,
            name: user.name,
            password: user.password,
            is_active: true,
            created_at: unix_seconds(),
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user_by_id(&self, id: i64) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> AppResult<Option<User>> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(password) = changes.password {
            user.password = password;
        }
        Ok(Some(user.clone()))
    }

    async fn list_recipes(&self, owner: i64, order: ListOrder) -> AppResult<Vec<RecipeRecord>> {
        let state = self.state.lock().await;
        let owned = state.recipes.values().filter(|recipe| recipe.user_id == owner);
        let records = match order {
            ListOrder::Ascending => owned.map(|recipe| state.record(recipe)).collect(),
            ListOrder::Descending => owned.rev().map(|recipe| state.record(recipe)).collect(),
        };
        Ok(records)
    }

    async fn get_recipe(&self, owner: i64, id: i64) -> AppResult<Option<RecipeRecord>> {
        Ok(self.state.lock().await.owned_record(owner, id))
    }

    async fn delete_recipe(&self, owner: i64, id: i64) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if state.owned_recipe(owner, id).is_none() {
            return Ok(false);
        }
        state.recipes.remove(&id);
        for kind in AttributeKind::ALL {
            state.table_mut(kind).unlink_recipe(id);
        }
        Ok(true)
    }

    async fn set_recipe_image(&self, owner: i64, id: i64, image: &str) -> AppResult<Option<Recipe>> {
        let mut state = self.state.lock().await;
        let Some(recipe) = state.recipes.get_mut(&id).filter(|r| r.user_id == owner) else {
            return Ok(None);
        };
        recipe.image = Some(image.to_string());
        recipe.updated_at = unix_seconds();
        Ok(Some(recipe.clone()))
    }

    async fn list_attributes(
        &self,
        kind: AttributeKind,
        owner: i64,
        order: ListOrder,
    ) -> AppResult<Vec<Attribute>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Attribute> = state
            .table(kind)
            .rows
            .values()
            .filter(|row| row.user_id == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        if order == ListOrder::Descending {
            rows.reverse();
        }
        Ok(rows)
    }

    async fn get_attribute(
        &self,
        kind: AttributeKind,
        owner: i64,
        id: i64,
    ) -> AppResult<Option<Attribute>> {
        let state = self.state.lock().await;
        Ok(state
            .table(kind)
            .rows
            .get(&id)
            .filter(|row| row.user_id == owner)
            .cloned())
    }

    async fn rename_attribute(
        &self,
        kind: AttributeKind,
        owner: i64,
        id: i64,
        name: &str,
    ) -> AppResult<Option<Attribute>> {
        let mut state = self.state.lock().await;
        let table = state.table_mut(kind);
        if !table.rows.get(&id).is_some_and(|row| row.user_id == owner) {
            return Ok(None);
        }
        if table.find(owner, name).is_some_and(|row| row.id != id) {
            return Err(duplicate_name(kind));
        }

        let Some(row) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        row.name = name.to_string();
        Ok(Some(row.clone()))
    }

    async fn delete_attribute(&self, kind: AttributeKind, owner: i64, id: i64) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let table = state.table_mut(kind);
        if !table.rows.get(&id).is_some_and(|row| row.user_id == owner) {
            return Ok(false);
        }
        table.rows.remove(&id);
        table.links.retain(|(_, attribute_id)| *attribute_id != id);
        Ok(true)
    }

    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

pub(super) fn duplicate_name(kind: AttributeKind) -> AppError {
    AppError::field(
        "name",
        format!("{} with this name already exists.", kind.label()),
    )
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_recipe(&mut self, owner: i64, fields: &RecipeFields) -> AppResult<Recipe> {
        let state = &mut self.working;
        if !state.users.contains_key(&owner) {
            return Err(AppError::Internal(format!("Unknown recipe owner {}", owner)));
        }

        state.last_recipe_id += 1;
        let now = unix_seconds();
        let recipe = Recipe {
            id: state.last_recipe_id,
            user_id: owner,
            title: fields.title.clone(),
            time_minutes: fields.time_minutes,
            price: fields.price,
            link: fields.link.clone(),
            description: fields.description.clone(),
            image: None,
            created_at: now,
            updated_at: now,
        };
        state.recipes.insert(recipe.id, recipe.clone());
        Ok(recipe)
    }

    async fn lock_recipe(&mut self, owner: i64, id: i64) -> AppResult<Option<Recipe>> {
        Ok(self.working.owned_recipe(owner, id).cloned())
    }

    async fn update_recipe(&mut self, recipe: &Recipe) -> AppResult<()> {
        match self.working.recipes.get_mut(&recipe.id) {
            Some(stored) if stored.user_id == recipe.user_id => {
                *stored = recipe.clone();
                Ok(())
            }
            _ => Err(AppError::NotFound("Recipe not found".to_string())),
        }
    }

    async fn get_or_create_attribute(
        &mut self,
        kind: AttributeKind,
        owner: i64,
        name: &str,
    ) -> AppResult<Attribute> {
        let table = self.working.table_mut(kind);
        if let Some(existing) = table.find(owner, name) {
            return Ok(existing.clone());
        }

        table.last_id += 1;
        let created = Attribute {
            id: table.last_id,
            user_id: owner,
            name: name.to_string(),
        };
        table.rows.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_association(
        &mut self,
        recipe_id: i64,
        kind: AttributeKind,
        attribute_ids: &[i64],
    ) -> AppResult<()> {
        if !self.working.recipes.contains_key(&recipe_id) {
            return Err(AppError::Internal(format!("Unknown recipe {}", recipe_id)));
        }
        let table = self.working.table_mut(kind);
        table.unlink_recipe(recipe_id);
        for attribute_id in attribute_ids {
            table.links.insert((recipe_id, *attribute_id));
        }
        Ok(())
    }

    async fn load_recipe(&mut self, owner: i64, id: i64) -> AppResult<Option<RecipeRecord>> {
        Ok(self.working.owned_record(owner, id))
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    async fn user(store: &MemoryStore, email: &str) -> User {
        store
            .create_user(NewUser {
                email: email.to_string(),
                name: "Test".to_string(),
                password: "hash".to_string(),
            })
            .await
            .unwrap()
    }

    fn fields(title: &str) -> RecipeFields {
        RecipeFields {
            title: title.to_string(),
            time_minutes: 10,
            price: Decimal::new(525, 2),
            link: String::new(),
            description: String::new(),
        }
    }

    async fn recipe(store: &MemoryStore, owner: i64, title: &str) -> Recipe {
        let mut tx = store.begin().await.unwrap();
        let recipe = tx.insert_recipe(owner, &fields(title)).await.unwrap();
        tx.commit().await.unwrap();
        recipe
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        user(&store, "user@example.com").await;

        let result = store
            .create_user(NewUser {
                email: "user@example.com".to_string(),
                name: "Other".to_string(),
                password: "hash".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AppError::UserAlreadyExists)));
    }

    #[tokio::test]
    async fn test_recipes_are_scoped_to_owner() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice@example.com").await;
        let bob = user(&store, "bob@example.com").await;
        let first = recipe(&store, alice.id, "Alice 1").await;
        recipe(&store, bob.id, "Bob 1").await;
        let second = recipe(&store, alice.id, "Alice 2").await;

        let listed = store.list_recipes(alice.id, ListOrder::Descending).await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|r| r.recipe.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        assert!(store.get_recipe(bob.id, first.id).await.unwrap().is_none());
        assert!(!store.delete_recipe(bob.id, first.id).await.unwrap());
        assert!(store.get_recipe(alice.id, first.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice@example.com").await;

        {
            let mut tx = store.begin().await.unwrap();
            let recipe = tx.insert_recipe(alice.id, &fields("Draft")).await.unwrap();
            let tag = tx
                .get_or_create_attribute(AttributeKind::Tag, alice.id, "Vegan")
                .await
                .unwrap();
            tx.set_association(recipe.id, AttributeKind::Tag, &[tag.id])
                .await
                .unwrap();
        }

        assert!(store
            .list_recipes(alice.id, ListOrder::Ascending)
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .list_attributes(AttributeKind::Tag, alice.id, ListOrder::Ascending)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_rows_per_owner() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice@example.com").await;
        let bob = user(&store, "bob@example.com").await;

        let mut tx = store.begin().await.unwrap();
        let salt = tx
            .get_or_create_attribute(AttributeKind::Ingredient, alice.id, "Salt")
            .await
            .unwrap();
        let again = tx
            .get_or_create_attribute(AttributeKind::Ingredient, alice.id, "Salt")
            .await
            .unwrap();
        let lower = tx
            .get_or_create_attribute(AttributeKind::Ingredient, alice.id, "salt")
            .await
            .unwrap();
        let bobs = tx
            .get_or_create_attribute(AttributeKind::Ingredient, bob.id, "Salt")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(salt.id, again.id);
        assert_ne!(salt.id, lower.id);
        assert_ne!(salt.id, bobs.id);
        assert_eq!(bobs.user_id, bob.id);
    }

    #[tokio::test]
    async fn test_attributes_sorted_by_name() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice@example.com").await;

        let mut tx = store.begin().await.unwrap();
        for name in ["Breakfast", "Vegan", "Dessert", "apple"] {
            tx.get_or_create_attribute(AttributeKind::Tag, alice.id, name)
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        let names: Vec<String> = store
            .list_attributes(AttributeKind::Tag, alice.id, ListOrder::Descending)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["apple", "Vegan", "Dessert", "Breakfast"]);
    }

    #[tokio::test]
    async fn test_deleting_recipe_keeps_attribute_rows() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice@example.com").await;

        let mut tx = store.begin().await.unwrap();
        let recipe = tx.insert_recipe(alice.id, &fields("Soup")).await.unwrap();
        let tag = tx
            .get_or_create_attribute(AttributeKind::Tag, alice.id, "Lunch")
            .await
            .unwrap();
        tx.set_association(recipe.id, AttributeKind::Tag, &[tag.id])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(store.delete_recipe(alice.id, recipe.id).await.unwrap());
        let tags = store
            .list_attributes(AttributeKind::Tag, alice.id, ListOrder::Ascending)
            .await
            .unwrap();
        assert_eq!(tags, vec![tag]);
    }

    #[tokio::test]
    async fn test_deleting_attribute_unlinks_it() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice@example.com").await;

        let mut tx = store.begin().await.unwrap();
        let recipe = tx.insert_recipe(alice.id, &fields("Soup")).await.unwrap();
        let tag = tx
            .get_or_create_attribute(AttributeKind::Tag, alice.id, "Lunch")
            .await
            .unwrap();
        tx.set_association(recipe.id, AttributeKind::Tag, &[tag.id])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(store
            .delete_attribute(AttributeKind::Tag, alice.id, tag.id)
            .await
            .unwrap());
        let record = store.get_recipe(alice.id, recipe.id).await.unwrap().unwrap();
        assert!(record.tags.is_empty());
    }

    #[tokio::test]
    async fn test_rename_to_existing_name_is_rejected() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice@example.com").await;

        let mut tx = store.begin().await.unwrap();
        let lunch = tx
            .get_or_create_attribute(AttributeKind::Tag, alice.id, "Lunch")
            .await
            .unwrap();
        tx.get_or_create_attribute(AttributeKind::Tag, alice.id, "Dinner")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let result = store
            .rename_attribute(AttributeKind::Tag, alice.id, lunch.id, "Dinner")
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let renamed = store
            .rename_attribute(AttributeKind::Tag, alice.id, lunch.id, "Brunch")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name, "Brunch");
    }
}
