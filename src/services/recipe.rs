use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::{
    AttributeKind, NameSpec, Recipe, RecipeChanges, RecipeForm, RecipeRecord, RecipeUpdateForm,
};
use crate::services::image::ImageStore;
use crate::services::reconciler::{NamePlan, Reconciler};
use crate::services::scope::OwnerScope;
use crate::store::{ListOrder, Store};
use crate::utils::time::unix_seconds;

/// Plans every relation present in a payload, collecting name errors.
fn plan_relations(
    relations: [(AttributeKind, Option<&[NameSpec]>); 2],
) -> (Vec<NamePlan>, FieldErrors) {
    let mut plans = Vec::new();
    let mut errors = FieldErrors::new();
    for (kind, specs) in relations {
        let Some(specs) = specs else { continue };
        match NamePlan::new(kind, specs) {
            Ok(plan) => plans.push(plan),
            Err(e) => errors.merge(e),
        }
    }
    (plans, errors)
}

/// Joins scalar and relation validation so one response lists every bad field.
fn combine(
    scalars: AppResult<RecipeChanges>,
    relation_errors: FieldErrors,
) -> AppResult<RecipeChanges> {
    match scalars {
        Ok(changes) => {
            relation_errors.into_result()?;
            Ok(changes)
        }
        Err(AppError::Validation(mut errors)) => {
            errors.merge(relation_errors);
            Err(AppError::Validation(errors))
        }
        Err(e) => Err(e),
    }
}

pub struct RecipeService<'a> {
    store: &'a dyn Store,
    images: &'a dyn ImageStore,
}

impl<'a> RecipeService<'a> {
    pub fn new(store: &'a dyn Store, images: &'a dyn ImageStore) -> Self {
        RecipeService { store, images }
    }

    /// The caller's recipes, newest first.
    pub async fn list(&self, scope: OwnerScope) -> AppResult<Vec<RecipeRecord>> {
        self.store
            .list_recipes(scope.user_id(), ListOrder::Descending)
            .await
    }

    pub async fn get(&self, scope: OwnerScope, id: i64) -> AppResult<RecipeRecord> {
        scope.recipe(self.store.get_recipe(scope.user_id(), id).await?)
    }

    pub async fn create(&self, scope: OwnerScope, form: RecipeForm) -> AppResult<RecipeRecord> {
        let (plans, relation_errors) = plan_relations(form.relations());
        let fields = combine(form.into_changes(), relation_errors)?.into_fields()?;
        let owner = scope.user_id();

        let mut tx = self.store.begin().await?;
        let recipe = tx.insert_recipe(owner, &fields).await?;
        let reconciler = Reconciler::new(scope);
        for plan in &plans {
            reconciler.apply(tx.as_mut(), recipe.id, plan).await?;
        }
        let record = scope.recipe(tx.load_recipe(owner, recipe.id).await?)?;
        tx.commit().await?;

        tracing::info!(user_id = owner, recipe_id = recipe.id, "Recipe created");
        Ok(record)
    }

    /// PUT: title, time and price are required; absent relations stay as they are.
    pub async fn replace(
        &self,
        scope: OwnerScope,
        id: i64,
        form: RecipeForm,
    ) -> AppResult<RecipeRecord> {
        self.update(scope, id, || {
            let (plans, relation_errors) = plan_relations(form.relations());
            Ok((combine(form.into_changes(), relation_errors)?, plans))
        })
        .await
    }

    /// PATCH: only the supplied fields change.
    pub async fn patch(
        &self,
        scope: OwnerScope,
        id: i64,
        form: RecipeUpdateForm,
    ) -> AppResult<RecipeRecord> {
        self.update(scope, id, || {
            let (plans, relation_errors) = plan_relations(form.relations());
            Ok((combine(form.into_changes(), relation_errors)?, plans))
        })
        .await
    }

    /// Locks the owned recipe, then validates the body. A recipe the caller
    /// cannot see is 404 whatever the body holds.
    async fn update<F>(&self, scope: OwnerScope, id: i64, validate: F) -> AppResult<RecipeRecord>
    where
        F: FnOnce() -> AppResult<(RecipeChanges, Vec<NamePlan>)>,
    {
        let owner = scope.user_id();
        let mut tx = self.store.begin().await?;

        let mut recipe = scope.recipe(tx.lock_recipe(owner, id).await?)?;
        let (changes, plans) = validate()?;
        recipe.apply(&changes);
        recipe.updated_at = unix_seconds();
        tx.update_recipe(&recipe).await?;

        let reconciler = Reconciler::new(scope);
        for plan in &plans {
            reconciler.apply(tx.as_mut(), id, plan).await?;
        }

        let record = scope.recipe(tx.load_recipe(owner, id).await?)?;
        tx.commit().await?;

        tracing::info!(user_id = owner, recipe_id = id, "Recipe updated");
        Ok(record)
    }

    pub async fn delete(&self, scope: OwnerScope, id: i64) -> AppResult<()> {
        let deleted = self.store.delete_recipe(scope.user_id(), id).await?;
        scope.deleted_recipe(deleted)?;
        tracing::info!(user_id = scope.user_id(), recipe_id = id, "Recipe deleted");
        Ok(())
    }

    /// 404 unless `id` is one of the caller's recipes.
    pub async fn ensure_owned(&self, scope: OwnerScope, id: i64) -> AppResult<()> {
        scope.recipe(self.store.get_recipe(scope.user_id(), id).await?)?;
        Ok(())
    }

    /// Stores `bytes` as the recipe's image. A rejected upload leaves the
    /// current reference in place.
    pub async fn upload_image(
        &self,
        scope: OwnerScope,
        id: i64,
        bytes: Vec<u8>,
    ) -> AppResult<Recipe> {
        let owner = scope.user_id();
        self.ensure_owned(scope, id).await?;

        let reference = self.images.store(bytes).await?;
        let recipe = scope.recipe(self.store.set_recipe_image(owner, id, &reference).await?)?;

        tracing::info!(user_id = owner, recipe_id = id, image = %reference, "Recipe image uploaded");
        Ok(recipe)
    }
}
