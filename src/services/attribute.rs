use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{Attribute, AttributeKind, AttributeUpdateForm};
use crate::services::reconciler::check_name;
use crate::services::scope::OwnerScope;
use crate::store::{ListOrder, Store};

/// Standalone tag and ingredient endpoints. Rows are only ever created by
/// recipe writes, so there is no create here.
pub struct AttributeService<'a> {
    store: &'a dyn Store,
    kind: AttributeKind,
}

impl<'a> AttributeService<'a> {
    pub fn new(store: &'a dyn Store, kind: AttributeKind) -> Self {
        AttributeService { store, kind }
    }

    /// The caller's rows, by name descending.
    pub async fn list(&self, scope: OwnerScope) -> AppResult<Vec<Attribute>> {
        self.store
            .list_attributes(self.kind, scope.user_id(), ListOrder::Descending)
            .await
    }

    /// Renames a row. An absent `name` leaves it as is.
    pub async fn update(
        &self,
        scope: OwnerScope,
        id: i64,
        form: AttributeUpdateForm,
    ) -> AppResult<Attribute> {
        form.validate()?;
        let owner = scope.user_id();

        let Some(name) = form.name else {
            return scope.attribute(self.kind, self.store.get_attribute(self.kind, owner, id).await?);
        };
        check_name(&name).map_err(|message| AppError::field("name", message))?;

        let renamed = self
            .store
            .rename_attribute(self.kind, owner, id, &name)
            .await?;
        let renamed = scope.attribute(self.kind, renamed)?;

        tracing::info!(user_id = owner, id, kind = %self.kind, "Attribute renamed");
        Ok(renamed)
    }

    pub async fn delete(&self, scope: OwnerScope, id: i64) -> AppResult<()> {
        let deleted = self
            .store
            .delete_attribute(self.kind, scope.user_id(), id)
            .await?;
        scope.deleted_attribute(self.kind, deleted)?;

        tracing::info!(user_id = scope.user_id(), id, kind = %self.kind, "Attribute deleted");
        Ok(())
    }
}
