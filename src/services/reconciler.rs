//! Nested tag/ingredient writes.
//!
//! A recipe payload names its tags and ingredients instead of referencing ids.
//! Each name is resolved to the owner's existing row or a freshly created
//! one, and the resolved set then replaces the recipe's link set wholesale.

use crate::error::{AppResult, FieldErrors};
use crate::models::{Attribute, AttributeKind, NameSpec, NAME_MAX_LENGTH};
use crate::services::scope::OwnerScope;
use crate::store::StoreTx;

/// Checks a tag/ingredient name. Names are matched exactly, so nothing is trimmed.
pub fn check_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("This field may not be blank.".to_string());
    }
    if name.chars().count() > NAME_MAX_LENGTH {
        return Err(format!(
            "Ensure this field has no more than {} characters.",
            NAME_MAX_LENGTH
        ));
    }
    Ok(())
}

/// Validated, de-duplicated names for one relation, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePlan {
    kind: AttributeKind,
    names: Vec<String>,
}

impl NamePlan {
    /// Validates every spec; failures are reported under the relation's field.
    pub fn new(kind: AttributeKind, specs: &[NameSpec]) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut names: Vec<String> = Vec::with_capacity(specs.len());

        for spec in specs {
            if let Err(message) = check_name(&spec.name) {
                errors.add(kind.field(), message);
                continue;
            }
            if !names.contains(&spec.name) {
                names.push(spec.name.clone());
            }
        }

        if errors.is_empty() {
            Ok(NamePlan { kind, names })
        } else {
            Err(errors)
        }
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

pub struct Reconciler {
    scope: OwnerScope,
}

impl Reconciler {
    pub fn new(scope: OwnerScope) -> Self {
        Reconciler { scope }
    }

    /// Resolves every planned name within `tx` and makes the result the
    /// recipe's complete link set for that relation.
    ///
    /// Nothing is visible to other requests until `tx` commits.
    pub async fn apply(
        &self,
        tx: &mut dyn StoreTx,
        recipe_id: i64,
        plan: &NamePlan,
    ) -> AppResult<Vec<Attribute>> {
        let owner = self.scope.user_id();
        let mut resolved = Vec::with_capacity(plan.names.len());

        for name in &plan.names {
            let attribute = tx.get_or_create_attribute(plan.kind, owner, name).await?;
            if !resolved.iter().any(|a: &Attribute| a.id == attribute.id) {
                resolved.push(attribute);
            }
        }

        let ids: Vec<i64> = resolved.iter().map(|a| a.id).collect();
        tx.set_association(recipe_id, plan.kind, &ids).await?;

        tracing::debug!(
            user_id = owner,
            recipe_id,
            relation = plan.kind.field(),
            count = ids.len(),
            "Reconciled recipe relation"
        );

        Ok(resolved)
    }
}
