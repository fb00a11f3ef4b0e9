use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, Transaction};
use std::collections::HashMap;

use super::memory::duplicate_name;
use super::{ListOrder, Store, StoreTx};
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{
    Attribute, AttributeKind, LinkedAttribute, NewUser, Recipe, RecipeFields, RecipeRecord, User,
    UserChanges,
};
use crate::utils::time::unix_seconds;

const RECIPE_COLUMNS: &str = "id, user_id, title, time_minutes, price, link, description, image, created_at, updated_at";
const USER_COLUMNS: &str = "id, email, name, password, is_active, created_at";

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn order_keyword(order: ListOrder) -> &'static str {
    match order {
        ListOrder::Ascending => "ASC",
        ListOrder::Descending => "DESC",
    }
}

/// Loads tags and ingredients for `recipes`, keeping their order.
async fn attach_relations(
    conn: &mut PgConnection,
    recipes: Vec<Recipe>,
) -> AppResult<Vec<RecipeRecord>> {
    let ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();
    let mut related: HashMap<(AttributeKind, i64), Vec<Attribute>> = HashMap::new();

    if !ids.is_empty() {
        for kind in AttributeKind::ALL {
            let sql = format!(
                r#"
                SELECT l.recipe_id, a.id, a.user_id, a.name
                FROM {link} l
                JOIN {table} a ON a.id = l.{column}
                WHERE l.recipe_id = ANY($1)
                ORDER BY a.id ASC
                "#,
                link = kind.link_table(),
                table = kind.table(),
                column = kind.link_column(),
            );
            let rows = sqlx::query_as::<_, LinkedAttribute>(&sql)
                .bind(&ids)
                .fetch_all(&mut *conn)
                .await?;
            for row in rows {
                related
                    .entry((kind, row.recipe_id))
                    .or_default()
                    .push(row.into());
            }
        }
    }

    Ok(recipes
        .into_iter()
        .map(|recipe| RecipeRecord {
            tags: related
                .remove(&(AttributeKind::Tag, recipe.id))
                .unwrap_or_default(),
            ingredients: related
                .remove(&(AttributeKind::Ingredient, recipe.id))
                .unwrap_or_default(),
            recipe,
        })
        .collect())
}

async fn fetch_owned_recipe(
    conn: &mut PgConnection,
    owner: i64,
    id: i64,
    for_update: bool,
) -> AppResult<Option<Recipe>> {
    let sql = format!(
        "SELECT {} FROM recipe WHERE id = $1 AND user_id = $2{}",
        RECIPE_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let recipe = sqlx::query_as::<_, Recipe>(&sql)
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(recipe)
}

async fn fetch_owned_record(
    conn: &mut PgConnection,
    owner: i64,
    id: i64,
) -> AppResult<Option<RecipeRecord>> {
    let Some(recipe) = fetch_owned_recipe(conn, owner, id, false).await? else {
        return Ok(None);
    };
    Ok(attach_relations(conn, vec![recipe]).await?.pop())
}

pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        PgStore { db }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(self.db.pool()).await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let sql = format!(
            r#"INSERT INTO "user" (email, name, password, is_active, created_at)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING {}"#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password)
            .bind(unix_seconds())
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::UserAlreadyExists
                } else {
                    AppError::Database(e)
                }
            })
    }

    async fn get_user_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let sql = format!(r#"SELECT {} FROM "user" WHERE id = $1"#, USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let sql = format!(r#"SELECT {} FROM "user" WHERE email = $1"#, USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(user)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> AppResult<Option<User>> {
        let sql = format!(
            r#"UPDATE "user"
            SET name = COALESCE($1, name), password = COALESCE($2, password)
            WHERE id = $3
            RETURNING {}"#,
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(changes.name)
            .bind(changes.password)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(user)
    }

    async fn list_recipes(&self, owner: i64, order: ListOrder) -> AppResult<Vec<RecipeRecord>> {
        let mut conn = self.db.pool().acquire().await?;
        let sql = format!(
            "SELECT {} FROM recipe WHERE user_id = $1 ORDER BY id {}",
            RECIPE_COLUMNS,
            order_keyword(order)
        );
        let recipes = sqlx::query_as::<_, Recipe>(&sql)
            .bind(owner)
            .fetch_all(&mut *conn)
            .await?;
        attach_relations(&mut conn, recipes).await
    }

    async fn get_recipe(&self, owner: i64, id: i64) -> AppResult<Option<RecipeRecord>> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_owned_record(&mut conn, owner, id).await
    }

    async fn delete_recipe(&self, owner: i64, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM recipe WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_recipe_image(&self, owner: i64, id: i64, image: &str) -> AppResult<Option<Recipe>> {
        let sql = format!(
            "UPDATE recipe SET image = $1, updated_at = $2 WHERE id = $3 AND user_id = $4 RETURNING {}",
            RECIPE_COLUMNS
        );
        let recipe = sqlx::query_as::<_, Recipe>(&sql)
            .bind(image)
            .bind(unix_seconds())
            .bind(id)
            .bind(owner)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(recipe)
    }

    async fn list_attributes(
        &self,
        kind: AttributeKind,
        owner: i64,
        order: ListOrder,
    ) -> AppResult<Vec<Attribute>> {
        let sql = format!(
            // Byte order, same as MemoryStore.
            "SELECT id, user_id, name FROM {} WHERE user_id = $1 \
             ORDER BY name COLLATE \"C\" {dir}, id {dir}",
            kind.table(),
            dir = order_keyword(order)
        );
        let rows = sqlx::query_as::<_, Attribute>(&sql)
            .bind(owner)
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows)
    }

    async fn get_attribute(
        &self,
        kind: AttributeKind,
        owner: i64,
        id: i64,
    ) -> AppResult<Option<Attribute>> {
        let sql = format!(
            "SELECT id, user_id, name FROM {} WHERE id = $1 AND user_id = $2",
            kind.table()
        );
        let row = sqlx::query_as::<_, Attribute>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row)
    }

    async fn rename_attribute(
        &self,
        kind: AttributeKind,
        owner: i64,
        id: i64,
        name: &str,
    ) -> AppResult<Option<Attribute>> {
        let sql = format!(
            "UPDATE {} SET name = $1 WHERE id = $2 AND user_id = $3 RETURNING id, user_id, name",
            kind.table()
        );
        sqlx::query_as::<_, Attribute>(&sql)
            .bind(name)
            .bind(id)
            .bind(owner)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    duplicate_name(kind)
                } else {
                    AppError::Database(e)
                }
            })
    }

    async fn delete_attribute(&self, kind: AttributeKind, owner: i64, id: i64) -> AppResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1 AND user_id = $2", kind.table());
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(owner)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.db.pool().begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_recipe(&mut self, owner: i64, fields: &RecipeFields) -> AppResult<Recipe> {
        let now = unix_seconds();
        let sql = format!(
            r#"INSERT INTO recipe (user_id, title, time_minutes, price, link, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {}"#,
            RECIPE_COLUMNS
        );
        let recipe = sqlx::query_as::<_, Recipe>(&sql)
            .bind(owner)
            .bind(&fields.title)
            .bind(fields.time_minutes)
            .bind(fields.price)
            .bind(&fields.link)
            .bind(&fields.description)
            .bind(now)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(recipe)
    }

    async fn lock_recipe(&mut self, owner: i64, id: i64) -> AppResult<Option<Recipe>> {
        fetch_owned_recipe(&mut self.tx, owner, id, true).await
    }

    async fn update_recipe(&mut self, recipe: &Recipe) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE recipe
            SET title = $1, time_minutes = $2, price = $3, link = $4,
                description = $5, updated_at = $6
            WHERE id = $7 AND user_id = $8
            "#,
        )
        .bind(&recipe.title)
        .bind(recipe.time_minutes)
        .bind(recipe.price)
        .bind(&recipe.link)
        .bind(&recipe.description)
        .bind(recipe.updated_at)
        .bind(recipe.id)
        .bind(recipe.user_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Recipe not found".to_string()));
        }
        Ok(())
    }

    async fn get_or_create_attribute(
        &mut self,
        kind: AttributeKind,
        owner: i64,
        name: &str,
    ) -> AppResult<Attribute> {
        let insert = format!(
            r#"
            INSERT INTO {} (user_id, name) VALUES ($1, $2)
            ON CONFLICT (user_id, name) DO NOTHING
            RETURNING id, user_id, name
            "#,
            kind.table()
        );
        let created = sqlx::query_as::<_, Attribute>(&insert)
            .bind(owner)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        if let Some(created) = created {
            return Ok(created);
        }

        // The conflicting row is committed by now; read it back.
        let select = format!(
            "SELECT id, user_id, name FROM {} WHERE user_id = $1 AND name = $2",
            kind.table()
        );
        let existing = sqlx::query_as::<_, Attribute>(&select)
            .bind(owner)
            .bind(name)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(existing)
    }

    async fn set_association(
        &mut self,
        recipe_id: i64,
        kind: AttributeKind,
        attribute_ids: &[i64],
    ) -> AppResult<()> {
        let delete = format!("DELETE FROM {} WHERE recipe_id = $1", kind.link_table());
        sqlx::query(&delete)
            .bind(recipe_id)
            .execute(&mut *self.tx)
            .await?;

        if attribute_ids.is_empty() {
            return Ok(());
        }

        let insert = format!(
            r#"
            INSERT INTO {link} (recipe_id, {column})
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
            link = kind.link_table(),
            column = kind.link_column(),
        );
        sqlx::query(&insert)
            .bind(recipe_id)
            .bind(attribute_ids)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn load_recipe(&mut self, owner: i64, id: i64) -> AppResult<Option<RecipeRecord>> {
        fetch_owned_record(&mut self.tx, owner, id).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
