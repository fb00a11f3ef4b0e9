use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use validator::Validate;

use super::attribute::{Attribute, AttributeKind, AttributeResponse, NameSpec};
use crate::error::{AppResult, FieldErrors};

/// Fractional digits kept for `price`.
pub const PRICE_SCALE: u32 = 2;
/// Total significant digits allowed for `price`.
pub const PRICE_MAX_DIGITS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub description: String,
    pub image: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Recipe {
    /// Overwrites the scalar fields present in `changes`. Owner and image are untouched.
    pub fn apply(&mut self, changes: &RecipeChanges) {
        if let Some(title) = &changes.title {
            self.title = title.clone();
        }
        if let Some(time_minutes) = changes.time_minutes {
            self.time_minutes = time_minutes;
        }
        if let Some(price) = changes.price {
            self.price = price;
        }
        if let Some(link) = &changes.link {
            self.link = link.clone();
        }
        if let Some(description) = &changes.description {
            self.description = description.clone();
        }
    }
}

/// Scalar fields of a recipe about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeFields {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub description: String,
}

/// Validated scalar fields of a recipe write; `None` leaves a field as stored.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub description: Option<String>,
}

impl RecipeChanges {
    /// Fields for a new recipe. Title, time and price must be present.
    pub fn into_fields(self) -> AppResult<RecipeFields> {
        let mut errors = FieldErrors::new();
        if self.title.is_none() {
            errors.add("title", "This field is required.");
        }
        if self.time_minutes.is_none() {
            errors.add("time_minutes", "This field is required.");
        }
        if self.price.is_none() {
            errors.add("price", "This field is required.");
        }
        errors.into_result()?;

        Ok(RecipeFields {
            title: self.title.unwrap_or_default(),
            time_minutes: self.time_minutes.unwrap_or_default(),
            price: self.price.unwrap_or_default(),
            link: self.link.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
        })
    }
}

/// A recipe with both of its relations loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeRecord {
    pub recipe: Recipe,
    pub tags: Vec<Attribute>,
    pub ingredients: Vec<Attribute>,
}

impl RecipeRecord {
    pub fn relation(&self, kind: AttributeKind) -> &[Attribute] {
        match kind {
            AttributeKind::Tag => &self.tags,
            AttributeKind::Ingredient => &self.ingredients,
        }
    }
}

/// Price as sent by clients: a JSON string (`"5.25"`) or number (`5.25`).
///
/// Kept raw so a malformed value is reported against `price` instead of
/// failing the whole body.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PriceInput {
    Text(String),
    Number(serde_json::Number),
}

impl PriceInput {
    pub fn parse(&self) -> Result<Decimal, String> {
        let raw = match self {
            PriceInput::Text(text) => text.trim().to_string(),
            PriceInput::Number(number) => number.to_string(),
        };
        let value = Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .map_err(|_| "A valid number is required.".to_string())?;
        validate_price(value)
    }
}

/// Checks `price` fits `NUMERIC(5, 2)` and is not negative; returns it at scale 2.
pub fn validate_price(value: Decimal) -> Result<Decimal, String> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err("Ensure this value is greater than or equal to 0.".to_string());
    }
    let normalized = value.normalize();
    if normalized.scale() > PRICE_SCALE {
        return Err(format!(
            "Ensure that there are no more than {} decimal places.",
            PRICE_SCALE
        ));
    }
    let integer_digits = normalized.trunc().abs().to_string().trim_start_matches('0').len() as u32;
    if integer_digits > PRICE_MAX_DIGITS - PRICE_SCALE {
        return Err(format!(
            "Ensure that there are no more than {} digits in total.",
            PRICE_MAX_DIGITS
        ));
    }
    let mut price = normalized;
    price.rescale(PRICE_SCALE);
    Ok(price)
}

/// Keeps an explicit `null` distinct from an absent key: absent is `None`,
/// `null` is `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Relation lists as sent in a recipe body.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeRelations {
    #[serde(default, deserialize_with = "present")]
    pub tags: Option<Option<Vec<NameSpec>>>,

    #[serde(default, deserialize_with = "present")]
    pub ingredients: Option<Option<Vec<NameSpec>>>,
}

impl RecipeRelations {
    /// Name specs per relation; `None` means the key was absent or `null`.
    pub fn specs(&self) -> [(AttributeKind, Option<&[NameSpec]>); 2] {
        [
            (AttributeKind::Tag, self.tags.as_ref().and_then(|v| v.as_deref())),
            (
                AttributeKind::Ingredient,
                self.ingredients.as_ref().and_then(|v| v.as_deref()),
            ),
        ]
    }

    fn check_nulls(&self, errors: &mut FieldErrors) {
        for (kind, value) in [
            (AttributeKind::Tag, &self.tags),
            (AttributeKind::Ingredient, &self.ingredients),
        ] {
            if matches!(value, Some(None)) {
                errors.add(kind.field(), "This field may not be null.");
            }
        }
    }
}

/// Body of `POST /recipes` and `PUT /recipes/{id}`.
///
/// The required scalars are optional here so a missing one is reported
/// against its own field instead of failing the whole body.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RecipeForm {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters."))]
    pub title: Option<String>,

    #[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
    pub time_minutes: Option<i32>,

    pub price: Option<PriceInput>,

    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub link: Option<String>,

    pub description: Option<String>,

    #[serde(flatten)]
    pub relations: RecipeRelations,
}

impl RecipeForm {
    pub fn relations(&self) -> [(AttributeKind, Option<&[NameSpec]>); 2] {
        self.relations.specs()
    }

    /// Validates every scalar field, collecting all failures. Title, time
    /// and price must be present.
    pub fn into_changes(self) -> AppResult<RecipeChanges> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => e.into(),
        };
        self.relations.check_nulls(&mut errors);
        if self.title.is_none() {
            errors.add("title", "This field is required.");
        }
        if self.time_minutes.is_none() {
            errors.add("time_minutes", "This field is required.");
        }
        let price = match self.price.as_ref().map(PriceInput::parse) {
            Some(Ok(price)) => Some(price),
            Some(Err(message)) => {
                errors.add("price", message);
                None
            }
            None => {
                errors.add("price", "This field is required.");
                None
            }
        };
        errors.into_result()?;

        Ok(RecipeChanges {
            title: self.title,
            time_minutes: self.time_minutes,
            price,
            link: self.link,
            description: self.description,
        })
    }
}

/// Body of `PATCH /recipes/{id}`: every field optional.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RecipeUpdateForm {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters."))]
    pub title: Option<String>,

    #[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
    pub time_minutes: Option<i32>,

    pub price: Option<PriceInput>,

    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub link: Option<String>,

    pub description: Option<String>,

    #[serde(flatten)]
    pub relations: RecipeRelations,
}

impl RecipeUpdateForm {
    pub fn relations(&self) -> [(AttributeKind, Option<&[NameSpec]>); 2] {
        self.relations.specs()
    }

    pub fn into_changes(self) -> AppResult<RecipeChanges> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => e.into(),
        };
        self.relations.check_nulls(&mut errors);
        let price = match self.price.as_ref().map(PriceInput::parse).transpose() {
            Ok(price) => price,
            Err(message) => {
                errors.add("price", message);
                None
            }
        };
        errors.into_result()?;

        Ok(RecipeChanges {
            title: self.title,
            time_minutes: self.time_minutes,
            price,
            link: self.link,
            description: self.description,
        })
    }
}

/// The recipe operations that produce a representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeAction {
    List,
    Retrieve,
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeShape {
    Summary,
    Detail,
}

impl RecipeAction {
    pub fn shape(self) -> RecipeShape {
        match self {
            RecipeAction::List => RecipeShape::Summary,
            RecipeAction::Retrieve | RecipeAction::Create | RecipeAction::Update => {
                RecipeShape::Detail
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<AttributeResponse>,
    pub ingredients: Vec<AttributeResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub summary: RecipeSummary,
    pub description: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecipeView {
    Summary(RecipeSummary),
    Detail(RecipeDetail),
}

impl RecipeView {
    /// Renders `record` in the shape `action` calls for.
    pub fn render(action: RecipeAction, record: RecipeRecord) -> Self {
        let RecipeRecord {
            recipe,
            tags,
            ingredients,
        } = record;
        let summary = RecipeSummary {
            id: recipe.id,
            title: recipe.title,
            time_minutes: recipe.time_minutes,
            price: recipe.price,
            link: recipe.link,
            tags: tags.into_iter().map(AttributeResponse::from).collect(),
            ingredients: ingredients.into_iter().map(AttributeResponse::from).collect(),
        };

        match action.shape() {
            RecipeShape::Summary => RecipeView::Summary(summary),
            RecipeShape::Detail => RecipeView::Detail(RecipeDetail {
                summary,
                description: recipe.description,
                image: recipe.image,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeImageResponse {
    pub id: i64,
    pub image: Option<String>,
}

impl From<Recipe> for RecipeImageResponse {
    fn from(recipe: Recipe) -> Self {
        RecipeImageResponse {
            id: recipe.id,
            image: recipe.image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn sample_record() -> RecipeRecord {
        RecipeRecord {
            recipe: Recipe {
                id: 7,
                user_id: 1,
                title: "Sample recipe title".into(),
                time_minutes: 22,
                price: dec("5.25"),
                link: "http://example.com/recipe.pdf".into(),
                description: "Sample description".into(),
                image: None,
                created_at: 0,
                updated_at: 0,
            },
            tags: vec![Attribute {
                id: 3,
                user_id: 1,
                name: "Dinner".into(),
            }],
            ingredients: vec![],
        }
    }

    #[test]
    fn test_price_accepts_string_and_number() {
        let text: PriceInput = serde_json::from_value(serde_json::json!("5.25")).unwrap();
        let number: PriceInput = serde_json::from_value(serde_json::json!(5.25)).unwrap();
        assert_eq!(text.parse().unwrap(), dec("5.25"));
        assert_eq!(number.parse().unwrap(), dec("5.25"));
    }

    #[test]
    fn test_price_is_rescaled_to_two_places() {
        assert_eq!(validate_price(dec("5")).unwrap().to_string(), "5.00");
        assert_eq!(validate_price(dec("5.250")).unwrap().to_string(), "5.25");
    }

    #[test]
    fn test_price_bounds() {
        assert!(validate_price(dec("999.99")).is_ok());
        assert!(validate_price(dec("1000")).is_err());
        assert!(validate_price(dec("5.255")).is_err());
        assert!(validate_price(dec("-1")).is_err());
        assert!(validate_price(dec("0")).is_ok());
    }

    #[test]
    fn test_price_garbage_is_reported_on_price() {
        let form: RecipeForm = serde_json::from_value(serde_json::json!({
            "title": "Chocolate cheesecake",
            "time_minutes": 30,
            "price": "five",
        }))
        .unwrap();

        match form.into_changes() {
            Err(crate::error::AppError::Validation(errors)) => {
                assert!(errors.get("price").is_some());
                assert!(errors.get("title").is_none());
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_form_collects_every_invalid_field() {
        let form: RecipeForm = serde_json::from_value(serde_json::json!({
            "title": "",
            "time_minutes": -5,
            "price": "1.001",
        }))
        .unwrap();

        match form.into_changes() {
            Err(crate::error::AppError::Validation(errors)) => {
                assert!(errors.get("title").is_some());
                assert!(errors.get("time_minutes").is_some());
                assert!(errors.get("price").is_some());
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_fields_are_reported_per_field() {
        let form: RecipeForm =
            serde_json::from_value(serde_json::json!({"title": "No price", "time_minutes": 5}))
                .unwrap();

        match form.into_changes() {
            Err(crate::error::AppError::Validation(errors)) => {
                assert_eq!(errors.get("price").unwrap(), &["This field is required.".to_string()]);
                assert!(errors.get("title").is_none());
                assert!(errors.get("time_minutes").is_none());
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_null_relation_is_rejected() {
        let form: RecipeUpdateForm =
            serde_json::from_value(serde_json::json!({"tags": null, "ingredients": []})).unwrap();

        assert_eq!(form.relations()[0], (AttributeKind::Tag, None));
        match form.into_changes() {
            Err(crate::error::AppError::Validation(errors)) => {
                assert_eq!(errors.get("tags").unwrap(), &["This field may not be null.".to_string()]);
                assert!(errors.get("ingredients").is_none());
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_patch_distinguishes_absent_and_empty_relations() {
        let absent: RecipeUpdateForm =
            serde_json::from_value(serde_json::json!({"title": "New title"})).unwrap();
        let cleared: RecipeUpdateForm =
            serde_json::from_value(serde_json::json!({"tags": []})).unwrap();

        assert_eq!(absent.relations()[0], (AttributeKind::Tag, None));
        assert_eq!(cleared.relations()[0], (AttributeKind::Tag, Some(&[][..])));
        assert!(cleared.relations()[1].1.is_none());
        assert!(cleared.into_changes().unwrap().title.is_none());
    }

    #[test]
    fn test_owner_field_is_ignored() {
        let form: RecipeUpdateForm =
            serde_json::from_value(serde_json::json!({"user": 99, "title": "x"})).unwrap();
        let changes = form.into_changes().unwrap();

        let mut recipe = sample_record().recipe;
        recipe.apply(&changes);
        assert_eq!(recipe.user_id, 1);
        assert_eq!(recipe.title, "x");
    }

    #[test]
    fn test_new_recipe_defaults_optional_text() {
        let form: RecipeForm = serde_json::from_value(serde_json::json!({
            "title": "Chocolate cheesecake",
            "time_minutes": 30,
            "price": "5.25",
        }))
        .unwrap();

        let fields = form.into_changes().unwrap().into_fields().unwrap();
        assert_eq!(fields.link, "");
        assert_eq!(fields.description, "");
        assert_eq!(fields.price, dec("5.25"));
    }

    #[test]
    fn test_partial_changes_cannot_create() {
        let changes = RecipeUpdateForm::default().into_changes().unwrap();
        match changes.into_fields() {
            Err(crate::error::AppError::Validation(errors)) => {
                assert!(errors.get("title").is_some());
                assert!(errors.get("price").is_some());
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_shape_per_action() {
        assert_eq!(RecipeAction::List.shape(), RecipeShape::Summary);
        assert_eq!(RecipeAction::Retrieve.shape(), RecipeShape::Detail);
        assert_eq!(RecipeAction::Create.shape(), RecipeShape::Detail);
        assert_eq!(RecipeAction::Update.shape(), RecipeShape::Detail);
    }

    #[test]
    fn test_summary_omits_description_and_image() {
        let json = serde_json::to_value(RecipeView::render(RecipeAction::List, sample_record()))
            .unwrap();
        assert_eq!(json["price"], "5.25");
        assert_eq!(json["tags"][0]["name"], "Dinner");
        assert!(json.get("description").is_none());
        assert!(json.get("image").is_none());
    }

    #[test]
    fn test_detail_includes_description_and_image() {
        let json =
            serde_json::to_value(RecipeView::render(RecipeAction::Retrieve, sample_record()))
                .unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["description"], "Sample description");
        assert!(json["image"].is_null());
        assert_eq!(json["ingredients"], serde_json::json!([]));
    }
}
