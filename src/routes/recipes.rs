use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::StreamExt;

use crate::{
    error::{AppError, AppResult},
    middleware::{AuthMiddleware, AuthUser},
    models::{RecipeAction, RecipeForm, RecipeImageResponse, RecipeUpdateForm, RecipeView},
    services::RecipeService,
    AppState,
};

pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .wrap(AuthMiddleware)
            .route(web::get().to(list_recipes))
            .route(web::post().to(create_recipe)),
    )
    .service(
        web::resource("/{id}")
            .wrap(AuthMiddleware)
            .route(web::get().to(get_recipe))
            .route(web::put().to(replace_recipe))
            .route(web::patch().to(patch_recipe))
            .route(web::delete().to(delete_recipe)),
    )
    .service(
        web::resource("/{id}/upload-image")
            .wrap(AuthMiddleware)
            .route(web::post().to(upload_recipe_image)),
    );
}

fn service(state: &AppState) -> RecipeService<'_> {
    RecipeService::new(state.store.as_ref(), state.images.as_ref())
}

/// GET / - Caller's recipes, newest first, in summary shape
async fn list_recipes(state: web::Data<AppState>, auth_user: AuthUser) -> AppResult<HttpResponse> {
    let recipes: Vec<RecipeView> = service(&state)
        .list(auth_user.scope())
        .await?
        .into_iter()
        .map(|record| RecipeView::render(RecipeAction::List, record))
        .collect();

    Ok(HttpResponse::Ok().json(recipes))
}

/// POST / - Create a recipe, with nested tags/ingredients
async fn create_recipe(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    form: web::Json<RecipeForm>,
) -> AppResult<HttpResponse> {
    let record = service(&state)
        .create(auth_user.scope(), form.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(RecipeView::render(RecipeAction::Create, record)))
}

/// GET /{id}
async fn get_recipe(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let record = service(&state).get(auth_user.scope(), id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(RecipeView::render(RecipeAction::Retrieve, record)))
}

/// PUT /{id}
async fn replace_recipe(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
    form: web::Json<RecipeForm>,
) -> AppResult<HttpResponse> {
    let record = service(&state)
        .replace(auth_user.scope(), id.into_inner(), form.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(RecipeView::render(RecipeAction::Update, record)))
}

/// PATCH /{id}
async fn patch_recipe(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
    form: web::Json<RecipeUpdateForm>,
) -> AppResult<HttpResponse> {
    let record = service(&state)
        .patch(auth_user.scope(), id.into_inner(), form.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(RecipeView::render(RecipeAction::Update, record)))
}

/// DELETE /{id}
async fn delete_recipe(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
) -> AppResult<HttpResponse> {
    service(&state).delete(auth_user.scope(), id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /{id}/upload-image - multipart body with an `image` part
async fn upload_recipe_image(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let id = id.into_inner();
    let recipes = service(&state);
    recipes.ensure_owned(auth_user.scope(), id).await?;

    let max_bytes = state.config.max_upload_bytes;
    let mut image: Option<Vec<u8>> = None;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;
        let is_image = field
            .content_disposition()
            .as_ref()
            .and_then(|cd| cd.get_name())
            == Some("image");

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
            if !is_image {
                continue;
            }
            if data.len() + chunk.len() > max_bytes {
                return Err(AppError::field(
                    "image",
                    format!("Ensure the file is no larger than {} bytes.", max_bytes),
                ));
            }
            data.extend_from_slice(&chunk);
        }

        if is_image && image.is_none() {
            image = Some(data);
        }
    }

    let image = image.ok_or_else(|| AppError::field("image", "No file was submitted."))?;
    let recipe = recipes.upload_image(auth_user.scope(), id, image).await?;

    Ok(HttpResponse::Ok().json(RecipeImageResponse::from(recipe)))
}
