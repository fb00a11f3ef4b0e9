use actix_web::{web, HttpResponse};

use crate::{
    error::AppResult,
    middleware::{AuthMiddleware, AuthUser},
    models::{AttributeForm, AttributeKind, AttributeResponse, AttributeUpdateForm},
    services::AttributeService,
    AppState,
};

/// Routes shared by `/tags` and `/ingredients`; the scope supplies the kind.
pub fn create_routes(kind: AttributeKind) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::new(kind))
            .service(
                web::resource("")
                    .wrap(AuthMiddleware)
                    .route(web::get().to(list_attributes)),
            )
            .service(
                web::resource("/{id}")
                    .wrap(AuthMiddleware)
                    .route(web::put().to(replace_attribute))
                    .route(web::patch().to(update_attribute))
                    .route(web::delete().to(delete_attribute)),
            );
    }
}

/// GET / - Caller's rows, by name descending
async fn list_attributes(
    state: web::Data<AppState>,
    kind: web::Data<AttributeKind>,
    auth_user: AuthUser,
) -> AppResult<HttpResponse> {
    let rows: Vec<AttributeResponse> = AttributeService::new(state.store.as_ref(), **kind)
        .list(auth_user.scope())
        .await?
        .into_iter()
        .map(AttributeResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(rows))
}

/// PUT /{id} - Rename; `name` is required
async fn replace_attribute(
    state: web::Data<AppState>,
    kind: web::Data<AttributeKind>,
    auth_user: AuthUser,
    id: web::Path<i64>,
    form: web::Json<AttributeForm>,
) -> AppResult<HttpResponse> {
    let row = AttributeService::new(state.store.as_ref(), **kind)
        .update(auth_user.scope(), id.into_inner(), form.into_inner().into())
        .await?;

    Ok(HttpResponse::Ok().json(AttributeResponse::from(row)))
}

/// PATCH /{id} - Rename
async fn update_attribute(
    state: web::Data<AppState>,
    kind: web::Data<AttributeKind>,
    auth_user: AuthUser,
    id: web::Path<i64>,
    form: web::Json<AttributeUpdateForm>,
) -> AppResult<HttpResponse> {
    let row = AttributeService::new(state.store.as_ref(), **kind)
        .update(auth_user.scope(), id.into_inner(), form.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(AttributeResponse::from(row)))
}

/// DELETE /{id}
async fn delete_attribute(
    state: web::Data<AppState>,
    kind: web::Data<AttributeKind>,
    auth_user: AuthUser,
    id: web::Path<i64>,
) -> AppResult<HttpResponse> {
    AttributeService::new(state.store.as_ref(), **kind)
        .delete(auth_user.scope(), id.into_inner())
        .await?;

    Ok(HttpResponse::NoContent().finish())
}
