use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::error::AppResult;
use crate::AppState;

pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(health_check))
        .route("/db", web::get().to(health_check_db));
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": true }))
}

async fn health_check_db(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    state.store.ping().await?;
    Ok(HttpResponse::Ok().json(json!({ "status": true })))
}
