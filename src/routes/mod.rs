pub mod attributes;
pub mod health;
pub mod recipes;
pub mod users;

use actix_web::web;

use crate::error::AppError;
use crate::models::AttributeKind;

/// Malformed or mistyped JSON bodies are reported like any other bad request.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(format!("JSON parse error: {}", err)).into())
}

/// Every route of the service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(web::scope("/health").configure(health::create_routes))
        .service(web::scope("/api").configure(create_routes));
}

pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/recipes").configure(recipes::create_routes))
        .service(web::scope("/tags").configure(attributes::create_routes(AttributeKind::Tag)))
        .service(
            web::scope("/ingredients")
                .configure(attributes::create_routes(AttributeKind::Ingredient)),
        )
        .service(web::scope("/user").configure(users::create_routes));
}
