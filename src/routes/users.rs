use actix_web::{
    cookie::{time::OffsetDateTime, Cookie, SameSite},
    web, HttpResponse,
};

use crate::error::AppResult;
use crate::middleware::{AuthMiddleware, AuthUser};
use crate::models::{CreateUserRequest, TokenRequest, UpdateUserRequest, UserResponse};
use crate::services::UserService;
use crate::AppState;

pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/create", web::post().to(create_user))
        .route("/token", web::post().to(create_token))
        .service(
            web::resource("/me")
                .wrap(AuthMiddleware)
                .route(web::get().to(get_me))
                .route(web::put().to(update_me))
                .route(web::patch().to(update_me)),
        );
}

fn token_cookie(token: &str, expires_at: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new("token", token.to_string());
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    if let Ok(expires) = OffsetDateTime::from_unix_timestamp(expires_at) {
        cookie.set_expires(expires);
    }
    cookie
}

/// POST /create - Register a new account
async fn create_user(
    state: web::Data<AppState>,
    form: web::Json<CreateUserRequest>,
) -> AppResult<HttpResponse> {
    let user = UserService::new(state.store.as_ref())
        .register(form.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// POST /token - Exchange credentials for an access token
async fn create_token(
    state: web::Data<AppState>,
    form: web::Json<TokenRequest>,
) -> AppResult<HttpResponse> {
    let response = UserService::new(state.store.as_ref())
        .issue_token(form.into_inner(), &state.config)
        .await?;

    Ok(HttpResponse::Ok()
        .cookie(token_cookie(&response.token, response.expires_at))
        .json(response))
}

/// GET /me
async fn get_me(auth_user: AuthUser) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(UserResponse::from(auth_user.user)))
}

/// PUT|PATCH /me - Update name and/or password
async fn update_me(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    form: web::Json<UpdateUserRequest>,
) -> AppResult<HttpResponse> {
    let user = UserService::new(state.store.as_ref())
        .update(auth_user.id(), form.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}
