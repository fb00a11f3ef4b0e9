//! Token authentication.
//!
//! [`AuthMiddleware`] guards a resource: it resolves the request's bearer
//! token to an active user and stores it in the request extensions, where
//! handlers pick it up through the [`AuthUser`] extractor.

use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::Error as ActixError,
    http::header,
    web, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::services::OwnerScope;
use crate::utils::auth::{extract_token, verify_jwt};
use crate::AppState;

const MISSING_CREDENTIALS: &str = "Authentication credentials were not provided.";

#[derive(Clone)]
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    /// Scope for owner-filtered recipe, tag and ingredient access.
    pub fn scope(&self) -> OwnerScope {
        OwnerScope::new(self.user.id)
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized(MISSING_CREDENTIALS.to_string())),
        )
    }
}

/// `Authorization: Bearer|Token <jwt>`, falling back to the `token` cookie.
fn request_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_token)
        .map(str::to_string)
        .or_else(|| req.cookie("token").map(|c| c.value().to_string()))
}

async fn authenticate(state: &AppState, token: &str) -> AppResult<AuthUser> {
    let claims = verify_jwt(token, &state.config.secret_key).map_err(|e| {
        tracing::debug!("JWT verification failed: {:?}", e);
        AppError::Unauthorized("Invalid or expired token".to_string())
    })?;

    let user = state
        .store
        .get_user_by_id(claims.sub)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| AppError::Unauthorized("User inactive or deleted".to_string()))?;

    Ok(AuthUser { user })
}

pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type InitError = ();
    type Transform = AuthGuard<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthGuard {
            inner: Rc::new(service),
        }))
    }
}

pub struct AuthGuard<S> {
    inner: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthGuard<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(inner);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let inner = self.inner.clone();

        Box::pin(async move {
            let state = req
                .app_data::<web::Data<AppState>>()
                .cloned()
                .ok_or_else(|| AppError::Internal("App state not found".to_string()))?;
            let token = request_token(&req)
                .ok_or_else(|| AppError::Unauthorized(MISSING_CREDENTIALS.to_string()))?;

            let auth_user = authenticate(&state, &token).await?;
            req.extensions_mut().insert(auth_user);

            inner.call(req).await
        })
    }
}
