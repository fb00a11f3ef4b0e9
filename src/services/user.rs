use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateUserRequest, NewUser, TokenRequest, TokenResponse, UpdateUserRequest, User, UserChanges,
};
use crate::store::Store;
use crate::utils::auth::create_jwt;
use crate::utils::password::{hash_password, verify_password};

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct UserService<'a> {
    store: &'a dyn Store,
}

impl<'a> UserService<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        UserService { store }
    }

    pub async fn register(&self, form: CreateUserRequest) -> AppResult<User> {
        form.validate()?;
        let user = self
            .store
            .create_user(NewUser {
                email: normalize_email(&form.email),
                name: form.name,
                password: hash_password(&form.password)?,
            })
            .await?;

        tracing::info!(user_id = user.id, "User registered");
        Ok(user)
    }

    /// Checks credentials; unknown emails, wrong passwords and inactive
    /// accounts all fail the same way.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        let user = self
            .store
            .get_user_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !user.is_active || !verify_password(password, &user.password)? {
            return Err(AppError::InvalidCredentials);
        }
        Ok(user)
    }

    pub async fn issue_token(&self, form: TokenRequest, config: &Config) -> AppResult<TokenResponse> {
        form.validate()?;
        let user = self.authenticate(&form.email, &form.password).await?;
        let (token, expires_at) = create_jwt(user.id, &config.secret_key, &config.jwt_expires_in)?;

        tracing::info!(user_id = user.id, "Token issued");
        Ok(TokenResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_at,
        })
    }

    pub async fn update(&self, user_id: i64, form: UpdateUserRequest) -> AppResult<User> {
        form.validate()?;
        let password = form.password.as_deref().map(hash_password).transpose()?;
        let user = self
            .store
            .update_user(
                user_id,
                UserChanges {
                    name: form.name,
                    password,
                },
            )
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        tracing::info!(user_id, "User updated");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::utils::auth::verify_jwt;
    use std::collections::HashMap;

    fn config() -> Config {
        let env: HashMap<String, String> = [("DATABASE_URL", "memory://"), ("SECRET_KEY", "testsecret")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(::config::Environment::default().source(Some(env))).unwrap()
    }

    fn signup(email: &str, password: &str) -> CreateUserRequest {
        CreateUserRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: "Test name".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_hashes_password_and_lowercases_email() {
        let store = MemoryStore::new();
        let user = UserService::new(&store)
            .register(signup("Test@Example.COM", "testpass123"))
            .await
            .unwrap();

        assert_eq!(user.email, "test@example.com");
        assert_ne!(user.password, "testpass123");
        assert!(verify_password("testpass123", &user.password).unwrap());
    }

    #[tokio::test]
    async fn test_register_rejects_short_password_and_duplicates() {
        let store = MemoryStore::new();
        let service = UserService::new(&store);

        assert!(matches!(
            service.register(signup("test@example.com", "pw")).await,
            Err(AppError::Validation(e)) if e.get("password").is_some()
        ));
        service.register(signup("test@example.com", "testpass123")).await.unwrap();
        assert!(matches!(
            service.register(signup("TEST@example.com", "testpass123")).await,
            Err(AppError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_token_for_valid_credentials() {
        let store = MemoryStore::new();
        let service = UserService::new(&store);
        let config = config();
        let user = service.register(signup("test@example.com", "testpass123")).await.unwrap();

        let response = service
            .issue_token(
                TokenRequest {
                    email: "test@example.com".into(),
                    password: "testpass123".into(),
                },
                &config,
            )
            .await
            .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(verify_jwt(&response.token, &config.secret_key).unwrap().sub, user.id);
    }

    #[tokio::test]
    async fn test_bad_credentials_are_rejected() {
        let store = MemoryStore::new();
        let service = UserService::new(&store);
        service.register(signup("test@example.com", "goodpass")).await.unwrap();

        assert!(matches!(
            service.authenticate("test@example.com", "badpass").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            service.authenticate("nobody@example.com", "goodpass").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_update_changes_name_and_password() {
        let store = MemoryStore::new();
        let service = UserService::new(&store);
        let user = service.register(signup("test@example.com", "testpass123")).await.unwrap();

        let updated = service
            .update(
                user.id,
                UpdateUserRequest {
                    name: Some("Updated name".into()),
                    password: Some("newpassword123".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Updated name");
        assert!(service.authenticate("test@example.com", "newpassword123").await.is_ok());
    }
}
