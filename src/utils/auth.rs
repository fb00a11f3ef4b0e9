use crate::error::{AppError, AppResult};
use crate::models::Claims;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

/// Issues a signed access token for `user_id`; returns the token and its expiry.
pub fn create_jwt(user_id: i64, secret: &str, expires_in: &str) -> AppResult<(String, i64)> {
    let expiration = parse_duration(expires_in)?;
    let now = Utc::now();
    let exp = now
        .checked_add_signed(expiration)
        .ok_or_else(|| AppError::Internal("Invalid expiration time".to_string()))?
        .timestamp();

    let claims = Claims {
        sub: user_id,
        exp,
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, exp))
}

pub fn verify_jwt(token: &str, secret: &str) -> AppResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

pub fn parse_duration(duration_str: &str) -> AppResult<Duration> {
    let duration_str = duration_str.trim();
    let invalid = || AppError::Internal(format!("Invalid duration format: {}", duration_str));

    if let Some(hours) = duration_str.strip_suffix('h') {
        let hours: i64 = hours.parse().map_err(|_| invalid())?;
        Ok(Duration::hours(hours))
    } else if let Some(days) = duration_str.strip_suffix('d') {
        let days: i64 = days.parse().map_err(|_| invalid())?;
        Ok(Duration::days(days))
    } else if let Some(minutes) = duration_str.strip_suffix('m') {
        let minutes: i64 = minutes.parse().map_err(|_| invalid())?;
        Ok(Duration::minutes(minutes))
    } else {
        // Default to hours
        let hours: i64 = duration_str.parse().map_err(|_| invalid())?;
        Ok(Duration::hours(hours))
    }
}

/// Pulls the credential out of an `Authorization` header value.
///
/// Both `Bearer <token>` and the `Token <token>` scheme used by token-auth
/// clients are accepted.
pub fn extract_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("Token "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
