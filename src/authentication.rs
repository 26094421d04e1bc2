use std::sync::Arc;

use crate::db_helpers::get_user_by_id;
use crate::errors::RequestError;
use crate::models::User;
use crate::AppState;
use anyhow::{Context, Result};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const TOKEN_COOKIE: &str = "token";

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthClaim {
    pub id: i64,
    pub iat: i64,
    pub exp: i64,
}

/// The caller, resolved from a valid session token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// A caller whose role is admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = RequestError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        let state = parts
            .extensions
            .get::<Arc<AppState>>()
            .cloned()
            .ok_or_else(|| RequestError::ServerError("Application state is missing".to_owned()))?;

        let token = extract_token(&parts.headers)
            .ok_or(RequestError::NotAuthorized("No token, authorization denied"))?;
        let id = verify_jwt_token(&token, &state.config.jwt_secret)?;

        match get_user_by_id(&state.pool, id).await? {
            Some(user) => {
                tracing::debug!(user_id = user.id, "request authenticated");
                Ok(AuthUser(user))
            }
            None => {
                tracing::warn!(user_id = id, "token refers to a missing user");
                Err(RequestError::NotAuthorized("User not found"))
            }
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = RequestError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(RequestError::Forbidden("Admin access required"));
        }
        Ok(AdminUser(user))
    }
}

/// The session cookie wins over an `Authorization: Bearer` header.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_owned());
        }
    }

    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_owned())
    }
}

pub fn get_jwt_token(id: i64, secret: &str, ttl: time::Duration) -> Result<String> {
    let issued_at = OffsetDateTime::now_utc();
    let claim = AuthClaim {
        id,
        iat: issued_at.unix_timestamp(),
        exp: (issued_at + ttl).unix_timestamp(),
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claim,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("Failed to generate jwt token")
}

/// Checks signature and expiry and returns the user id the token carries.
pub fn verify_jwt_token(token: &str, secret: &str) -> Result<i64, RequestError> {
    let token_data = jsonwebtoken::decode::<AuthClaim>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "token verification failed");
        RequestError::NotAuthorized("Token is not valid")
    })?;
    Ok(token_data.claims.id)
}

pub fn session_cookie(token: String, ttl: time::Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(ttl)
        .build()
}

/// An already expired, empty session cookie.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

pub async fn verify_password_argon2(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let hash = PasswordHash::new(hash.as_str())
            .map_err(|_| anyhow::anyhow!("Stored password hash is malformed"))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok())
    })
    .await
    .context("Failed to verify password")?
}

pub async fn hash_password_argon2(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_| anyhow::anyhow!("Failed to hash password"))?;
        Ok(hash.to_string())
    })
    .await
    .context("Failed to hash password")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trip_carries_the_user_id() {
        let token = get_jwt_token(42, SECRET, time::Duration::days(7)).unwrap();
        assert_eq!(verify_jwt_token(&token, SECRET).unwrap(), 42);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = get_jwt_token(42, "other", time::Duration::days(7)).unwrap();
        assert!(matches!(
            verify_jwt_token(&token, SECRET),
            Err(RequestError::NotAuthorized("Token is not valid"))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = get_jwt_token(42, SECRET, time::Duration::hours(-2)).unwrap();
        assert!(verify_jwt_token(&token, SECRET).is_err());
    }

    #[test]
    fn cookie_takes_precedence_over_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; token=from-cookie"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("from-cookie"));

        headers.remove(header::COOKIE);
        assert_eq!(extract_token(&headers).as_deref(), Some("from-header"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Token nope"));
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn session_cookie_is_http_only_and_strict() {
        let cookie = session_cookie("abc".to_owned(), time::Duration::days(7), true);
        assert_eq!(cookie.name(), TOKEN_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));
    }

    #[test]
    fn removal_cookie_expires_immediately() {
        let cookie = removal_cookie();
        assert_eq!(cookie.name(), TOKEN_COOKIE);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }

    #[tokio::test]
    async fn password_hash_verifies_only_the_original_password() {
        let hash = hash_password_argon2("hunter22".to_owned()).await.unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password_argon2("hunter22".to_owned(), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password_argon2("hunter23".to_owned(), hash)
            .await
            .unwrap());
    }
}
