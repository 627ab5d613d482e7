use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::response::AppError;
use crate::state::AppState;

/// Syntactically valid argon2id hash that matches no real password. Login
/// verifies against it when the email is unknown, so the unknown-email and
/// wrong-password paths cost the same.
pub const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$ZHVtbXlzYWx0ZHVtbXk$YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXoxMjM0NTY";

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    match Argon2::default().hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(e) => Err(AppError::internal(&format!("argon2 hashing failed: {e}"))),
    }
}

pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::internal(&format!("stored hash is not parseable: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Sessions are keyed by this digest so a leaked store dump yields no usable
/// bearer tokens.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub jti: String,
}

pub fn sign_jwt_for_user(
    user_id: &str,
    secret: &str,
    expires_in_hours: u64,
) -> Result<String, AppError> {
    let issued = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        token_type: "user".to_string(),
        iat: issued.timestamp(),
        exp: (issued + Duration::hours(expires_in_hours as i64)).timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(&format!("jwt signing failed: {e}")))
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    // 显式固定 HS256，避免算法混淆类攻击
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::unauthorized("Invalid or expired token"))
}

/// Bearer header first, `token` cookie as the fallback for browser clients.
pub fn extract_token_from_headers(headers: &HeaderMap) -> Result<String, AppError> {
    let from_bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    let from_cookie = || {
        headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|cookies| {
                cookies
                    .split(';')
                    .find_map(|part| part.trim().strip_prefix("token=").map(str::to_string))
            })
    };

    from_bearer
        .or_else(from_cookie)
        .ok_or_else(|| AppError::unauthorized("Missing bearer token"))
}

/// Identity of the calling user. Resolving it checks three things: the JWT
/// signature and expiry, a live session row for the token's hash, and that
/// the user still exists. Any miss is the same 401 to the client.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let store = app_state.store();

        let token = extract_token_from_headers(&parts.headers)?;
        let claims = verify_jwt(&token, &app_state.config().jwt_secret)?;
        if claims.token_type != "user" {
            return Err(AppError::unauthorized("Invalid token type"));
        }

        let session = store
            .get_session(&hash_token(&token))?
            .filter(|s| s.user_id == claims.sub)
            .ok_or_else(|| AppError::unauthorized("Session not found or expired"))?;

        if store.get_user_by_id(&session.user_id)?.is_none() {
            return Err(AppError::unauthorized("User not found"));
        }

        Ok(AuthUser {
            user_id: session.user_id,
        })
    }
}
