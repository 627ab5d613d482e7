use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{
    extract_token_from_headers, hash_password, hash_token, sign_jwt_for_user, verify_password,
    AuthUser, DUMMY_PASSWORD_HASH,
};
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::routes::users::UserProfile;
use crate::state::AppState;
use crate::store::operations::sessions::Session;
use crate::store::operations::users::User;
use crate::store::StoreError;
use crate::validation::{is_valid_email, validate_name, validate_password};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    email: String,
    name: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    token: String,
    user: UserProfile,
}

async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::bad_request("INVALID_EMAIL", "Invalid email address"));
    }
    let name = req.name.trim().to_string();
    validate_name(&name).map_err(|msg| AppError::bad_request("INVALID_NAME", msg))?;
    validate_password(&req.password)
        .map_err(|msg| AppError::bad_request("WEAK_PASSWORD", msg))?;

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email: email.clone(),
        name,
        password_hash: hash_password(&req.password)?,
        points: 0.0,
        active_session_record_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    // 重复邮箱由存储层 CAS 保证，这里只负责翻译错误码
    match state.store().create_user(&user) {
        Ok(()) => {}
        Err(StoreError::Conflict { .. }) => {
            return Err(AppError::conflict(
                "EMAIL_TAKEN",
                "An account with this email already exists",
            ));
        }
        Err(e) => return Err(e.into()),
    }

    let token = issue_session(&state, &user.id)?;
    tracing::info!(user_id = %user.id, "User registered");

    Ok(created(AuthResponse {
        token,
        user: UserProfile::from_user(&user),
    }))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.trim().to_lowercase();

    let user = state.store().get_user_by_email(&email)?;

    // Run the argon2 verify in both branches so "unknown email" and "wrong
    // password" take the same time.
    let (valid, user) = match user {
        Some(user) => {
            let valid = verify_password(&req.password, &user.password_hash)?;
            (valid, Some(user))
        }
        None => {
            let _ = verify_password(&req.password, DUMMY_PASSWORD_HASH);
            (false, None)
        }
    };

    let Some(user) = user.filter(|_| valid) else {
        return Err(AppError::unauthorized("Invalid email or password"));
    };

    let token = issue_session(&state, &user.id)?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(ok(AuthResponse {
        token,
        user: UserProfile::from_user(&user),
    }))
}

async fn logout(
    auth: AuthUser,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = extract_token_from_headers(&headers)?;
    state.store().delete_session(&hash_token(&token))?;
    tracing::info!(user_id = %auth.user_id, "User logged out");

    Ok(ok(serde_json::json!({ "loggedOut": true })))
}

/// Sign a JWT and persist the matching session row keyed by the token hash.
fn issue_session(state: &AppState, user_id: &str) -> Result<String, AppError> {
    let config = state.config();
    let token = sign_jwt_for_user(user_id, &config.jwt_secret, config.jwt_expires_in_hours)?;

    let session = Session {
        token_hash: hash_token(&token),
        user_id: user_id.to_string(),
        created_at: Utc::now(),
        expires_at: Utc::now() + Duration::hours(config.jwt_expires_in_hours as i64),
        revoked: false,
    };
    state.store().create_session(&session)?;

    Ok(token)
}
