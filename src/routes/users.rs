use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::levels::{level_for_points, points_of_next_level, UserLevel};
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::users::User;

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

/// Public view of a user row. Level and the next-level threshold are derived
/// from the point total on every read, never persisted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub points: f64,
    pub level: UserLevel,
    pub points_of_next_level: f64,
    pub active_session_record_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl UserProfile {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            points: user.points,
            level: level_for_points(user.points),
            points_of_next_level: points_of_next_level(user.points),
            active_session_record_id: user.active_session_record_id.clone(),
            created_at: user.created_at,
        }
    }
}

async fn me(auth: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store()
        .get_user_by_id(&auth.user_id)?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(ok(UserProfile::from_user(&user)))
}
