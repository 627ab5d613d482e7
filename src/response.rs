use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

/// API error carrying the HTTP status, a stable machine-readable code, and a
/// message. Non-operational errors (bugs, infrastructure) keep their message
/// server-side only.
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl AppError {
    fn operational(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
            is_operational: true,
        }
    }

    pub fn bad_request(code: &str, message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::UNAUTHORIZED, "AUTH_UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(code: &str, message: impl Into<String>) -> Self {
        Self::operational(StatusCode::CONFLICT, code, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            is_operational: false,
        }
    }

    /// Guard rejection: the user already owns a Pending or Started session.
    pub fn active_session_exists() -> Self {
        Self::conflict(
            "ACTIVE_SESSION_EXISTS",
            "Please finish your active session before starting a new one.",
        )
    }

    /// The requested operation is not valid for the record's current state.
    pub fn invalid_transition() -> Self {
        Self::bad_request(
            "INVALID_TRANSITION",
            "This action is not available for the session in its current state.",
        )
    }

    /// Topic extraction or question generation failed. The cause is logged
    /// server-side with full context; the caller only sees a retry hint.
    pub fn invalid_topic_input() -> Self {
        Self::bad_request(
            "INVALID_TOPIC_INPUT",
            "We couldn't start a session from that topic. Please try again.",
        )
    }

    /// Answer grading failed. Same redaction policy as topic extraction.
    pub fn answer_grading_failed() -> Self {
        Self::bad_request(
            "ANSWER_GRADING_FAILED",
            "We couldn't grade that answer. Please try again.",
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Internal API error");
        }

        let body = ErrorBody {
            success: false,
            code: self.code,
            message: if self.is_operational {
                self.message
            } else {
                "Internal server error".to_string()
            },
            trace_id: None,
        };

        (self.status, Json(body)).into_response()
    }
}

// 安全说明：StoreError 转换映射：
// - Validation -> 400 Bad Request（用户输入问题，可安全暴露消息）
// - NotFound -> 404（不区分"不存在"与"属于他人"）
// - Conflict -> 409（并发写入冲突，由调用方决定是否换成领域错误码）
// - 其他错误 -> 500 Internal（is_operational=false，IntoResponse 中会替换为通用消息）
impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match &value {
            StoreError::Validation(msg) => AppError::bad_request("VALIDATION_ERROR", msg.clone()),
            StoreError::NotFound { .. } => AppError::not_found("Resource not found"),
            StoreError::Conflict { .. } => {
                AppError::conflict("CONFLICT", "The resource was modified concurrently")
            }
            _ => AppError::internal(value.to_string()),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}
