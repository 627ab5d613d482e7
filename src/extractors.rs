use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::response::AppError;

/// `axum::Json` with the rejection folded into the standard error envelope:
/// malformed bodies come back as an `INVALID_REQUEST_BODY` JSON error instead
/// of axum's plain-text default. The concrete parse failure is logged, not
/// echoed to the client.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                tracing::warn!(
                    kind = rejection_kind(&rejection),
                    error = %rejection,
                    "Rejected request body"
                );
                AppError::bad_request("INVALID_REQUEST_BODY", "Invalid request body")
            })?;
        Ok(JsonBody(value))
    }
}

fn rejection_kind(rejection: &JsonRejection) -> &'static str {
    match rejection {
        JsonRejection::JsonDataError(_) => "data",
        JsonRejection::JsonSyntaxError(_) => "syntax",
        JsonRejection::MissingJsonContentType(_) => "content_type",
        JsonRejection::BytesRejection(_) => "bytes",
        _ => "other",
    }
}
