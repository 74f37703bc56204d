use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::AppError;

pub(crate) mod auth;
pub(crate) mod contact;
pub(crate) mod convert;
pub(crate) mod health;
pub(crate) mod quota;

/// Unwraps a JSON body, turning axum's rejection into a JSON 400.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e.body_text())))
}
