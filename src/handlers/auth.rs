use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use tracing::info;

use crate::constants::MIN_PASSWORD_LEN;
use crate::db::users::{self, UserView};
use crate::error::AppError;
use crate::password::{hash_password, verify_password};
use crate::state::AppState;
use crate::token::TokenSubject;
use crate::util::is_valid_email;

use super::json_body;

#[derive(Deserialize)]
pub(crate) struct RegisterRequest {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) email: String,
    #[serde(default)]
    pub(crate) password: String,
}

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    #[serde(default)]
    pub(crate) email: String,
    #[serde(default)]
    pub(crate) password: String,
}

pub(crate) async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(body)?;

    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Name, email and password are required".to_string(),
        ));
    }
    if !is_valid_email(&req.email) {
        return Err(AppError::BadRequest(
            "Please enter a valid email address".to_string(),
        ));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("hash task failed: {e}")))?;

    let Some(user) = users::create(&state.db, &req.name, &req.email, &password_hash, false).await?
    else {
        return Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    };

    info!(user_id = %user.id, "registered user");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Registration successful",
            "user": UserView::from(&user),
        })),
    )
        .into_response())
}

pub(crate) async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(body)?;
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let Some(user) = users::find_by_email(&state.db, &req.email).await? else {
        return Err(invalid());
    };

    let password = req.password;
    let stored = user.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {e}")))?;
    if !matches {
        return Err(invalid());
    }

    let token = state.signer.issue(
        &TokenSubject {
            id: &user.id,
            email: &user.email,
            name: &user.name,
            is_admin: user.is_admin,
        },
        OffsetDateTime::now_utc(),
    );

    info!(user_id = %user.id, "user logged in");
    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "token": token,
        "user": UserView::from(&user),
    }))
    .into_response())
}

pub(crate) async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let claims = state.require_user(&headers)?;
    let Some(user) = users::find_by_id(&state.db, &claims.id).await? else {
        return Err(AppError::NotFound("User not found".to_string()));
    };
    Ok(Json(json!({ "success": true, "user": UserView::from(&user) })).into_response())
}
