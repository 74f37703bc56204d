use std::net::SocketAddr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use tracing::info;

use crate::constants::{CONTACT_MAX_PAGE_SIZE, CONTACT_STATUSES};
use crate::db::contacts::{self, ContactView, NewContact};
use crate::error::AppError;
use crate::state::AppState;
use crate::util::{is_valid_email, rfc3339, start_of_day};

use super::json_body;

const MAX_NAME_CHARS: usize = 100;
const MAX_SUBJECT_CHARS: usize = 200;
const MAX_MESSAGE_CHARS: usize = 5000;

#[derive(Deserialize)]
pub(crate) struct SubmitRequest {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) email: String,
    #[serde(default)]
    pub(crate) subject: String,
    #[serde(default)]
    pub(crate) message: String,
}

#[derive(Deserialize)]
pub(crate) struct StatusQuery {
    pub(crate) email: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    pub(crate) page: Option<i64>,
    pub(crate) limit: Option<i64>,
    pub(crate) status: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct StatusUpdate {
    #[serde(default)]
    pub(crate) status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReplyRequest {
    #[serde(default)]
    pub(crate) reply_message: String,
}

fn query<T>(q: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    q.map(|Query(v)| v)
        .map_err(|e| AppError::BadRequest(format!("Invalid query: {}", e.body_text())))
}

fn not_found() -> AppError {
    AppError::NotFound("Contact submission not found".to_string())
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

pub(crate) fn is_valid_status(status: &str) -> bool {
    CONTACT_STATUSES.contains(&status)
}

pub(crate) async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(body)?;

    if [&req.name, &req.email, &req.subject, &req.message]
        .iter()
        .any(|v| v.trim().is_empty())
    {
        return Err(AppError::BadRequest("All fields are required".to_string()));
    }
    if !is_valid_email(&req.email) {
        return Err(AppError::BadRequest(
            "Please enter a valid email address".to_string(),
        ));
    }
    if req.name.chars().count() > MAX_NAME_CHARS
        || req.subject.chars().count() > MAX_SUBJECT_CHARS
        || req.message.chars().count() > MAX_MESSAGE_CHARS
    {
        return Err(AppError::BadRequest("Message is too long".to_string()));
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ip = state.client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));

    let contact = contacts::insert(
        &state.db,
        NewContact {
            name: &req.name,
            email: &req.email,
            subject: &req.subject,
            message: &req.message,
            ip_address: Some(ip),
            user_agent,
        },
        now_unix(),
    )
    .await?;

    info!(contact_id = %contact.id, "contact submission stored");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Message sent successfully! We'll get back to you soon.",
            "data": { "id": contact.id, "createdAt": rfc3339(contact.created_at) },
        })),
    )
        .into_response())
}

pub(crate) async fn check_status(
    State(state): State<AppState>,
    q: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let q = query(q)?;
    let email = q
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("Email is required".to_string()))?;

    let Some(contact) = contacts::latest_for_email(&state.db, email).await? else {
        return Err(AppError::NotFound(
            "No contact submission found for this email".to_string(),
        ));
    };

    let admin_reply = contact.admin_reply();
    Ok(Json(json!({
        "success": true,
        "data": {
            "id": contact.id,
            "name": contact.name,
            "subject": contact.subject,
            "message": contact.message,
            "status": contact.status,
            "submittedAt": rfc3339(contact.created_at),
            "adminReply": admin_reply,
        },
    }))
    .into_response())
}

pub(crate) async fn admin_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    q: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    state.require_admin(&headers)?;
    let q = query(q)?;

    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(10).clamp(1, CONTACT_MAX_PAGE_SIZE);
    // Unknown status values are ignored rather than rejected.
    let status = q.status.as_deref().filter(|s| is_valid_status(s));

    let rows = contacts::list(&state.db, status, page, limit).await?;
    let total = contacts::count(&state.db, status).await?;
    let data: Vec<ContactView> = rows.into_iter().map(ContactView::from).collect();

    Ok(Json(json!({
        "success": true,
        "data": data,
        "pagination": {
            "currentPage": page,
            "totalPages": (total + limit - 1) / limit,
            "totalItems": total,
            "itemsPerPage": limit,
        },
    }))
    .into_response())
}

pub(crate) async fn admin_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    state.require_admin(&headers)?;
    let today = start_of_day(OffsetDateTime::now_utc());
    let stats = contacts::stats(&state.db, today).await?;
    Ok(Json(json!({ "success": true, "data": stats })).into_response())
}

pub(crate) async fn admin_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    state.require_admin(&headers)?;
    let contact = contacts::get(&state.db, &id).await?.ok_or_else(not_found)?;
    Ok(Json(json!({ "success": true, "data": ContactView::from(contact) })).into_response())
}

pub(crate) async fn admin_update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Response, AppError> {
    state.require_admin(&headers)?;
    let req = json_body(body)?;
    if !is_valid_status(&req.status) {
        return Err(AppError::BadRequest("Invalid status value".to_string()));
    }

    let contact = contacts::set_status(&state.db, &id, &req.status, now_unix())
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(json!({
        "success": true,
        "message": "Status updated successfully",
        "data": ContactView::from(contact),
    }))
    .into_response())
}

pub(crate) async fn admin_reply(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<ReplyRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let admin = state.require_admin(&headers)?;
    let req = json_body(body)?;
    if req.reply_message.trim().is_empty() {
        return Err(AppError::BadRequest("Reply message is required".to_string()));
    }

    let replied_by = if admin.name.trim().is_empty() {
        "Admin"
    } else {
        admin.name.as_str()
    };
    let contact = contacts::reply(&state.db, &id, &req.reply_message, replied_by, now_unix())
        .await?
        .ok_or_else(not_found)?;

    // Replies are stored for the status page; no mail is sent.
    info!(contact_id = %contact.id, to = %contact.email, "stored admin reply");
    Ok(Json(json!({
        "success": true,
        "message": "Reply sent successfully",
        "data": ContactView::from(contact),
    }))
    .into_response())
}

pub(crate) async fn admin_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    state.require_admin(&headers)?;
    if !contacts::delete(&state.db, &id).await? {
        return Err(not_found());
    }
    info!(contact_id = %id, "contact submission deleted");
    Ok(Json(json!({
        "success": true,
        "message": "Contact submission deleted successfully",
    }))
    .into_response())
}
